use crate::types::{
    DiscreteItem,
    FungibleKind,
    Identity,
    InventoryEntry,
    TokenAmount,
};
use std::collections::{
    BTreeMap,
    HashMap,
};

/// Issued when a refresh starts. A response is applied only if its ticket is still the
/// newest one for that part of the cache and the session has not moved on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    seq: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer response already landed, or the session changed identity meanwhile.
    Stale,
}

impl ApplyOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

/// Consistent copy of the cache handed to readers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventorySnapshot {
    pub owner: Option<Identity>,
    pub entries: Vec<InventoryEntry>,
    pub fungible: HashMap<FungibleKind, TokenAmount>,
    /// False until the first discrete refresh for `owner` has landed.
    pub loaded: bool,
}

impl InventorySnapshot {
    pub fn owns(&self, item: DiscreteItem) -> bool {
        self.entries.iter().any(|entry| entry.item == item)
    }

    pub fn balance(&self, kind: FungibleKind) -> Option<TokenAmount> {
        self.fungible.get(&kind).copied()
    }
}

/// Local snapshot of what the connected identity owns.
///
/// Only meaningful for `owner`; any session change resets it. Discrete entries are
/// replaced wholesale by refreshes and extended by confirmed mints.
#[derive(Debug, Default)]
pub struct InventoryCache {
    owner: Option<Identity>,
    epoch: u64,
    entries: BTreeMap<DiscreteItem, InventoryEntry>,
    fungible: HashMap<FungibleKind, TokenAmount>,
    loaded: bool,
    next_seq: u64,
    discrete_seq: u64,
    fungible_seq: HashMap<FungibleKind, u64>,
}

impl InventoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything and start over for `owner` in session `epoch`.
    pub fn reset_for(&mut self, owner: Option<Identity>, epoch: u64) {
        self.owner = owner;
        self.epoch = epoch;
        self.entries.clear();
        self.fungible.clear();
        self.loaded = false;
        self.discrete_seq = 0;
        self.fungible_seq.clear();
    }

    pub fn issue_ticket(&mut self) -> Ticket {
        self.next_seq += 1;
        Ticket {
            epoch: self.epoch,
            seq: self.next_seq,
        }
    }

    fn accepts(&self, ticket: Ticket, owner: &Identity, last_applied: u64) -> bool {
        ticket.epoch == self.epoch
            && self.owner.as_ref() == Some(owner)
            && ticket.seq > last_applied
    }

    /// Replace the discrete entries with a backend listing.
    pub fn apply_discrete(
        &mut self,
        ticket: Ticket,
        owner: &Identity,
        listing: Vec<InventoryEntry>,
    ) -> ApplyOutcome {
        if !self.accepts(ticket, owner, self.discrete_seq) {
            return ApplyOutcome::Stale;
        }
        let mut entries = BTreeMap::new();
        for entry in listing {
            entries.entry(entry.item).or_insert(entry);
        }
        self.entries = entries;
        self.loaded = true;
        self.discrete_seq = ticket.seq;
        ApplyOutcome::Applied
    }

    pub fn apply_fungible(
        &mut self,
        ticket: Ticket,
        owner: &Identity,
        kind: FungibleKind,
        amount: TokenAmount,
    ) -> ApplyOutcome {
        let last = self.fungible_seq.get(&kind).copied().unwrap_or_default();
        if !self.accepts(ticket, owner, last) {
            return ApplyOutcome::Stale;
        }
        self.fungible.insert(kind, amount);
        self.fungible_seq.insert(kind, ticket.seq);
        ApplyOutcome::Applied
    }

    /// Add the entry produced by a confirmed mint.
    ///
    /// Counts as a discrete update, so refreshes issued before the confirmation can no
    /// longer overwrite it.
    pub fn record_confirmed(
        &mut self,
        ticket: Ticket,
        owner: &Identity,
        entry: InventoryEntry,
    ) -> ApplyOutcome {
        if !self.accepts(ticket, owner, self.discrete_seq) {
            return ApplyOutcome::Stale;
        }
        self.entries.entry(entry.item).or_insert(entry);
        self.discrete_seq = ticket.seq;
        ApplyOutcome::Applied
    }

    pub fn owns(&self, owner: &Identity, item: DiscreteItem) -> bool {
        self.owner.as_ref() == Some(owner) && self.entries.contains_key(&item)
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        InventorySnapshot {
            owner: self.owner.clone(),
            entries: self.entries.values().cloned().collect(),
            fungible: self.fungible.clone(),
            loaded: self.loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn alice() -> Identity {
        Identity::new("0xa11ce")
    }

    fn entry(item: DiscreteItem, uri: &str) -> InventoryEntry {
        InventoryEntry {
            item,
            metadata_ref: uri.to_string(),
        }
    }

    fn cache_for_alice() -> InventoryCache {
        let mut cache = InventoryCache::new();
        cache.reset_for(Some(alice()), 1);
        cache
    }

    #[test]
    fn apply_discrete__replaces_entries_wholesale() {
        // given
        let mut cache = cache_for_alice();
        let first = cache.issue_ticket();
        cache.apply_discrete(
            first,
            &alice(),
            vec![entry(DiscreteItem::Sword, "uri1"), entry(DiscreteItem::Gem, "uri2")],
        );

        // when
        let second = cache.issue_ticket();
        let outcome =
            cache.apply_discrete(second, &alice(), vec![entry(DiscreteItem::Potion, "uri3")]);

        // then
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            cache.snapshot().entries,
            vec![entry(DiscreteItem::Potion, "uri3")]
        );
    }

    #[test]
    fn apply_discrete__older_ticket_landing_late_is_discarded() {
        let mut cache = cache_for_alice();
        let older = cache.issue_ticket();
        let newer = cache.issue_ticket();

        let newer_outcome =
            cache.apply_discrete(newer, &alice(), vec![entry(DiscreteItem::Sword, "uri1")]);
        let older_outcome = cache.apply_discrete(older, &alice(), Vec::new());

        assert_eq!(newer_outcome, ApplyOutcome::Applied);
        assert_eq!(older_outcome, ApplyOutcome::Stale);
        assert!(cache.owns(&alice(), DiscreteItem::Sword));
    }

    #[test]
    fn apply_discrete__ticket_from_previous_session_is_discarded() {
        let mut cache = cache_for_alice();
        let ticket = cache.issue_ticket();
        cache.reset_for(Some(alice()), 2);

        let outcome =
            cache.apply_discrete(ticket, &alice(), vec![entry(DiscreteItem::Sword, "u")]);

        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(cache.snapshot().entries.is_empty());
        assert!(!cache.snapshot().loaded);
    }

    #[test]
    fn apply_discrete__duplicate_items_collapse_to_one_entry() {
        let mut cache = cache_for_alice();
        let ticket = cache.issue_ticket();

        cache.apply_discrete(
            ticket,
            &alice(),
            vec![entry(DiscreteItem::Gem, "a"), entry(DiscreteItem::Gem, "b")],
        );

        assert_eq!(cache.snapshot().entries, vec![entry(DiscreteItem::Gem, "a")]);
    }

    #[test]
    fn record_confirmed__supersedes_refreshes_issued_earlier() {
        let mut cache = cache_for_alice();
        let refresh = cache.issue_ticket();
        let confirm = cache.issue_ticket();

        cache.record_confirmed(confirm, &alice(), entry(DiscreteItem::Sword, "uri1"));
        let outcome = cache.apply_discrete(refresh, &alice(), Vec::new());

        assert_eq!(outcome, ApplyOutcome::Stale);
        assert!(cache.owns(&alice(), DiscreteItem::Sword));
    }

    #[test]
    fn apply_fungible__tracks_kinds_independently_of_discrete_entries() {
        let mut cache = cache_for_alice();
        let discrete = cache.issue_ticket();
        let fungible = cache.issue_ticket();

        cache.apply_fungible(fungible, &alice(), FungibleKind::Gold, TokenAmount(70));
        let outcome = cache.apply_discrete(discrete, &alice(), Vec::new());

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            cache.snapshot().balance(FungibleKind::Gold),
            Some(TokenAmount(70))
        );
    }

    #[test]
    fn reset_for__clears_entries_and_balances() {
        let mut cache = cache_for_alice();
        let ticket = cache.issue_ticket();
        cache.apply_discrete(ticket, &alice(), vec![entry(DiscreteItem::Sword, "u")]);
        let ticket = cache.issue_ticket();
        cache.apply_fungible(ticket, &alice(), FungibleKind::Gold, TokenAmount(9));

        let bob = Identity::new("0xb0b");
        cache.reset_for(Some(bob.clone()), 2);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.owner, Some(bob));
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.balance(FungibleKind::Gold), None);
        assert!(!cache.owns(&alice(), DiscreteItem::Sword));
    }
}
