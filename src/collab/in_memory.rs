//! In-process wallet, backend and ledger sharing one simulated world.
//!
//! Every operation can be made to fail once (`fail_next_*`) or be held mid-flight
//! (`hold_next_*`) until the returned [`Gate`] is released. Results that a real
//! collaborator would compute server-side are computed before the hold; ledger effects
//! are applied after it.

use crate::{
    Error,
    Result,
    collab::{
        AccountChanges,
        Backend,
        Ledger,
        Provisioned,
        Wallet,
    },
    lock,
    metadata::{
        ItemAttribute,
        ItemMetadata,
    },
    types::{
        AdjustDirection,
        DiscreteItem,
        Finality,
        FungibleKind,
        Identity,
        InventoryEntry,
        TokenAmount,
        TxHandle,
    },
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
    },
};
use tokio::sync::{
    mpsc,
    watch,
};

/// Holds a single collaborator call until released.
#[derive(Clone, Debug)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Gate {
    fn closed() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            open: Arc::new(open),
        }
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Debug, Default)]
struct Hooks {
    calls: AtomicUsize,
    failure: Mutex<Option<Error>>,
    hold: Mutex<Option<Gate>>,
}

struct Call {
    failure: Option<Error>,
    hold: Option<Gate>,
}

impl Hooks {
    fn begin(&self) -> Call {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Call {
            failure: lock(&self.failure).take(),
            hold: lock(&self.hold).take(),
        }
    }

    fn fail_next(&self, err: Error) {
        *lock(&self.failure) = Some(err);
    }

    fn hold_next(&self) -> Gate {
        let gate = Gate::closed();
        *lock(&self.hold) = Some(gate.clone());
        gate
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Call {
    async fn settle<T>(self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(gate) = self.hold {
            gate.pass().await;
        }
        match self.failure {
            Some(err) => Err(err),
            None => f(),
        }
    }
}

#[derive(Clone, Debug)]
enum PendingTx {
    Claim {
        identity: Identity,
        uri: String,
    },
    Adjust {
        kind: FungibleKind,
        target: Identity,
        amount: TokenAmount,
        direction: AdjustDirection,
    },
}

#[derive(Debug)]
struct WorldState {
    inventories: HashMap<Identity, Vec<InventoryEntry>>,
    balances: HashMap<(FungibleKind, Identity), TokenAmount>,
    provisioned: HashMap<String, (DiscreteItem, Identity)>,
    metadata: HashMap<String, ItemMetadata>,
    pending: HashMap<TxHandle, PendingTx>,
    prices: HashMap<DiscreteItem, u64>,
    block_height: u64,
    nonce: u64,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            inventories: HashMap::new(),
            balances: HashMap::new(),
            provisioned: HashMap::new(),
            metadata: HashMap::new(),
            pending: HashMap::new(),
            prices: HashMap::from([
                (DiscreteItem::Sword, 100),
                (DiscreteItem::Potion, 25),
                (DiscreteItem::Gem, 250),
            ]),
            block_height: 0,
            nonce: 0,
        }
    }
}

impl WorldState {
    fn owns(&self, identity: &Identity, item: DiscreteItem) -> bool {
        self.inventories
            .get(identity)
            .is_some_and(|entries| entries.iter().any(|e| e.item == item))
    }

    fn store_provisioned(&mut self, item: DiscreteItem, identity: &Identity) -> String {
        self.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(item.as_str().as_bytes());
        hasher.update(identity.as_str().as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        let cid = hex::encode(hasher.finalize());
        let uri = format!("ipfs://{cid}");
        self.metadata.insert(cid.clone(), default_metadata(item, &cid));
        self.provisioned.insert(uri.clone(), (item, identity.clone()));
        uri
    }

    fn apply(&mut self, tx: PendingTx) -> Result<()> {
        match tx {
            PendingTx::Claim { identity, uri } => {
                let Some((item, _)) = self.provisioned.get(&uri).cloned() else {
                    tracing::debug!(%uri, "claim carries an unknown content reference");
                    return Ok(());
                };
                if self.owns(&identity, item) {
                    return Err(Error::Reverted(format!("{item} already claimed")));
                }
                self.inventories
                    .entry(identity)
                    .or_default()
                    .push(InventoryEntry {
                        item,
                        metadata_ref: uri,
                    });
            }
            PendingTx::Adjust {
                kind,
                target,
                amount,
                direction,
            } => {
                let balance = self.balances.entry((kind, target)).or_default();
                let next = match direction {
                    AdjustDirection::Mint => balance.0.checked_add(amount.0),
                    AdjustDirection::Burn => balance.0.checked_sub(amount.0),
                };
                let next = next.ok_or_else(|| {
                    Error::Reverted(format!("{direction} of {amount} out of range"))
                })?;
                *balance = TokenAmount(next);
            }
        }
        self.block_height += 1;
        Ok(())
    }
}

fn default_metadata(item: DiscreteItem, cid: &str) -> ItemMetadata {
    let (name, description, power) = match item {
        DiscreteItem::Sword => {
            ("Sword of Valor", "A shiny sword found in the dungeon.", 10)
        }
        DiscreteItem::Potion => ("Healing Potion", "A vial of red liquid.", 0),
        DiscreteItem::Gem => ("Glowing Gem", "It hums faintly in the dark.", 3),
    };
    ItemMetadata {
        name: name.to_string(),
        description: description.to_string(),
        image: format!("ipfs://{cid}/image.png"),
        attributes: vec![ItemAttribute {
            trait_type: "Power".to_string(),
            value: serde_json::json!(power),
        }],
    }
}

/// Shared simulated state behind [`InMemoryBackend`] and [`InMemoryLedger`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryWorld {
    state: Arc<Mutex<WorldState>>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> InMemoryBackend {
        InMemoryBackend {
            world: self.clone(),
            hooks: Arc::new(BackendHooks::default()),
        }
    }

    pub fn ledger(&self) -> InMemoryLedger {
        InMemoryLedger {
            world: self.clone(),
            hooks: Arc::new(LedgerHooks::default()),
        }
    }

    /// Record ownership as if `item` had been claimed outside this engine.
    pub fn grant_item(&self, identity: &Identity, item: DiscreteItem) -> String {
        let mut state = lock(&self.state);
        let uri = state.store_provisioned(item, identity);
        state
            .inventories
            .entry(identity.clone())
            .or_default()
            .push(InventoryEntry {
                item,
                metadata_ref: uri.clone(),
            });
        uri
    }

    pub fn owned_items(&self, identity: &Identity) -> Vec<InventoryEntry> {
        lock(&self.state)
            .inventories
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_balance(&self, kind: FungibleKind, identity: &Identity, amount: TokenAmount) {
        lock(&self.state)
            .balances
            .insert((kind, identity.clone()), amount);
    }

    pub fn balance(&self, kind: FungibleKind, identity: &Identity) -> TokenAmount {
        lock(&self.state)
            .balances
            .get(&(kind, identity.clone()))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_price(&self, item: DiscreteItem, price: u64) {
        lock(&self.state).prices.insert(item, price);
    }

    pub fn block_height(&self) -> u64 {
        lock(&self.state).block_height
    }
}

#[derive(Debug, Default)]
struct BackendHooks {
    provision: Hooks,
    inventory: Hooks,
    price: Hooks,
    metadata: Hooks,
}

#[derive(Clone, Debug)]
pub struct InMemoryBackend {
    world: InMemoryWorld,
    hooks: Arc<BackendHooks>,
}

impl InMemoryBackend {
    pub fn fail_next_provision(&self, err: Error) {
        self.hooks.provision.fail_next(err);
    }

    pub fn hold_next_provision(&self) -> Gate {
        self.hooks.provision.hold_next()
    }

    pub fn provision_calls(&self) -> usize {
        self.hooks.provision.calls()
    }

    pub fn fail_next_inventory(&self, err: Error) {
        self.hooks.inventory.fail_next(err);
    }

    pub fn hold_next_inventory(&self) -> Gate {
        self.hooks.inventory.hold_next()
    }

    pub fn inventory_calls(&self) -> usize {
        self.hooks.inventory.calls()
    }

    pub fn fail_next_metadata(&self, err: Error) {
        self.hooks.metadata.fail_next(err);
    }

    pub fn metadata_calls(&self) -> usize {
        self.hooks.metadata.calls()
    }

    /// Total calls of any kind. Zero means the backend was never contacted.
    pub fn total_calls(&self) -> usize {
        self.hooks.provision.calls()
            + self.hooks.inventory.calls()
            + self.hooks.price.calls()
            + self.hooks.metadata.calls()
    }
}

impl Backend for InMemoryBackend {
    async fn provision(
        &self,
        item: DiscreteItem,
        identity: &Identity,
    ) -> Result<Provisioned> {
        let call = self.hooks.provision.begin();
        call.settle(|| {
            let uri = lock(&self.world.state).store_provisioned(item, identity);
            Ok(Provisioned { uri })
        })
        .await
    }

    async fn list_inventory(&self, identity: &Identity) -> Result<Vec<InventoryEntry>> {
        let call = self.hooks.inventory.begin();
        let entries = self.world.owned_items(identity);
        call.settle(move || Ok(entries)).await
    }

    async fn list_price(&self, item: DiscreteItem) -> Result<u64> {
        let call = self.hooks.price.begin();
        call.settle(|| {
            lock(&self.world.state)
                .prices
                .get(&item)
                .copied()
                .ok_or_else(|| Error::BackendError(format!("{item} is not for sale")))
        })
        .await
    }

    async fn fetch_metadata(&self, url: &str) -> Result<ItemMetadata> {
        let call = self.hooks.metadata.begin();
        call.settle(|| {
            let state = lock(&self.world.state);
            url.trim_end_matches('/')
                .rsplit('/')
                .next()
                .and_then(|cid| state.metadata.get(cid))
                .cloned()
                .ok_or_else(|| Error::BackendError(format!("no metadata at {url}")))
        })
        .await
    }
}

#[derive(Debug, Default)]
struct LedgerHooks {
    submit_claim: Hooks,
    finality: Hooks,
    balance: Hooks,
    submit_adjust: Hooks,
}

#[derive(Clone, Debug)]
pub struct InMemoryLedger {
    world: InMemoryWorld,
    hooks: Arc<LedgerHooks>,
}

impl InMemoryLedger {
    pub fn fail_next_claim_submission(&self, err: Error) {
        self.hooks.submit_claim.fail_next(err);
    }

    pub fn claim_submissions(&self) -> usize {
        self.hooks.submit_claim.calls()
    }

    pub fn fail_next_finality(&self, err: Error) {
        self.hooks.finality.fail_next(err);
    }

    pub fn hold_next_finality(&self) -> Gate {
        self.hooks.finality.hold_next()
    }

    pub fn finality_waits(&self) -> usize {
        self.hooks.finality.calls()
    }

    pub fn fail_next_balance(&self, err: Error) {
        self.hooks.balance.fail_next(err);
    }

    pub fn hold_next_balance(&self) -> Gate {
        self.hooks.balance.hold_next()
    }

    pub fn balance_reads(&self) -> usize {
        self.hooks.balance.calls()
    }

    pub fn fail_next_adjust_submission(&self, err: Error) {
        self.hooks.submit_adjust.fail_next(err);
    }

    pub fn adjust_submissions(&self) -> usize {
        self.hooks.submit_adjust.calls()
    }

    /// Total calls of any kind. Zero means the ledger was never contacted.
    pub fn total_calls(&self) -> usize {
        self.hooks.submit_claim.calls()
            + self.hooks.finality.calls()
            + self.hooks.balance.calls()
            + self.hooks.submit_adjust.calls()
    }

    fn enqueue(&self, tx: PendingTx) -> TxHandle {
        let handle = TxHandle(format!("0x{}", hex::encode(rand::random::<[u8; 32]>())));
        lock(&self.world.state).pending.insert(handle.clone(), tx);
        handle
    }
}

impl Ledger for InMemoryLedger {
    async fn submit_mint_claim(&self, identity: &Identity, uri: &str) -> Result<TxHandle> {
        let call = self.hooks.submit_claim.begin();
        call.settle(|| {
            Ok(self.enqueue(PendingTx::Claim {
                identity: identity.clone(),
                uri: uri.to_string(),
            }))
        })
        .await
    }

    async fn await_finality(&self, handle: &TxHandle) -> Result<Finality> {
        let call = self.hooks.finality.begin();
        call.settle(|| {
            let mut state = lock(&self.world.state);
            let tx = state
                .pending
                .remove(handle)
                .ok_or_else(|| Error::Reverted(format!("unknown transaction {handle}")))?;
            state.apply(tx)?;
            Ok(Finality {
                tx: handle.clone(),
                block_height: state.block_height,
            })
        })
        .await
    }

    async fn read_fungible_balance(
        &self,
        kind: FungibleKind,
        identity: &Identity,
    ) -> Result<TokenAmount> {
        let call = self.hooks.balance.begin();
        let amount = self.world.balance(kind, identity);
        call.settle(move || Ok(amount)).await
    }

    async fn submit_fungible_adjust(
        &self,
        kind: FungibleKind,
        target: &Identity,
        amount: TokenAmount,
        direction: AdjustDirection,
    ) -> Result<TxHandle> {
        let call = self.hooks.submit_adjust.begin();
        call.settle(|| {
            Ok(self.enqueue(PendingTx::Adjust {
                kind,
                target: target.clone(),
                amount,
                direction,
            }))
        })
        .await
    }
}

#[derive(Debug)]
struct WalletInner {
    account: Mutex<Option<Identity>>,
    authorized: AtomicBool,
    access: Hooks,
    query: Hooks,
    changes: mpsc::UnboundedSender<Option<Identity>>,
}

/// Browser-wallet stand-in with a single selectable account.
#[derive(Clone, Debug)]
pub struct InMemoryWallet {
    inner: Arc<WalletInner>,
}

impl InMemoryWallet {
    pub fn new(account: Option<Identity>) -> (Self, AccountChanges) {
        let (changes, receiver) = mpsc::unbounded_channel();
        let wallet = Self {
            inner: Arc::new(WalletInner {
                account: Mutex::new(account),
                authorized: AtomicBool::new(false),
                access: Hooks::default(),
                query: Hooks::default(),
                changes,
            }),
        };
        (wallet, receiver)
    }

    /// Mark the current account as previously approved, as after an earlier visit.
    pub fn pre_authorize(&self) {
        self.inner.authorized.store(true, Ordering::SeqCst);
    }

    /// Select another account in the wallet. Authorized origins are notified.
    pub fn switch_account(&self, account: Identity) {
        *lock(&self.inner.account) = Some(account.clone());
        if self.inner.authorized.load(Ordering::SeqCst) {
            let _ = self.inner.changes.send(Some(account));
        }
    }

    /// Withdraw this origin's access.
    pub fn revoke(&self) {
        self.inner.authorized.store(false, Ordering::SeqCst);
        let _ = self.inner.changes.send(None);
    }

    pub fn fail_next_access(&self, err: Error) {
        self.inner.access.fail_next(err);
    }

    pub fn hold_next_access(&self) -> Gate {
        self.inner.access.hold_next()
    }

    pub fn access_requests(&self) -> usize {
        self.inner.access.calls()
    }
}

impl Wallet for InMemoryWallet {
    async fn request_access(&self) -> Result<Identity> {
        let call = self.inner.access.begin();
        call.settle(|| {
            let account = lock(&self.inner.account)
                .clone()
                .ok_or_else(|| Error::ProviderError("wallet has no accounts".to_string()))?;
            self.inner.authorized.store(true, Ordering::SeqCst);
            Ok(account)
        })
        .await
    }

    async fn query_authorized(&self) -> Result<Option<Identity>> {
        let call = self.inner.query.begin();
        call.settle(|| {
            if !self.inner.authorized.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(lock(&self.inner.account).clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn alice() -> Identity {
        Identity::new("0xa11ce")
    }

    #[tokio::test]
    async fn await_finality__claim_adds_provisioned_item_to_world() {
        // given
        let world = InMemoryWorld::new();
        let backend = world.backend();
        let ledger = world.ledger();
        let provisioned = backend.provision(DiscreteItem::Gem, &alice()).await.unwrap();

        // when
        let handle = ledger
            .submit_mint_claim(&alice(), &provisioned.uri)
            .await
            .unwrap();
        let finality = ledger.await_finality(&handle).await.unwrap();

        // then
        assert_eq!(finality.block_height, 1);
        assert_eq!(
            world.owned_items(&alice()),
            vec![InventoryEntry {
                item: DiscreteItem::Gem,
                metadata_ref: provisioned.uri,
            }]
        );
    }

    #[tokio::test]
    async fn await_finality__burn_beyond_balance_reverts() {
        let world = InMemoryWorld::new();
        let ledger = world.ledger();
        world.set_balance(FungibleKind::Gold, &alice(), TokenAmount(5));

        let handle = ledger
            .submit_fungible_adjust(
                FungibleKind::Gold,
                &alice(),
                TokenAmount(6),
                AdjustDirection::Burn,
            )
            .await
            .unwrap();
        let result = ledger.await_finality(&handle).await;

        assert!(matches!(result, Err(Error::Reverted(_))));
        assert_eq!(world.balance(FungibleKind::Gold, &alice()), TokenAmount(5));
    }

    #[tokio::test]
    async fn provision__each_call_yields_a_fresh_reference() {
        let world = InMemoryWorld::new();
        let backend = world.backend();

        let first = backend.provision(DiscreteItem::Sword, &alice()).await.unwrap();
        let second = backend.provision(DiscreteItem::Sword, &alice()).await.unwrap();

        assert_ne!(first.uri, second.uri);
        assert!(first.uri.starts_with("ipfs://"));
        assert_eq!(backend.provision_calls(), 2);
    }

    #[tokio::test]
    async fn fail_next__applies_to_exactly_one_call() {
        let world = InMemoryWorld::new();
        let backend = world.backend();
        backend.fail_next_inventory(Error::BackendError("offline".to_string()));

        assert!(backend.list_inventory(&alice()).await.is_err());
        assert!(backend.list_inventory(&alice()).await.is_ok());
    }

    #[tokio::test]
    async fn query_authorized__is_empty_until_access_granted() {
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));

        assert_eq!(wallet.query_authorized().await.unwrap(), None);
        wallet.request_access().await.unwrap();
        assert_eq!(wallet.query_authorized().await.unwrap(), Some(alice()));
    }

    #[tokio::test]
    async fn switch_account__notifies_only_authorized_origins() {
        let (wallet, mut changes) = InMemoryWallet::new(Some(alice()));
        let bob = Identity::new("0xb0b");

        wallet.switch_account(bob.clone());
        assert!(changes.try_recv().is_err());

        wallet.pre_authorize();
        wallet.switch_account(alice());
        assert_eq!(changes.try_recv().unwrap(), Some(alice()));
    }
}
