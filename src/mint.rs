//! Two-phase item claims and admin fungible adjustments.
//!
//! A claim first provisions a content reference off-chain, then submits it to the ledger
//! and waits for finality. The two phases are not atomic: a claim rejected after
//! provisioning leaves an orphaned reference behind, and a retry provisions a new one.

use crate::{
    ClaimEngine,
    Error,
    Result,
    collab::{
        Backend,
        Ledger,
        Provisioned,
    },
    lock,
    types::{
        AdjustDirection,
        DiscreteItem,
        FungibleKind,
        Identity,
        InventoryEntry,
        MintPhase,
        MintRequest,
        TokenAmount,
        TxHandle,
    },
};
use chrono::Utc;
use itertools::Itertools;
use std::{
    collections::HashMap,
    sync::Mutex,
};
use tracing::{
    info,
    warn,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintReceipt {
    pub item: DiscreteItem,
    pub identity: Identity,
    pub uri: String,
    pub tx: TxHandle,
    pub block_height: u64,
    /// False when the session moved to another identity before finality, in which case
    /// the new identity's cache was left alone.
    pub cached: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdjustReceipt {
    pub kind: FungibleKind,
    pub target: Identity,
    pub amount: TokenAmount,
    pub direction: AdjustDirection,
    pub tx: TxHandle,
    pub block_height: u64,
    /// Target balance read back after finality; `None` if that read failed.
    pub balance: Option<TokenAmount>,
}

type MintKey = (Identity, DiscreteItem);

/// In-flight claims, at most one per identity and item.
#[derive(Debug, Default)]
pub struct MintRegistry {
    in_flight: Mutex<HashMap<MintKey, MintRequest>>,
}

impl MintRegistry {
    pub fn begin(&self, identity: &Identity, item: DiscreteItem) -> Result<InFlightMint<'_>> {
        let key = (identity.clone(), item);
        let mut in_flight = lock(&self.in_flight);
        if in_flight.contains_key(&key) {
            return Err(Error::MintInProgress);
        }
        in_flight.insert(
            key.clone(),
            MintRequest {
                item,
                requester: identity.clone(),
                phase: MintPhase::Provisioning,
                started_at: Utc::now(),
            },
        );
        Ok(InFlightMint {
            registry: self,
            key,
        })
    }

    pub fn is_in_flight(&self, identity: &Identity, item: DiscreteItem) -> bool {
        lock(&self.in_flight).contains_key(&(identity.clone(), item))
    }

    /// Claims that have not reached a terminal phase, oldest first.
    pub fn pending(&self) -> Vec<MintRequest> {
        lock(&self.in_flight)
            .values()
            .filter(|request| !request.phase.is_terminal())
            .cloned()
            .sorted_by_key(|request| request.started_at)
            .collect()
    }
}

/// Registration of one in-flight claim. Dropping it frees the slot, whatever the outcome.
#[derive(Debug)]
pub struct InFlightMint<'a> {
    registry: &'a MintRegistry,
    key: MintKey,
}

impl InFlightMint<'_> {
    pub fn advance(&self, phase: MintPhase) {
        if let Some(request) = lock(&self.registry.in_flight).get_mut(&self.key) {
            request.phase = phase;
        }
        let (identity, item) = &self.key;
        info!(%identity, %item, ?phase, "mint phase");
    }
}

impl Drop for InFlightMint<'_> {
    fn drop(&mut self) {
        lock(&self.registry.in_flight).remove(&self.key);
    }
}

impl<W, B: Backend, L: Ledger> ClaimEngine<W, B, L> {
    /// Claim `item` for `identity`, which must be the connected account.
    ///
    /// Fails fast, without contacting anything, with `NotConnected`, `AlreadyOwned` or
    /// `MintInProgress`. Collaborator failures are returned as they came.
    pub async fn mint_item(
        &self,
        item: DiscreteItem,
        identity: &Identity,
    ) -> Result<MintReceipt> {
        if self.session.connected_epoch(identity).is_none() {
            return Err(Error::NotConnected);
        }
        if lock(&self.cache).owns(identity, item) {
            return Err(Error::AlreadyOwned);
        }
        let request = self.mints.begin(identity, item)?;
        let result = self.run_claim(&request, item, identity).await;
        if let Err(err) = &result {
            request.advance(MintPhase::Failed);
            warn!(%identity, %item, %err, "mint failed");
        }
        result
    }

    async fn run_claim(
        &self,
        request: &InFlightMint<'_>,
        item: DiscreteItem,
        identity: &Identity,
    ) -> Result<MintReceipt> {
        let Provisioned { uri } = self.backend.provision(item, identity).await?;
        request.advance(MintPhase::AwaitingConfirmation);

        let tx = self.ledger.submit_mint_claim(identity, &uri).await?;
        info!(%identity, %item, %tx, "claim submitted");
        let finality = self.ledger.await_finality(&tx).await?;
        request.advance(MintPhase::Confirmed);

        let entry = InventoryEntry {
            item,
            metadata_ref: uri.clone(),
        };
        let cached = {
            let mut cache = lock(&self.cache);
            let ticket = cache.issue_ticket();
            cache.record_confirmed(ticket, identity, entry).is_applied()
        };
        if cached {
            self.bump_display();
            if let Err(err) = self.refresh(identity).await {
                warn!(%identity, %err, "inventory refresh after mint failed");
            }
        } else {
            info!(%identity, %item, "session changed before finality; cache untouched");
        }

        Ok(MintReceipt {
            item,
            identity: identity.clone(),
            uri,
            tx: finality.tx,
            block_height: finality.block_height,
            cached,
        })
    }

    /// Mint or burn a fungible amount for `target`. Only authority identities may do this.
    pub async fn adjust_fungible(
        &self,
        kind: FungibleKind,
        target: &Identity,
        amount: TokenAmount,
        direction: AdjustDirection,
    ) -> Result<AdjustReceipt> {
        let actor = self.session.identity().ok_or(Error::NotConnected)?;
        if !self.authority.is_authorized(&actor) {
            warn!(%actor, "fungible adjustment refused");
            return Err(Error::Unauthorized);
        }
        info!(%actor, %target, %kind, %amount, %direction, "fungible adjustment requested");

        let tx = self
            .ledger
            .submit_fungible_adjust(kind, target, amount, direction)
            .await
            .inspect_err(|err| warn!(%err, "adjustment submission failed"))?;
        let finality = self
            .ledger
            .await_finality(&tx)
            .await
            .inspect_err(|err| warn!(%tx, %err, "adjustment did not finalize"))?;

        let balance = match self.refresh_fungible_kind(kind, target).await {
            Ok(reading) => Some(reading.amount),
            Err(err) => {
                warn!(%target, %err, "balance refresh after adjustment failed");
                None
            }
        };

        Ok(AdjustReceipt {
            kind,
            target: target.clone(),
            amount,
            direction,
            tx: finality.tx,
            block_height: finality.block_height,
            balance,
        })
    }
}
