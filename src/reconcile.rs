use crate::{
    ClaimEngine,
    Error,
    Result,
    collab::{
        AccountChanges,
        Backend,
        Ledger,
    },
    inventory::ApplyOutcome,
    lock,
    types::{
        FungibleKind,
        Identity,
        TokenAmount,
    },
};
use std::pin::Pin;
use tokio::time::{
    self,
    Instant,
    Interval,
    MissedTickBehavior,
};
use tracing::{
    debug,
    info,
    warn,
};

type BalancePoll<'a> = Pin<Box<dyn Future<Output = (Identity, Result<FungibleReading>)> + 'a>>;
type Reconcile<'a> = Pin<Box<dyn Future<Output = ()> + 'a>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FungibleReading {
    pub kind: FungibleKind,
    pub amount: TokenAmount,
    /// Whether the reading replaced the cached value.
    pub outcome: ApplyOutcome,
}

impl<W, B: Backend, L> ClaimEngine<W, B, L> {
    /// Replace the cached discrete items of the connected `identity` with the backend's list.
    ///
    /// A failed fetch leaves the cache as it was. A response that lands after a newer one
    /// is discarded.
    pub async fn refresh(&self, identity: &Identity) -> Result<ApplyOutcome> {
        if self.session.connected_epoch(identity).is_none() {
            return Err(Error::NotConnected);
        }
        let ticket = lock(&self.cache).issue_ticket();
        let listing = self
            .backend
            .list_inventory(identity)
            .await
            .inspect_err(|err| warn!(%identity, %err, "inventory refresh failed"))?;
        let count = listing.len();
        let outcome = lock(&self.cache).apply_discrete(ticket, identity, listing);
        match outcome {
            ApplyOutcome::Applied => {
                debug!(%identity, count, "inventory refreshed");
                self.bump_display();
            }
            ApplyOutcome::Stale => debug!(%identity, "discarded stale inventory response"),
        }
        Ok(outcome)
    }
}

impl<W, B, L: Ledger> ClaimEngine<W, B, L> {
    pub async fn refresh_fungible(&self, identity: &Identity) -> Result<FungibleReading> {
        self.refresh_fungible_kind(FungibleKind::Gold, identity).await
    }

    /// Read `identity`'s balance from the ledger.
    ///
    /// The reading is always returned; it replaces the cached value only when `identity`
    /// is the connected account and no newer reading has landed.
    pub async fn refresh_fungible_kind(
        &self,
        kind: FungibleKind,
        identity: &Identity,
    ) -> Result<FungibleReading> {
        let ticket = lock(&self.cache).issue_ticket();
        let amount = self
            .ledger
            .read_fungible_balance(kind, identity)
            .await
            .inspect_err(|err| warn!(%identity, %kind, %err, "balance refresh failed"))?;
        let outcome = lock(&self.cache).apply_fungible(ticket, identity, kind, amount);
        if outcome.is_applied() {
            debug!(%identity, %kind, %amount, "balance refreshed");
            self.bump_display();
        }
        Ok(FungibleReading {
            kind,
            amount,
            outcome,
        })
    }
}

impl<W, B: Backend, L: Ledger> ClaimEngine<W, B, L> {
    /// Fetch items and balance for a freshly connected identity. Failures are logged.
    pub(crate) async fn reconcile_all(&self, identity: &Identity) {
        let (items, balance) =
            futures::join!(self.refresh(identity), self.refresh_fungible(identity));
        if let Err(err) = items {
            warn!(%identity, %err, "initial inventory load failed");
        }
        if let Err(err) = balance {
            warn!(%identity, %err, "initial balance load failed");
        }
    }

    /// Drive wallet notifications and periodic balance reconciliation until `shutdown`
    /// resolves.
    ///
    /// The poll timer only exists while connected and is restarted once for every new
    /// connection, so at most one timer is ever live. Account changes cut the session over
    /// immediately. The reconcile that follows and each balance poll run alongside the
    /// loop, at most one of each, so a slow collaborator does not hold up later account
    /// changes or shutdown.
    pub async fn run(
        &self,
        mut account_changes: AccountChanges,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut session_rx = self.session.watch();
        let mut notifications_open = true;
        let mut poller = Poller::default();
        let mut in_flight: Option<BalancePoll<'_>> = None;
        let mut reconciling: Option<Reconcile<'_>> = None;
        poller.sync(self);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("reconciliation loop stopping");
                    return;
                }
                change = account_changes.recv(), if notifications_open => match change {
                    Some(account) => {
                        if let Some(change) = self.session.on_account_changed(account)
                            && change.identity_changed()
                        {
                            reconciling = change.current.identity().cloned().map(|identity| {
                                let reconcile: Reconcile<'_> =
                                    Box::pin(async move { self.reconcile_all(&identity).await });
                                reconcile
                            });
                        }
                    }
                    None => {
                        debug!("wallet notifications closed");
                        notifications_open = false;
                    }
                },
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if poller.sync(self) && in_flight.take().is_some() {
                        debug!("dropped balance poll of a previous connection");
                    }
                }
                _ = poller.tick() => {
                    if in_flight.is_some() {
                        debug!("previous balance poll still running, skipping tick");
                    } else if let Some(identity) = self.session.identity() {
                        let poll: BalancePoll<'_> = Box::pin(async move {
                            let reading = self.refresh_fungible(&identity).await;
                            (identity, reading)
                        });
                        in_flight = Some(poll);
                    }
                }
                () = settle(&mut reconciling) => {
                    reconciling = None;
                }
                (identity, reading) = settle(&mut in_flight) => {
                    in_flight = None;
                    if let Err(err) = reading {
                        warn!(%identity, %err, "periodic balance refresh failed");
                    }
                }
            }
        }
    }
}

/// Completes with the in-flight poll's result; never completes when there is none.
async fn settle<T>(poll: &mut Option<Pin<Box<dyn Future<Output = T> + '_>>>) -> T {
    match poll.as_mut() {
        Some(poll) => poll.await,
        None => std::future::pending().await,
    }
}

#[derive(Default)]
struct Poller {
    ticker: Option<Interval>,
    epoch: Option<u64>,
}

impl Poller {
    /// Align the timer with the session. Returns whether the connection it serves changed.
    fn sync<W, B, L>(&mut self, engine: &ClaimEngine<W, B, L>) -> bool {
        let epoch = engine.session.epoch();
        match engine.session.identity() {
            Some(_) if self.epoch == Some(epoch) => false,
            Some(identity) => {
                let period = engine.config.poll_interval();
                let mut ticker = time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.ticker = Some(ticker);
                self.epoch = Some(epoch);
                info!(%identity, ?period, "balance polling started");
                true
            }
            None => {
                if self.ticker.take().is_some() {
                    info!("balance polling stopped");
                }
                self.epoch.take().is_some()
            }
        }
    }

    async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
