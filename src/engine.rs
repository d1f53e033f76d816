use crate::{
    Result,
    collab::{
        Backend,
        Ledger,
        Wallet,
    },
    config::{
        Authorize,
        EngineConfig,
    },
    inventory::{
        InventoryCache,
        InventorySnapshot,
    },
    lock,
    metadata::{
        OwnedItemView,
        resolve_gateway_url,
    },
    mint::MintRegistry,
    session::{
        IdentitySession,
        SessionChange,
    },
    types::{
        DiscreteItem,
        Identity,
        MintRequest,
        SessionState,
    },
};
use futures::future::join_all;
use std::sync::{
    Arc,
    Mutex,
};
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

/// Session and cache state as one consistent view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub session: SessionState,
    pub inventory: InventorySnapshot,
    /// Display revision the snapshot was taken at.
    pub revision: u64,
}

pub struct ClaimEngine<W, B, L> {
    pub(crate) session: IdentitySession<W>,
    pub(crate) cache: Arc<Mutex<InventoryCache>>,
    pub(crate) mints: MintRegistry,
    pub(crate) backend: B,
    pub(crate) ledger: L,
    pub(crate) authority: Box<dyn Authorize + Send + Sync>,
    pub(crate) config: EngineConfig,
    display: Arc<watch::Sender<u64>>,
}

impl<W, B, L> ClaimEngine<W, B, L> {
    /// Build an engine. Authorization for fungible adjustments comes from
    /// `config.authority` unless replaced with [`ClaimEngine::with_authority`].
    pub fn new(wallet: Option<W>, backend: B, ledger: L, config: EngineConfig) -> Self {
        let session = IdentitySession::new(wallet);
        let cache = Arc::new(Mutex::new(InventoryCache::new()));
        let (display, _) = watch::channel(0u64);
        let display = Arc::new(display);
        {
            let cache = cache.clone();
            let display = display.clone();
            session.on_change(move |change| {
                if change.identity_changed() {
                    lock(&cache).reset_for(change.current.identity().cloned(), change.epoch);
                }
                display.send_modify(|revision| *revision += 1);
            });
        }
        Self {
            session,
            cache,
            mints: MintRegistry::default(),
            backend,
            ledger,
            authority: Box::new(config.authority.clone()),
            config,
            display,
        }
    }

    pub fn with_authority(mut self, authority: impl Authorize + Send + Sync + 'static) -> Self {
        self.authority = Box::new(authority);
        self
    }

    pub fn session(&self) -> &IdentitySession<W> {
        &self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.identity()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let session = self.session.state();
        let mut inventory = lock(&self.cache).snapshot();
        if inventory.owner.as_ref() != session.identity() {
            inventory = InventorySnapshot {
                owner: session.identity().cloned(),
                ..InventorySnapshot::default()
            };
        }
        EngineSnapshot {
            session,
            inventory,
            revision: *self.display.borrow(),
        }
    }

    /// Bumped on every session transition and every applied cache update.
    pub fn subscribe_display(&self) -> watch::Receiver<u64> {
        self.display.subscribe()
    }

    pub fn pending_mints(&self) -> Vec<MintRequest> {
        self.mints.pending()
    }

    pub(crate) fn bump_display(&self) {
        self.display.send_modify(|revision| *revision += 1);
    }

    pub fn disconnect(&self) -> Option<SessionChange> {
        self.session.disconnect()
    }
}

impl<W, B: Backend, L: Ledger> ClaimEngine<W, B, L> {
    /// Apply a wallet account notification, then reconcile the new identity.
    pub async fn on_account_changed(&self, account: Option<Identity>) -> Option<SessionChange> {
        let change = self.session.on_account_changed(account)?;
        if change.identity_changed()
            && let Some(identity) = change.current.identity()
        {
            self.reconcile_all(identity).await;
        }
        Some(change)
    }

    /// Owned items with their metadata. Items whose metadata cannot be fetched are left
    /// out.
    pub async fn describe_inventory(&self) -> Vec<OwnedItemView> {
        let entries = self.snapshot().inventory.entries;
        let gateway = self.config.ipfs_gateway.as_str();
        let lookups = entries.into_iter().map(|entry| async move {
            let metadata_url = resolve_gateway_url(&entry.metadata_ref, gateway);
            match self.backend.fetch_metadata(&metadata_url).await {
                Ok(metadata) => Some(OwnedItemView {
                    image_url: resolve_gateway_url(&metadata.image, gateway),
                    entry,
                    metadata_url,
                    metadata,
                }),
                Err(err) => {
                    warn!(item = %entry.item, %err, "skipping item with unreadable metadata");
                    None
                }
            }
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }

    pub async fn price_of(&self, item: DiscreteItem) -> Result<u64> {
        self.backend.list_price(item).await
    }
}

impl<W: Wallet, B: Backend, L: Ledger> ClaimEngine<W, B, L> {
    /// Prompt for wallet access; on a new connection, reconcile immediately.
    pub async fn connect(&self) -> Result<Identity> {
        let before = self.session.identity();
        let identity = self.session.connect().await?;
        if before.as_ref() != Some(&identity) {
            info!(%identity, "connected");
            self.reconcile_all(&identity).await;
        }
        Ok(identity)
    }

    /// Resume a previously authorized connection without prompting.
    pub async fn init_silent(&self) -> Option<Identity> {
        let before = self.session.identity();
        let identity = self.session.init_silent().await?;
        if before.as_ref() != Some(&identity) {
            info!(%identity, "resumed authorized session");
            self.reconcile_all(&identity).await;
        }
        Some(identity)
    }
}
