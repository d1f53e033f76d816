use crate::{
    ClaimEngine,
    collab::{
        AccountChanges,
        in_memory::{
            InMemoryBackend,
            InMemoryLedger,
            InMemoryWallet,
            InMemoryWorld,
        },
    },
    config::{
        AuthorityPolicy,
        EngineConfig,
    },
    types::Identity,
};

pub type TestEngine = ClaimEngine<InMemoryWallet, InMemoryBackend, InMemoryLedger>;

pub fn alice() -> Identity {
    Identity::new("0xa11ce")
}

pub fn bob() -> Identity {
    Identity::new("0xb0b")
}

pub fn admin() -> Identity {
    Identity::new("0xad312")
}

/// An engine wired to in-memory collaborators sharing one world.
///
/// The wallet starts on `account`.
pub struct TestContext {
    pub world: InMemoryWorld,
    pub wallet: InMemoryWallet,
    pub backend: InMemoryBackend,
    pub ledger: InMemoryLedger,
    pub engine: TestEngine,
    account_changes: Option<AccountChanges>,
}

impl TestContext {
    pub fn new(account: Identity) -> Self {
        Self::with_config(account, EngineConfig::default())
    }

    /// Like [`TestContext::new`]; an empty authority list in `config` defaults to `admin()`.
    pub fn with_config(account: Identity, mut config: EngineConfig) -> Self {
        if config.authority.identities.is_empty() {
            config.authority = AuthorityPolicy::single(admin().as_str());
        }
        let world = InMemoryWorld::new();
        let backend = world.backend();
        let ledger = world.ledger();
        let (wallet, account_changes) = InMemoryWallet::new(Some(account));
        let engine = ClaimEngine::new(
            Some(wallet.clone()),
            backend.clone(),
            ledger.clone(),
            config,
        );
        Self {
            world,
            wallet,
            backend,
            ledger,
            engine,
            account_changes: Some(account_changes),
        }
    }

    /// Wallet notifications, for driving [`ClaimEngine::run`]. Can be taken once.
    pub fn take_account_changes(&mut self) -> AccountChanges {
        self.account_changes
            .take()
            .expect("account changes already taken")
    }

    /// Connect through the wallet prompt and wait for the initial reconciliation.
    pub async fn connected(account: Identity) -> Self {
        let ctx = Self::new(account.clone());
        let identity = ctx.engine.connect().await.expect("connect");
        assert_eq!(identity, account);
        ctx
    }
}
