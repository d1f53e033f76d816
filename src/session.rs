use crate::{
    Error,
    Result,
    collab::Wallet,
    lock,
    types::{
        Identity,
        SessionState,
    },
};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

/// A state change published to session subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionChange {
    pub previous: SessionState,
    pub current: SessionState,
    /// Bumped every time the connected identity changes, including to and from none.
    pub epoch: u64,
}

impl SessionChange {
    pub fn identity_changed(&self) -> bool {
        self.previous.identity() != self.current.identity()
    }
}

type Subscriber = Box<dyn Fn(&SessionChange) + Send + Sync>;

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    epoch: u64,
}

impl SessionInner {
    fn swap(&mut self, next: SessionState) -> Option<SessionChange> {
        if self.state == next {
            return None;
        }
        if self.state.identity() != next.identity() {
            self.epoch += 1;
        }
        let previous = std::mem::replace(&mut self.state, next.clone());
        Some(SessionChange {
            previous,
            current: next,
            epoch: self.epoch,
        })
    }
}

/// Owns the connection state for one wallet provider.
///
/// Subscribers registered with [`IdentitySession::on_change`] run synchronously inside
/// every transition, so they have observed it by the time the triggering call returns.
pub struct IdentitySession<W> {
    wallet: Option<W>,
    inner: Mutex<SessionInner>,
    watch: watch::Sender<SessionState>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl<W> IdentitySession<W> {
    pub fn new(wallet: Option<W>) -> Self {
        let (watch, _) = watch::channel(SessionState::Disconnected);
        Self {
            wallet,
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                epoch: 0,
            }),
            watch,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).state.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        lock(&self.inner).state.identity().cloned()
    }

    pub fn epoch(&self) -> u64 {
        lock(&self.inner).epoch
    }

    /// The current epoch, provided `identity` is the connected account.
    pub fn connected_epoch(&self, identity: &Identity) -> Option<u64> {
        let inner = lock(&self.inner);
        match &inner.state {
            SessionState::Connected(current) if current == identity => Some(inner.epoch),
            _ => None,
        }
    }

    pub fn on_change(&self, subscriber: impl Fn(&SessionChange) + Send + Sync + 'static) {
        lock(&self.subscribers).push(Box::new(subscriber));
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.watch.subscribe()
    }

    /// Apply an externally driven account change. `None` means access was revoked.
    ///
    /// A different identity replaces the current one outright; nothing carries over.
    pub fn on_account_changed(&self, account: Option<Identity>) -> Option<SessionChange> {
        let next = match account {
            Some(identity) => SessionState::Connected(identity),
            None => SessionState::Disconnected,
        };
        self.transition(next)
    }

    pub fn disconnect(&self) -> Option<SessionChange> {
        self.transition(SessionState::Disconnected)
    }

    fn transition(&self, next: SessionState) -> Option<SessionChange> {
        let change = lock(&self.inner).swap(next)?;
        self.publish(&change);
        Some(change)
    }

    fn publish(&self, change: &SessionChange) {
        info!(
            from = ?change.previous,
            to = ?change.current,
            epoch = change.epoch,
            "session transition"
        );
        for subscriber in lock(&self.subscribers).iter() {
            subscriber(change);
        }
        self.watch.send_replace(change.current.clone());
    }
}

impl<W: Wallet> IdentitySession<W> {
    /// Prompt for account access and connect.
    ///
    /// Already connected sessions return their identity without prompting again.
    pub async fn connect(&self) -> Result<Identity> {
        let Some(wallet) = self.wallet.as_ref() else {
            return Err(Error::ProviderUnavailable);
        };
        let change = {
            let mut inner = lock(&self.inner);
            match &inner.state {
                SessionState::Connected(identity) => return Ok(identity.clone()),
                SessionState::Connecting => {
                    return Err(Error::ProviderError(
                        "account request already pending".to_string(),
                    ));
                }
                SessionState::Disconnected => inner.swap(SessionState::Connecting),
            }
        };
        if let Some(change) = change {
            self.publish(&change);
        }
        let outcome = wallet.request_access().await;
        if let Err(err) = &outcome {
            warn!(%err, "account request failed");
        }
        self.settle_prompt(outcome)
    }

    /// Apply a prompt result, unless an account notification already moved the session
    /// off `Connecting` while the prompt was open. The notification wins.
    fn settle_prompt(&self, outcome: Result<Identity>) -> Result<Identity> {
        let change = {
            let mut inner = lock(&self.inner);
            match &inner.state {
                SessionState::Connecting => {}
                SessionState::Connected(current) => {
                    info!(%current, "account changed while the prompt was open");
                    return Ok(current.clone());
                }
                SessionState::Disconnected => {
                    info!("access revoked while the prompt was open");
                    return Err(Error::NotConnected);
                }
            }
            let next = match &outcome {
                Ok(identity) => SessionState::Connected(identity.clone()),
                Err(_) => SessionState::Disconnected,
            };
            inner.swap(next)
        };
        if let Some(change) = change {
            self.publish(&change);
        }
        outcome
    }

    /// Pick up an account the provider already authorized, without prompting.
    pub async fn init_silent(&self) -> Option<Identity> {
        let wallet = self.wallet.as_ref()?;
        if let Some(identity) = self.identity() {
            return Some(identity);
        }
        match wallet.query_authorized().await {
            Ok(Some(identity)) => {
                self.transition(SessionState::Connected(identity.clone()));
                Some(identity)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(%err, "querying authorized accounts failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::collab::in_memory::InMemoryWallet;
    use std::sync::Arc;

    fn alice() -> Identity {
        Identity::new("0xa11ce")
    }

    fn bob() -> Identity {
        Identity::new("0xb0b")
    }

    fn recorded(session: &IdentitySession<InMemoryWallet>) -> Arc<Mutex<Vec<SessionState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.on_change(move |change| lock(&sink).push(change.current.clone()));
        seen
    }

    #[tokio::test]
    async fn connect__passes_through_connecting_before_connected() {
        // given
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let session = IdentitySession::new(Some(wallet));
        let seen = recorded(&session);

        // when
        let identity = session.connect().await.unwrap();

        // then
        assert_eq!(identity, alice());
        assert_eq!(
            *lock(&seen),
            vec![SessionState::Connecting, SessionState::Connected(alice())]
        );
        assert_eq!(session.epoch(), 1);
    }

    #[tokio::test]
    async fn connect__without_provider_fails_unavailable() {
        let session: IdentitySession<InMemoryWallet> = IdentitySession::new(None);

        let result = session.connect().await;

        assert_eq!(result, Err(Error::ProviderUnavailable));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn connect__rejection_returns_to_disconnected() {
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        wallet.fail_next_access(Error::UserRejected);
        let session = IdentitySession::new(Some(wallet));
        let seen = recorded(&session);

        let result = session.connect().await;

        assert_eq!(result, Err(Error::UserRejected));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(
            *lock(&seen),
            vec![SessionState::Connecting, SessionState::Disconnected]
        );
    }

    #[tokio::test]
    async fn connect__while_pending_fails_fast_without_second_prompt() {
        // given
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let gate = wallet.hold_next_access();
        let session = IdentitySession::new(Some(wallet.clone()));

        // when
        let (first, second) = tokio::join!(session.connect(), async {
            let second = session.connect().await;
            gate.release();
            second
        });

        // then
        assert_eq!(first, Ok(alice()));
        assert!(matches!(second, Err(Error::ProviderError(_))));
        assert_eq!(wallet.access_requests(), 1);
    }

    #[tokio::test]
    async fn connect__account_notification_during_prompt_wins() {
        // given
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let gate = wallet.hold_next_access();
        let session = IdentitySession::new(Some(wallet));
        let seen = recorded(&session);

        // when
        let (connected, _) = tokio::join!(session.connect(), async {
            session.on_account_changed(Some(bob()));
            gate.release();
        });

        // then
        assert_eq!(connected, Ok(bob()));
        assert_eq!(session.state(), SessionState::Connected(bob()));
        assert_eq!(
            *lock(&seen),
            vec![SessionState::Connecting, SessionState::Connected(bob())]
        );
    }

    #[tokio::test]
    async fn connect__revocation_during_prompt_leaves_session_disconnected() {
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let gate = wallet.hold_next_access();
        let session = IdentitySession::new(Some(wallet));

        let (connected, _) = tokio::join!(session.connect(), async {
            session.on_account_changed(None);
            gate.release();
        });

        assert_eq!(connected, Err(Error::NotConnected));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn connect__when_connected_does_not_prompt_again() {
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let session = IdentitySession::new(Some(wallet.clone()));
        session.connect().await.unwrap();

        let again = session.connect().await;

        assert_eq!(again, Ok(alice()));
        assert_eq!(wallet.access_requests(), 1);
    }

    #[tokio::test]
    async fn init_silent__connects_previously_authorized_account_without_prompt() {
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        wallet.pre_authorize();
        let session = IdentitySession::new(Some(wallet.clone()));

        let identity = session.init_silent().await;

        assert_eq!(identity, Some(alice()));
        assert_eq!(session.state(), SessionState::Connected(alice()));
        assert_eq!(wallet.access_requests(), 0);
    }

    #[tokio::test]
    async fn init_silent__stays_disconnected_for_unknown_origin() {
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let session = IdentitySession::new(Some(wallet.clone()));
        let seen = recorded(&session);

        let identity = session.init_silent().await;

        assert_eq!(identity, None);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(lock(&seen).is_empty());
        assert_eq!(wallet.access_requests(), 0);
    }

    #[tokio::test]
    async fn on_account_changed__replaces_identity_and_bumps_epoch() {
        // given
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let session = IdentitySession::new(Some(wallet));
        session.connect().await.unwrap();
        let epoch = session.epoch();

        // when
        let change = session.on_account_changed(Some(bob())).unwrap();

        // then
        assert_eq!(change.previous, SessionState::Connected(alice()));
        assert_eq!(change.current, SessionState::Connected(bob()));
        assert!(change.identity_changed());
        assert_eq!(session.epoch(), epoch + 1);
        assert_eq!(session.connected_epoch(&alice()), None);
        assert_eq!(session.connected_epoch(&bob()), Some(epoch + 1));
    }

    #[tokio::test]
    async fn on_account_changed__same_identity_is_not_a_transition() {
        let (wallet, _changes) = InMemoryWallet::new(Some(alice()));
        let session = IdentitySession::new(Some(wallet));
        session.connect().await.unwrap();

        assert_eq!(session.on_account_changed(Some(alice())), None);
    }

    #[test]
    fn on_account_changed__none_disconnects_and_updates_watchers() {
        let session: IdentitySession<InMemoryWallet> = IdentitySession::new(None);
        let watcher = session.watch();
        session.on_account_changed(Some(alice()));

        session.on_account_changed(None);

        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(*watcher.borrow(), SessionState::Disconnected);
        assert_eq!(session.epoch(), 2);
    }
}
