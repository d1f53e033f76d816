use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way an engine operation can fail.
///
/// `NotConnected`, `AlreadyOwned`, `MintInProgress` and `Unauthorized` are raised locally
/// before any collaborator is contacted. The rest originate in a collaborator and are
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no connected account matches the requesting identity")]
    NotConnected,
    #[error("item is already owned by this account")]
    AlreadyOwned,
    #[error("a mint for this item is already in flight")]
    MintInProgress,
    #[error("identity is not authorized for fungible adjustments")]
    Unauthorized,
    #[error("no wallet provider is available")]
    ProviderUnavailable,
    #[error("the account request was rejected by the user")]
    UserRejected,
    #[error("wallet provider error: {0}")]
    ProviderError(String),
    #[error("backend error: {0}")]
    BackendError(String),
    #[error("ledger transaction reverted: {0}")]
    Reverted(String),
    #[error("timed out waiting for ledger finality")]
    TimedOut,
}

impl Error {
    /// True for failures detected before reaching a collaborator.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::AlreadyOwned
                | Error::MintInProgress
                | Error::Unauthorized
        )
    }
}
