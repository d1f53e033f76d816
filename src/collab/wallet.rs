use crate::{
    Result,
    types::Identity,
};
use tokio::sync::mpsc;

/// External account changes (switch or revoke) pushed by the wallet provider.
pub type AccountChanges = mpsc::UnboundedReceiver<Option<Identity>>;

pub trait Wallet {
    /// Ask the user for account access. May raise a prompt.
    ///
    /// Fails with `UserRejected` when the prompt is declined and `ProviderError` on any
    /// other provider fault.
    fn request_access(&self) -> impl Future<Output = Result<Identity>>;

    /// The account already authorized for this origin, if any. Never prompts.
    fn query_authorized(&self) -> impl Future<Output = Result<Option<Identity>>>;
}
