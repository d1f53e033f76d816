use crate::{
    Result,
    types::{
        AdjustDirection,
        Finality,
        FungibleKind,
        Identity,
        TokenAmount,
        TxHandle,
    },
};

/// The on-chain side: claim submission, finality and fungible balances.
pub trait Ledger {
    fn submit_mint_claim(
        &self,
        identity: &Identity,
        uri: &str,
    ) -> impl Future<Output = Result<TxHandle>>;

    /// Resolves once the transaction is final, or fails with `Reverted` / `TimedOut`.
    fn await_finality(&self, handle: &TxHandle) -> impl Future<Output = Result<Finality>>;

    fn read_fungible_balance(
        &self,
        kind: FungibleKind,
        identity: &Identity,
    ) -> impl Future<Output = Result<TokenAmount>>;

    fn submit_fungible_adjust(
        &self,
        kind: FungibleKind,
        target: &Identity,
        amount: TokenAmount,
        direction: AdjustDirection,
    ) -> impl Future<Output = Result<TxHandle>>;
}
