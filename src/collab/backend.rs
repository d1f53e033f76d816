use crate::{
    Result,
    metadata::ItemMetadata,
    types::{
        DiscreteItem,
        Identity,
        InventoryEntry,
    },
};

/// Content reference prepared off-chain for a claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provisioned {
    pub uri: String,
}

/// The off-chain provisioning authority.
pub trait Backend {
    /// Prepare item metadata for `identity` and return the reference to embed on-chain.
    fn provision(
        &self,
        item: DiscreteItem,
        identity: &Identity,
    ) -> impl Future<Output = Result<Provisioned>>;

    /// Authoritative list of discrete items owned by `identity`.
    fn list_inventory(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<InventoryEntry>>>;

    /// Shop price of `item`, in whole gold.
    fn list_price(&self, item: DiscreteItem) -> impl Future<Output = Result<u64>>;

    /// Fetch a metadata document from an already gateway-resolved URL.
    fn fetch_metadata(&self, url: &str) -> impl Future<Output = Result<ItemMetadata>>;
}
