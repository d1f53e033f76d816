use crate::types::InventoryEntry;
use serde::{
    Deserialize,
    Serialize,
};

const IPFS_SCHEME: &str = "ipfs://";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemAttribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

/// Metadata document referenced by a claimed item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub attributes: Vec<ItemAttribute>,
}

/// An owned item together with its fetched metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedItemView {
    pub entry: InventoryEntry,
    pub metadata_url: String,
    pub image_url: String,
    pub metadata: ItemMetadata,
}

/// Rewrite `ipfs://<cid>` to an HTTP gateway URL. Other URIs pass through unchanged.
pub fn resolve_gateway_url(uri: &str, gateway: &str) -> String {
    match uri.strip_prefix(IPFS_SCHEME) {
        Some(path) => {
            let gateway = gateway.trim_end_matches('/');
            format!("{gateway}/{}", path.trim_start_matches('/'))
        }
        None => uri.to_string(),
    }
}
