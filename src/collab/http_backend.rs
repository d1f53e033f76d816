use std::fmt;

use reqwest::StatusCode;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::warn;
use url::Url;

use crate::{
    Error,
    Result,
    collab::{
        Backend,
        Provisioned,
    },
    metadata::ItemMetadata,
    types::{
        DiscreteItem,
        Identity,
        InventoryEntry,
    },
};

/// HTTP client for the provisioning backend.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &Url) -> Result<Self> {
        let base_url = base_url.as_str().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| backend_error("failed to build HTTP client", err))?;
        Ok(Self { base_url, http })
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        res: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|err| backend_error("failed to read backend response body", err))?;
        if !status.is_success() {
            return Err(Error::BackendError(describe_failure(status, &bytes, what)));
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| backend_error(&format!("invalid {what} payload"), err))
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: String, what: &str) -> Result<T> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| backend_error("backend request failed", err))?;
        Self::read_json(res, what).await
    }
}

impl Backend for HttpBackend {
    async fn provision(&self, item: DiscreteItem, identity: &Identity) -> Result<Provisioned> {
        let url = format!("{}/mint/{}", self.base_url, item);
        let res = self
            .http
            .post(url)
            .json(&MintRequestDto {
                user: identity.as_str(),
            })
            .send()
            .await
            .map_err(|err| backend_error("backend request failed", err))?;
        let dto: MintResponseDto = Self::read_json(res, "mint").await?;
        Ok(Provisioned {
            uri: dto.metadata_uri,
        })
    }

    async fn list_inventory(&self, identity: &Identity) -> Result<Vec<InventoryEntry>> {
        let url = format!("{}/inventory/{}", self.base_url, identity);
        let dtos: Vec<InventoryEntryDto> = self.get(url, "inventory").await?;
        Ok(into_entries(dtos))
    }

    async fn list_price(&self, item: DiscreteItem) -> Result<u64> {
        let url = format!("{}/shop", self.base_url);
        let listings: Vec<ShopListingDto> = self.get(url, "shop").await?;
        listings
            .into_iter()
            .find(|listing| {
                listing
                    .item
                    .parse::<DiscreteItem>()
                    .is_ok_and(|listed| listed == item)
            })
            .map(|listing| listing.price)
            .ok_or_else(|| Error::BackendError(format!("{item} is not listed in the shop")))
    }

    async fn fetch_metadata(&self, url: &str) -> Result<ItemMetadata> {
        self.get(url.to_string(), "metadata").await
    }
}

impl fmt::Display for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

fn backend_error(context: &str, err: impl fmt::Display) -> Error {
    Error::BackendError(format!("{context}: {err}"))
}

fn describe_failure(status: StatusCode, body: &[u8], what: &str) -> String {
    let detail = serde_json::from_slice::<ErrorDto>(body)
        .map(|dto| dto.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    format!("backend responded with {status} for {what}: {detail}")
}

/// Entries naming an item this engine does not know are dropped.
fn into_entries(dtos: Vec<InventoryEntryDto>) -> Vec<InventoryEntry> {
    dtos.into_iter()
        .filter_map(|dto| match dto.item.parse() {
            Ok(item) => Some(InventoryEntry {
                item,
                metadata_ref: dto.metadata_uri,
            }),
            Err(err) => {
                warn!(%err, "ignoring inventory entry");
                None
            }
        })
        .collect()
}

#[derive(Serialize)]
struct MintRequestDto<'a> {
    user: &'a str,
}

#[derive(Deserialize)]
struct MintResponseDto {
    metadata_uri: String,
}

#[derive(Deserialize)]
struct InventoryEntryDto {
    item: String,
    metadata_uri: String,
}

#[allow(dead_code)]
#[derive(Deserialize)]
struct ShopListingDto {
    item: String,
    price: u64,
    #[serde(default)]
    image: String,
}

#[derive(Deserialize)]
struct ErrorDto {
    error: String,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn into_entries__drops_unknown_items() {
        let dtos: Vec<InventoryEntryDto> = serde_json::from_str(
            r#"[
                {"item": "sword", "metadata_uri": "ipfs://bafy1"},
                {"item": "shield", "metadata_uri": "ipfs://bafy2"},
                {"item": "Gem", "metadata_uri": "ipfs://bafy3"}
            ]"#,
        )
        .unwrap();

        let entries = into_entries(dtos);

        assert_eq!(
            entries,
            vec![
                InventoryEntry {
                    item: DiscreteItem::Sword,
                    metadata_ref: "ipfs://bafy1".to_string(),
                },
                InventoryEntry {
                    item: DiscreteItem::Gem,
                    metadata_ref: "ipfs://bafy3".to_string(),
                },
            ]
        );
    }

    #[test]
    fn describe_failure__prefers_error_field_over_raw_body() {
        let structured = describe_failure(
            StatusCode::NOT_FOUND,
            br#"{"error": "Item not found"}"#,
            "mint",
        );
        let raw = describe_failure(StatusCode::BAD_GATEWAY, b"upstream down", "inventory");

        assert_eq!(
            structured,
            "backend responded with 404 Not Found for mint: Item not found"
        );
        assert_eq!(
            raw,
            "backend responded with 502 Bad Gateway for inventory: upstream down"
        );
    }

    #[test]
    fn mint_response__ignores_extra_fields() {
        let dto: MintResponseDto = serde_json::from_str(
            r#"{"message": "sword will be minted", "metadata_uri": "ipfs://bafy"}"#,
        )
        .unwrap();

        assert_eq!(dto.metadata_uri, "ipfs://bafy");
    }

    #[test]
    fn new__trims_trailing_slash_from_base_url() {
        let url = Url::parse("http://localhost:5000/").unwrap();

        let backend = HttpBackend::new(&url).unwrap();

        assert_eq!(backend.to_string(), "http://localhost:5000");
    }
}
