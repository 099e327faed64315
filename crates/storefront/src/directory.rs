use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use sliceline_core::domain::location::{AddressRef, Coordinates, StoreId, StoreLocation};
use sliceline_core::errors::PortError;
use sliceline_core::ports::StoreDirectory;

use crate::auth::TokenCache;
use crate::error::StorefrontError;
use crate::transport::ApiContext;

/// Flow slugs the bootstrap tooling provisions; the core only reads the
/// store flow and reads/writes customer-address entries.
const STORE_FLOW: &str = "pizzeria";
const ADDRESS_FLOW: &str = "customer_address";

#[derive(Debug, Deserialize)]
struct EntryCollection {
    data: Vec<StoreEntryDto>,
}

#[derive(Debug, Deserialize)]
struct Entry<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct StoreEntryDto {
    id: String,
    address: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    courier_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressEntryDto {
    id: String,
    latitude: f64,
    longitude: f64,
}

/// Store-location directory and persisted customer addresses, both stored
/// as custom-flow entries in the commerce backend.
pub struct DirectoryClient {
    api: ApiContext,
}

impl DirectoryClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        tokens: Arc<TokenCache>,
        request_timeout: Duration,
    ) -> Self {
        Self { api: ApiContext::new(http, base_url, tokens, request_timeout) }
    }
}

fn parse_store(dto: StoreEntryDto) -> StoreLocation {
    StoreLocation {
        id: StoreId(dto.id),
        latitude: dto.latitude,
        longitude: dto.longitude,
        address: dto.address,
        courier_id: dto.courier_id,
    }
}

fn parse_store_list(raw: Value) -> Result<Vec<StoreLocation>, StorefrontError> {
    let collection: EntryCollection =
        serde_json::from_value(raw).map_err(|err| StorefrontError::Decode {
            endpoint: format!("/v2/flows/{STORE_FLOW}/entries"),
            detail: err.to_string(),
        })?;
    Ok(collection.data.into_iter().map(parse_store).collect())
}

#[async_trait]
impl StoreDirectory for DirectoryClient {
    async fn list_locations(&self) -> Result<Vec<StoreLocation>, PortError> {
        let raw = self.api.get_json(&format!("/v2/flows/{STORE_FLOW}/entries")).await?;
        Ok(parse_store_list(raw)?)
    }

    async fn location(&self, id: &StoreId) -> Result<StoreLocation, PortError> {
        let path = format!("/v2/flows/{STORE_FLOW}/entries/{}", id.0);
        let raw = self.api.get_json(&path).await?;
        let entry: Entry<StoreEntryDto> = serde_json::from_value(raw).map_err(|err| {
            StorefrontError::Decode { endpoint: path.clone(), detail: err.to_string() }
        })?;
        Ok(parse_store(entry.data))
    }

    async fn save_customer_address(&self, point: Coordinates) -> Result<AddressRef, PortError> {
        let path = format!("/v2/flows/{ADDRESS_FLOW}/entries");
        let body = json!({
            "data": {
                "type": "entry",
                "latitude": point.latitude,
                "longitude": point.longitude,
            }
        });
        let raw = self.api.post_json(&path, &body).await?;
        let entry: Entry<AddressEntryDto> = serde_json::from_value(raw).map_err(|err| {
            StorefrontError::Decode { endpoint: path.clone(), detail: err.to_string() }
        })?;
        Ok(AddressRef(entry.data.id))
    }

    async fn customer_address(&self, address: &AddressRef) -> Result<Coordinates, PortError> {
        let path = format!("/v2/flows/{ADDRESS_FLOW}/entries/{}", address.0);
        let raw = self.api.get_json(&path).await?;
        let entry: Entry<AddressEntryDto> = serde_json::from_value(raw).map_err(|err| {
            StorefrontError::Decode { endpoint: path.clone(), detail: err.to_string() }
        })?;
        Ok(Coordinates { latitude: entry.data.latitude, longitude: entry.data.longitude })
    }
}
