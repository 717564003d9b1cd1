use super::ObjectStore;
use crate::constants::{
    DEFAULT_EPOCHS, DEFAULT_WALRUS_AGGREGATOR, DEFAULT_WALRUS_PUBLISHER, WALRUS_BLOB_PATH,
};
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walrus_rs::WalrusClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalrusOptions {
    pub aggregator_url: String,
    pub publisher_url: String,
    pub epochs: Option<u64>,
}

impl Default for WalrusOptions {
    fn default() -> Self {
        Self {
            aggregator_url: DEFAULT_WALRUS_AGGREGATOR.to_string(),
            publisher_url: DEFAULT_WALRUS_PUBLISHER.to_string(),
            epochs: Some(DEFAULT_EPOCHS),
        }
    }
}

impl WalrusOptions {
    pub fn new(
        aggregator_url: Option<String>,
        publisher_url: Option<String>,
        epochs: Option<u64>,
    ) -> Self {
        Self {
            aggregator_url: aggregator_url
                .unwrap_or_else(|| DEFAULT_WALRUS_AGGREGATOR.to_string()),
            publisher_url: publisher_url
                .unwrap_or_else(|| DEFAULT_WALRUS_PUBLISHER.to_string()),
            epochs,
        }
    }
}

/// Builds a Walrus network access URL from aggregator URL and blob ID
pub fn build_blob_url(aggregator_url: &str, blob_id: &str) -> String {
    format!(
        "{}{}{}",
        aggregator_url.trim_end_matches('/'),
        WALRUS_BLOB_PATH,
        blob_id
    )
}

/// Walrus decentralized storage.
///
/// Blobs are content addressed, so the storage key of an object is its blob
/// ID. The logical key passed to `put` travels in the URL fragment, which
/// keeps the compressed marker visible to later runs.
pub struct WalrusStore {
    options: WalrusOptions,
    http: reqwest::Client,
}

impl WalrusStore {
    pub fn new(options: WalrusOptions, http: reqwest::Client) -> Self {
        Self { options, http }
    }
}

#[async_trait]
impl ObjectStore for WalrusStore {
    fn name(&self) -> &'static str {
        "walrus"
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let prefix = build_blob_url(&self.options.aggregator_url, "");
        let rest = url.strip_prefix(&prefix)?;
        let blob_id = rest.split(['#', '?', '/']).next()?;
        if blob_id.is_empty() {
            None
        } else {
            Some(blob_id.to_string())
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let client = WalrusClient::new(&self.options.aggregator_url, &self.options.publisher_url)
            .map_err(|e| {
                MigrateError::Storage(format!("Failed to create Walrus client: {}", e))
            })?;

        let size = bytes.len();
        let store_result = client
            .store_blob(bytes, self.options.epochs, Some(true), None, None)
            .await
            .map_err(|e| MigrateError::Storage(format!("Failed to store blob: {}", e)))?;

        let blob_id = match store_result.newly_created {
            Some(newly_created) => newly_created.blob_object.blob_id,
            None => {
                return Err(MigrateError::Storage(
                    "Failed to create new blob".to_string(),
                ))
            }
        };
        info!(key, blob_id = %blob_id, size, "stored blob on Walrus");

        Ok(format!(
            "{}#{}",
            build_blob_url(&self.options.aggregator_url, &blob_id),
            utf8_percent_encode(key, NON_ALPHANUMERIC)
        ))
    }

    async fn read_signed(&self, signed_url: &str) -> Result<Vec<u8>> {
        debug!(url = %signed_url, "reading blob from aggregator");

        let response = self
            .http
            .get(signed_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                MigrateError::Storage(format!("Failed to read blob {}: {}", signed_url, e))
            })?;
        let bytes = response.bytes().await.map_err(|e| {
            MigrateError::Storage(format!("Failed to read blob {}: {}", signed_url, e))
        })?;

        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Err(MigrateError::Storage(format!(
            "blob {} cannot be deleted through the Walrus HTTP API",
            key
        )))
    }

    async fn fresh_signed_url(&self, key: &str) -> Result<String> {
        // Aggregator reads need no signature; the blob ID URL never expires.
        let blob_id = percent_decode_str(key).decode_utf8_lossy();
        Ok(build_blob_url(&self.options.aggregator_url, &blob_id))
    }
}
