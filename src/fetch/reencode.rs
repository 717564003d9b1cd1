use super::{is_http_url, FetchError, FetchStrategy};
use crate::compressor::encode_jpeg;
use crate::constants::{DEFAULT_MAX_BODY_BYTES, REENCODE_QUALITY};
use crate::storage::ImageAsset;
use async_trait::async_trait;
use tracing::debug;

/// Last-resort fetch: decode whatever the server returns and re-serialize
/// the pixels as a maximum quality JPEG.
///
/// The output format ignores the compression target on purpose; the
/// compressor still runs on the result afterwards.
pub struct ReencodeStrategy {
    client: reqwest::Client,
    max_body_bytes: u64,
}

impl ReencodeStrategy {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

#[async_trait]
impl FetchStrategy for ReencodeStrategy {
    fn name(&self) -> &'static str {
        "reencode"
    }

    async fn fetch(&self, asset: &ImageAsset) -> Result<Vec<u8>, FetchError> {
        if !is_http_url(&asset.url) {
            return Err(FetchError::Unavailable("not an http(s) URL".to_string()));
        }

        let response = self
            .client
            .get(&asset.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Http(e.to_string()))?;
        if let Some(len) = response.content_length().filter(|len| *len > self.max_body_bytes) {
            return Err(FetchError::TooLarge {
                size: len,
                limit: self.max_body_bytes,
            });
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let encoded = tokio::task::spawn_blocking(move || reencode(&raw))
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))??;

        debug!(url = %asset.url, size = encoded.len(), "re-encoded asset");
        Ok(encoded)
    }
}

/// Decodes `raw` and re-serializes it as a quality 100 JPEG.
pub fn reencode(raw: &[u8]) -> Result<Vec<u8>, FetchError> {
    let img = image::load_from_memory(raw).map_err(|e| FetchError::Decode(e.to_string()))?;
    encode_jpeg(&img, REENCODE_QUALITY).map_err(|e| FetchError::Decode(e.to_string()))
}
