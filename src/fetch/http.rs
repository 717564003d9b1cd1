use super::{is_http_url, FetchError, FetchStrategy};
use crate::constants::{DEFAULT_MAX_BODY_BYTES, MAX_PREALLOC_BYTES};
use crate::storage::ImageAsset;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

/// Direct HTTP GET that reads the body chunk by chunk.
///
/// `idle_timeout` bounds the wait for the response head and for every
/// subsequent chunk, so a stalled transfer fails fast. `total_timeout`
/// bounds the whole download, which may legitimately take much longer.
/// Bodies above `max_body_bytes` are refused, whether announced in the
/// Content-Length header or discovered while streaming.
pub struct HttpStrategy {
    client: reqwest::Client,
    idle_timeout: Duration,
    total_timeout: Duration,
    max_body_bytes: u64,
}

impl HttpStrategy {
    pub fn new(client: reqwest::Client, idle_timeout: Duration, total_timeout: Duration) -> Self {
        Self {
            client,
            idle_timeout,
            total_timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    fn too_large(&self, size: u64) -> FetchError {
        FetchError::TooLarge {
            size,
            limit: self.max_body_bytes,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = timeout(self.idle_timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Stalled(self.idle_timeout))?
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let expected = response.content_length();
        if let Some(len) = expected.filter(|len| *len > self.max_body_bytes) {
            return Err(self.too_large(len));
        }
        let reserve = expected.map_or(0, |len| len.min(MAX_PREALLOC_BYTES));
        let mut body = Vec::with_capacity(reserve as usize);
        let started = Instant::now();

        loop {
            let chunk = timeout(self.idle_timeout, response.chunk())
                .await
                .map_err(|_| FetchError::Stalled(self.idle_timeout))?
                .map_err(|e| FetchError::Http(e.to_string()))?;

            match chunk {
                Some(chunk) => {
                    let received = (body.len() + chunk.len()) as u64;
                    if received > self.max_body_bytes {
                        return Err(self.too_large(received));
                    }
                    body.extend_from_slice(&chunk);
                    trace!(url, received = body.len(), expected, "download progress");
                }
                None => break,
            }
        }

        debug!(
            url,
            size = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "download complete"
        );
        Ok(body)
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, asset: &ImageAsset) -> Result<Vec<u8>, FetchError> {
        if !is_http_url(&asset.url) {
            return Err(FetchError::Unavailable("not an http(s) URL".to_string()));
        }

        timeout(self.total_timeout, self.download(&asset.url))
            .await
            .map_err(|_| FetchError::Timeout(self.total_timeout))?
    }
}
