//! Ordered download strategies for remote assets.
//!
//! A [`FetchChain`] tries each [`FetchStrategy`] in turn. Every strategy gets
//! a fixed number of attempts, each bounded by that strategy's timeout,
//! before the chain moves on. When every strategy is exhausted the chain
//! reports all collected reasons in a single `DownloadFailed` error.

mod http;
mod reencode;
mod store;

pub use http::HttpStrategy;
pub use reencode::{reencode, ReencodeStrategy};
pub use store::StoreStrategy;

use crate::config::FetchConfig;
use crate::constants::{DEFAULT_ATTEMPTS_PER_STRATEGY, DEFAULT_RETRY_BACKOFF_MS};
use crate::error::{MigrateError, Result};
use crate::storage::{ImageAsset, ObjectStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The strategy does not apply to this asset; it is skipped without retry.
    #[error("not applicable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no data received for {0:?}")]
    Stalled(Duration),

    #[error("body of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("cannot decode image: {0}")]
    Decode(String),
}

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, asset: &ImageAsset) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Strategy identifiers used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Store,
    Http,
    Reencode,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Store => "store",
            StrategyKind::Http => "http",
            StrategyKind::Reencode => "reencode",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS_PER_STRATEGY,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

struct Slot {
    strategy: Box<dyn FetchStrategy>,
    timeout: Duration,
}

pub struct FetchChain {
    slots: Vec<Slot>,
    policy: RetryPolicy,
}

impl FetchChain {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            slots: Vec::new(),
            policy,
        }
    }

    /// Appends `strategy` with its own per-attempt timeout.
    pub fn with_strategy(mut self, strategy: impl FetchStrategy + 'static, timeout: Duration) -> Self {
        self.slots.push(Slot {
            strategy: Box::new(strategy),
            timeout,
        });
        self
    }

    /// Builds the chain in the order given by `config.strategies`.
    pub fn from_config(
        config: &FetchConfig,
        store: Arc<dyn ObjectStore>,
        http: reqwest::Client,
    ) -> Self {
        let policy = RetryPolicy {
            attempts: config.attempts_per_strategy,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        };
        let strategy_timeout = Duration::from_secs(config.strategy_timeout_secs);
        let total_timeout = Duration::from_secs(config.total_timeout_secs);
        let max_body = config.max_body_bytes;

        config
            .strategies
            .iter()
            .fold(Self::new(policy), |chain, kind| match kind {
                StrategyKind::Store => {
                    chain.with_strategy(StoreStrategy::new(store.clone()), strategy_timeout)
                }
                StrategyKind::Http => chain.with_strategy(
                    HttpStrategy::new(
                        http.clone(),
                        Duration::from_secs(config.idle_timeout_secs),
                        total_timeout,
                    )
                    .with_max_body_bytes(max_body),
                    // The strategy enforces its own idle/total bounds.
                    total_timeout + Duration::from_secs(1),
                ),
                StrategyKind::Reencode => chain.with_strategy(
                    ReencodeStrategy::new(http.clone()).with_max_body_bytes(max_body),
                    strategy_timeout,
                ),
            })
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.strategy.name()).collect()
    }

    /// Downloads `asset`, falling through the strategies in order.
    pub async fn fetch(&self, asset: &ImageAsset) -> Result<Vec<u8>> {
        let attempts = self.policy.attempts.max(1);
        let mut reasons = Vec::new();

        for slot in &self.slots {
            let name = slot.strategy.name();

            for attempt in 1..=attempts {
                let outcome = tokio::time::timeout(slot.timeout, slot.strategy.fetch(asset))
                    .await
                    .unwrap_or(Err(FetchError::Timeout(slot.timeout)));

                match outcome {
                    Ok(bytes) => {
                        debug!(strategy = name, attempt, size = bytes.len(), url = %asset.url, "fetched asset");
                        return Ok(bytes);
                    }
                    Err(FetchError::Unavailable(why)) => {
                        debug!(strategy = name, reason = %why, "strategy skipped");
                        reasons.push(format!("{}: skipped ({})", name, why));
                        break;
                    }
                    Err(e) => {
                        warn!(strategy = name, attempt, error = %e, url = %asset.url, "fetch attempt failed");
                        reasons.push(format!("{}#{}: {}", name, attempt, e));
                        if attempt < attempts && !self.policy.backoff.is_zero() {
                            tokio::time::sleep(self.policy.backoff).await;
                        }
                    }
                }
            }
        }

        Err(MigrateError::DownloadFailed {
            url: asset.url.clone(),
            reasons,
        })
    }
}

pub(crate) fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
