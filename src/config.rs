//! TOML configuration for a migration.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! local store rooted at `./media` and the standard fetch chain.
//!
//! ```toml
//! [store]
//! backend = "local"
//! root = "./media"
//! base_url = "https://media.example.com/"
//!
//! [fetch]
//! strategies = ["store", "http", "reencode"]
//! idle_timeout_secs = 15
//!
//! [migration]
//! delete_original = true
//! preset = "aggressive"
//! ```

use crate::compressor::Preset;
use crate::constants::{
    DEFAULT_ATTEMPTS_PER_STRATEGY, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_RETRY_BACKOFF_MS,
    DEFAULT_STRATEGY_TIMEOUT_SECS, DEFAULT_THROTTLE_MS, DEFAULT_TOTAL_TIMEOUT_SECS,
};
use crate::error::{MigrateError, Result};
use crate::fetch::StrategyKind;
use crate::formats::OutputFormat;
use crate::storage::{LocalStore, ObjectStore, WalrusOptions, WalrusStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Local {
        root: PathBuf,
        #[serde(default)]
        base_url: Option<String>,
    },
    Walrus(WalrusOptions),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local {
            root: PathBuf::from("media"),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Strategy order; reordering or removing entries needs no code change.
    pub strategies: Vec<StrategyKind>,
    pub attempts_per_strategy: u32,
    pub retry_backoff_ms: u64,
    pub strategy_timeout_secs: u64,
    /// No-data bound for the direct HTTP strategy.
    pub idle_timeout_secs: u64,
    /// Whole-download bound for the direct HTTP strategy.
    pub total_timeout_secs: u64,
    /// Downloads announcing or streaming more than this fail the attempt.
    pub max_body_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strategies: vec![StrategyKind::Store, StrategyKind::Http, StrategyKind::Reencode],
            attempts_per_strategy: DEFAULT_ATTEMPTS_PER_STRATEGY,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            strategy_timeout_secs: DEFAULT_STRATEGY_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            total_timeout_secs: DEFAULT_TOTAL_TIMEOUT_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub delete_original: bool,
    pub throttle_ms: u64,
    /// Pins one preset instead of choosing by input size.
    pub preset: Option<Preset>,
    /// Forces one output format instead of choosing by source format.
    pub output_format: Option<OutputFormat>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            delete_original: false,
            throttle_ms: DEFAULT_THROTTLE_MS,
            preset: None,
            output_format: None,
        }
    }
}

impl MigrationConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| MigrateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| MigrateError::Config(format!("cannot read {:?}: {}", path, e)))?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = ?path, "loaded configuration");
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.strategies.is_empty() {
            return Err(MigrateError::Config(
                "fetch.strategies must name at least one strategy".to_string(),
            ));
        }
        if self.fetch.attempts_per_strategy == 0 {
            return Err(MigrateError::Config(
                "fetch.attempts_per_strategy must be at least 1".to_string(),
            ));
        }
        if self.fetch.idle_timeout_secs == 0 || self.fetch.total_timeout_secs == 0 {
            return Err(MigrateError::Config(
                "fetch timeouts must be positive".to_string(),
            ));
        }
        if self.fetch.max_body_bytes == 0 {
            return Err(MigrateError::Config(
                "fetch.max_body_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_store(&self, http: reqwest::Client) -> Result<Arc<dyn ObjectStore>> {
        let store: Arc<dyn ObjectStore> = match &self.store {
            StoreConfig::Local { root, base_url } => {
                Arc::new(LocalStore::new(root, base_url.clone())?)
            }
            StoreConfig::Walrus(options) => Arc::new(WalrusStore::new(options.clone(), http)),
        };
        Ok(store)
    }
}

/// Shared HTTP client for the fetch strategies and the Walrus store.
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("img-migrate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MigrateError::Config(format!("cannot build HTTP client: {}", e)))
}
