pub mod catalog;
pub mod checkpoint;
pub mod cli;
pub mod compressor;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod formats;
pub mod logger;
pub mod migrator;
pub mod storage;
pub mod utils;

pub use catalog::{candidate_jobs, url_updates, Catalog, JsonCatalog, ProductRecord, UrlUpdate};
pub use checkpoint::StateCheckpoint;
pub use compressor::{
    compress, compress_file, CompressionOutcome, CompressionResult, CompressionTarget, Preset,
};
pub use config::{build_http_client, PipelineConfig};
pub use error::{MigrateError, Result};
pub use fetch::{FetchChain, FetchError, FetchStrategy, RetryPolicy};
pub use formats::OutputFormat;
pub use migrator::{
    Checkpoint, JobOrigin, JobStatus, MigrationJob, MigrationOptions, MigrationRun, Migrator,
    NoProgress, PauseToken, ProgressEvent, ProgressSink, RunState, RunStatus,
};
pub use storage::{ImageAsset, LocalStore, ObjectStore, WalrusOptions, WalrusStore};
