pub const MIB: u64 = 1024 * 1024;
pub const KIB: u64 = 1024;

/// Inputs above this size get the aggressive preset.
pub const AGGRESSIVE_THRESHOLD_BYTES: u64 = 3 * MIB;
/// Inputs below this size get the conservative preset.
pub const CONSERVATIVE_THRESHOLD_BYTES: u64 = MIB / 2;

pub const MAX_IMAGE_DIMENSION: u32 = 16384;

// Preset tuples: (max size, max dimension, initial quality, iterations)
pub const AGGRESSIVE_MAX_SIZE: u64 = MIB;
pub const AGGRESSIVE_MAX_DIMENSION: u32 = 1920;
pub const AGGRESSIVE_QUALITY: f32 = 0.7;
pub const AGGRESSIVE_ITERATIONS: u32 = 10;

pub const DEFAULT_MAX_SIZE: u64 = 800 * KIB;
pub const DEFAULT_MAX_DIMENSION: u32 = 1920;
pub const DEFAULT_QUALITY: f32 = 0.8;
pub const DEFAULT_ITERATIONS: u32 = 8;

pub const CONSERVATIVE_MAX_SIZE: u64 = 512 * KIB;
pub const CONSERVATIVE_MAX_DIMENSION: u32 = 2048;
pub const CONSERVATIVE_QUALITY: f32 = 0.9;
pub const CONSERVATIVE_ITERATIONS: u32 = 4;

pub const QUALITY_STEP: u8 = 10;
pub const MIN_LOSSY_QUALITY: u8 = 10;
/// Quality used by the re-encode fetch fallback, independent of any target.
pub const REENCODE_QUALITY: u8 = 100;
/// Linear shrink factor applied per lossless iteration.
pub const LOSSLESS_SHRINK_FACTOR: f32 = 0.8;
/// Results at or above this fraction of the input are flagged already optimal.
pub const ALREADY_OPTIMAL_RATIO: f64 = 0.95;

pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;
pub const OXIPNG_PRESET: u8 = 4;

pub const COMPRESSED_MARKER: &str = "compressed";
pub const DEFAULT_KEY_PREFIX: &str = "images";

pub const DEFAULT_ATTEMPTS_PER_STRATEGY: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_STRATEGY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_TOTAL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_THROTTLE_MS: u64 = 300;
/// Downloads larger than this are refused.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 256 * MIB;
/// Upper bound on the buffer reserved from a Content-Length header.
pub const MAX_PREALLOC_BYTES: u64 = 8 * MIB;

pub const DEFAULT_EPOCHS: u64 = 10;
pub const DEFAULT_WALRUS_AGGREGATOR: &str = "https://aggregator.walrus-testnet.walrus.space";
pub const DEFAULT_WALRUS_PUBLISHER: &str = "https://publisher.walrus-testnet.walrus.space";
pub const WALRUS_BLOB_PATH: &str = "/v1/blobs/";

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
