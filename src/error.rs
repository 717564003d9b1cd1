use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid quality value: {0}. Must be between 0.0 and 1.0")]
    InvalidQuality(f32),

    #[error("Invalid compression target: {0}")]
    InvalidTarget(String),

    #[error("Invalid image dimensions: {0}x{1}. Maximum allowed: {2}x{2}")]
    InvalidDimensions(u32, u32, u32),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Download failed for {url}: {}", .reasons.join("; "))]
    DownloadFailed { url: String, reasons: Vec<String> },

    #[error("Upload failed for key {key}: {message}")]
    UploadFailed { key: String, message: String },

    #[error("Delete failed for key {key}: {message}")]
    DeleteFailed { key: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run expects {expected} jobs but {actual} were supplied")]
    RunMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, MigrateError>;
