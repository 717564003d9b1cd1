//! Object storage seam and storage-key conventions.
//!
//! New objects are written under keys carrying [`COMPRESSED_MARKER`], which
//! is how already-migrated assets are recognised on later runs.

mod local;
mod walrus;

pub use local::LocalStore;
pub use walrus::{build_blob_url, WalrusOptions, WalrusStore};

use crate::constants::{COMPRESSED_MARKER, DEFAULT_KEY_PREFIX};
use crate::error::{MigrateError, Result};
use crate::utils::sanitize_key_segment;
use async_trait::async_trait;
use chrono::Utc;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recovers the storage key from a public URL this store handed out.
    fn key_from_url(&self, url: &str) -> Option<String>;

    /// Writes `bytes` under `key` and returns the public URL of the object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// A currently valid download URL for `key`.
    async fn fresh_signed_url(&self, key: &str) -> Result<String>;

    /// Streams the object behind a URL returned by `fresh_signed_url`.
    async fn read_signed(&self, signed_url: &str) -> Result<Vec<u8>>;
}

/// A remote image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub url: String,
    /// `None` when the URL does not belong to the configured store.
    pub storage_key: Option<String>,
}

impl ImageAsset {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            storage_key: None,
        }
    }

    /// Builds an asset and derives its key through `store`.
    pub fn resolve(url: impl Into<String>, store: &dyn ObjectStore) -> Self {
        let url = url.into();
        let storage_key = store.key_from_url(&url);
        Self { url, storage_key }
    }

    pub fn is_compressed(&self) -> bool {
        is_compressed(&self.url)
            || self.storage_key.as_deref().is_some_and(is_compressed)
    }
}

/// Whether a URL or key names an object written by [`compressed_key`].
///
/// Only the file name counts: the last segment of the key, of the URL path,
/// or of the percent-decoded URL fragment must start with `compressed_`.
pub fn is_compressed(url_or_key: &str) -> bool {
    let (before_fragment, fragment) = match url_or_key.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url_or_key, None),
    };
    let path = before_fragment
        .split_once('?')
        .map_or(before_fragment, |(path, _)| path);

    std::iter::once(path).chain(fragment).any(|part| {
        let decoded = percent_decode_str(part).decode_utf8_lossy();
        has_marker_prefix(decoded.rsplit('/').next().unwrap_or_default())
    })
}

fn has_marker_prefix(file_name: &str) -> bool {
    file_name
        .strip_prefix(COMPRESSED_MARKER)
        .is_some_and(|rest| rest.starts_with('_'))
}

/// Key for the re-uploaded object of `job_id`.
///
/// Lives next to the original object when its key is known, otherwise under
/// the default prefix. The millisecond suffix keeps re-runs from colliding.
pub fn compressed_key(original_key: Option<&str>, job_id: &str, extension: &str) -> String {
    let dir = original_key
        .and_then(|key| key.rsplit_once('/'))
        .map(|(dir, _)| dir)
        .filter(|dir| !dir.is_empty())
        .unwrap_or(DEFAULT_KEY_PREFIX);

    format!(
        "{}/{}_{}_{}.{}",
        dir,
        COMPRESSED_MARKER,
        sanitize_key_segment(job_id),
        Utc::now().timestamp_millis(),
        extension
    )
}

/// Extension of the last path segment of `key`, if any.
pub fn key_extension(key: &str) -> Option<&str> {
    let file = key.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Rejects keys that could escape the store root.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(MigrateError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(MigrateError::InvalidKey(key.to_string()));
    }
    Ok(())
}
