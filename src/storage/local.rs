use super::{validate_key, ObjectStore};
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Characters escaped when a key is turned into a URL path. `/` is kept.
const KEY_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Object store backed by a directory tree.
///
/// Objects are addressed as `{base_url}{key}`. Without an explicit base URL
/// the `file://` URL of the root directory is used.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    base_url: String,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>, base_url: Option<String>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .map_err(|e| MigrateError::Storage(format!("cannot create {:?}: {}", root, e)))?;
        let root = root.canonicalize()?;

        let mut base_url =
            base_url.unwrap_or_else(|| format!("file://{}", root.to_string_lossy()));
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { root, base_url })
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.base_url, utf8_percent_encode(key, KEY_PATH))
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let encoded = url.strip_prefix(&self.base_url)?;
        let encoded = encoded.split(['?', '#']).next()?;
        let key = percent_decode_str(encoded).decode_utf8().ok()?.into_owned();
        validate_key(&key).ok()?;
        Some(key)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let path = self.path_for(key)?;
        let size = bytes.len();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = path
                .parent()
                .ok_or_else(|| MigrateError::InvalidKey(path.to_string_lossy().into_owned()))?;
            fs::create_dir_all(parent)?;

            // Write to a sibling temp file and rename so readers never see a partial object.
            let mut tmp = NamedTempFile::new_in(parent)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| MigrateError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| MigrateError::Storage(format!("write task failed: {}", e)))??;

        debug!(key, size, content_type, "stored object");
        Ok(self.url_for(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path).await?;
        debug!(key, "deleted object");
        Ok(())
    }

    async fn fresh_signed_url(&self, key: &str) -> Result<String> {
        let path = self.path_for(key)?;
        tokio::fs::metadata(&path).await?;
        Ok(self.url_for(key))
    }

    async fn read_signed(&self, signed_url: &str) -> Result<Vec<u8>> {
        let key = self
            .key_from_url(signed_url)
            .ok_or_else(|| MigrateError::InvalidKey(signed_url.to_string()))?;
        let path = self.path_for(&key)?;
        Ok(tokio::fs::read(&path).await?)
    }
}
