use super::{FetchError, FetchStrategy};
use crate::storage::{ImageAsset, ObjectStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Reads the asset through the object store: a fresh signed URL is issued
/// for its storage key on every attempt, then the object is streamed from it.
pub struct StoreStrategy {
    store: Arc<dyn ObjectStore>,
}

impl StoreStrategy {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FetchStrategy for StoreStrategy {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn fetch(&self, asset: &ImageAsset) -> Result<Vec<u8>, FetchError> {
        let key = asset.storage_key.as_deref().ok_or_else(|| {
            FetchError::Unavailable(format!("no {} key for this URL", self.store.name()))
        })?;

        let signed_url = self
            .store
            .fresh_signed_url(key)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        trace!(key, url = %signed_url, "issued signed URL");

        self.store
            .read_signed(&signed_url)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_through_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path(), None).unwrap());
        let url = store.put("images/a.jpg", vec![9, 9], "image/jpeg").await.unwrap();

        let asset = ImageAsset::resolve(url, store.as_ref());
        let strategy = StoreStrategy::new(store);
        assert_eq!(strategy.fetch(&asset).await.unwrap(), vec![9, 9]);
    }

    #[tokio::test]
    async fn test_missing_object_fails_when_signing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path(), None).unwrap());
        let url = store.put("images/a.jpg", vec![1], "image/jpeg").await.unwrap();
        let asset = ImageAsset::resolve(url, store.as_ref());
        store.delete("images/a.jpg").await.unwrap();

        let result = StoreStrategy::new(store).fetch(&asset).await;
        assert!(matches!(result, Err(FetchError::Storage(_))));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path(), None).unwrap());
        let strategy = StoreStrategy::new(store);

        let result = strategy
            .fetch(&ImageAsset::new("https://elsewhere.example.com/a.jpg"))
            .await;
        assert!(matches!(result, Err(FetchError::Unavailable(_))));
    }
}
