//! Product records whose image URLs are migrated, and the write-back of
//! new URLs once their jobs succeed.

use crate::error::{MigrateError, Result};
use crate::migrator::{JobOrigin, JobStatus, MigrationJob};
use crate::storage::{is_compressed, ImageAsset, ObjectStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub images_urls: Vec<String>,
    /// Fields this tool does not touch, preserved on write-back.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProductRecord {
    pub fn new(id: impl Into<String>, image_url: Option<&str>, images_urls: &[&str]) -> Self {
        Self {
            id: id.into(),
            image_url: image_url.map(str::to_string),
            images_urls: images_urls.iter().map(|u| u.to_string()).collect(),
            extra: Map::new(),
        }
    }

    /// Replaces the URL in `update`'s slot if it still holds the old URL.
    pub fn apply(&mut self, update: &UrlUpdate) -> bool {
        if self.id != update.record_id {
            return false;
        }
        let slot = match update.index {
            None => self.image_url.as_mut(),
            Some(index) => self.images_urls.get_mut(index),
        };
        match slot {
            Some(url) if *url == update.old_url => {
                *url = update.new_url.clone();
                true
            }
            _ => false,
        }
    }
}

/// New URL for one image slot of a record. `index` is `None` for the main
/// image and the gallery position otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlUpdate {
    pub record_id: String,
    pub index: Option<usize>,
    pub old_url: String,
    pub new_url: String,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list(&self) -> Result<Vec<ProductRecord>>;

    /// Applies `updates` and returns how many slots changed.
    async fn write_back(&self, updates: &[UrlUpdate]) -> Result<usize>;
}

/// Catalog stored as a JSON array of records.
pub struct JsonCatalog {
    path: PathBuf,
}

impl JsonCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn save(&self, records: &[ProductRecord]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, records)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path)
            .map_err(|e| MigrateError::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn list(&self) -> Result<Vec<ProductRecord>> {
        let raw = tokio::fs::read(&self.path).await?;
        let records: Vec<ProductRecord> = serde_json::from_slice(&raw)?;
        debug!(path = ?self.path, records = records.len(), "loaded catalog");
        Ok(records)
    }

    async fn write_back(&self, updates: &[UrlUpdate]) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut records = self.list().await?;
        let applied = updates
            .iter()
            .filter(|update| records.iter_mut().any(|record| record.apply(update)))
            .count();

        if applied > 0 {
            self.save(&records)?;
        }
        info!(path = ?self.path, applied, requested = updates.len(), "wrote back image URLs");
        Ok(applied)
    }
}

/// One job per distinct main or gallery URL that has not been migrated yet.
///
/// A URL held by several slots becomes a single job; the later slots ride
/// along in `shared_origins` and receive the same new URL.
pub fn candidate_jobs(records: &[ProductRecord], store: &dyn ObjectStore) -> Vec<MigrationJob> {
    let mut jobs: Vec<MigrationJob> = Vec::new();
    let mut by_url: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let main = record.image_url.as_deref().map(|url| {
            let origin = JobOrigin::Main {
                record_id: record.id.clone(),
            };
            (url, origin)
        });
        let gallery = record.images_urls.iter().enumerate().map(|(index, url)| {
            let origin = JobOrigin::Gallery {
                record_id: record.id.clone(),
                index,
            };
            (url.as_str(), origin)
        });

        for (url, origin) in main.into_iter().chain(gallery) {
            if !is_candidate(url) {
                continue;
            }
            if let Some(&existing) = by_url.get(url) {
                debug!(url, job = %jobs[existing].id, "slot shares an image with an earlier job");
                jobs[existing].shared_origins.push(origin);
                continue;
            }

            let asset = ImageAsset::resolve(url, store);
            if asset.is_compressed() {
                continue;
            }
            by_url.insert(url, jobs.len());
            jobs.push(MigrationJob::new(slot_job_id(&origin), asset, origin));
        }
    }

    jobs
}

/// `{record}/main` or `{record}/{index}`; unique because the last segment
/// is either `main` or a number.
fn slot_job_id(origin: &JobOrigin) -> String {
    match origin {
        JobOrigin::Main { record_id } => format!("{}/main", record_id),
        JobOrigin::Gallery { record_id, index } => format!("{}/{}", record_id, index),
        JobOrigin::Standalone => "standalone".to_string(),
    }
}

fn is_candidate(url: &str) -> bool {
    !url.trim().is_empty() && !is_compressed(url)
}

/// URL replacements for every slot of every succeeded job.
pub fn url_updates(jobs: &[MigrationJob]) -> Vec<UrlUpdate> {
    let mut updates = Vec::new();

    for job in jobs.iter().filter(|job| job.status == JobStatus::Succeeded) {
        let new_url = match job.new_url.as_deref() {
            Some(url) => url,
            None => continue,
        };
        for origin in job.origins() {
            let (record_id, index) = match origin {
                JobOrigin::Main { record_id } => (record_id, None),
                JobOrigin::Gallery { record_id, index } => (record_id, Some(*index)),
                JobOrigin::Standalone => continue,
            };
            updates.push(UrlUpdate {
                record_id: record_id.clone(),
                index,
                old_url: job.asset.url.clone(),
                new_url: new_url.to_string(),
            });
        }
    }

    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalStore {
        LocalStore::new(dir.path(), Some("https://media.example.com/".to_string())).unwrap()
    }

    #[test]
    fn test_record_json_shape() {
        let raw = r#"[{"id":"p1","imageUrl":"https://a/1.jpg","imagesUrls":["https://a/2.jpg"],"name":"Lamp"}]"#;
        let records: Vec<ProductRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records[0].image_url.as_deref(), Some("https://a/1.jpg"));
        assert_eq!(records[0].images_urls.len(), 1);
        assert_eq!(records[0].extra["name"], "Lamp");

        let back = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(back["imagesUrls"][0], "https://a/2.jpg");
        assert_eq!(back["name"], "Lamp");
    }

    #[test]
    fn test_candidate_jobs_skip_compressed_and_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let records = vec![
            ProductRecord::new(
                "p1",
                Some("https://media.example.com/images/a.jpg"),
                &["https://other.example.com/b.png", ""],
            ),
            ProductRecord::new(
                "p2",
                Some("https://media.example.com/images/compressed_p2_1.jpg"),
                &[],
            ),
        ];

        let jobs = candidate_jobs(&records, &store);
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["p1/main", "p1/0"]);
        assert_eq!(jobs[0].asset.storage_key.as_deref(), Some("images/a.jpg"));
        assert_eq!(jobs[1].asset.storage_key, None);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn test_url_updates_only_for_succeeded_jobs() {
        let mut ok = MigrationJob::new(
            "p1/2",
            ImageAsset::new("https://a/old.jpg"),
            JobOrigin::Gallery {
                record_id: "p1".to_string(),
                index: 2,
            },
        );
        ok.status = JobStatus::Succeeded;
        ok.new_url = Some("https://a/compressed.jpg".to_string());

        let mut failed = ok.clone();
        failed.status = JobStatus::Failed;

        let updates = url_updates(&[ok, failed]);
        assert_eq!(
            updates,
            vec![UrlUpdate {
                record_id: "p1".to_string(),
                index: Some(2),
                old_url: "https://a/old.jpg".to_string(),
                new_url: "https://a/compressed.jpg".to_string(),
            }]
        );
    }

    #[test]
    fn test_job_ids_do_not_collide_across_records() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let records = vec![
            ProductRecord::new("p1", Some("https://a/1.jpg"), &["https://a/2.jpg"]),
            ProductRecord::new("p1-0", Some("https://a/3.jpg"), &[]),
            ProductRecord::new("p1/0", Some("https://a/4.jpg"), &[]),
        ];

        let jobs = candidate_jobs(&records, &store);
        let mut ids: Vec<_> = jobs.iter().map(|j| j.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_shared_url_becomes_one_job_for_every_slot() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let url = "https://media.example.com/products/p1/main.jpg";
        let records = vec![
            ProductRecord::new("p1", Some(url), &[url, "https://media.example.com/products/p1/side.jpg"]),
            ProductRecord::new("p2", None, &[url]),
        ];

        let mut jobs = candidate_jobs(&records, &store);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "p1/main");
        assert_eq!(
            jobs[0].shared_origins,
            vec![
                JobOrigin::Gallery {
                    record_id: "p1".to_string(),
                    index: 0
                },
                JobOrigin::Gallery {
                    record_id: "p2".to_string(),
                    index: 0
                },
            ]
        );

        jobs[0].status = JobStatus::Succeeded;
        jobs[0].new_url = Some("https://media.example.com/products/p1/compressed_p1_main_1.jpg".to_string());
        let updates = url_updates(&jobs);
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| u.old_url == url));
        assert_eq!(updates[1].index, Some(0));
        assert_eq!(updates[2].record_id, "p2");
    }

    #[test]
    fn test_apply_requires_matching_old_url() {
        let mut record = ProductRecord::new("p1", Some("https://a/new.jpg"), &[]);
        let update = UrlUpdate {
            record_id: "p1".to_string(),
            index: None,
            old_url: "https://a/old.jpg".to_string(),
            new_url: "https://a/compressed.jpg".to_string(),
        };
        assert!(!record.apply(&update));
        assert_eq!(record.image_url.as_deref(), Some("https://a/new.jpg"));
    }

    #[tokio::test]
    async fn test_json_catalog_write_back_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        let records = vec![ProductRecord::new("p1", Some("https://a/old.jpg"), &["https://a/g.jpg"])];
        std::fs::write(&path, serde_json::to_vec(&records).unwrap()).unwrap();

        let catalog = JsonCatalog::new(&path);
        let updates = vec![UrlUpdate {
            record_id: "p1".to_string(),
            index: None,
            old_url: "https://a/old.jpg".to_string(),
            new_url: "https://a/compressed_p1.jpg".to_string(),
        }];

        assert_eq!(catalog.write_back(&updates).await.unwrap(), 1);
        assert_eq!(catalog.write_back(&updates).await.unwrap(), 0);

        let stored = catalog.list().await.unwrap();
        assert_eq!(stored[0].image_url.as_deref(), Some("https://a/compressed_p1.jpg"));
        assert_eq!(stored[0].images_urls, vec!["https://a/g.jpg".to_string()]);
    }
}
