//! Progress persisted after every job.
//!
//! A process killed mid-run loses at most the job in flight: the state file
//! already holds the cursor and every earlier job, and the catalog already
//! points at every uploaded replacement.

use crate::catalog::{url_updates, Catalog};
use crate::error::Result;
use crate::migrator::{Checkpoint, JobStatus, MigrationJob, MigrationRun, RunState};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct StateCheckpoint {
    state_path: PathBuf,
    catalog: Arc<dyn Catalog>,
    applied: AtomicUsize,
}

impl StateCheckpoint {
    pub fn new(state_path: impl Into<PathBuf>, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            state_path: state_path.into(),
            catalog,
            applied: AtomicUsize::new(0),
        }
    }

    /// Catalog slots rewritten so far.
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checkpoint for StateCheckpoint {
    async fn job_finished(
        &self,
        job: &MigrationJob,
        jobs: &[MigrationJob],
        run: &MigrationRun,
    ) -> Result<()> {
        // State before catalog; a resumed session re-applies the URLs.
        let state = RunState {
            jobs: jobs.to_vec(),
            run: run.clone(),
        };
        state.save(&self.state_path)?;

        if job.status == JobStatus::Succeeded {
            let updates = url_updates(std::slice::from_ref(job));
            let applied = self.catalog.write_back(&updates).await?;
            self.applied.fetch_add(applied, Ordering::SeqCst);
        }

        debug!(job = %job.id, cursor = run.cursor, "checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{JsonCatalog, ProductRecord};
    use crate::migrator::JobOrigin;
    use crate::storage::ImageAsset;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_saves_state_and_rewrites_catalog_slot() {
        let dir = TempDir::new().unwrap();
        let catalog_path = dir.path().join("products.json");
        let records = vec![ProductRecord::new("p1", Some("https://a/old.jpg"), &[])];
        std::fs::write(&catalog_path, serde_json::to_vec(&records).unwrap()).unwrap();

        let state_path = dir.path().join("state.json");
        let checkpoint = StateCheckpoint::new(&state_path, Arc::new(JsonCatalog::new(&catalog_path)));

        let mut job = MigrationJob::new(
            "p1/main",
            ImageAsset::new("https://a/old.jpg"),
            JobOrigin::Main {
                record_id: "p1".to_string(),
            },
        );
        job.status = JobStatus::Succeeded;
        job.new_url = Some("https://a/compressed_p1_main_1.jpg".to_string());
        let mut run = MigrationRun::new(1);
        run.cursor = 1;

        checkpoint
            .job_finished(&job, std::slice::from_ref(&job), &run)
            .await
            .unwrap();

        let saved = RunState::load(&state_path).unwrap().unwrap();
        assert_eq!(saved.run.cursor, 1);
        assert_eq!(saved.jobs[0].status, JobStatus::Succeeded);

        let stored = JsonCatalog::new(&catalog_path).list().await.unwrap();
        assert_eq!(
            stored[0].image_url.as_deref(),
            Some("https://a/compressed_p1_main_1.jpg")
        );
        assert_eq!(checkpoint.applied(), 1);
    }

    #[tokio::test]
    async fn test_failed_job_only_saves_state() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        let checkpoint = StateCheckpoint::new(
            &state_path,
            Arc::new(JsonCatalog::new(dir.path().join("missing.json"))),
        );

        let mut job = MigrationJob::new("x", ImageAsset::new("https://a/x.jpg"), JobOrigin::Standalone);
        job.status = JobStatus::Failed;
        let run = MigrationRun::new(1);

        checkpoint
            .job_finished(&job, std::slice::from_ref(&job), &run)
            .await
            .unwrap();
        assert!(state_path.exists());
        assert_eq!(checkpoint.applied(), 0);
    }
}
