//! Sequential download, compress and upload of a batch of assets.
//!
//! One job runs at a time. Pause requests are sampled only between jobs, so
//! a job that has started always finishes before the run stops.

use crate::compressor::{
    compress, CompressionOutcome, CompressionResult, CompressionTarget, Preset,
};
use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::fetch::FetchChain;
use crate::formats::{content_type_for, extension_for, OutputFormat};
use crate::storage::{compressed_key, key_extension, ImageAsset, ObjectStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Where a job's asset came from, so its new URL can be written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "slot", rename_all = "lowercase")]
pub enum JobOrigin {
    Main { record_id: String },
    Gallery { record_id: String, index: usize },
    Standalone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub id: String,
    pub asset: ImageAsset,
    pub origin: JobOrigin,
    /// Further catalog slots holding the same URL; they receive the same new URL.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_origins: Vec<JobOrigin>,
    pub status: JobStatus,
    pub original_size_bytes: Option<u64>,
    pub compressed_size_bytes: Option<u64>,
    pub new_key: Option<String>,
    pub new_url: Option<String>,
    pub error: Option<String>,
}

impl MigrationJob {
    pub fn new(id: impl Into<String>, asset: ImageAsset, origin: JobOrigin) -> Self {
        Self {
            id: id.into(),
            asset,
            origin,
            shared_origins: Vec::new(),
            status: JobStatus::Pending,
            original_size_bytes: None,
            compressed_size_bytes: None,
            new_key: None,
            new_url: None,
            error: None,
        }
    }

    /// Every slot this job writes its new URL to.
    pub fn origins(&self) -> impl Iterator<Item = &JobOrigin> {
        std::iter::once(&self.origin).chain(&self.shared_origins)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub job_id: String,
    pub message: String,
}

/// Aggregate state of a batch, kept across pause/resume cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRun {
    pub total_jobs: usize,
    /// Index of the next job to process; only `reset` moves it back.
    pub cursor: usize,
    pub status: RunStatus,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_savings_bytes: u64,
    pub errors: Vec<JobError>,
    /// Best-effort failures that did not fail their job.
    pub warnings: Vec<JobError>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationRun {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            total_jobs,
            cursor: 0,
            status: RunStatus::Idle,
            success_count: 0,
            failure_count: 0,
            total_savings_bytes: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Discards all progress and starts over with the same job count.
    pub fn reset(&mut self) {
        *self = Self::new(self.total_jobs);
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn remaining(&self) -> usize {
        self.total_jobs.saturating_sub(self.cursor)
    }

    fn record_success(&mut self, original: u64, compressed: u64) {
        self.success_count += 1;
        self.total_savings_bytes += original.saturating_sub(compressed);
    }

    fn record_failure(&mut self, job_id: &str, message: String) {
        self.failure_count += 1;
        self.errors.push(JobError {
            job_id: job_id.to_string(),
            message,
        });
    }
}

/// Jobs plus run, as saved between invocations of a paused migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub jobs: Vec<MigrationJob>,
    pub run: MigrationRun,
}

impl RunState {
    pub fn new(jobs: Vec<MigrationJob>) -> Self {
        let run = MigrationRun::new(jobs.len());
        Self { jobs, run }
    }

    /// Reads a saved state, or `None` if `path` does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(path)?;
        let state: Self = serde_json::from_slice(&raw)?;
        if state.run.total_jobs != state.jobs.len() {
            return Err(MigrateError::RunMismatch {
                expected: state.run.total_jobs,
                actual: state.jobs.len(),
            });
        }
        debug!(path = ?path, cursor = state.run.cursor, "loaded run state");
        Ok(Some(state))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.persist(path).map_err(|e| MigrateError::Io(e.error))?;
        Ok(())
    }
}

/// Cooperative pause flag shared between the caller and a running batch.
#[derive(Debug, Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    JobStarted {
        index: usize,
        total: usize,
        job_id: String,
    },
    JobSucceeded {
        index: usize,
        job_id: String,
        original_size_bytes: u64,
        compressed_size_bytes: u64,
    },
    JobFailed {
        index: usize,
        job_id: String,
        message: String,
    },
    Paused {
        cursor: usize,
    },
    Completed {
        success_count: usize,
        failure_count: usize,
        total_savings_bytes: u64,
    },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Durable hook called after every finished job, before the next one
/// starts. `jobs` and `run` already reflect the finished job.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    async fn job_finished(
        &self,
        job: &MigrationJob,
        jobs: &[MigrationJob],
        run: &MigrationRun,
    ) -> Result<()>;
}

/// Sink that drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationOptions {
    pub delete_original: bool,
    /// Delay between jobs.
    pub throttle: Duration,
    /// Fixed preset; `None` picks one from each input's size.
    pub preset: Option<Preset>,
    pub output_format: Option<OutputFormat>,
}

impl MigrationOptions {
    /// Compression target for an input of `len` bytes.
    pub fn target_for(&self, len: u64) -> CompressionTarget {
        let preset = self.preset.unwrap_or_else(|| Preset::for_input_size(len));
        CompressionTarget {
            output_format: self.output_format,
            ..preset.target()
        }
    }
}

impl From<&MigrationConfig> for MigrationOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            delete_original: config.delete_original,
            throttle: config.throttle(),
            preset: config.preset,
            output_format: config.output_format,
        }
    }
}

pub struct Migrator {
    store: Arc<dyn ObjectStore>,
    fetcher: FetchChain,
    options: MigrationOptions,
    checkpoint: Option<Arc<dyn Checkpoint>>,
}

impl Migrator {
    pub fn new(store: Arc<dyn ObjectStore>, fetcher: FetchChain, options: MigrationOptions) -> Self {
        Self {
            store,
            fetcher,
            options,
            checkpoint: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn Checkpoint>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Processes `jobs` from `run.cursor` until the batch completes or a
    /// pause is observed between two jobs.
    ///
    /// Re-invoking with the same run resumes where it stopped. A completed
    /// run is returned untouched until it is reset.
    pub async fn run_batch(
        &self,
        jobs: &mut [MigrationJob],
        run: &mut MigrationRun,
        pause: &PauseToken,
        progress: &dyn ProgressSink,
    ) -> Result<RunStatus> {
        if run.total_jobs != jobs.len() {
            return Err(MigrateError::RunMismatch {
                expected: run.total_jobs,
                actual: jobs.len(),
            });
        }
        if run.is_completed() {
            debug!("run already completed, nothing to do");
            return Ok(RunStatus::Completed);
        }

        run.status = RunStatus::Running;
        run.started_at.get_or_insert_with(Utc::now);
        info!(
            cursor = run.cursor,
            total = run.total_jobs,
            "starting migration batch"
        );

        while run.cursor < jobs.len() {
            if pause.is_paused() {
                run.status = RunStatus::Paused;
                info!(cursor = run.cursor, "migration paused");
                progress.on_event(&ProgressEvent::Paused { cursor: run.cursor });
                return Ok(RunStatus::Paused);
            }

            let index = run.cursor;
            // A later job reading the same object needs the original to stay.
            let keep_original = jobs[index].asset.storage_key.as_deref().is_some_and(|key| {
                jobs[index + 1..]
                    .iter()
                    .any(|other| other.asset.storage_key.as_deref() == Some(key))
            });
            let job = &mut jobs[index];
            progress.on_event(&ProgressEvent::JobStarted {
                index,
                total: run.total_jobs,
                job_id: job.id.clone(),
            });

            self.process_job(job, run, keep_original).await;

            let event = match job.status {
                JobStatus::Succeeded => ProgressEvent::JobSucceeded {
                    index,
                    job_id: job.id.clone(),
                    original_size_bytes: job.original_size_bytes.unwrap_or(0),
                    compressed_size_bytes: job.compressed_size_bytes.unwrap_or(0),
                },
                _ => ProgressEvent::JobFailed {
                    index,
                    job_id: job.id.clone(),
                    message: job.error.clone().unwrap_or_default(),
                },
            };
            run.cursor += 1;
            progress.on_event(&event);

            if let Some(checkpoint) = &self.checkpoint {
                let finished = &jobs[index];
                if let Err(e) = checkpoint.job_finished(finished, jobs, run).await {
                    warn!(job = %finished.id, error = %e, "checkpoint failed");
                    run.warnings.push(JobError {
                        job_id: finished.id.clone(),
                        message: format!("Checkpoint failed: {}", e),
                    });
                }
            }

            if run.cursor < jobs.len() && !self.options.throttle.is_zero() {
                tokio::time::sleep(self.options.throttle).await;
            }
        }

        run.status = RunStatus::Completed;
        run.finished_at = Some(Utc::now());
        info!(
            succeeded = run.success_count,
            failed = run.failure_count,
            saved = run.total_savings_bytes,
            "migration batch completed"
        );
        progress.on_event(&ProgressEvent::Completed {
            success_count: run.success_count,
            failure_count: run.failure_count,
            total_savings_bytes: run.total_savings_bytes,
        });

        Ok(RunStatus::Completed)
    }

    /// Runs one job to a terminal status and records it on `run`.
    async fn process_job(&self, job: &mut MigrationJob, run: &mut MigrationRun, keep_original: bool) {
        job.status = JobStatus::Running;
        debug!(job = %job.id, url = %job.asset.url, "processing job");

        match self.migrate_asset(job, run, keep_original).await {
            Ok((original, compressed)) => {
                job.status = JobStatus::Succeeded;
                job.original_size_bytes = Some(original);
                job.compressed_size_bytes = Some(compressed);
                job.error = None;
                run.record_success(original, compressed);
                info!(
                    job = %job.id,
                    original,
                    compressed,
                    url = job.new_url.as_deref().unwrap_or_default(),
                    "job succeeded"
                );
            }
            Err(e) => {
                let message = e.to_string();
                warn!(job = %job.id, error = %message, "job failed");
                job.status = JobStatus::Failed;
                job.error = Some(message.clone());
                run.record_failure(&job.id, message);
            }
        }
    }

    async fn migrate_asset(
        &self,
        job: &mut MigrationJob,
        run: &mut MigrationRun,
        keep_original: bool,
    ) -> Result<(u64, u64)> {
        let bytes = self.fetcher.fetch(&job.asset).await?;
        let original_size = bytes.len() as u64;
        job.original_size_bytes = Some(original_size);

        let result = self.compress_bytes(bytes).await?;
        match &result.outcome {
            CompressionOutcome::Compressed => {}
            CompressionOutcome::AlreadyOptimal => {
                info!(job = %job.id, size = result.size_bytes, "image already close to optimal")
            }
            CompressionOutcome::Degraded(reason) => {
                warn!(job = %job.id, reason = %reason, "uploading original bytes")
            }
        }

        let extension = match extension_for(result.format) {
            Some(ext) => ext.to_string(),
            None => job
                .asset
                .storage_key
                .as_deref()
                .and_then(key_extension)
                .unwrap_or("img")
                .to_string(),
        };
        let new_key = compressed_key(job.asset.storage_key.as_deref(), &job.id, &extension);
        let compressed_size = result.size_bytes;

        let new_url = self
            .store
            .put(&new_key, result.bytes, content_type_for(result.format))
            .await
            .map_err(|e| MigrateError::UploadFailed {
                key: new_key.clone(),
                message: e.to_string(),
            })?;
        job.new_key = Some(new_key);
        job.new_url = Some(new_url);

        if self.options.delete_original {
            match job.asset.storage_key.as_deref() {
                Some(old_key) if keep_original => {
                    debug!(job = %job.id, key = old_key, "original still needed by a later job");
                }
                Some(old_key) => {
                    if let Err(e) = self.store.delete(old_key).await {
                        let failure = MigrateError::DeleteFailed {
                            key: old_key.to_string(),
                            message: e.to_string(),
                        };
                        warn!(job = %job.id, error = %failure, "could not delete original");
                        run.warnings.push(JobError {
                            job_id: job.id.clone(),
                            message: failure.to_string(),
                        });
                    }
                }
                None => {}
            }
        }

        Ok((original_size, compressed_size))
    }

    /// Compresses on the blocking pool. Only `InvalidInput` propagates; a
    /// lost worker degrades to the original bytes like any other failure.
    async fn compress_bytes(&self, bytes: Vec<u8>) -> Result<CompressionResult> {
        let target = self.options.target_for(bytes.len() as u64);
        let shared: Arc<[u8]> = bytes.into();
        let input = shared.clone();

        match tokio::task::spawn_blocking(move || compress(&input, &target)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "compression worker failed, keeping original bytes");
                let size = shared.len() as u64;
                Ok(CompressionResult {
                    bytes: shared.to_vec(),
                    format: image::guess_format(&shared).ok(),
                    size_bytes: size,
                    original_size_bytes: size,
                    quality: None,
                    iterations: 0,
                    dimensions: None,
                    outcome: CompressionOutcome::Degraded(e.to_string()),
                })
            }
        }
    }
}
