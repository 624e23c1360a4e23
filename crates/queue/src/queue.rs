//! Submission and query facade.
//!
//! [`JobQueue`] is constructed once at startup and handed to every consumer
//! (HTTP handlers, the WebSocket broadcaster, tests) by reference.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use wmpro_core::error::CoreError;
use wmpro_core::job::{EnqueueRequest, JobRecord, JobType, QueueStats};
use wmpro_core::types::JobId;
use wmpro_events::{EventBus, JobEvent};

use crate::archive::{self, ArchiveRequest, ArchiveSummary};
use crate::config::QueueConfig;
use crate::dispatcher::JobDispatcher;
use crate::executor::{discard_upload, WorkerExecutor};
use crate::processor::ProcessorRegistry;
use crate::retry::RetryPolicy;
use crate::scheduler::{ClassScheduler, ClassSnapshot};
use crate::store::JobStore;

pub struct JobQueue {
    store: Arc<JobStore>,
    dispatcher: Arc<JobDispatcher>,
    bus: Arc<EventBus>,
}

impl JobQueue {
    pub fn new(
        config: QueueConfig,
        processors: ProcessorRegistry,
        bus: Arc<EventBus>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let store = Arc::new(JobStore::new(
            Arc::clone(&bus),
            config.retention,
            config.retry.max_attempts,
        ));
        let executor = WorkerExecutor::new(Arc::clone(&store), processors, &config);
        let dispatcher = Arc::new(JobDispatcher::new(
            Arc::clone(&store),
            ClassScheduler::new(config.concurrency),
            executor,
            RetryPolicy::new(config.retry),
        ));

        tracing::info!(
            video = config.concurrency.video,
            image = config.concurrency.image,
            pdf = config.concurrency.pdf,
            max_attempts = config.retry.max_attempts,
            "Job queue initialised",
        );

        Ok(Self {
            store,
            dispatcher,
            bus,
        })
    }

    /// Create a job and start it if its class has a free slot.
    ///
    /// Returns after the first dispatch, so a job submitted into an idle
    /// class is already `active` when this returns. Submission never waits
    /// for a slot.
    ///
    /// A caller-chosen id is refused with [`CoreError::Conflict`] while a
    /// removed attempt under the same id is still running.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<JobId, CoreError> {
        if let Some(id) = request.id.as_deref() {
            if self.dispatcher.holds_slot(id).await {
                return Err(CoreError::Conflict(format!(
                    "Job {id} still has an attempt running"
                )));
            }
        }

        let job = self.store.create(request).await?;
        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            upload_group_id = %job.upload_group_id,
            priority = job.priority,
            "Job enqueued",
        );
        if let Err(e) = self.dispatcher.submit(&job).await {
            self.store.remove(&job.id).await;
            tracing::warn!(job_id = %job.id, error = %e, "Job submission rolled back");
            return Err(e);
        }
        Ok(job.id)
    }

    /// Unpack a ZIP upload and enqueue one job per supported entry, all in
    /// `request.upload_group_id`.
    ///
    /// The archive is deleted afterwards. Entries that do not become jobs
    /// are listed in [`ArchiveSummary::skipped`]; an archive without any
    /// supported entry is a validation error.
    pub async fn enqueue_archive(&self, request: ArchiveRequest) -> Result<ArchiveSummary, CoreError> {
        if request.upload_group_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "Upload group id must not be empty".to_string(),
            ));
        }
        request.watermark.validate()?;

        let archive_path = request.archive_path.clone();
        let extract_dir = request.extract_dir.clone();
        let extraction = tokio::task::spawn_blocking(move || {
            archive::extract_archive(&archive_path, &extract_dir)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("Archive extraction task failed: {e}")))?;
        discard_upload(&request.archive_path).await;
        let extraction = extraction?;

        if extraction.entries.is_empty() {
            return Err(CoreError::Validation(
                "Archive contains no supported files".to_string(),
            ));
        }

        let mut summary = ArchiveSummary {
            job_ids: Vec::with_capacity(extraction.entries.len()),
            skipped: extraction.skipped,
        };
        for entry in extraction.entries {
            let payload = match archive::payload_for(entry.job_type, &request.watermark) {
                Ok(payload) => payload,
                Err(reason) => {
                    discard_upload(&entry.path).await;
                    summary.skipped.push(format!("{}: {reason}", entry.filename));
                    continue;
                }
            };

            let mut job = EnqueueRequest::new(
                request.upload_group_id.clone(),
                entry.filename.clone(),
                entry.path.clone(),
                payload,
            )
            .with_file_size(entry.size_bytes);
            if let Some(priority) = request.priority {
                job = job.with_priority(priority);
            }

            match self.enqueue(job).await {
                Ok(id) => summary.job_ids.push(id),
                Err(e) => {
                    discard_upload(&entry.path).await;
                    summary.skipped.push(format!("{}: {e}", entry.filename));
                }
            }
        }

        tracing::info!(
            upload_group_id = %request.upload_group_id,
            jobs = summary.job_ids.len(),
            skipped = summary.skipped.len(),
            "Archive enqueued",
        );
        Ok(summary)
    }

    pub async fn get_job(&self, id: &str) -> Result<JobRecord, CoreError> {
        self.store.get_by_id(id).await
    }

    pub async fn get_job_stats(&self) -> QueueStats {
        self.store.stats().await
    }

    pub async fn get_active_jobs(&self) -> Vec<JobRecord> {
        self.store.list_active().await
    }

    pub async fn get_waiting_jobs(&self) -> Vec<JobRecord> {
        self.store.list_waiting().await
    }

    pub async fn get_jobs_by_upload_id(&self, upload_group_id: &str) -> Vec<JobRecord> {
        self.store.list_by_upload_group(upload_group_id).await
    }

    /// Slot usage and queue order for one job type.
    pub async fn class_snapshot(&self, job_type: JobType) -> ClassSnapshot {
        self.dispatcher.class_snapshot(job_type).await
    }

    /// Delete a job's bookkeeping and its uploaded input.
    ///
    /// Idempotent: `Ok(true)` the first time, `Ok(false)` once the record is
    /// gone. An attempt already running is not interrupted; it keeps its
    /// worker slot until the processor returns and its outcome is discarded.
    pub async fn remove_job(&self, id: &str) -> Result<bool, CoreError> {
        if id.trim().is_empty() {
            return Err(CoreError::Validation(
                "Job id must not be empty".to_string(),
            ));
        }

        self.dispatcher.forget(id).await;
        match self.store.remove(id).await {
            Some(record) => {
                discard_upload(&record.input_path).await;
                tracing::info!(job_id = %id, status = %record.status, "Job removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Receive every job event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.bus.subscribe()
    }

    /// Stop dispatching and cancel backoff timers. Waits up to `grace` for
    /// running attempts.
    pub async fn shutdown(&self, grace: Duration) {
        self.dispatcher.shutdown(grace).await;
    }
}
