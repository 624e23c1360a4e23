//! Job dispatcher.
//!
//! Moves waiting jobs into free worker slots. There is no polling loop:
//! dispatch runs on submission, after every attempt, and when a backoff
//! timer fires. Each claimed slot gets its own Tokio task tracked by a
//! [`TaskTracker`], and backoff timers stop on the shared
//! [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use wmpro_core::error::CoreError;
use wmpro_core::job::{JobRecord, JobStatus, JobType};

use crate::executor::{discard_upload, AttemptOutcome, WorkerExecutor};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::scheduler::{ClassScheduler, ClassSnapshot};
use crate::store::{JobStore, Transition};

pub struct JobDispatcher {
    store: Arc<JobStore>,
    scheduler: ClassScheduler,
    executor: WorkerExecutor,
    retry: RetryPolicy,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<JobStore>,
        scheduler: ClassScheduler,
        executor: WorkerExecutor,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            scheduler,
            executor,
            retry,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Put a freshly created job in line and try to start it right away.
    ///
    /// The `created -> waiting` transition happens before the id is queued,
    /// so a concurrent dispatch can never claim a job that is not waiting
    /// yet. Returns once every free slot of the job's type is filled.
    pub async fn submit(self: &Arc<Self>, job: &JobRecord) -> Result<JobRecord, CoreError> {
        let waiting = self.store.transition(&job.id, Transition::Waiting).await?;
        let queued = self
            .scheduler
            .push(job.job_type, &job.id, job.priority)
            .await;
        if !queued {
            return Err(CoreError::Conflict(format!(
                "Job {} is already queued or running",
                job.id
            )));
        }
        self.dispatch(job.job_type).await;
        Ok(waiting)
    }

    /// Fill free slots of `job_type` from its waiting queue.
    pub async fn dispatch(self: &Arc<Self>, job_type: JobType) {
        if self.cancel.is_cancelled() {
            return;
        }

        while let Some(id) = self.scheduler.claim_next(job_type).await {
            match self.store.transition(&id, Transition::Active).await {
                Ok(job) => {
                    tracing::info!(
                        job_id = %job.id,
                        job_type = %job_type,
                        attempt = job.attempt,
                        "Job dispatched",
                    );
                    self.spawn_worker(job);
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %id,
                        job_type = %job_type,
                        error = %e,
                        "Releasing stale dispatch claim",
                    );
                    self.scheduler.release(job_type, &id).await;
                }
            }
        }
    }

    /// Whether a previous attempt for `id` still holds a worker slot.
    pub async fn holds_slot(&self, id: &str) -> bool {
        self.scheduler.holds_slot(id).await
    }

    /// Drop a waiting id from the scheduler. Running attempts are unaffected.
    pub async fn forget(&self, id: &str) -> bool {
        self.scheduler.forget(id).await
    }

    pub async fn class_snapshot(&self, job_type: JobType) -> ClassSnapshot {
        self.scheduler.snapshot(job_type).await
    }

    /// Stop dispatching, cancel backoff timers, and wait up to `grace` for
    /// running attempts to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Shutdown grace period elapsed with attempts still running",
            );
        } else {
            tracing::info!("Job dispatcher stopped");
        }
    }

    fn spawn_worker(self: &Arc<Self>, job: JobRecord) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            this.run_attempt(job).await;
        });
    }

    async fn run_attempt(self: Arc<Self>, job: JobRecord) {
        let job_type = job.job_type;

        match self.executor.execute(&job).await {
            AttemptOutcome::Completed(record) => {
                tracing::info!(
                    job_id = %record.id,
                    job_type = %job_type,
                    attempt = record.attempt,
                    result_url = record.result_url.as_deref().unwrap_or_default(),
                    "Job completed",
                );
                discard_upload(&record.input_path).await;
            }
            AttemptOutcome::Failed(record) => self.handle_failure(record).await,
            AttemptOutcome::Abandoned => {}
        }

        self.scheduler.release(job_type, &job.id).await;
        self.dispatch(job_type).await;
    }

    async fn handle_failure(self: &Arc<Self>, job: JobRecord) {
        match self.retry.decide(&job) {
            RetryDecision::Retry { delay } => {
                match self.store.transition(&job.id, Transition::Retry { delay }).await {
                    Ok(record) => {
                        tracing::info!(
                            job_id = %record.id,
                            attempt = record.attempt,
                            max_attempts = record.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Retry scheduled",
                        );
                        self.schedule_requeue(record, delay);
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, error = %e, "Could not schedule retry");
                    }
                }
            }
            RetryDecision::GiveUp => {
                tracing::error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts = job.attempt,
                    error = job.error.as_deref().unwrap_or_default(),
                    "Job failed permanently",
                );
                discard_upload(&job.input_path).await;
            }
        }
    }

    /// Re-queue `job` once its backoff elapses, unless shutdown comes first
    /// or the record is no longer waiting (removed meanwhile).
    fn schedule_requeue(self: &Arc<Self>, job: JobRecord, delay: Duration) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = this.cancel.cancelled() => {
                    tracing::debug!(job_id = %job.id, "Backoff cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if this.store.status(&job.id).await != Some(JobStatus::Waiting) {
                return;
            }
            this.scheduler
                .push(job.job_type, &job.id, job.priority)
                .await;
            this.dispatch(job.job_type).await;
        });
    }
}
