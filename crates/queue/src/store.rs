//! Authoritative in-memory job table.
//!
//! [`JobStore`] is the only component that mutates [`JobRecord`]s. Every
//! mutation publishes exactly one [`JobEvent`] per affected record while the
//! write lock is still held, so subscribers observe per-job events in the
//! order the mutations were applied.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use wmpro_core::error::CoreError;
use wmpro_core::job::{
    EnqueueRequest, JobRecord, JobStatus, QueueStats, STAGE_COMPLETED, STAGE_FAILED,
    STAGE_PROCESSING, STAGE_QUEUED, STAGE_RETRY_SCHEDULED, STAGE_WAITING,
};
use wmpro_core::scheduling::state_machine;
use wmpro_core::types::{JobId, UploadGroupId};
use wmpro_events::{EventBus, JobEvent};

use crate::config::RetentionConfig;

/// A requested status change, with the data that change carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `created -> waiting` on first enqueue.
    Waiting,
    /// `failed -> waiting` for the next attempt, eligible after `delay`.
    Retry { delay: Duration },
    /// `waiting -> active` when a worker slot is assigned.
    Active,
    Completed {
        result_url: String,
        processing_time_seconds: f64,
    },
    Failed { error: String },
}

impl Transition {
    /// Status the record ends up in.
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Waiting | Transition::Retry { .. } => JobStatus::Waiting,
            Transition::Active => JobStatus::Active,
            Transition::Completed { .. } => JobStatus::Completed,
            Transition::Failed { .. } => JobStatus::Failed,
        }
    }
}

#[derive(Default)]
struct StoreInner {
    /// Records in creation order.
    jobs: IndexMap<JobId, JobRecord>,
    groups: HashMap<UploadGroupId, Vec<JobId>>,
    /// Terminal records, oldest first, for retention pruning.
    completed: VecDeque<JobId>,
    failed: VecDeque<JobId>,
}

impl StoreInner {
    /// Drop a record and its index entries. Does not publish.
    fn detach(&mut self, id: &str) -> Option<JobRecord> {
        let record = self.jobs.shift_remove(id)?;
        if let Some(ids) = self.groups.get_mut(&record.upload_group_id) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.groups.remove(&record.upload_group_id);
            }
        }
        self.completed.retain(|existing| existing != id);
        self.failed.retain(|existing| existing != id);
        Some(record)
    }
}

/// Thread-safe job table shared via `Arc<JobStore>`.
pub struct JobStore {
    inner: RwLock<StoreInner>,
    bus: Arc<EventBus>,
    retention: RetentionConfig,
    default_max_attempts: u32,
}

impl JobStore {
    pub fn new(bus: Arc<EventBus>, retention: RetentionConfig, default_max_attempts: u32) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            bus,
            retention,
            default_max_attempts,
        }
    }

    /// Create a record in `created` status and publish `job:added`.
    ///
    /// Generates a UUID when the request carries no id. A duplicate id is a
    /// [`CoreError::Conflict`].
    pub async fn create(&self, request: EnqueueRequest) -> Result<JobRecord, CoreError> {
        request.validate()?;

        let job_type = request.job_type();
        let priority = request.priority();
        let id = request
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&id) {
            return Err(CoreError::Conflict(format!("Job {id} already exists")));
        }

        let record = JobRecord {
            id: id.clone(),
            upload_group_id: request.upload_group_id,
            job_type,
            status: JobStatus::Created,
            progress: 0,
            stage: STAGE_QUEUED.to_string(),
            message: "Queued for processing".to_string(),
            attempt: 1,
            max_attempts: request.max_attempts.unwrap_or(self.default_max_attempts),
            priority,
            filename: request.filename,
            file_size_bytes: request.file_size_bytes,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            next_attempt_at: None,
            result_url: None,
            error: None,
            processing_time_seconds: None,
            speed: None,
            eta_seconds: None,
            payload: request.payload,
            input_path: request.input_path,
            progress_updated_at: None,
        };

        inner
            .groups
            .entry(record.upload_group_id.clone())
            .or_default()
            .push(id.clone());
        inner.jobs.insert(id, record.clone());

        self.bus.publish(JobEvent::Added {
            job: record.clone(),
        });
        Ok(record)
    }

    /// Apply a progress report from the running attempt.
    ///
    /// Only `active` records accept progress. Values below the current
    /// progress are clamped up to it and values above 100 down to 100, so
    /// progress never decreases within an attempt. Speed (percent/second)
    /// and ETA are recomputed whenever progress advances.
    pub async fn update_progress(
        &self,
        id: &str,
        percent: u8,
        stage: Option<&str>,
        message: Option<&str>,
    ) -> Result<JobRecord, CoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| CoreError::job_not_found(id))?;

        if record.status != JobStatus::Active {
            return Err(CoreError::Conflict(format!(
                "Job {id} is {}, progress requires active",
                record.status
            )));
        }

        let now = Utc::now();
        let next = percent.min(100).max(record.progress);
        if next > record.progress {
            if let Some(previous) = record.progress_updated_at {
                let elapsed = (now - previous).num_milliseconds() as f64 / 1000.0;
                if elapsed > 0.0 {
                    let speed = f64::from(next - record.progress) / elapsed;
                    record.speed = Some(speed);
                    record.eta_seconds = Some(f64::from(100 - next) / speed);
                }
            }
            record.progress = next;
            record.progress_updated_at = Some(now);
        }
        if let Some(stage) = stage {
            record.stage = stage.to_string();
        }
        if let Some(message) = message {
            record.message = message.to_string();
        }

        let snapshot = record.clone();
        self.bus.publish(JobEvent::Progress {
            job_id: snapshot.id.clone(),
            progress: snapshot.progress,
            stage: snapshot.stage.clone(),
            message: snapshot.message.clone(),
            eta_seconds: snapshot.eta_seconds,
            speed: snapshot.speed,
        });
        Ok(snapshot)
    }

    /// Move a record along the lifecycle and publish the matching event.
    ///
    /// `Waiting` is only valid from `created` and `Retry` only from `failed`
    /// with attempts left. Terminal transitions trigger retention pruning.
    pub async fn transition(&self, id: &str, transition: Transition) -> Result<JobRecord, CoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| CoreError::job_not_found(id))?;

        let from = record.status;
        let to = transition.target();
        let edge_matches = match &transition {
            Transition::Waiting => from == JobStatus::Created,
            Transition::Retry { .. } => from == JobStatus::Failed,
            _ => true,
        };
        if !edge_matches {
            return Err(CoreError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }
        state_machine::validate_transition(id, from, to)?;

        let now = Utc::now();
        let event = match transition {
            Transition::Waiting => {
                record.stage = STAGE_WAITING.to_string();
                record.message = "Waiting for a free worker".to_string();
                JobEvent::Waiting {
                    job_id: record.id.clone(),
                    attempt: record.attempt,
                    retry: false,
                    delay_ms: None,
                }
            }
            Transition::Retry { delay } => {
                if !record.has_attempts_left() {
                    return Err(CoreError::Conflict(format!(
                        "Job {id} has no attempts left ({}/{})",
                        record.attempt, record.max_attempts
                    )));
                }
                record.attempt += 1;
                record.progress = 0;
                record.speed = None;
                record.eta_seconds = None;
                record.started_at = None;
                record.progress_updated_at = None;
                let delay_ms = delay.as_millis().min(i64::MAX as u128) as i64;
                record.next_attempt_at = Some(now + chrono::Duration::milliseconds(delay_ms));
                record.stage = STAGE_RETRY_SCHEDULED.to_string();
                record.message = format!(
                    "Retrying in {:.1}s (attempt {}/{})",
                    delay.as_secs_f64(),
                    record.attempt,
                    record.max_attempts
                );
                JobEvent::Waiting {
                    job_id: record.id.clone(),
                    attempt: record.attempt,
                    retry: true,
                    delay_ms: Some(delay_ms as u64),
                }
            }
            Transition::Active => {
                record.started_at = Some(now);
                record.progress_updated_at = Some(now);
                record.next_attempt_at = None;
                record.error = None;
                record.stage = STAGE_PROCESSING.to_string();
                record.message = format!(
                    "Processing (attempt {}/{})",
                    record.attempt, record.max_attempts
                );
                JobEvent::Active {
                    job_id: record.id.clone(),
                    attempt: record.attempt,
                    started_at: now,
                }
            }
            Transition::Completed {
                result_url,
                processing_time_seconds,
            } => {
                record.progress = 100;
                record.ended_at = Some(now);
                record.eta_seconds = None;
                record.result_url = Some(result_url.clone());
                record.processing_time_seconds = Some(processing_time_seconds);
                record.stage = STAGE_COMPLETED.to_string();
                record.message = "Processing completed".to_string();
                JobEvent::Completed {
                    job_id: record.id.clone(),
                    result_url,
                    processing_time_seconds,
                }
            }
            Transition::Failed { error } => {
                let will_retry = record.has_attempts_left();
                if !will_retry {
                    record.ended_at = Some(now);
                }
                record.eta_seconds = None;
                record.error = Some(error.clone());
                record.stage = STAGE_FAILED.to_string();
                record.message = error.clone();
                JobEvent::Failed {
                    job_id: record.id.clone(),
                    error,
                    attempt: record.attempt,
                    will_retry,
                }
            }
        };
        record.status = to;

        let snapshot = record.clone();
        self.bus.publish(event);

        if snapshot.is_terminal() {
            let id = snapshot.id.clone();
            match snapshot.status {
                JobStatus::Completed => inner.completed.push_back(id),
                _ => inner.failed.push_back(id),
            }
            self.prune(&mut inner);
        }
        Ok(snapshot)
    }

    /// Evict the oldest terminal records beyond the retention caps.
    fn prune(&self, inner: &mut StoreInner) {
        let mut evicted = Vec::new();
        while inner.completed.len() > self.retention.keep_completed {
            if let Some(id) = inner.completed.pop_front() {
                evicted.push(id);
            }
        }
        while inner.failed.len() > self.retention.keep_failed {
            if let Some(id) = inner.failed.pop_front() {
                evicted.push(id);
            }
        }
        for id in evicted {
            if inner.detach(&id).is_some() {
                tracing::debug!(job_id = %id, "Pruned terminal job record");
                self.bus.publish(JobEvent::Removed { job_id: id });
            }
        }
    }

    /// Delete a record and publish `job:removed`. Returns the removed record,
    /// or `None` when it did not exist.
    pub async fn remove(&self, id: &str) -> Option<JobRecord> {
        let mut inner = self.inner.write().await;
        let record = inner.detach(id)?;
        self.bus.publish(JobEvent::Removed {
            job_id: record.id.clone(),
        });
        Some(record)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<JobRecord, CoreError> {
        self.inner
            .read()
            .await
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Current status, or `None` if the record is gone.
    pub async fn status(&self, id: &str) -> Option<JobStatus> {
        self.inner.read().await.jobs.get(id).map(|job| job.status)
    }

    /// Jobs of one upload group in creation order.
    pub async fn list_by_upload_group(&self, group_id: &str) -> Vec<JobRecord> {
        let inner = self.inner.read().await;
        inner
            .groups
            .get(group_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.jobs.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn list_active(&self) -> Vec<JobRecord> {
        self.list_with_status(JobStatus::Active).await
    }

    /// Waiting jobs (including those in retry backoff), highest priority
    /// first, ties in creation order.
    pub async fn list_waiting(&self) -> Vec<JobRecord> {
        let mut jobs = self.list_with_status(JobStatus::Waiting).await;
        jobs.sort_by_key(|job| std::cmp::Reverse(job.priority));
        jobs
    }

    async fn list_with_status(&self, status: JobStatus) -> Vec<JobRecord> {
        self.inner
            .read()
            .await
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect()
    }

    /// Counters over all held records. `created` counts as waiting.
    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.read().await;
        let mut stats = QueueStats {
            total: inner.jobs.len(),
            ..QueueStats::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Created | JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}
