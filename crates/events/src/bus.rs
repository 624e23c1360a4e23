//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`JobEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use wmpro_core::job::JobRecord;
use wmpro_core::job_events::{
    MSG_TYPE_JOB_ACTIVE, MSG_TYPE_JOB_ADDED, MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED,
    MSG_TYPE_JOB_PROGRESS, MSG_TYPE_JOB_REMOVED, MSG_TYPE_JOB_WAITING,
};
use wmpro_core::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A job store mutation.
///
/// Serializes to the real-time wire format: a JSON object with a `type`
/// discriminator (`job:added`, `job:progress`, ...) and camelCase fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    /// A record was created. Carries the full record.
    #[serde(rename = "job:added")]
    Added { job: JobRecord },

    #[serde(rename = "job:progress", rename_all = "camelCase")]
    Progress {
        job_id: JobId,
        progress: u8,
        stage: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eta_seconds: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
    },

    /// The job is waiting for a slot. `retry` is set when this follows a
    /// failed attempt, in which case `delay_ms` is the backoff.
    #[serde(rename = "job:waiting", rename_all = "camelCase")]
    Waiting {
        job_id: JobId,
        attempt: u32,
        retry: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
    },

    #[serde(rename = "job:active", rename_all = "camelCase")]
    Active {
        job_id: JobId,
        attempt: u32,
        started_at: Timestamp,
    },

    #[serde(rename = "job:completed", rename_all = "camelCase")]
    Completed {
        job_id: JobId,
        result_url: String,
        processing_time_seconds: f64,
    },

    /// An attempt failed. `will_retry` is false once attempts are exhausted.
    #[serde(rename = "job:failed", rename_all = "camelCase")]
    Failed {
        job_id: JobId,
        error: String,
        attempt: u32,
        will_retry: bool,
    },

    #[serde(rename = "job:removed", rename_all = "camelCase")]
    Removed { job_id: JobId },
}

impl JobEvent {
    /// Id of the job this event concerns.
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Added { job } => &job.id,
            JobEvent::Progress { job_id, .. }
            | JobEvent::Waiting { job_id, .. }
            | JobEvent::Active { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Removed { job_id } => job_id,
        }
    }

    /// The wire `type` discriminator.
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Added { .. } => MSG_TYPE_JOB_ADDED,
            JobEvent::Progress { .. } => MSG_TYPE_JOB_PROGRESS,
            JobEvent::Waiting { .. } => MSG_TYPE_JOB_WAITING,
            JobEvent::Active { .. } => MSG_TYPE_JOB_ACTIVE,
            JobEvent::Completed { .. } => MSG_TYPE_JOB_COMPLETED,
            JobEvent::Failed { .. } => MSG_TYPE_JOB_FAILED,
            JobEvent::Removed { .. } => MSG_TYPE_JOB_REMOVED,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`], in publish order.
///
/// # Usage
///
/// ```rust
/// use wmpro_events::bus::{EventBus, JobEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(JobEvent::Removed { job_id: "job-1".into() });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Never blocks. If there are no active subscribers the event is dropped.
    pub fn publish(&self, event: JobEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
