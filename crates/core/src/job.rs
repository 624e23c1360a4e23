//! The job record and the submission request that creates it.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::scheduling::PRIORITY_NORMAL;
use crate::types::{JobId, Timestamp, UploadGroupId};
use crate::watermark::JobPayload;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of caller-supplied identifiers (job id, upload group id).
const MAX_ID_LEN: usize = 128;

/// Maximum length of an original filename.
const MAX_FILENAME_LEN: usize = 255;

/// Upper bound for a per-job attempt override.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

pub const STAGE_QUEUED: &str = "queued";
pub const STAGE_WAITING: &str = "waiting";
pub const STAGE_RETRY_SCHEDULED: &str = "retry_scheduled";
pub const STAGE_PROCESSING: &str = "processing";
pub const STAGE_COMPLETED: &str = "completed";
pub const STAGE_FAILED: &str = "failed";

// ---------------------------------------------------------------------------
// Job type
// ---------------------------------------------------------------------------

/// The class of media a job processes. Each class has its own concurrency cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Video,
    Image,
    Pdf,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Video, JobType::Image, JobType::Pdf];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Video => "video",
            JobType::Image => "image",
            JobType::Pdf => "pdf",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(JobType::Video),
            "image" => Ok(JobType::Image),
            "pdf" => Ok(JobType::Pdf),
            other => Err(CoreError::Validation(format!("Unknown job type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job record.
///
/// `Failed` is terminal only once the record has no attempts left; see
/// [`JobRecord::is_terminal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Authoritative state of one job. Owned and mutated by the job store;
/// everything else works on clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub upload_group_id: UploadGroupId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    /// Percentage `0..=100`, non-decreasing within one attempt.
    pub progress: u8,
    pub stage: String,
    pub message: String,
    /// Current attempt, starting at 1.
    pub attempt: u32,
    pub max_attempts: u32,
    pub priority: i32,
    pub filename: String,
    pub file_size_bytes: u64,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    /// When a scheduled retry becomes eligible to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,
    /// Advisory processing speed in percent per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Advisory remaining time, derived from `speed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    pub payload: JobPayload,
    /// Server-side location of the uploaded artifact. Never sent to clients.
    #[serde(skip)]
    pub input_path: PathBuf,
    /// Time of the last progress advance, used for the speed estimate.
    #[serde(skip)]
    pub progress_updated_at: Option<Timestamp>,
}

impl JobRecord {
    /// Whether a failure of the current attempt may be followed by another.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// `completed`, or `failed` with no attempts left.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            JobStatus::Completed => true,
            JobStatus::Failed => !self.has_attempts_left(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Everything needed to create a job record.
///
/// Built by the submission entrypoint after the upload is on disk. Optional
/// fields fall back to queue defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<JobId>,
    pub upload_group_id: UploadGroupId,
    pub filename: String,
    #[serde(default)]
    pub file_size_bytes: u64,
    pub input_path: PathBuf,
    pub payload: JobPayload,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl EnqueueRequest {
    pub fn new(
        upload_group_id: impl Into<UploadGroupId>,
        filename: impl Into<String>,
        input_path: impl Into<PathBuf>,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: None,
            upload_group_id: upload_group_id.into(),
            filename: filename.into(),
            file_size_bytes: 0,
            input_path: input_path.into(),
            payload,
            priority: None,
            max_attempts: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size_bytes = bytes;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// Effective priority (`PRIORITY_NORMAL` when unset).
    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(PRIORITY_NORMAL)
    }

    /// Reject malformed submissions before any record exists.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(id) = &self.id {
            validate_identifier("Job id", id)?;
        }
        validate_identifier("Upload group id", &self.upload_group_id)?;

        let filename = self.filename.trim();
        if filename.is_empty() {
            return Err(CoreError::Validation(
                "Filename must not be empty".to_string(),
            ));
        }
        if filename.len() > MAX_FILENAME_LEN {
            return Err(CoreError::Validation(format!(
                "Filename must not exceed {MAX_FILENAME_LEN} characters"
            )));
        }
        if self.input_path.as_os_str().is_empty() {
            return Err(CoreError::Validation(
                "Input path must not be empty".to_string(),
            ));
        }
        if let Some(attempts) = self.max_attempts {
            if attempts == 0 || attempts > MAX_ATTEMPTS_LIMIT {
                return Err(CoreError::Validation(format!(
                    "maxAttempts must be between 1 and {MAX_ATTEMPTS_LIMIT}"
                )));
            }
        }
        self.payload.validate()
    }
}

fn validate_identifier(name: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{name} must not be empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(CoreError::Validation(format!(
            "{name} must not exceed {MAX_ID_LEN} characters"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(CoreError::Validation(format!(
            "{name} must not contain control characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Aggregate counters over all records currently held by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}
