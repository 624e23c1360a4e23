//! Message type constants for the real-time job protocol.
//!
//! Server-to-client job events use a `job:` prefix; snapshot replies and
//! client requests use snake_case names. Both the event bus serializer and
//! the WebSocket protocol reference these so the strings live in one place.

/// A job record was created.
pub const MSG_TYPE_JOB_ADDED: &str = "job:added";

/// Progress update during an attempt (percentage, stage, ETA).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job:progress";

/// Job entered the waiting state (first time or after a failed attempt).
pub const MSG_TYPE_JOB_WAITING: &str = "job:waiting";

/// Job occupied a worker slot and started an attempt.
pub const MSG_TYPE_JOB_ACTIVE: &str = "job:active";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job:completed";

/// An attempt failed. Carries whether another attempt will follow.
pub const MSG_TYPE_JOB_FAILED: &str = "job:failed";

/// Job record was deleted (explicit removal or retention pruning).
pub const MSG_TYPE_JOB_REMOVED: &str = "job:removed";

/// Snapshot reply: aggregate queue counters.
pub const MSG_TYPE_QUEUE_STATS: &str = "queue_stats";

/// Snapshot reply: currently active jobs.
pub const MSG_TYPE_ACTIVE_JOBS: &str = "active_jobs";

/// Snapshot reply: jobs of one upload group.
pub const MSG_TYPE_UPLOAD_JOBS: &str = "upload_jobs";

/// Heartbeat reply to a client `ping`.
pub const MSG_TYPE_PONG: &str = "pong";

/// Acknowledges a `subscribe_job` or `subscribe_all` request.
pub const MSG_TYPE_SUBSCRIBED: &str = "subscribed";

/// Reply to a client message that could not be understood.
pub const MSG_TYPE_ERROR: &str = "error";
