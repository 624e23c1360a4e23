//! Job priority constants and the lifecycle state machine.
//!
//! Lives in `core` so the store, the dispatcher, and API handlers all agree
//! on what a legal transition is.

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority value for urgent jobs. Dispatched before all others.
pub const PRIORITY_URGENT: i32 = 10;

/// Priority value for jobs a user is actively waiting on.
pub const PRIORITY_HIGH: i32 = 5;

/// Priority value for normal jobs. Default.
pub const PRIORITY_NORMAL: i32 = 0;

/// Priority value for background jobs. Dispatched last.
pub const PRIORITY_LOW: i32 = -10;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Allowed status edges:
///
/// ```text
/// created -> waiting -> active -> completed
///                         |
///                         v
///                       failed -> waiting   (retry, while attempts remain)
/// ```
///
/// Removal is not a status: a record may be deleted from any state.
pub mod state_machine {
    use crate::error::CoreError;
    use crate::job::JobStatus;

    /// Returns the set of statuses reachable from `from` in one step.
    ///
    /// `Completed` returns an empty slice. `Failed -> Waiting` is listed but
    /// additionally requires remaining attempts, which only the record knows.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            JobStatus::Created => &[JobStatus::Waiting],
            JobStatus::Waiting => &[JobStatus::Active],
            JobStatus::Active => &[JobStatus::Completed, JobStatus::Failed],
            JobStatus::Failed => &[JobStatus::Waiting],
            JobStatus::Completed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition for job `id`.
    pub fn validate_transition(id: &str, from: JobStatus, to: JobStatus) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::state_machine::*;
    use crate::error::CoreError;
    use crate::job::JobStatus::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn created_to_waiting() {
        assert!(can_transition(Created, Waiting));
    }

    #[test]
    fn waiting_to_active() {
        assert!(can_transition(Waiting, Active));
    }

    #[test]
    fn active_to_either_outcome() {
        assert!(can_transition(Active, Completed));
        assert!(can_transition(Active, Failed));
    }

    #[test]
    fn failed_loops_back_to_waiting() {
        assert!(can_transition(Failed, Waiting));
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn completed_is_terminal() {
        assert!(valid_transitions(Completed).is_empty());
    }

    #[test]
    fn no_skipping_the_queue() {
        assert!(!can_transition(Created, Active));
        assert!(!can_transition(Waiting, Completed));
        assert!(!can_transition(Waiting, Failed));
    }

    #[test]
    fn no_moving_backwards() {
        assert!(!can_transition(Active, Waiting));
        assert!(!can_transition(Waiting, Created));
        assert!(!can_transition(Failed, Active));
    }

    #[test]
    fn validate_reports_both_ends() {
        let err = validate_transition("job-1", Completed, Active).unwrap_err();
        assert_matches!(
            err,
            CoreError::InvalidTransition { ref id, from: Completed, to: Active } if id == "job-1"
        );
        assert_eq!(
            err.to_string(),
            "Invalid transition for job job-1: completed -> active"
        );
    }
}
