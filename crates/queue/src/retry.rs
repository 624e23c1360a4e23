//! Retry decisions and exponential backoff.

use std::time::Duration;

use wmpro_core::job::JobRecord;

use crate::config::RetryConfig;

/// Outcome of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enter the waiting queue after `delay`.
    Retry { delay: Duration },
    /// Attempts exhausted; the failure is terminal.
    GiveUp,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Backoff after attempt number `attempt` failed.
    ///
    /// `base * 2^(attempt-1)`, capped at the configured maximum, plus up to
    /// 25% jitter when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.config.backoff_base.as_millis() as f64;
        let max_ms = self.config.backoff_max.as_millis() as f64;
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let delay_ms = (base_ms * 2f64.powi(exponent)).min(max_ms) as u64;

        let final_delay = if self.config.jitter {
            // Add up to 25% jitter
            let jitter = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay_ms + jitter
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Decide what follows the failure recorded in `job`.
    ///
    /// `job` is the record after its `failed` transition, so `attempt` is the
    /// attempt that just failed.
    pub fn decide(&self, job: &JobRecord) -> RetryDecision {
        if job.has_attempts_left() {
            RetryDecision::Retry {
                delay: self.delay_for_attempt(job.attempt),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}
