//! The processing collaborator seam.
//!
//! A [`Processor`] turns one input file plus a [`JobPayload`] into an output
//! file. Progress flows back through a [`ProgressReporter`], an mpsc sender
//! the executor drains into the job store, so implementations never touch
//! shared queue state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use wmpro_core::job::JobType;
use wmpro_core::watermark::JobPayload;

/// Failure of one processing attempt. Every variant is retryable.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The collaborator reported a failure.
    #[error("Processing failed: {0}")]
    Processing(String),

    /// Input missing or unreadable, or an output/temp write failed.
    #[error("Resource error: {0}")]
    Resource(#[from] std::io::Error),

    #[error("Processor panicked: {0}")]
    Panicked(String),

    #[error("Processing timed out after {0:?}")]
    TimedOut(Duration),
}

/// Successful result of a processing call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub output_path: PathBuf,
    pub processing_time_seconds: f64,
}

/// One progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub stage: Option<String>,
    pub message: Option<String>,
}

/// Cloneable handle for reporting progress from inside a [`Processor`].
///
/// Sends never block. Reports made after the attempt finished are dropped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl ProgressReporter {
    /// A reporter plus the receiving end the executor drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that discards everything.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, percent: u8) {
        self.send(ProgressUpdate {
            percent,
            stage: None,
            message: None,
        });
    }

    pub fn report_stage(&self, percent: u8, stage: impl Into<String>, message: impl Into<String>) {
        self.send(ProgressUpdate {
            percent,
            stage: Some(stage.into()),
            message: Some(message.into()),
        });
    }

    fn send(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means the attempt already ended.
            let _ = tx.send(update);
        }
    }
}

/// External processing collaborator for one job type.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        input: &Path,
        payload: &JobPayload,
        progress: ProgressReporter,
    ) -> Result<ProcessOutput, ProcessorError>;
}

/// Processor lookup by job type.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<JobType, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, job_type: JobType, processor: Arc<dyn Processor>) -> Self {
        self.processors.insert(job_type, processor);
        self
    }

    /// Register the same processor for every job type.
    pub fn with_all(processor: Arc<dyn Processor>) -> Self {
        JobType::ALL
            .into_iter()
            .fold(Self::new(), |registry, job_type| {
                registry.register(job_type, processor.clone())
            })
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn Processor>> {
        self.processors.get(&job_type).cloned()
    }
}
