//! Runs one attempt of one job.
//!
//! The executor stages a private copy of the input, calls the registered
//! [`Processor`], applies its progress reports to the store in order, and
//! records the outcome. Nothing that goes wrong inside an attempt escapes as
//! an error or a panic; it ends as a `failed` transition instead.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tempfile::TempDir;
use wmpro_core::error::CoreError;
use wmpro_core::job::{JobRecord, JobStatus};
use wmpro_core::watermark::JobPayload;

use crate::config::QueueConfig;
use crate::processor::{
    ProcessOutput, Processor, ProcessorError, ProcessorRegistry, ProgressReporter, ProgressUpdate,
};
use crate::store::{JobStore, Transition};

/// How an attempt ended, as recorded in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Completed(JobRecord),
    Failed(JobRecord),
    /// The record disappeared mid-attempt (removed), so nothing was recorded.
    Abandoned,
}

/// Per-attempt copy of the uploaded input. Deleted on drop.
struct StagedInput {
    _dir: TempDir,
    path: PathBuf,
}

pub struct WorkerExecutor {
    store: Arc<JobStore>,
    processors: ProcessorRegistry,
    work_dir: PathBuf,
    output_url_prefix: String,
    timeout: Option<Duration>,
}

impl WorkerExecutor {
    pub fn new(store: Arc<JobStore>, processors: ProcessorRegistry, config: &QueueConfig) -> Self {
        Self {
            store,
            processors,
            work_dir: config.work_dir.clone(),
            output_url_prefix: config.output_url_prefix.clone(),
            timeout: config.processing_timeout,
        }
    }

    /// Run the current attempt of `job` (already `active`) and record the
    /// result.
    pub async fn execute(&self, job: &JobRecord) -> AttemptOutcome {
        let transition = match self.run(job).await {
            Ok(output) => Transition::Completed {
                result_url: self.result_url(&output.output_path),
                processing_time_seconds: output.processing_time_seconds,
            },
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempt,
                    error = %e,
                    "Processing attempt failed",
                );
                Transition::Failed {
                    error: e.to_string(),
                }
            }
        };

        match self.store.transition(&job.id, transition).await {
            Ok(record) if record.status == JobStatus::Completed => AttemptOutcome::Completed(record),
            Ok(record) => AttemptOutcome::Failed(record),
            Err(CoreError::NotFound { .. }) => {
                tracing::debug!(job_id = %job.id, "Job removed during processing");
                AttemptOutcome::Abandoned
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to record attempt outcome");
                AttemptOutcome::Abandoned
            }
        }
    }

    async fn run(&self, job: &JobRecord) -> Result<ProcessOutput, ProcessorError> {
        let processor = self.processors.get(job.job_type).ok_or_else(|| {
            ProcessorError::Processing(format!("No processor registered for {} jobs", job.job_type))
        })?;
        let staged = self.stage_input(&job.input_path).await?;
        let (reporter, mut updates) = ProgressReporter::channel();

        let result = {
            let work = invoke(
                processor.as_ref(),
                &staged.path,
                &job.payload,
                reporter,
                self.timeout,
            );
            tokio::pin!(work);

            loop {
                tokio::select! {
                    biased;
                    Some(update) = updates.recv() => self.apply_progress(&job.id, update).await,
                    result = &mut work => break result,
                }
            }
        };

        while let Ok(update) = updates.try_recv() {
            self.apply_progress(&job.id, update).await;
        }
        drop(staged);
        result
    }

    /// Hard-link (or copy) the upload into a fresh temp dir under `work_dir`.
    async fn stage_input(&self, source: &Path) -> Result<StagedInput, ProcessorError> {
        let file_name = source.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Input path {} has no file name", source.display()),
            )
        })?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let dir = tempfile::Builder::new()
            .prefix("wmpro-")
            .tempdir_in(&self.work_dir)?;
        let path = dir.path().join(file_name);

        if tokio::fs::hard_link(source, &path).await.is_err() {
            tokio::fs::copy(source, &path).await?;
        }
        Ok(StagedInput { _dir: dir, path })
    }

    async fn apply_progress(&self, id: &str, update: ProgressUpdate) {
        if let Err(e) = self
            .store
            .update_progress(
                id,
                update.percent,
                update.stage.as_deref(),
                update.message.as_deref(),
            )
            .await
        {
            tracing::debug!(job_id = %id, error = %e, "Progress update dropped");
        }
    }

    fn result_url(&self, output_path: &Path) -> String {
        let name = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.output_url_prefix, name)
    }
}

/// Call the processor, converting a panic or an expired timeout into an error.
async fn invoke(
    processor: &dyn Processor,
    input: &Path,
    payload: &JobPayload,
    reporter: ProgressReporter,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, ProcessorError> {
    let call = AssertUnwindSafe(processor.process(input, payload, reporter)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(ProcessorError::TimedOut(limit)),
        },
        None => call.await,
    };
    outcome.unwrap_or_else(|panic| Err(ProcessorError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Delete an uploaded artifact. A missing file is not an error.
pub(crate) async fn discard_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Upload deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct Panicking;

    #[async_trait]
    impl Processor for Panicking {
        async fn process(
            &self,
            _input: &Path,
            _payload: &JobPayload,
            _progress: ProgressReporter,
        ) -> Result<ProcessOutput, ProcessorError> {
            panic!("decoder exploded");
        }
    }

    struct Stalling;

    #[async_trait]
    impl Processor for Stalling {
        async fn process(
            &self,
            _input: &Path,
            _payload: &JobPayload,
            _progress: ProgressReporter,
        ) -> Result<ProcessOutput, ProcessorError> {
            std::future::pending().await
        }
    }

    fn payload() -> JobPayload {
        JobPayload::Pdf {
            watermark: wmpro_core::watermark::TextWatermark::new("x"),
        }
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let result = invoke(
            &Panicking,
            Path::new("in.pdf"),
            &payload(),
            ProgressReporter::noop(),
            None,
        )
        .await;
        assert!(matches!(result, Err(ProcessorError::Panicked(msg)) if msg == "decoder exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_error() {
        let limit = Duration::from_secs(30);
        let result = invoke(
            &Stalling,
            Path::new("in.pdf"),
            &payload(),
            ProgressReporter::noop(),
            Some(limit),
        )
        .await;
        assert!(matches!(result, Err(ProcessorError::TimedOut(d)) if d == limit));
    }

    #[test]
    fn panic_message_handles_both_payload_kinds() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn discard_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.mp4");
        std::fs::write(&path, b"data").unwrap();

        discard_upload(&path).await;
        assert!(!path.exists());
        discard_upload(&path).await;
    }
}
