#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{broadcast, Semaphore};
use wmpro_core::job::EnqueueRequest;
use wmpro_core::watermark::{JobPayload, TextWatermark, WatermarkSpec};
use wmpro_events::{EventBus, JobEvent};
use wmpro_queue::config::{ConcurrencyLimits, QueueConfig, RetryConfig};
use wmpro_queue::{JobQueue, ProcessOutput, Processor, ProcessorError, ProcessorRegistry, ProgressReporter};

/// Upper bound for waiting on an event in tests.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A queue wired to a temp directory, plus a subscription opened before any
/// job exists.
pub struct Harness {
    pub queue: JobQueue,
    pub events: broadcast::Receiver<JobEvent>,
    pub dir: TempDir,
}

impl Harness {
    /// `dir` is usually created by the test first so processors can write
    /// into `<dir>/output`.
    pub fn new(
        dir: TempDir,
        config: impl FnOnce(&mut QueueConfig),
        processor: Arc<dyn Processor>,
    ) -> Self {
        let mut queue_config = QueueConfig {
            concurrency: ConcurrencyLimits {
                video: 2,
                image: 3,
                pdf: 3,
            },
            retry: RetryConfig {
                max_attempts: 3,
                backoff_base: Duration::from_millis(10),
                backoff_max: Duration::from_millis(100),
                jitter: false,
            },
            work_dir: dir.path().join("work"),
            ..QueueConfig::default()
        };
        config(&mut queue_config);

        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();
        let queue = JobQueue::new(queue_config, ProcessorRegistry::with_all(processor), bus)
            .expect("valid test config");
        Self { queue, events, dir }
    }

    /// Write an upload file and build a request for it.
    pub fn upload(&self, id: &str, payload: JobPayload) -> EnqueueRequest {
        let uploads = self.dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        let path = uploads.join(format!("{id}.bin"));
        std::fs::write(&path, id.as_bytes()).unwrap();
        EnqueueRequest::new("upload-1", format!("{id}.bin"), path, payload)
            .with_id(id)
            .with_file_size(id.len() as u64)
    }

    pub fn upload_path(&self, id: &str) -> PathBuf {
        self.dir.path().join("uploads").join(format!("{id}.bin"))
    }

    /// Receive events until one matches `done`, returning everything seen
    /// for `job_id` along the way (including the match).
    pub async fn events_until(
        &mut self,
        job_id: &str,
        done: impl Fn(&JobEvent) -> bool,
    ) -> Vec<JobEvent> {
        let mut seen = Vec::new();
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let event = self.events.recv().await.expect("bus open");
                if event.job_id() != job_id {
                    continue;
                }
                let finished = done(&event);
                seen.push(event);
                if finished {
                    break;
                }
            }
        })
        .await
        .expect("event did not arrive in time");
        seen
    }

    pub async fn wait_completed(&mut self, job_id: &str) -> Vec<JobEvent> {
        self.events_until(job_id, |e| matches!(e, JobEvent::Completed { .. }))
            .await
    }

    pub async fn wait_terminal_failure(&mut self, job_id: &str) -> Vec<JobEvent> {
        self.events_until(job_id, |e| {
            matches!(e, JobEvent::Failed { will_retry: false, .. })
        })
        .await
    }
}

pub fn video_payload() -> JobPayload {
    JobPayload::Video {
        watermark: WatermarkSpec::Text(TextWatermark::new("© WatermarkPro")),
    }
}

pub fn image_payload() -> JobPayload {
    JobPayload::Image {
        watermark: WatermarkSpec::Text(TextWatermark::new("sample")),
    }
}

pub fn pdf_payload() -> JobPayload {
    JobPayload::Pdf {
        watermark: TextWatermark::new("Confidential"),
    }
}

pub fn output_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("output")
}

/// Wire `type` names, without progress noise.
pub fn lifecycle_types(events: &[JobEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter(|e| !matches!(e, JobEvent::Progress { .. }))
        .map(JobEvent::event_type)
        .collect()
}

async fn write_output(output_dir: &Path, input: &Path) -> Result<ProcessOutput, ProcessorError> {
    tokio::fs::create_dir_all(output_dir).await?;
    let name = input.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    let output_path = output_dir.join(name);
    tokio::fs::copy(input, &output_path).await?;
    Ok(ProcessOutput {
        output_path,
        processing_time_seconds: 0.01,
    })
}

// ---------------------------------------------------------------------------
// Processors
// ---------------------------------------------------------------------------

/// Holds every call until the test hands out permits.
pub struct GatedProcessor {
    gate: Semaphore,
    output_dir: PathBuf,
}

impl GatedProcessor {
    pub fn new(output_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            output_dir,
        })
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }
}

#[async_trait]
impl Processor for GatedProcessor {
    async fn process(
        &self,
        input: &Path,
        _payload: &JobPayload,
        progress: ProgressReporter,
    ) -> Result<ProcessOutput, ProcessorError> {
        progress.report(10);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ProcessorError::Processing(e.to_string()))?;
        permit.forget();
        progress.report(90);
        write_output(&self.output_dir, input).await
    }
}

/// Fails the first `failures` calls, then succeeds.
pub struct FlakyProcessor {
    failures: u32,
    calls: AtomicU32,
    output_dir: PathBuf,
}

impl FlakyProcessor {
    pub fn new(failures: u32, output_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
            output_dir,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for FlakyProcessor {
    async fn process(
        &self,
        input: &Path,
        _payload: &JobPayload,
        progress: ProgressReporter,
    ) -> Result<ProcessOutput, ProcessorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        progress.report(30);
        if call <= self.failures {
            return Err(ProcessorError::Processing(format!("encoder crashed on call {call}")));
        }
        progress.report(100);
        write_output(&self.output_dir, input).await
    }
}

/// Panics on every call.
pub struct PanickingProcessor;

#[async_trait]
impl Processor for PanickingProcessor {
    async fn process(
        &self,
        _input: &Path,
        _payload: &JobPayload,
        _progress: ProgressReporter,
    ) -> Result<ProcessOutput, ProcessorError> {
        panic!("codec library aborted");
    }
}

/// Records the highest number of overlapping calls.
pub struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    output_dir: PathBuf,
}

impl ConcurrencyProbe {
    pub fn new(output_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            output_dir,
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for ConcurrencyProbe {
    async fn process(
        &self,
        input: &Path,
        _payload: &JobPayload,
        progress: ProgressReporter,
    ) -> Result<ProcessOutput, ProcessorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        for pct in [25, 50, 75] {
            progress.report(pct);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        write_output(&self.output_dir, input).await
    }
}
