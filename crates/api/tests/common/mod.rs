#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use wmpro_core::watermark::JobPayload;
use wmpro_events::EventBus;
use wmpro_queue::config::RetryConfig;
use wmpro_queue::{
    JobQueue, ProcessOutput, Processor, ProcessorError, ProcessorRegistry, ProgressReporter,
    QueueConfig,
};

use wmpro_api::config::ServerConfig;
use wmpro_api::router::build_app_router;
use wmpro_api::state::AppState;

/// Upper bound for waiting on anything asynchronous in tests.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state over a temp directory, with every processor call held
/// at a gate until the test releases it.
pub struct TestApp {
    pub state: AppState,
    pub bus: Arc<EventBus>,
    pub gate: Arc<GatedProcessor>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: dir.path().join("uploads"),
            output_dir: dir.path().join("output"),
            ..ServerConfig::default()
        };
        std::fs::create_dir_all(&config.upload_dir).unwrap();

        let queue_config = QueueConfig {
            retry: RetryConfig {
                max_attempts: 3,
                backoff_base: Duration::from_millis(10),
                backoff_max: Duration::from_millis(100),
                jitter: false,
            },
            work_dir: dir.path().join("work"),
            ..QueueConfig::default()
        };

        let gate = GatedProcessor::new(config.output_dir.clone());
        let bus = Arc::new(EventBus::default());
        let queue = JobQueue::new(
            queue_config,
            ProcessorRegistry::with_all(gate.clone()),
            Arc::clone(&bus),
        )
        .expect("valid test config");

        Self {
            state: AppState::new(config, Arc::new(queue)),
            bus,
            gate,
            dir,
        }
    }

    pub fn router(&self) -> Router {
        build_app_router(self.state.clone())
    }

    /// Store an upload the way the outer upload layer would.
    pub fn write_upload(&self, name: &str, bytes: &[u8]) {
        std::fs::write(self.state.config.upload_dir.join(name), bytes).unwrap();
    }

    pub fn upload_exists(&self, name: &str) -> bool {
        self.state.config.upload_dir.join(name).exists()
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert the status and return the parsed body.
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Processors
// ---------------------------------------------------------------------------

/// Reports 10%, holds until the test hands out permits, then copies the
/// input to the output directory.
pub struct GatedProcessor {
    gate: Semaphore,
    output_dir: std::path::PathBuf,
}

impl GatedProcessor {
    pub fn new(output_dir: std::path::PathBuf) -> Arc<Self> {
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

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let name = input.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let output_path = self.output_dir.join(name);
        tokio::fs::copy(input, &output_path).await?;
        Ok(ProcessOutput {
            output_path,
            processing_time_seconds: 0.01,
        })
    }
}
