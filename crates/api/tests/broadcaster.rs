//! Progress broadcaster: fan-out, interest, snapshot replies and reconnects.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::ws::Message;
use common::{TestApp, WAIT_TIMEOUT};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wmpro_core::job::{EnqueueRequest, JobStatus};
use wmpro_core::watermark::{JobPayload, TextWatermark};
use wmpro_api::ws::{ClientMessage, ServerMessage};

fn pdf_request(app: &TestApp, id: &str) -> EnqueueRequest {
    let name = format!("{id}.pdf");
    app.write_upload(&name, b"%PDF-1.7");
    EnqueueRequest::new(
        "upload-9",
        name.clone(),
        app.state.config.upload_dir.join(&name),
        JobPayload::Pdf {
            watermark: TextWatermark::new("Draft"),
        },
    )
    .with_id(id)
}

/// Start the fan-out loop the way the binary does.
fn spawn_broadcaster(app: &TestApp) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        Arc::clone(&app.state.broadcaster).run(app.bus.subscribe(), cancel.clone()),
    );
    (cancel, handle)
}

/// Read frames until a job event of `event_type` for `job_id` arrives.
async fn wait_for(rx: &mut mpsc::Receiver<Message>, job_id: &str, event_type: &str) -> Value {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let Some(Message::Text(text)) = rx.recv().await else {
                continue;
            };
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["jobId"] == job_id && value["type"] == event_type {
                return value;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

// ---------------------------------------------------------------------------
// Test: Events reach connected clients in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn job_events_reach_connected_clients() {
    let app = TestApp::new();
    let (cancel, _handle) = spawn_broadcaster(&app);
    let mut rx = app.state.ws_manager.add("viewer".to_string()).await;

    app.state.queue.enqueue(pdf_request(&app, "p1")).await.unwrap();

    let active = wait_for(&mut rx, "p1", "job:active").await;
    assert_eq!(active["attempt"], 1);
    let progress = wait_for(&mut rx, "p1", "job:progress").await;
    assert_eq!(progress["progress"], 10);

    app.gate.release(1);
    let completed = wait_for(&mut rx, "p1", "job:completed").await;
    assert_eq!(completed["resultUrl"], "/output/p1.pdf");

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Test: A narrowed connection only sees its jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribed_connection_filters_other_jobs() {
    let app = TestApp::new();
    let _rx_all = app.state.ws_manager.add("all".to_string()).await;
    let mut rx = app.state.ws_manager.add("narrow".to_string()).await;

    let reply = app
        .state
        .broadcaster
        .handle_request(
            "narrow",
            ClientMessage::SubscribeJob {
                job_id: "p2".to_string(),
            },
        )
        .await;
    assert_eq!(
        reply,
        ServerMessage::Subscribed {
            job_id: Some("p2".to_string())
        }
    );

    let (cancel, _handle) = spawn_broadcaster(&app);
    app.state.queue.enqueue(pdf_request(&app, "p1")).await.unwrap();
    app.state.queue.enqueue(pdf_request(&app, "p2")).await.unwrap();

    let active = wait_for(&mut rx, "p2", "job:active").await;
    assert_eq!(active["jobId"], "p2");
    app.gate.release(2);
    wait_for(&mut rx, "p2", "job:completed").await;

    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_ne!(value["jobId"], "p1");
        }
    }

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Test: Reconnecting does not replay missed events, snapshots resync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnect_gets_no_replay_but_snapshot_is_current() {
    let app = TestApp::new();
    let (cancel, _handle) = spawn_broadcaster(&app);

    // Stays connected for the whole test so we know when fan-out caught up.
    let mut probe = app.state.ws_manager.add("probe".to_string()).await;
    let mut first = app.state.ws_manager.add("first".to_string()).await;

    app.state.queue.enqueue(pdf_request(&app, "p1")).await.unwrap();
    app.state.queue.enqueue(pdf_request(&app, "p2")).await.unwrap();
    wait_for(&mut first, "p1", "job:active").await;
    wait_for(&mut first, "p2", "job:active").await;

    // Disconnect, then let one job finish during the gap.
    app.state.ws_manager.remove("first").await;
    let mut watcher = app.bus.subscribe();
    app.gate.release(1);
    let finished = tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            let event = watcher.recv().await.unwrap();
            if event.event_type() == "job:completed" {
                return event.job_id().to_string();
            }
        }
    })
    .await
    .unwrap();
    wait_for(&mut probe, &finished, "job:completed").await;

    let mut second = app.state.ws_manager.add("second".to_string()).await;
    assert!(second.try_recv().is_err(), "missed events must not be replayed");

    let reply = app
        .state
        .broadcaster
        .handle_request("second", ClientMessage::GetActiveJobs)
        .await;
    let jobs = assert_matches!(reply, ServerMessage::ActiveJobs { jobs } => jobs);
    assert_eq!(jobs.len(), 1);
    assert_ne!(jobs[0].id, finished);
    assert_eq!(jobs[0].status, JobStatus::Active);

    let reply = app
        .state
        .broadcaster
        .handle_request("second", ClientMessage::GetQueueStats)
        .await;
    let stats = assert_matches!(reply, ServerMessage::QueueStats(stats) => stats);
    assert_eq!((stats.active, stats.completed, stats.total), (1, 1, 2));

    // Live events flow again after reconnecting.
    let remaining = jobs[0].id.clone();
    app.gate.release(1);
    wait_for(&mut second, &remaining, "job:completed").await;

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Test: Snapshot and control requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn answers_upload_and_ping_requests() {
    let app = TestApp::new();
    let _rx = app.state.ws_manager.add("c".to_string()).await;
    app.state.queue.enqueue(pdf_request(&app, "p1")).await.unwrap();

    let reply = app
        .state
        .broadcaster
        .handle_request(
            "c",
            ClientMessage::GetJobsByUpload {
                upload_group_id: "upload-9".to_string(),
            },
        )
        .await;
    assert_matches!(
        reply,
        ServerMessage::UploadJobs { upload_group_id, jobs }
            if upload_group_id == "upload-9" && jobs.len() == 1
    );

    let reply = app.state.broadcaster.handle_text("c", r#"{"type":"ping"}"#).await;
    assert_eq!(reply, ServerMessage::Pong);
}

#[tokio::test]
async fn malformed_frames_get_an_error_reply() {
    let app = TestApp::new();
    let mut rx = app.state.ws_manager.add("c".to_string()).await;

    let reply = app.state.broadcaster.handle_text("c", "not json").await;
    assert_matches!(reply, ServerMessage::Error { .. });

    assert!(app.state.broadcaster.reply("c", &reply).await);
    let Some(Message::Text(text)) = rx.recv().await else {
        panic!("expected a text frame");
    };
    let value: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(value["type"], "error");
}

// ---------------------------------------------------------------------------
// Test: The fan-out loop stops on cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_loop_stops_when_cancelled() {
    let app = TestApp::new();
    let (cancel, handle) = spawn_broadcaster(&app);

    cancel.cancel();
    tokio::time::timeout(WAIT_TIMEOUT, handle)
        .await
        .expect("broadcaster did not stop")
        .unwrap();
}
