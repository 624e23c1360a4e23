//! Progress broadcaster.
//!
//! [`ProgressBroadcaster`] subscribes to the job event bus and pushes every
//! event to the WebSocket connections interested in that job. It also
//! answers client snapshot requests. Delivery never waits on a connection:
//! see [`WsManager`] for the drop-if-full rule.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use wmpro_events::JobEvent;
use wmpro_queue::JobQueue;

use crate::ws::{ClientMessage, ServerMessage, WsManager};

pub struct ProgressBroadcaster {
    ws_manager: Arc<WsManager>,
    queue: Arc<JobQueue>,
}

impl ProgressBroadcaster {
    pub fn new(ws_manager: Arc<WsManager>, queue: Arc<JobQueue>) -> Self {
        Self { ws_manager, queue }
    }

    /// Run the fan-out loop until `cancel` fires or the bus closes.
    pub async fn run(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<JobEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Progress broadcaster stopped");
                    break;
                }
                received = receiver.recv() => received,
            };

            match received {
                Ok(event) => {
                    let delivered = self.deliver(&event).await;
                    tracing::trace!(
                        job_id = %event.job_id(),
                        event_type = event.event_type(),
                        delivered,
                        "Job event fanned out",
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Progress broadcaster lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, progress broadcaster shutting down");
                    break;
                }
            }
        }
    }

    /// Push one event to every interested connection. Returns how many
    /// connections accepted it.
    pub async fn deliver(&self, event: &JobEvent) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    job_id = %event.job_id(),
                    error = %e,
                    "Failed to serialize job event",
                );
                return 0;
            }
        };
        self.ws_manager
            .send_job_message(event.job_id(), Message::Text(text.into()))
            .await
    }

    /// Parse a raw client frame and answer it.
    pub async fn handle_text(&self, conn_id: &str, text: &str) -> ServerMessage {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(request) => self.handle_request(conn_id, request).await,
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Malformed client message");
                ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                }
            }
        }
    }

    pub async fn handle_request(&self, conn_id: &str, request: ClientMessage) -> ServerMessage {
        match request {
            ClientMessage::SubscribeJob { job_id } => {
                self.ws_manager.subscribe_job(conn_id, &job_id).await;
                tracing::debug!(conn_id = %conn_id, job_id = %job_id, "Subscribed to job");
                ServerMessage::Subscribed {
                    job_id: Some(job_id),
                }
            }
            ClientMessage::SubscribeAll => {
                self.ws_manager.subscribe_all(conn_id).await;
                ServerMessage::Subscribed { job_id: None }
            }
            ClientMessage::GetQueueStats => {
                ServerMessage::QueueStats(self.queue.get_job_stats().await)
            }
            ClientMessage::GetActiveJobs => ServerMessage::ActiveJobs {
                jobs: self.queue.get_active_jobs().await,
            },
            ClientMessage::GetJobsByUpload { upload_group_id } => {
                let jobs = self.queue.get_jobs_by_upload_id(&upload_group_id).await;
                ServerMessage::UploadJobs {
                    upload_group_id,
                    jobs,
                }
            }
            ClientMessage::Ping => ServerMessage::Pong,
        }
    }

    /// Send a reply to the connection that asked for it.
    pub async fn reply(&self, conn_id: &str, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.ws_manager.send_to(conn_id, Message::Text(text.into())).await,
            Err(e) => {
                tracing::error!(
                    conn_id = %conn_id,
                    message_type = message.message_type(),
                    error = %e,
                    "Failed to serialize reply",
                );
                false
            }
        }
    }
}
