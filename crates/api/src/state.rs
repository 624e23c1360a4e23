use std::sync::Arc;

use wmpro_queue::JobQueue;

use crate::broadcast::ProgressBroadcaster;
use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Submission and query facade over the job queue.
    pub queue: Arc<JobQueue>,
    /// Open WebSocket connections and their interests.
    pub ws_manager: Arc<WsManager>,
    /// Answers client requests and fans job events out to connections.
    pub broadcaster: Arc<ProgressBroadcaster>,
}

impl AppState {
    pub fn new(config: ServerConfig, queue: Arc<JobQueue>) -> Self {
        let ws_manager = Arc::new(WsManager::new());
        let broadcaster = Arc::new(ProgressBroadcaster::new(
            Arc::clone(&ws_manager),
            Arc::clone(&queue),
        ));
        Self {
            config: Arc::new(config),
            queue,
            ws_manager,
            broadcaster,
        }
    }
}
