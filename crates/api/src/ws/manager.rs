use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use wmpro_core::types::{JobId, Timestamp};

/// Outbound messages buffered per connection before delivery starts dropping.
pub const OUTBOUND_BUFFER: usize = 256;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::Sender<Message>;

/// Which job events a connection wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// Every job event. The state of a new connection.
    All,
    /// Only events for these job ids.
    Jobs(HashSet<JobId>),
}

impl Interest {
    pub fn matches(&self, job_id: &str) -> bool {
        match self {
            Interest::All => true,
            Interest::Jobs(ids) => ids.contains(job_id),
        }
    }
}

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    pub interest: Interest,
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. Sends never block: a connection whose
/// buffer is full misses the message.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection interested in every job.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let conn = WsConnection {
            sender: tx,
            interest: Interest::All,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Narrow the connection to explicit job ids, adding `job_id` to the set.
    ///
    /// Returns `false` if the connection is unknown.
    pub async fn subscribe_job(&self, conn_id: &str, job_id: &str) -> bool {
        let mut conns = self.connections.write().await;
        let Some(conn) = conns.get_mut(conn_id) else {
            return false;
        };
        match &mut conn.interest {
            Interest::Jobs(ids) => {
                ids.insert(job_id.to_string());
            }
            Interest::All => {
                conn.interest = Interest::Jobs(HashSet::from([job_id.to_string()]));
            }
        }
        true
    }

    /// Restore interest in every job.
    pub async fn subscribe_all(&self, conn_id: &str) -> bool {
        match self.connections.write().await.get_mut(conn_id) {
            Some(conn) => {
                conn.interest = Interest::All;
                true
            }
            None => false,
        }
    }

    pub async fn interest(&self, conn_id: &str) -> Option<Interest> {
        self.connections
            .read()
            .await
            .get(conn_id)
            .map(|conn| conn.interest.clone())
    }

    /// Deliver a job event to every connection interested in `job_id`.
    ///
    /// Returns the number of connections that accepted the message.
    pub async fn send_job_message(&self, job_id: &str, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for (conn_id, conn) in conns.iter() {
            if conn.interest.matches(job_id) && try_deliver(conn_id, conn, message.clone()) {
                count += 1;
            }
        }
        count
    }

    /// Send a message to one connection. Returns whether it was accepted.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.read().await.get(conn_id) {
            Some(conn) => try_deliver(conn_id, conn, message),
            None => false,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// How long the longest-lived connection has been open.
    pub async fn oldest_connection_age(&self) -> Option<chrono::Duration> {
        let now = chrono::Utc::now();
        self.connections
            .read()
            .await
            .values()
            .map(|conn| now - conn.connected_at)
            .max()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for (conn_id, conn) in conns.iter() {
            try_deliver(conn_id, conn, Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for (conn_id, conn) in conns.iter() {
            try_deliver(conn_id, conn, Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

fn try_deliver(conn_id: &str, conn: &WsConnection, message: Message) -> bool {
    match conn.sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::debug!(conn_id = %conn_id, "Outbound buffer full, dropping message");
            false
        }
        // The receive loop removes the entry on disconnect.
        Err(TrySendError::Closed(_)) => false,
    }
}
