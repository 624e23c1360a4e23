//! WebSocket infrastructure for real-time job updates.
//!
//! Provides connection management with per-connection interest, the wire
//! messages clients exchange with the server, heartbeat pings, and the HTTP
//! upgrade handler.

mod handler;
mod heartbeat;
pub mod manager;
pub mod protocol;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::{Interest, WsManager};
pub use protocol::{ClientMessage, ServerMessage};
