//! WatermarkPro event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. Every job store mutation publishes exactly
//!   one [`JobEvent`] while the store's write lock is held, so all
//!   subscribers observe mutations in the order they were applied.
//! - [`JobEvent`]: the typed domain event, which doubles as the
//!   server-to-client wire message for job updates.

pub mod bus;

pub use bus::{EventBus, JobEvent};
