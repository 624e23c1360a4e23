//! Domain types shared by every WatermarkPro crate.
//!
//! This crate has zero internal dependencies so the queue core, the event
//! bus, and the HTTP layer can all depend on it without cycles.

pub mod error;
pub mod job;
pub mod job_events;
pub mod scheduling;
pub mod types;
pub mod watermark;
