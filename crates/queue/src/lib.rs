//! Background job orchestration for WatermarkPro.
//!
//! The pieces, leaf first:
//!
//! - [`store::JobStore`]: authoritative in-memory job table. Every mutation
//!   publishes one event on the [`wmpro_events::EventBus`].
//! - [`scheduler::ClassScheduler`]: per-type worker slots and priority queues.
//! - [`retry::RetryPolicy`]: exponential backoff between attempts.
//! - [`executor::WorkerExecutor`]: runs one attempt through a [`processor::Processor`].
//! - [`dispatcher::JobDispatcher`]: ties the above together and spawns workers.
//! - [`queue::JobQueue`]: the submission and query facade handed to callers.
//! - [`archive`]: ZIP batch submissions fanned out into one upload group.

pub mod archive;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod simulated;
pub mod store;

pub use archive::{ArchiveRequest, ArchiveSummary};
pub use config::QueueConfig;
pub use processor::{ProcessOutput, Processor, ProcessorError, ProcessorRegistry, ProgressReporter};
pub use queue::JobQueue;
