//! Durable task broker over Redis: streams for tasks, pub/sub for fanout.
//!
//! This crate provides:
//! - Task enqueueing and consumer-group based consumption, with retry/DLQ
//! - A low-latency progress cache for UI polling
//! - The segment-completed fanout event

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{CompositionTask, GenerationTask, QueueJob, SegmentCompletedEvent};
pub use progress::{ProgressCache, ProgressSnapshot};
pub use queue::{JobQueue, QueueConfig};
