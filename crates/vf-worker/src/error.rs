//! AI worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("state store error: {0}")]
    State(#[from] vf_state::StateError),

    #[error("queue error: {0}")]
    Queue(#[from] vf_queue::QueueError),

    #[error("storage error: {0}")]
    Storage(#[from] vf_storage::StorageError),

    #[error("adapter error: {0}")]
    Adapter(#[from] vf_adapter::AdapterError),
}

impl WorkerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the queue should redeliver this message (infra-layer failure)
    /// rather than have the handler have already recorded a terminal
    /// Segment.FAILED and ack'd it itself (§7 propagation rule).
    pub fn is_infra(&self) -> bool {
        matches!(self, WorkerError::State(_) | WorkerError::Queue(_) | WorkerError::Storage(_))
    }
}
