//! Composition worker error types.

use thiserror::Error;

pub type CompositorResult<T> = Result<T, CompositorError>;

#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("state store error: {0}")]
    State(#[from] vf_state::StateError),

    #[error("queue error: {0}")]
    Queue(#[from] vf_queue::QueueError),

    #[error("storage error: {0}")]
    Storage(#[from] vf_storage::StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The external concatenator exited non-zero, or couldn't be spawned at
    /// all. Terminal for the render job — no retry (§4.4).
    #[error("concatenation failed: {0}")]
    Concatenation(String),
}

impl CompositorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn concatenation(msg: impl Into<String>) -> Self {
        Self::Concatenation(msg.into())
    }

    /// Whether the queue should redeliver this message rather than have the
    /// handler already recorded a terminal RenderJob.FAILED and ack'd it.
    pub fn is_infra(&self) -> bool {
        matches!(self, CompositorError::State(_) | CompositorError::Queue(_))
    }
}
