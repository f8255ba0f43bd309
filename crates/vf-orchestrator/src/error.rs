//! Error type for the render orchestrator.

use thiserror::Error;
use vf_models::ProjectId;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("project {0} has no segments")]
    EmptyProject(ProjectId),

    #[error("state store error: {0}")]
    State(#[from] vf_state::StateError),

    #[error("queue error: {0}")]
    Queue(#[from] vf_queue::QueueError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
