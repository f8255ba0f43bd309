//! Adapter error types and the retryable/terminal classification.

use thiserror::Error;
use vf_models::AdapterErrorCode;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// An error raised by a model adapter, carrying the taxonomy code that
/// decides whether the AI worker retries or fails the segment.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct AdapterError {
    pub code: AdapterErrorCode,
    pub message: String,
}

impl AdapterError {
    pub fn new(code: AdapterErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::Timeout, message)
    }

    pub fn workflow(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::Workflow, message)
    }

    pub fn parameters(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::Parameters, message)
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::Generation, message)
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::new(AdapterErrorCode::Output, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}
