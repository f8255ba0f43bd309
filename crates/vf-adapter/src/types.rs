//! Wire types shared by every adapter implementation.

use vf_models::AdapterErrorCode;

/// Status of a generation task as reported by `get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }
}

/// Result of a completed (successfully or not) generation task, returned by
/// `get_result`.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub status: GenerationStatus,
    /// Set iff status is Completed. May be a `file://` path (mock adapter) or
    /// a remote URL the worker must download.
    pub asset_url: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<AdapterErrorCode>,
}

impl GenerationResult {
    pub fn completed(asset_url: impl Into<String>) -> Self {
        Self {
            status: GenerationStatus::Completed,
            asset_url: Some(asset_url.into()),
            error_message: None,
            error_code: None,
        }
    }

    pub fn failed(code: AdapterErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: GenerationStatus::Failed,
            asset_url: None,
            error_message: Some(message.into()),
            error_code: Some(code),
        }
    }
}
