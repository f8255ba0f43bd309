//! Adapter error taxonomy shared by the adapter layer, the AI worker, and the
//! state store's `Segment.error_code` column.

use serde::{Deserialize, Serialize};

/// Classification of an adapter-level failure.
///
/// Retryable codes (`Connection`, `Timeout`, `Generation`) may be re-attempted
/// by the worker within its bounded retry/poll budget. The rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorCode {
    /// Cannot reach the service.
    Connection,
    /// Service did not respond in bound.
    Timeout,
    /// Malformed request / missing nodes.
    Workflow,
    /// Invalid inputs.
    Parameters,
    /// Service-side produced an error while generating.
    Generation,
    /// Service reported success but produced no usable artifact.
    Output,
}

impl AdapterErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterErrorCode::Connection => "CONNECTION",
            AdapterErrorCode::Timeout => "TIMEOUT",
            AdapterErrorCode::Workflow => "WORKFLOW",
            AdapterErrorCode::Parameters => "PARAMETERS",
            AdapterErrorCode::Generation => "GENERATION",
            AdapterErrorCode::Output => "OUTPUT",
        }
    }

    /// Whether the worker should retry rather than fail the segment outright.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterErrorCode::Connection | AdapterErrorCode::Timeout | AdapterErrorCode::Generation
        )
    }

    /// A short, user-facing explanation plus troubleshooting hint. Kept as a
    /// static table so classification and messaging never drift apart.
    pub fn user_message(&self) -> &'static str {
        match self {
            AdapterErrorCode::Connection => {
                "Could not reach the generation service. Check network connectivity and the service endpoint."
            }
            AdapterErrorCode::Timeout => {
                "The generation service did not respond in time. It may be overloaded; try again shortly."
            }
            AdapterErrorCode::Workflow => {
                "The request was malformed for this model. Check the selected model and its required parameters."
            }
            AdapterErrorCode::Parameters => {
                "One or more generation parameters were invalid. Review the segment's model parameters."
            }
            AdapterErrorCode::Generation => {
                "The generation service reported an internal error while producing the clip. Retrying may succeed."
            }
            AdapterErrorCode::Output => {
                "The generation service reported success but produced no usable output. This segment needs review."
            }
        }
    }
}

impl std::fmt::Display for AdapterErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes_match_spec_taxonomy() {
        assert!(AdapterErrorCode::Connection.is_retryable());
        assert!(AdapterErrorCode::Timeout.is_retryable());
        assert!(AdapterErrorCode::Generation.is_retryable());
        assert!(!AdapterErrorCode::Workflow.is_retryable());
        assert!(!AdapterErrorCode::Parameters.is_retryable());
        assert!(!AdapterErrorCode::Output.is_retryable());
    }

    #[test]
    fn every_code_has_a_non_empty_user_message() {
        for code in [
            AdapterErrorCode::Connection,
            AdapterErrorCode::Timeout,
            AdapterErrorCode::Workflow,
            AdapterErrorCode::Parameters,
            AdapterErrorCode::Generation,
            AdapterErrorCode::Output,
        ] {
            assert!(!code.user_message().is_empty());
        }
    }
}
