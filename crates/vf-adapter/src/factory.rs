//! String-keyed adapter registry (component C1 support, §4.5).

use std::sync::Arc;

use crate::error::{AdapterError, AdapterResult};
use crate::mock::{MockAdapter, MockAdapterConfig};
use crate::traits::ModelAdapter;

/// Builds a [`ModelAdapter`] from a `model_params.model` string.
///
/// Unknown model names are a terminal WORKFLOW error at initiate time, not a
/// construction-time panic, since the factory is consulted per-task and must
/// stay cheap.
pub struct AdapterFactory {
    mock_config: MockAdapterConfig,
}

impl AdapterFactory {
    pub fn new(mock_config: MockAdapterConfig) -> Self {
        Self { mock_config }
    }

    /// Look up and construct the adapter registered for `model_name`.
    /// `model_name` is matched case-insensitively; an empty/absent name
    /// defaults to the mock adapter so local development works without a
    /// configured external model.
    pub fn create(&self, model_name: &str) -> AdapterResult<Arc<dyn ModelAdapter>> {
        match model_name.to_lowercase().as_str() {
            "" | "mock" => Ok(Arc::new(MockAdapter::new(self.mock_config.clone()))),
            other => Err(AdapterError::workflow(format!(
                "unsupported model: {other}. Supported models: mock"
            ))),
        }
    }
}

impl Default for AdapterFactory {
    fn default() -> Self {
        Self::new(MockAdapterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_mock_when_model_is_empty() {
        let factory = AdapterFactory::default();
        let adapter = factory.create("").unwrap();
        assert_eq!(adapter.model_name(), "mock");
    }

    #[test]
    fn unknown_model_is_a_workflow_error() {
        let factory = AdapterFactory::default();
        let err = factory.create("not-a-real-model").unwrap_err();
        assert!(!err.is_retryable());
    }
}
