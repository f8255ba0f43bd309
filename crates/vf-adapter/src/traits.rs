//! The Model Adapter contract (component C1).

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::types::{GenerationResult, GenerationStatus};

/// Uniform interface over one external video generation model.
///
/// Adapters must be cheap to construct and hold no hidden global state —
/// the factory builds a fresh instance per lookup.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Name this adapter is registered under (e.g. "mock", "runway").
    fn model_name(&self) -> &str;

    /// Submit a generation request. Returns the external job id.
    /// Validation failures are terminal (PARAMETERS/WORKFLOW).
    async fn initiate(&self, prompt: &str, params: &serde_json::Value) -> AdapterResult<String>;

    /// Cheap status probe. Transient adapter errors should be mapped to
    /// `Processing` by the caller rather than propagated as FAILED, so the
    /// poll loop can tolerate flakiness.
    async fn get_status(&self, external_job_id: &str) -> AdapterResult<GenerationStatus>;

    /// Fetch the terminal result. Only called once `get_status` reports a
    /// terminal status.
    async fn get_result(&self, external_job_id: &str) -> AdapterResult<GenerationResult>;

    /// Best-effort cancellation; never required for correctness.
    async fn cancel(&self, external_job_id: &str) -> AdapterResult<bool>;
}
