//! Segment: one atomic clip in a project timeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error_code::AdapterErrorCode;
use crate::ids::{ProjectId, SegmentId};

/// Lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::Generating => "generating",
            SegmentStatus::Completed => "completed",
            SegmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentStatus::Completed | SegmentStatus::Failed)
    }
}

impl std::str::FromStr for SegmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SegmentStatus::Pending),
            "generating" => Ok(SegmentStatus::Generating),
            "completed" => Ok(SegmentStatus::Completed),
            "failed" => Ok(SegmentStatus::Failed),
            other => Err(format!("unknown segment status: {other}")),
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One clip in a project's timeline.
///
/// `model_params` is opaque structured data except for the `model` key, which
/// the orchestrator/worker use to select an adapter via the factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub project_id: ProjectId,
    pub order_index: i64,
    pub prompt: String,
    pub model_params: Json,
    pub status: SegmentStatus,
    pub asset_url: Option<String>,
    pub external_job_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<AdapterErrorCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    /// Construct a brand-new PENDING segment.
    pub fn new(project_id: ProjectId, order_index: i64, prompt: impl Into<String>, model_params: Json) -> Self {
        let now = Utc::now();
        Self {
            id: SegmentId::new(),
            project_id,
            order_index,
            prompt: prompt.into(),
            model_params,
            status: SegmentStatus::Pending,
            asset_url: None,
            external_job_id: None,
            error_message: None,
            error_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The adapter name selected by `model_params.model`, defaulting to "mock".
    pub fn model_name(&self) -> &str {
        self.model_params
            .get("model")
            .and_then(Json::as_str)
            .unwrap_or("mock")
    }

    /// Is this segment a "live" asset usable by a future composition without
    /// regeneration? I.e. COMPLETED with a non-null asset_url.
    pub fn is_live(&self) -> bool {
        self.status == SegmentStatus::Completed && self.asset_url.is_some()
    }

    /// Apply the §3 content-edit invariant: editing prompt/params resets the
    /// segment to PENDING and clears the produced asset.
    pub fn apply_edit(&mut self, prompt: Option<String>, model_params: Option<Json>) {
        if let Some(p) = prompt {
            self.prompt = p;
        }
        if let Some(params) = model_params {
            self.model_params = params;
        }
        self.status = SegmentStatus::Pending;
        self.asset_url = None;
        self.external_job_id = None;
        self.error_message = None;
        self.error_code = None;
        self.updated_at = Utc::now();
    }

    /// Flip a FAILED segment back to PENDING, clearing error state, so the
    /// next render includes it in the regeneration set.
    pub fn retry(&mut self) {
        self.status = SegmentStatus::Pending;
        self.error_message = None;
        self.error_code = None;
        self.external_job_id = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Segment {
        Segment::new(ProjectId::new(), 0, "a cat riding a bike", json!({"model": "mock"}))
    }

    #[test]
    fn new_segment_is_pending_and_not_live() {
        let s = sample();
        assert_eq!(s.status, SegmentStatus::Pending);
        assert!(!s.is_live());
    }

    #[test]
    fn editing_resets_status_and_asset() {
        let mut s = sample();
        s.status = SegmentStatus::Completed;
        s.asset_url = Some("segments/p/s.mp4".to_string());

        s.apply_edit(Some("a dog on a skateboard".to_string()), None);

        assert_eq!(s.status, SegmentStatus::Pending);
        assert!(s.asset_url.is_none());
        assert_eq!(s.prompt, "a dog on a skateboard");
    }

    #[test]
    fn model_name_defaults_to_mock() {
        let s = Segment::new(ProjectId::new(), 0, "p", json!({}));
        assert_eq!(s.model_name(), "mock");
    }

    #[test]
    fn retry_clears_error_state() {
        let mut s = sample();
        s.status = SegmentStatus::Failed;
        s.error_message = Some("boom".to_string());
        s.error_code = Some(AdapterErrorCode::Workflow);

        s.retry();

        assert_eq!(s.status, SegmentStatus::Pending);
        assert!(s.error_message.is_none());
        assert!(s.error_code.is_none());
    }
}
