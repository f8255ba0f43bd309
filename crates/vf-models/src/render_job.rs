//! RenderJob: one attempt to produce a final video for a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, RenderJobId, SegmentId};

/// Lifecycle state of a render job.
///
/// Valid transitions: `Pending -> Processing -> Compositing -> Completed`,
/// with `Failed` reachable from any non-terminal state. `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderJobStatus {
    #[default]
    Pending,
    Processing,
    Compositing,
    Completed,
    Failed,
}

impl RenderJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderJobStatus::Pending => "pending",
            RenderJobStatus::Processing => "processing",
            RenderJobStatus::Compositing => "compositing",
            RenderJobStatus::Completed => "completed",
            RenderJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderJobStatus::Completed | RenderJobStatus::Failed)
    }
}

impl std::str::FromStr for RenderJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RenderJobStatus::Pending),
            "processing" => Ok(RenderJobStatus::Processing),
            "compositing" => Ok(RenderJobStatus::Compositing),
            "completed" => Ok(RenderJobStatus::Completed),
            "failed" => Ok(RenderJobStatus::Failed),
            other => Err(format!("unknown render job status: {other}")),
        }
    }
}

impl std::fmt::Display for RenderJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single rendering attempt over a frozen snapshot of a project's timeline.
///
/// `segments_total` is the regeneration-set size for *this* job, not the
/// project's total segment count — see the orchestrator's diff algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: RenderJobId,
    pub project_id: ProjectId,
    pub status: RenderJobStatus,
    pub segments_total: i64,
    pub segments_completed: i64,
    pub segment_ids: Vec<SegmentId>,
    pub final_asset_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Build a freshly-created PENDING render job. `segment_ids` is the full
    /// ordered timeline snapshot; `regeneration_count` is the number of
    /// segments this job will actually (re)generate.
    pub fn new(project_id: ProjectId, segment_ids: Vec<SegmentId>, regeneration_count: usize) -> Self {
        let now = Utc::now();
        Self {
            id: RenderJobId::new(),
            project_id,
            status: RenderJobStatus::Pending,
            segments_total: regeneration_count as i64,
            segments_completed: 0,
            segment_ids,
            final_asset_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True once every segment dispatched by this job has completed.
    pub fn is_fully_completed(&self) -> bool {
        self.segments_completed >= self.segments_total
    }

    pub fn mark_processing(&mut self) {
        self.status = RenderJobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn mark_compositing(&mut self) {
        self.status = RenderJobStatus::Compositing;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, final_asset_url: impl Into<String>) {
        self.status = RenderJobStatus::Completed;
        self.final_asset_url = Some(final_asset_url.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = RenderJobStatus::Failed;
        self.error_message = Some(error_message.into());
        self.updated_at = Utc::now();
    }

    /// Invariant I1: 0 <= segments_completed <= segments_total.
    pub fn progress_invariant_holds(&self) -> bool {
        self.segments_completed >= 0 && self.segments_completed <= self.segments_total
    }

    /// Invariant I2: status = COMPLETED <=> final_asset_url is set.
    pub fn completion_invariant_holds(&self) -> bool {
        (self.status == RenderJobStatus::Completed) == self.final_asset_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(total: i64) -> RenderJob {
        let mut job = RenderJob::new(ProjectId::new(), vec![SegmentId::new(); total.max(1) as usize], total as usize);
        job.segments_total = total;
        job
    }

    #[test]
    fn new_job_starts_pending_with_zero_progress() {
        let job = sample_job(3);
        assert_eq!(job.status, RenderJobStatus::Pending);
        assert_eq!(job.segments_completed, 0);
        assert!(job.progress_invariant_holds());
    }

    #[test]
    fn zero_regeneration_set_is_immediately_fully_completed() {
        let job = sample_job(0);
        assert!(job.is_fully_completed());
    }

    #[test]
    fn mark_completed_satisfies_i2() {
        let mut job = sample_job(1);
        assert!(job.completion_invariant_holds());
        job.mark_completed("renders/p/r.mp4");
        assert!(job.completion_invariant_holds());
    }

    #[test]
    fn non_completed_status_requires_null_final_url() {
        let mut job = sample_job(1);
        job.mark_processing();
        assert!(job.completion_invariant_holds());
        assert!(job.final_asset_url.is_none());
    }
}
