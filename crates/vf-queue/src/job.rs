//! Task and event payloads carried on the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vf_models::{ProjectId, RenderJobId, SegmentId};

/// Task dispatched to an AI worker: generate one segment.
///
/// Produced by the orchestrator's regeneration-set diff; one task per
/// segment that needs (re)generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    pub render_job_id: RenderJobId,
    pub project_id: ProjectId,
    pub segment_id: SegmentId,
    pub prompt: String,
    pub model_params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl GenerationTask {
    pub fn new(
        render_job_id: RenderJobId,
        project_id: ProjectId,
        segment_id: SegmentId,
        prompt: impl Into<String>,
        model_params: serde_json::Value,
    ) -> Self {
        Self {
            render_job_id,
            project_id,
            segment_id,
            prompt: prompt.into(),
            model_params,
            created_at: Utc::now(),
        }
    }

    /// Dedupe on (render job, segment): re-delivery of the same generation
    /// attempt is a no-op, a new render job always gets a fresh key.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}:{}", self.render_job_id, self.segment_id)
    }
}

/// Task dispatched to the composition worker: concatenate a render job's
/// segments into a single final asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionTask {
    pub render_job_id: RenderJobId,
    pub project_id: ProjectId,
    /// Segment ids in timeline order; the manifest preserves this order.
    pub segment_ids: Vec<SegmentId>,
    pub created_at: DateTime<Utc>,
}

impl CompositionTask {
    pub fn new(render_job_id: RenderJobId, project_id: ProjectId, segment_ids: Vec<SegmentId>) -> Self {
        Self {
            render_job_id,
            project_id,
            segment_ids,
            created_at: Utc::now(),
        }
    }

    /// Dedupe on render job: composition only ever runs once per job.
    pub fn idempotency_key(&self) -> String {
        format!("compose:{}", self.render_job_id)
    }
}

/// Advisory fanout event published when a segment finishes generating,
/// successfully or not. Not consumed by any queue-reading worker; the
/// composition trigger is decided inline by the AI worker, not by
/// subscribing to this event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentCompletedEvent {
    pub render_job_id: RenderJobId,
    pub project_id: ProjectId,
    pub segment_id: SegmentId,
    pub succeeded: bool,
    pub created_at: DateTime<Utc>,
}

impl SegmentCompletedEvent {
    pub fn new(render_job_id: RenderJobId, project_id: ProjectId, segment_id: SegmentId, succeeded: bool) -> Self {
        Self {
            render_job_id,
            project_id,
            segment_id,
            succeeded,
            created_at: Utc::now(),
        }
    }
}

/// Tagged union of everything that travels through the durable queue streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    Generation(GenerationTask),
    Composition(CompositionTask),
}

impl QueueJob {
    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::Generation(t) => t.idempotency_key(),
            QueueJob::Composition(t) => t.idempotency_key(),
        }
    }

    pub fn render_job_id(&self) -> RenderJobId {
        match self {
            QueueJob::Generation(t) => t.render_job_id,
            QueueJob::Composition(t) => t.render_job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_task_serde_roundtrip() {
        let task = GenerationTask::new(
            RenderJobId::new(),
            ProjectId::new(),
            SegmentId::new(),
            "a dog running",
            serde_json::json!({"model": "mock"}),
        );
        let wrapper = QueueJob::Generation(task.clone());
        let json = serde_json::to_string(&wrapper).expect("serialize");
        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize");

        match decoded {
            QueueJob::Generation(t) => {
                assert_eq!(t.render_job_id, task.render_job_id);
                assert_eq!(t.segment_id, task.segment_id);
                assert_eq!(t.prompt, task.prompt);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn composition_task_idempotency_key_is_stable_per_job() {
        let render_job_id = RenderJobId::new();
        let task_a = CompositionTask::new(render_job_id, ProjectId::new(), vec![SegmentId::new()]);
        let task_b = CompositionTask::new(render_job_id, ProjectId::new(), vec![SegmentId::new(), SegmentId::new()]);
        assert_eq!(task_a.idempotency_key(), task_b.idempotency_key());
    }

    #[test]
    fn generation_task_idempotency_key_differs_per_segment() {
        let render_job_id = RenderJobId::new();
        let project_id = ProjectId::new();
        let task_a = GenerationTask::new(render_job_id, project_id, SegmentId::new(), "p", serde_json::json!({}));
        let task_b = GenerationTask::new(render_job_id, project_id, SegmentId::new(), "p", serde_json::json!({}));
        assert_ne!(task_a.idempotency_key(), task_b.idempotency_key());
    }
}
