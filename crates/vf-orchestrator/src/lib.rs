//! Render orchestrator (component C8): the synchronous entry point invoked
//! by the API on a render request.
//!
//! Computes the regeneration set against the last completed render, creates
//! the render-job row, seeds the progress cache, and dispatches one
//! generation task per segment that needs to (re)produce its clip.

pub mod diff;
pub mod error;

use vf_models::{ProjectId, RenderJob, RenderJobStatus};
use vf_queue::{CompositionTask, GenerationTask, JobQueue, ProgressCache};
use vf_state::StateStore;

pub use diff::regeneration_set;
pub use error::{OrchestratorError, OrchestratorResult};

/// Render orchestrator: holds the shared handles to the state store, queue,
/// and progress cache it dispatches through. Stateless beyond those handles
/// — safe to call concurrently for the same or different projects.
#[derive(Clone)]
pub struct Orchestrator {
    state: StateStore,
    queue: JobQueue,
    progress: ProgressCache,
}

impl Orchestrator {
    pub fn new(state: StateStore, queue: JobQueue, progress: ProgressCache) -> Self {
        Self { state, queue, progress }
    }

    /// §4.2: compute the regeneration set, create the render job, and
    /// dispatch per-segment generation tasks.
    pub async fn create_render(&self, project_id: ProjectId) -> OrchestratorResult<RenderJob> {
        let segments = self.state.list_segments_by_project(project_id).await?;
        if segments.is_empty() {
            return Err(OrchestratorError::EmptyProject(project_id));
        }

        let last_completed = self.state.get_latest_completed_render_job(project_id).await?;
        let to_regenerate = regeneration_set(&segments, last_completed.as_ref());

        let segment_ids = segments.iter().map(|s| s.id).collect::<Vec<_>>();
        let mut job = RenderJob::new(project_id, segment_ids, to_regenerate.len());
        self.state.create_render_job(&job).await?;

        self.progress
            .set_mapping(job.id, job.segments_total, job.segments_completed, job.status.as_str())
            .await?;

        job.mark_processing();
        self.state.mark_render_job_status(job.id, RenderJobStatus::Processing).await?;
        self.progress
            .set_mapping(job.id, job.segments_total, job.segments_completed, job.status.as_str())
            .await?;

        if to_regenerate.is_empty() {
            // §4.2 L2: nothing to regenerate — the orchestrator itself is the
            // actor that observes `segments_completed == segments_total` and
            // triggers composition, since no worker completion will ever
            // fire that check.
            self.enqueue_composition(&mut job).await?;
            return Ok(job);
        }

        // §4.2 step 7: transition the whole regeneration set to GENERATING
        // here, before any task is published, so a concurrent create_render
        // for the same project can never see these segments as still
        // eligible for regeneration.
        self.state.mark_segments_dispatched(&to_regenerate).await?;

        let by_id: std::collections::HashMap<_, _> = segments.into_iter().map(|s| (s.id, s)).collect();
        let mut tasks = Vec::with_capacity(to_regenerate.len());
        for segment_id in &to_regenerate {
            let segment = by_id
                .get(segment_id)
                .expect("regeneration_set only returns ids present in `segments`");
            self.progress
                .set_segment_status(segment.id, vf_models::SegmentStatus::Generating.as_str(), job.id)
                .await
                .ok();
            tasks.push(GenerationTask::new(
                job.id,
                project_id,
                segment.id,
                segment.prompt.clone(),
                segment.model_params.clone(),
            ));
        }

        self.queue.enqueue_generation_batch(tasks).await?;

        Ok(job)
    }

    async fn enqueue_composition(&self, job: &mut RenderJob) -> OrchestratorResult<()> {
        job.mark_compositing();
        self.state.mark_render_job_status(job.id, RenderJobStatus::Compositing).await?;
        self.progress
            .set_mapping(job.id, job.segments_total, job.segments_completed, job.status.as_str())
            .await?;

        let task = CompositionTask::new(job.id, job.project_id, job.segment_ids.clone());
        self.queue.enqueue_composition_task(task).await?;
        Ok(())
    }
}
