//! The AI worker's per-message handler (§4.3): initiate/poll/fetch one
//! segment through its adapter, upload the result, and advance render-job
//! progress.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use vf_adapter::{AdapterError, AdapterFactory, GenerationStatus};
use vf_models::{AdapterErrorCode, Segment};
use vf_queue::{GenerationTask, ProgressCache, SegmentCompletedEvent};
use vf_state::StateStore;
use vf_storage::ObjectStoreClient;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Shared, cheaply-cloneable handles every concurrent task handler needs.
#[derive(Clone)]
pub struct GenerationContext {
    pub config: WorkerConfig,
    pub state: StateStore,
    pub queue: vf_queue::JobQueue,
    pub progress: ProgressCache,
    pub storage: ObjectStoreClient,
    pub adapters: Arc<AdapterFactory>,
}

/// Outcome of handling one generation task, for the executor's ack/retry
/// decision.
pub enum Outcome {
    /// Terminal for this message: ack regardless of success/failure, since
    /// the segment's state (COMPLETED or FAILED) was durably recorded.
    Handled,
    /// An infrastructure failure occurred before any terminal state was
    /// recorded; the message should NOT be acked so it's redelivered.
    Infra(WorkerError),
}

/// Handle one generation task end to end (§4.3 steps 1-9).
pub async fn handle(ctx: &GenerationContext, task: GenerationTask) -> Outcome {
    match handle_inner(ctx, &task).await {
        Ok(()) => Outcome::Handled,
        Err(e) if e.is_infra() => {
            warn!(segment_id = %task.segment_id, render_job_id = %task.render_job_id, "infra error handling generation task: {e}");
            Outcome::Infra(e)
        }
        Err(e) => {
            // Should not happen: adapter/io errors are translated to a
            // Segment.FAILED write inside handle_inner before they can
            // surface here. Treat defensively as handled so a message that
            // can never succeed doesn't loop forever.
            warn!(segment_id = %task.segment_id, "unexpected error handling generation task, acking anyway: {e}");
            Outcome::Handled
        }
    }
}

async fn handle_inner(ctx: &GenerationContext, task: &GenerationTask) -> WorkerResult<()> {
    let segment = ctx.state.get_segment(task.segment_id).await?;

    // I6: a replayed message for an already-terminal segment is a no-op.
    if segment.status.is_terminal() {
        debug!(segment_id = %segment.id, status = %segment.status, "segment already terminal, skipping");
        return Ok(());
    }

    let adapter = match ctx.adapters.create(segment.model_name()) {
        Ok(a) => a,
        Err(e) => return fail_segment(ctx, task, &segment, e).await,
    };

    let initiate_result = vf_adapter::retry::with_retry(
        ctx.config.initiate_max_attempts,
        ctx.config.initiate_base_delay,
        ctx.config.initiate_max_delay,
        || adapter.initiate(&segment.prompt, &segment.model_params),
    )
    .await;

    let external_job_id = match initiate_result {
        Ok(id) => id,
        Err(e) => return fail_segment(ctx, task, &segment, e).await,
    };

    let claimed = ctx.state.mark_segment_generating(segment.id, &external_job_id).await?;
    if !claimed {
        // A concurrent duplicate delivery already recorded its own
        // external_job_id first. Our adapter job is now orphaned;
        // best-effort cancel it and defer to whichever delivery owns the
        // authoritative attempt.
        adapter.cancel(&external_job_id).await.ok();
        debug!(segment_id = %segment.id, "lost the initiate race to a concurrent delivery, acking");
        return Ok(());
    }

    let deadline = Instant::now() + ctx.config.poll_timeout;
    let terminal_status = loop {
        if Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(ctx.config.poll_interval).await;

        match adapter.get_status(&external_job_id).await {
            Ok(status) if status.is_terminal() => break Some(status),
            Ok(_) => continue,
            Err(e) => {
                // Transient get_status errors don't count against the
                // budget; keep polling until the wall-clock deadline.
                debug!(segment_id = %segment.id, "transient get_status error, continuing to poll: {e}");
                continue;
            }
        }
    };

    let Some(_status) = terminal_status else {
        adapter.cancel(&external_job_id).await.ok();
        let err = AdapterError::timeout(format!(
            "segment {} did not complete within {:?}",
            segment.id, ctx.config.poll_timeout
        ));
        return fail_segment(ctx, task, &segment, err).await;
    };

    let result = match adapter.get_result(&external_job_id).await {
        Ok(r) => r,
        Err(e) => return fail_segment(ctx, task, &segment, e).await,
    };

    if result.status != GenerationStatus::Completed {
        let code = result.error_code.unwrap_or(AdapterErrorCode::Generation);
        let message = result.error_message.unwrap_or_else(|| "generation failed".to_string());
        return fail_segment(ctx, task, &segment, AdapterError::new(code, message)).await;
    }

    let source_url = result
        .asset_url
        .ok_or_else(|| AdapterError::output("completed result carried no asset_url"))?;

    let key = format!("segments/{}/{}.mp4", task.project_id, segment.id);
    let uploaded_url = match download_and_upload(ctx, &source_url, &key).await {
        Ok(url) => url,
        Err(e) => return fail_segment(ctx, task, &segment, e).await,
    };

    complete_segment(ctx, task, segment.id, &uploaded_url).await
}

/// Download the adapter's asset (a local `file://` path for the mock
/// adapter, or a remote URL for a real model) and re-upload it to the
/// object store under the deterministic segment key.
async fn download_and_upload(ctx: &GenerationContext, source_url: &str, key: &str) -> Result<String, AdapterError> {
    if let Some(local_path) = source_url.strip_prefix("file://") {
        let url = ctx
            .storage
            .upload_file(local_path, key, "video/mp4")
            .await
            .map_err(|e| AdapterError::output(format!("failed to upload segment asset: {e}")))?;
        tokio::fs::remove_file(local_path).await.ok();
        return Ok(url);
    }

    let bytes = reqwest::get(source_url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| AdapterError::connection(format!("failed to download segment asset: {e}")))?
        .bytes()
        .await
        .map_err(|e| AdapterError::connection(format!("failed to read segment asset body: {e}")))?;

    ctx.storage
        .upload_bytes(bytes.to_vec(), key, "video/mp4")
        .await
        .map_err(|e| AdapterError::output(format!("failed to upload segment asset: {e}")))
}

async fn complete_segment(
    ctx: &GenerationContext,
    task: &GenerationTask,
    segment_id: vf_models::SegmentId,
    asset_url: &str,
) -> WorkerResult<()> {
    let outcome = ctx
        .state
        .complete_segment_and_advance_job(segment_id, asset_url, task.render_job_id)
        .await?;

    if !outcome.advanced {
        // Duplicate delivery racing a prior successful completion (I6):
        // the segment was already COMPLETED by the time we committed.
        debug!(segment_id = %segment_id, "segment already completed by a concurrent delivery");
        return Ok(());
    }

    ctx.progress.increment_completed(task.render_job_id).await.ok();
    ctx.progress
        .set_mapping(
            task.render_job_id,
            outcome.segments_total,
            outcome.segments_completed,
            if outcome.job_is_fully_completed() {
                vf_models::RenderJobStatus::Compositing.as_str()
            } else {
                vf_models::RenderJobStatus::Processing.as_str()
            },
        )
        .await
        .ok();

    let event = SegmentCompletedEvent::new(task.render_job_id, task.project_id, segment_id, true);
    ctx.progress.publish_segment_completed(&event).await.ok();

    info!(segment_id = %segment_id, render_job_id = %task.render_job_id, "segment completed");

    if outcome.job_is_fully_completed() {
        ctx.state
            .mark_render_job_status(task.render_job_id, vf_models::RenderJobStatus::Compositing)
            .await?;

        let job = ctx.state.get_render_job(task.render_job_id).await?;
        let composition = vf_queue::CompositionTask::new(task.render_job_id, task.project_id, job.segment_ids);
        ctx.queue.enqueue_composition_task(composition).await?;
        info!(render_job_id = %task.render_job_id, "all segments complete, composition enqueued");
    }

    Ok(())
}

async fn fail_segment(
    ctx: &GenerationContext,
    task: &GenerationTask,
    segment: &Segment,
    error: AdapterError,
) -> WorkerResult<()> {
    warn!(
        segment_id = %segment.id,
        render_job_id = %task.render_job_id,
        error_code = %error.code,
        "segment generation failed: {}",
        error.message
    );

    ctx.state.fail_segment(segment.id, error.code, &error.message).await?;

    let event = SegmentCompletedEvent::new(task.render_job_id, task.project_id, segment.id, false);
    ctx.progress.publish_segment_completed(&event).await.ok();

    Ok(())
}
