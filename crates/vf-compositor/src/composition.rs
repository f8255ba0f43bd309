//! The composition worker's per-message handler (§4.4): concatenate a
//! render job's segments into one final asset via a stream-copy ffmpeg
//! concat, and finalize the render job.

use std::path::Path;

use tracing::{info, warn};
use vf_queue::CompositionTask;
use vf_state::StateStore;
use vf_storage::ObjectStoreClient;

use crate::config::CompositorConfig;
use crate::error::{CompositorError, CompositorResult};

/// Shared, cheaply-cloneable handles every concurrent task handler needs.
#[derive(Clone)]
pub struct CompositionContext {
    pub config: CompositorConfig,
    pub state: StateStore,
    pub queue: vf_queue::JobQueue,
    pub progress: vf_queue::ProgressCache,
    pub storage: ObjectStoreClient,
}

/// Outcome of handling one composition task, for the executor's ack/retry
/// decision.
pub enum Outcome {
    /// Terminal for this message: the render job's final state (COMPLETED
    /// or FAILED) was durably recorded.
    Handled,
    /// An infra failure occurred before any terminal state could be
    /// recorded; redeliver.
    Infra(CompositorError),
}

pub async fn handle(ctx: &CompositionContext, task: CompositionTask) -> Outcome {
    match handle_inner(ctx, &task).await {
        Ok(()) => Outcome::Handled,
        Err(e) if e.is_infra() => {
            warn!(render_job_id = %task.render_job_id, "infra error handling composition task: {e}");
            Outcome::Infra(e)
        }
        Err(e) => {
            warn!(render_job_id = %task.render_job_id, "unexpected error handling composition task, acking anyway: {e}");
            Outcome::Handled
        }
    }
}

async fn handle_inner(ctx: &CompositionContext, task: &CompositionTask) -> CompositorResult<()> {
    let job = ctx.state.get_render_job(task.render_job_id).await?;

    // Idempotent on render_job_id: a replayed or duplicate composition
    // message for an already-terminal job is a no-op (§4.2 outbox note).
    if job.status.is_terminal() {
        info!(render_job_id = %task.render_job_id, status = %job.status, "composition task already settled, skipping");
        return Ok(());
    }

    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    let work_dir = tempfile::Builder::new()
        .prefix("composition-")
        .tempdir_in(&ctx.config.work_dir)?;

    let result = compose(ctx, task, work_dir.path()).await;

    match result {
        Ok(final_url) => {
            ctx.state.complete_render_job(task.render_job_id, final_url).await?;
            ctx.progress
                .set_mapping(task.render_job_id, job.segments_total, job.segments_completed, "completed")
                .await
                .ok();
            info!(render_job_id = %task.render_job_id, "render job completed");
            Ok(())
        }
        Err(CompositorError::Concatenation(message)) => {
            warn!(render_job_id = %task.render_job_id, "composition failed: {message}");
            ctx.state.fail_render_job(task.render_job_id, message).await?;
            ctx.progress
                .set_mapping(task.render_job_id, job.segments_total, job.segments_completed, "failed")
                .await
                .ok();
            Ok(())
        }
        Err(e) if e.is_infra() => Err(e),
        Err(e) => {
            // Storage/IO failures mid-composition are still terminal for the
            // render job (§4.4 "no retry"), just not classified as a
            // Concatenation error.
            let message = e.to_string();
            warn!(render_job_id = %task.render_job_id, "composition failed: {message}");
            ctx.state.fail_render_job(task.render_job_id, message).await?;
            ctx.progress
                .set_mapping(task.render_job_id, job.segments_total, job.segments_completed, "failed")
                .await
                .ok();
            Ok(())
        }
    }

    // `work_dir` is removed on drop regardless of which branch above ran.
}

/// Download segments in frozen timeline order, concatenate via ffmpeg, and
/// upload the result. Returns the uploaded URL.
async fn compose(ctx: &CompositionContext, task: &CompositionTask, work_dir: &Path) -> CompositorResult<String> {
    let segments = ctx.state.get_segments_in_order(&task.segment_ids).await?;

    let mut manifest_lines = Vec::with_capacity(segments.len());
    let mut skipped = 0usize;

    for segment in &segments {
        if segment.asset_url.is_none() {
            warn!(segment_id = %segment.id, render_job_id = %task.render_job_id, "segment has no asset_url, skipping (best-effort composition)");
            skipped += 1;
            continue;
        }

        let key = format!("segments/{}/{}.mp4", segment.project_id, segment.id);
        let local_path = work_dir.join(format!("{}.mp4", segment.id));
        ctx.storage.download_file(&key, &local_path).await?;
        manifest_lines.push(format!("file '{}'", local_path.display().to_string().replace('\'', "'\\''")));
    }

    if skipped > 0 {
        warn!(render_job_id = %task.render_job_id, skipped, "composed with missing segments; output is incomplete");
    }

    if manifest_lines.is_empty() {
        return Err(CompositorError::concatenation("no segment assets available to concatenate"));
    }

    let manifest_path = work_dir.join("manifest.txt");
    tokio::fs::write(&manifest_path, manifest_lines.join("\n")).await?;

    let output_path = work_dir.join("output.mp4");
    run_concat(ctx, &manifest_path, &output_path).await?;

    let key = format!("renders/{}/{}.mp4", task.project_id, task.render_job_id);
    let url = ctx
        .storage
        .upload_file(&output_path, &key, "video/mp4")
        .await?;

    Ok(url)
}

/// `ffmpeg -f concat -safe 0 -i <manifest> -c copy -y <output>` (§6).
async fn run_concat(ctx: &CompositionContext, manifest_path: &Path, output_path: &Path) -> CompositorResult<()> {
    let output = tokio::process::Command::new(&ctx.config.ffmpeg_binary)
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(manifest_path)
        .arg("-c")
        .arg("copy")
        .arg("-y")
        .arg(output_path)
        .output()
        .await
        .map_err(|e| CompositorError::concatenation(format!("failed to spawn ffmpeg: {e}")))?;

    if !output.status.success() {
        return Err(CompositorError::concatenation(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(())
}
