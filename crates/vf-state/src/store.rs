//! The `StateStore`: pooled async access to projects, segments, and render
//! jobs, with conditional updates so idempotency never requires a prior read.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use vf_models::{
    AdapterErrorCode, OwnerId, Project, ProjectId, RenderJob, RenderJobId, RenderJobStatus,
    Segment, SegmentId, SegmentStatus,
};

use crate::error::{StateError, StateResult};

/// Outcome of a conditional segment-completion mutation, letting the caller
/// (the AI worker) decide whether to enqueue composition without a second
/// read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressOutcome {
    /// Whether this call actually transitioned the segment (false on replay).
    pub advanced: bool,
    pub segments_completed: i64,
    pub segments_total: i64,
}

impl ProgressOutcome {
    pub fn job_is_fully_completed(&self) -> bool {
        self.segments_completed >= self.segments_total
    }
}

/// Pooled PostgreSQL-backed implementation of the render pipeline's shared
/// state. Every multi-row mutation runs inside one transaction; every
/// conditional update is a `WHERE status = ...` clause checked against the
/// affected row count, never a read-then-write.
#[derive(Clone)]
pub struct StateStore {
    pool: PgPool,
}

impl StateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StateResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- Projects --------------------------------------------------

    pub async fn create_project(&self, owner_id: OwnerId, name: impl Into<String>) -> StateResult<Project> {
        let project = Project::new(owner_id, name);
        sqlx::query(
            "INSERT INTO projects (id, owner_id, name, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(project.id.as_uuid())
        .bind(project.owner_id.as_uuid())
        .bind(&project.name)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(project)
    }

    pub async fn get_project(&self, project_id: ProjectId) -> StateResult<Project> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, created_at, updated_at FROM projects WHERE id = $1",
        )
        .bind(project_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StateError::not_found(format!("project {project_id}")))?;

        Ok(Project {
            id: ProjectId(row.get("id")),
            owner_id: OwnerId(row.get("owner_id")),
            name: row.get("name"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    // ---- Segments ---------------------------------------------------

    /// Insert a batch of segments for a project's initial timeline, in one
    /// transaction.
    pub async fn create_segments(&self, segments: &[Segment]) -> StateResult<()> {
        let mut tx = self.pool.begin().await?;
        for s in segments {
            sqlx::query(
                "INSERT INTO segments (id, project_id, order_index, prompt, model_params, status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(s.id.as_uuid())
            .bind(s.project_id.as_uuid())
            .bind(s.order_index)
            .bind(&s.prompt)
            .bind(&s.model_params)
            .bind(s.status.as_str())
            .bind(s.created_at)
            .bind(s.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_segment(&self, segment_id: SegmentId) -> StateResult<Segment> {
        let row = sqlx::query(SEGMENT_COLUMNS_SELECT)
            .bind(segment_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StateError::not_found(format!("segment {segment_id}")))?;
        row_to_segment(row)
    }

    /// Segments for a project in timeline order.
    pub async fn list_segments_by_project(&self, project_id: ProjectId) -> StateResult<Vec<Segment>> {
        let rows = sqlx::query(&format!(
            "{SEGMENT_COLUMNS_SELECT_BASE} WHERE project_id = $1 ORDER BY order_index ASC, id ASC"
        ))
        .bind(project_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_segment).collect()
    }

    /// Fetch a specific set of segments, preserving the order of `segment_ids`
    /// — used by the composition worker, for which input order is semantic.
    pub async fn get_segments_in_order(&self, segment_ids: &[SegmentId]) -> StateResult<Vec<Segment>> {
        let ids: Vec<uuid::Uuid> = segment_ids.iter().map(|s| s.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "{SEGMENT_COLUMNS_SELECT_BASE} WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_id: std::collections::HashMap<SegmentId, Segment> = rows
            .into_iter()
            .map(|r| row_to_segment(r).map(|s| (s.id, s)))
            .collect::<StateResult<Vec<_>>>()?
            .into_iter()
            .collect();

        segment_ids
            .iter()
            .map(|id| by_id.remove(id).ok_or_else(|| StateError::not_found(format!("segment {id}"))))
            .collect()
    }

    /// Apply the §3 content-edit invariant (I4): atomically reset prompt and
    /// params, clear the produced asset, and return to PENDING.
    pub async fn apply_segment_edit(
        &self,
        segment_id: SegmentId,
        prompt: Option<String>,
        model_params: Option<serde_json::Value>,
    ) -> StateResult<Segment> {
        let mut segment = self.get_segment(segment_id).await?;
        segment.apply_edit(prompt, model_params);

        sqlx::query(
            "UPDATE segments SET prompt = $1, model_params = $2, status = $3, asset_url = NULL,
             external_job_id = NULL, error_message = NULL, error_code = NULL, updated_at = $4
             WHERE id = $5",
        )
        .bind(&segment.prompt)
        .bind(&segment.model_params)
        .bind(segment.status.as_str())
        .bind(segment.updated_at)
        .bind(segment_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(segment)
    }

    /// Flip a FAILED segment back to PENDING so the next render includes it.
    pub async fn retry_segment(&self, segment_id: SegmentId) -> StateResult<Segment> {
        let row = sqlx::query(
            "UPDATE segments SET status = 'pending', error_message = NULL, error_code = NULL,
             external_job_id = NULL, updated_at = now()
             WHERE id = $1 AND status = 'failed'
             RETURNING id",
        )
        .bind(segment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            tracing::debug!(%segment_id, "retry_segment: no failed segment matched, returning current state");
        }
        self.get_segment(segment_id).await
    }

    /// Transition each given segment to GENERATING at dispatch time (§4.2
    /// step 7), before the generation task is published. `WHERE status <>
    /// 'completed'` rather than `= 'pending'`: the regeneration set can also
    /// contain FAILED segments being retried.
    ///
    /// Run once per render, right before enqueuing — not by the worker on
    /// initiate — so the window in which a concurrent `create_render` could
    /// see the same segment as still eligible for regeneration is one write,
    /// not the time the task sits on the queue.
    pub async fn mark_segments_dispatched(&self, segment_ids: &[SegmentId]) -> StateResult<()> {
        if segment_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<uuid::Uuid> = segment_ids.iter().map(|s| s.as_uuid()).collect();
        sqlx::query(
            "UPDATE segments SET status = 'generating', updated_at = now()
             WHERE id = ANY($1) AND status <> 'completed'",
        )
        .bind(&ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the external job id for a segment's in-flight adapter call.
    /// The GENERATING transition itself already happened at dispatch
    /// (`mark_segments_dispatched`); this only claims the "first initiate
    /// wins" slot, so a second concurrent delivery of the same task (or one
    /// reclaimed mid-flight) finds `external_job_id` already set and backs
    /// off instead of double-initiating.
    pub async fn mark_segment_generating(&self, segment_id: SegmentId, external_job_id: &str) -> StateResult<bool> {
        let result = sqlx::query(
            "UPDATE segments SET external_job_id = $1, updated_at = now()
             WHERE id = $2 AND status = 'generating' AND external_job_id IS NULL",
        )
        .bind(external_job_id)
        .bind(segment_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a segment FAILED with a classified error. Idempotent: only
    /// applies from GENERATING, so a duplicate failure delivery after the
    /// segment already failed or was retried is a no-op.
    pub async fn fail_segment(
        &self,
        segment_id: SegmentId,
        error_code: AdapterErrorCode,
        error_message: impl Into<String>,
    ) -> StateResult<bool> {
        let result = sqlx::query(
            "UPDATE segments SET status = 'failed', error_code = $1, error_message = $2, updated_at = now()
             WHERE id = $3 AND status = 'generating'",
        )
        .bind(error_code.as_str())
        .bind(error_message.into())
        .bind(segment_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// The combined mutation at the heart of I6/I7: conditionally complete a
    /// segment and, only if that transition actually happened, advance the
    /// owning render job's progress counter in the same transaction. A
    /// replayed "segment completed" message for an already-COMPLETED segment
    /// touches no rows and returns `advanced = false`.
    pub async fn complete_segment_and_advance_job(
        &self,
        segment_id: SegmentId,
        asset_url: impl Into<String>,
        render_job_id: RenderJobId,
    ) -> StateResult<ProgressOutcome> {
        let mut tx = self.pool.begin().await?;

        let segment_result = sqlx::query(
            "UPDATE segments SET status = 'completed', asset_url = $1, updated_at = now()
             WHERE id = $2 AND status = 'generating'",
        )
        .bind(asset_url.into())
        .bind(segment_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        let advanced = segment_result.rows_affected() == 1;

        let row = if advanced {
            sqlx::query(
                "UPDATE render_jobs SET segments_completed = segments_completed + 1, updated_at = now()
                 WHERE id = $1
                 RETURNING segments_completed, segments_total",
            )
            .bind(render_job_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query("SELECT segments_completed, segments_total FROM render_jobs WHERE id = $1")
                .bind(render_job_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?
        };

        tx.commit().await?;

        Ok(ProgressOutcome {
            advanced,
            segments_completed: row.get("segments_completed"),
            segments_total: row.get("segments_total"),
        })
    }

    // ---- Render jobs --------------------------------------------------

    pub async fn create_render_job(&self, job: &RenderJob) -> StateResult<()> {
        let ids: Vec<uuid::Uuid> = job.segment_ids.iter().map(|s| s.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO render_jobs (id, project_id, status, segments_total, segments_completed, segment_ids, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(job.id.as_uuid())
        .bind(job.project_id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.segments_total)
        .bind(job.segments_completed)
        .bind(&ids)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent COMPLETED render job for a project, if any — the
    /// baseline the orchestrator diffs against.
    pub async fn get_latest_completed_render_job(&self, project_id: ProjectId) -> StateResult<Option<RenderJob>> {
        let row = sqlx::query(&format!(
            "{} WHERE project_id = $1 AND status = 'completed' ORDER BY created_at DESC LIMIT 1",
            RENDER_JOB_COLUMNS_SELECT_BASE
        ))
        .bind(project_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_render_job).transpose()
    }

    pub async fn get_render_job(&self, render_job_id: RenderJobId) -> StateResult<RenderJob> {
        let row = sqlx::query(RENDER_JOB_COLUMNS_SELECT)
            .bind(render_job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StateError::not_found(format!("render job {render_job_id}")))?;
        row_to_render_job(row)
    }

    pub async fn mark_render_job_status(&self, render_job_id: RenderJobId, status: RenderJobStatus) -> StateResult<()> {
        sqlx::query("UPDATE render_jobs SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(render_job_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a render job COMPLETED with the final composed asset. Satisfies
    /// I2 by setting both fields together.
    pub async fn complete_render_job(&self, render_job_id: RenderJobId, final_asset_url: impl Into<String>) -> StateResult<()> {
        sqlx::query(
            "UPDATE render_jobs SET status = 'completed', final_asset_url = $1, updated_at = now() WHERE id = $2",
        )
        .bind(final_asset_url.into())
        .bind(render_job_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_render_job(&self, render_job_id: RenderJobId, error_message: impl Into<String>) -> StateResult<()> {
        sqlx::query("UPDATE render_jobs SET status = 'failed', error_message = $1, updated_at = now() WHERE id = $2")
            .bind(error_message.into())
            .bind(render_job_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

const SEGMENT_COLUMNS_SELECT_BASE: &str = "SELECT id, project_id, order_index, prompt, model_params, status, asset_url, external_job_id, error_message, error_code, created_at, updated_at FROM segments";
const SEGMENT_COLUMNS_SELECT: &str = "SELECT id, project_id, order_index, prompt, model_params, status, asset_url, external_job_id, error_message, error_code, created_at, updated_at FROM segments WHERE id = $1";
const RENDER_JOB_COLUMNS_SELECT: &str = "SELECT id, project_id, status, segments_total, segments_completed, segment_ids, final_asset_url, error_message, created_at, updated_at FROM render_jobs WHERE id = $1";

fn row_to_segment(row: sqlx::postgres::PgRow) -> StateResult<Segment> {
    let status_str: String = row.get("status");
    let status = SegmentStatus::from_str(&status_str).map_err(StateError::config)?;
    let error_code: Option<String> = row.get("error_code");
    let error_code = error_code
        .map(|s| parse_error_code(&s))
        .transpose()?;

    Ok(Segment {
        id: SegmentId(row.get("id")),
        project_id: ProjectId(row.get("project_id")),
        order_index: row.get("order_index"),
        prompt: row.get("prompt"),
        model_params: row.get("model_params"),
        status,
        asset_url: row.get("asset_url"),
        external_job_id: row.get("external_job_id"),
        error_message: row.get("error_message"),
        error_code,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn row_to_render_job(row: sqlx::postgres::PgRow) -> StateResult<RenderJob> {
    let status_str: String = row.get("status");
    let status = RenderJobStatus::from_str(&status_str).map_err(StateError::config)?;
    let segment_ids: Vec<uuid::Uuid> = row.get("segment_ids");

    Ok(RenderJob {
        id: RenderJobId(row.get("id")),
        project_id: ProjectId(row.get("project_id")),
        status,
        segments_total: row.get("segments_total"),
        segments_completed: row.get("segments_completed"),
        segment_ids: segment_ids.into_iter().map(SegmentId).collect(),
        final_asset_url: row.get("final_asset_url"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn parse_error_code(s: &str) -> StateResult<AdapterErrorCode> {
    match s {
        "CONNECTION" => Ok(AdapterErrorCode::Connection),
        "TIMEOUT" => Ok(AdapterErrorCode::Timeout),
        "WORKFLOW" => Ok(AdapterErrorCode::Workflow),
        "PARAMETERS" => Ok(AdapterErrorCode::Parameters),
        "GENERATION" => Ok(AdapterErrorCode::Generation),
        "OUTPUT" => Ok(AdapterErrorCode::Output),
        other => Err(StateError::config(format!("unknown error_code column value: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_outcome_reports_full_completion() {
        let outcome = ProgressOutcome {
            advanced: true,
            segments_completed: 3,
            segments_total: 3,
        };
        assert!(outcome.job_is_fully_completed());
    }

    #[test]
    fn progress_outcome_reports_partial_completion() {
        let outcome = ProgressOutcome {
            advanced: true,
            segments_completed: 2,
            segments_total: 3,
        };
        assert!(!outcome.job_is_fully_completed());
    }
}
