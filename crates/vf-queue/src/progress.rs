//! Progress cache (component C4) and the segment-completed fanout event.
//!
//! The cache is advisory: a low-latency hash of render-job progress for UI
//! polling, kept approximately in sync with the state store. It is never the
//! source of truth and a missing or stale entry is not an error condition —
//! the next worker event refreshes it.

use redis::AsyncCommands;
use tracing::debug;
use vf_models::{RenderJobId, SegmentId};

use crate::error::QueueResult;
use crate::job::SegmentCompletedEvent;

const PROGRESS_KEY_PREFIX: &str = "renderpipe:progress:";
const SEGMENT_KEY_PREFIX: &str = "renderpipe:segment:";
const PROGRESS_TTL_SECS: i64 = 86400;
const FANOUT_CHANNEL: &str = "renderpipe:segment_completed";

/// Snapshot of a render job's progress hash.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub segments_total: i64,
    pub segments_completed: i64,
    pub status: String,
    pub progress_percentage: u8,
}

impl ProgressSnapshot {
    fn percentage(segments_completed: i64, segments_total: i64) -> u8 {
        if segments_total <= 0 {
            return 100;
        }
        ((segments_completed as f64 / segments_total as f64) * 100.0).clamp(0.0, 100.0) as u8
    }
}

/// Redis-backed progress hash plus the segment-completion fanout channel.
#[derive(Clone)]
pub struct ProgressCache {
    client: redis::Client,
}

impl ProgressCache {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    fn key(render_job_id: RenderJobId) -> String {
        format!("{PROGRESS_KEY_PREFIX}{render_job_id}")
    }

    fn segment_key(segment_id: SegmentId) -> String {
        format!("{SEGMENT_KEY_PREFIX}{segment_id}")
    }

    /// Set a single segment's advisory status, independent of the render
    /// job's aggregate hash. Dispatch-time bookkeeping only: never writes
    /// `segments_total`/`segments_completed`, so it can't clobber the
    /// render-job-level counters another caller owns.
    pub async fn set_segment_status(
        &self,
        segment_id: SegmentId,
        status: &str,
        render_job_id: RenderJobId,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::segment_key(segment_id);

        redis::pipe()
            .hset(&key, "status", status)
            .ignore()
            .hset(&key, "render_job_id", render_job_id.to_string())
            .ignore()
            .expire(&key, PROGRESS_TTL_SECS)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(%segment_id, status, "Set segment status");
        Ok(())
    }

    /// Read a segment's advisory status, if cached.
    pub async fn get_segment_status(&self, segment_id: SegmentId) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.hget(Self::segment_key(segment_id), "status").await?;
        Ok(value)
    }

    /// Set the full progress mapping for a render job, with TTL.
    pub async fn set_mapping(
        &self,
        render_job_id: RenderJobId,
        segments_total: i64,
        segments_completed: i64,
        status: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::key(render_job_id);
        let percentage = ProgressSnapshot::percentage(segments_completed, segments_total);

        redis::pipe()
            .hset(&key, "segments_total", segments_total)
            .ignore()
            .hset(&key, "segments_completed", segments_completed)
            .ignore()
            .hset(&key, "status", status)
            .ignore()
            .hset(&key, "progress_percentage", percentage)
            .ignore()
            .expire(&key, PROGRESS_TTL_SECS)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(%render_job_id, status, percentage, "Set progress mapping");
        Ok(())
    }

    /// Atomically increment segments_completed and refresh the percentage.
    pub async fn increment_completed(&self, render_job_id: RenderJobId) -> QueueResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::key(render_job_id);

        let completed: i64 = conn.hincr(&key, "segments_completed", 1).await?;
        let total: i64 = conn.hget(&key, "segments_total").await.unwrap_or(0);
        let percentage = ProgressSnapshot::percentage(completed, total);
        conn.hset::<_, _, _, ()>(&key, "progress_percentage", percentage).await?;

        Ok(completed)
    }

    /// Read a single field from the progress hash.
    pub async fn hget(&self, render_job_id: RenderJobId, field: &str) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.hget(Self::key(render_job_id), field).await?;
        Ok(value)
    }

    /// Read the full progress hash.
    pub async fn hgetall(&self, render_job_id: RenderJobId) -> QueueResult<Option<ProgressSnapshot>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::key(render_job_id);

        let map: std::collections::HashMap<String, String> = conn.hgetall(&key).await?;
        if map.is_empty() {
            return Ok(None);
        }

        Ok(Some(ProgressSnapshot {
            segments_total: map.get("segments_total").and_then(|v| v.parse().ok()).unwrap_or(0),
            segments_completed: map.get("segments_completed").and_then(|v| v.parse().ok()).unwrap_or(0),
            status: map.get("status").cloned().unwrap_or_default(),
            progress_percentage: map.get("progress_percentage").and_then(|v| v.parse().ok()).unwrap_or(0),
        }))
    }

    /// Publish the advisory segment-completion fanout event. Not consumed by
    /// any queue-reading worker; the composition trigger is decided inline.
    pub async fn publish_segment_completed(&self, event: &SegmentCompletedEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(event)?;
        conn.publish::<_, _, ()>(FANOUT_CHANNEL, payload).await?;
        Ok(())
    }

    /// Subscribe to segment-completion fanout events.
    pub async fn subscribe_segment_completed(
        &self,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = SegmentCompletedEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(FANOUT_CHANNEL).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_full_for_empty_regeneration_set() {
        assert_eq!(ProgressSnapshot::percentage(0, 0), 100);
    }

    #[test]
    fn percentage_tracks_partial_progress() {
        assert_eq!(ProgressSnapshot::percentage(1, 4), 25);
        assert_eq!(ProgressSnapshot::percentage(4, 4), 100);
    }
}
