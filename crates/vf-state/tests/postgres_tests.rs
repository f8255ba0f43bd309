//! PostgreSQL state store integration tests.

use vf_models::{AdapterErrorCode, OwnerId, RenderJob};
use vf_state::{StateConfig, StateStore};

async fn test_store() -> StateStore {
    dotenvy::dotenv().ok();
    let config = StateConfig::from_env().expect("failed to load state store config");
    let pool = config.connect().await.expect("failed to connect to the state store");
    let store = StateStore::new(pool);
    store.migrate().await.expect("failed to run migrations");
    store
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn project_segment_and_render_job_lifecycle() {
    let store = test_store().await;

    let project = store
        .create_project(OwnerId::new(), "integration test project")
        .await
        .expect("failed to create project");

    let segments = vec![
        vf_models::Segment::new(project.id, 0, "a sunrise over mountains", serde_json::json!({})),
        vf_models::Segment::new(project.id, 1, "a river flowing through a forest", serde_json::json!({})),
    ];
    store.create_segments(&segments).await.expect("failed to create segments");

    let segment_ids: Vec<_> = segments.iter().map(|s| s.id).collect();
    let render_job = RenderJob::new(project.id, segment_ids.clone(), 2);
    store.create_render_job(&render_job).await.expect("failed to create render job");

    // First segment: dispatch, then complete.
    let dispatched = store
        .mark_segment_generating(segment_ids[0], "external-job-1")
        .await
        .expect("mark_segment_generating failed");
    assert!(dispatched);

    // A replayed dispatch for the same segment is a no-op.
    let redispatched = store
        .mark_segment_generating(segment_ids[0], "external-job-1-retry")
        .await
        .expect("mark_segment_generating failed");
    assert!(!redispatched);

    let outcome = store
        .complete_segment_and_advance_job(segment_ids[0], "https://example.com/seg0.mp4", render_job.id)
        .await
        .expect("complete_segment_and_advance_job failed");
    assert!(outcome.advanced);
    assert_eq!(outcome.segments_completed, 1);
    assert_eq!(outcome.segments_total, 2);
    assert!(!outcome.job_is_fully_completed());

    // Replaying the same completion a second time must not double-count.
    let replayed = store
        .complete_segment_and_advance_job(segment_ids[0], "https://example.com/seg0.mp4", render_job.id)
        .await
        .expect("replayed complete_segment_and_advance_job failed");
    assert!(!replayed.advanced);
    assert_eq!(replayed.segments_completed, 1);

    // Second segment: dispatch, then fail.
    store
        .mark_segment_generating(segment_ids[1], "external-job-2")
        .await
        .expect("mark_segment_generating failed");
    let failed = store
        .fail_segment(segment_ids[1], AdapterErrorCode::Generation, "model returned an empty output")
        .await
        .expect("fail_segment failed");
    assert!(failed);

    let segment = store.get_segment(segment_ids[1]).await.expect("get_segment failed");
    assert_eq!(segment.status, vf_models::SegmentStatus::Failed);

    // Retrying the failed segment returns it to pending for the next render.
    let retried = store.retry_segment(segment_ids[1]).await.expect("retry_segment failed");
    assert_eq!(retried.status, vf_models::SegmentStatus::Pending);
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn segment_edit_resets_generation_state() {
    let store = test_store().await;

    let project = store
        .create_project(OwnerId::new(), "edit test project")
        .await
        .expect("failed to create project");

    let segment = vf_models::Segment::new(project.id, 0, "original prompt", serde_json::json!({"seed": 1}));
    store.create_segments(&[segment.clone()]).await.expect("failed to create segment");

    store
        .mark_segment_generating(segment.id, "external-job-1")
        .await
        .expect("mark_segment_generating failed");

    let edited = store
        .apply_segment_edit(segment.id, Some("a new prompt".to_string()), None)
        .await
        .expect("apply_segment_edit failed");

    assert_eq!(edited.status, vf_models::SegmentStatus::Pending);
    assert_eq!(edited.prompt, "a new prompt");
    assert!(edited.asset_url.is_none());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn render_job_completion_and_failure() {
    let store = test_store().await;

    let project = store
        .create_project(OwnerId::new(), "render job test project")
        .await
        .expect("failed to create project");

    let segment = vf_models::Segment::new(project.id, 0, "a single segment render", serde_json::json!({}));
    store.create_segments(&[segment.clone()]).await.expect("failed to create segment");

    let job = RenderJob::new(project.id, vec![segment.id], 0);
    store.create_render_job(&job).await.expect("failed to create render job");

    store
        .complete_render_job(job.id, "https://example.com/final.mp4")
        .await
        .expect("complete_render_job failed");
    let completed = store.get_render_job(job.id).await.expect("get_render_job failed");
    assert_eq!(completed.status, vf_models::RenderJobStatus::Completed);
    assert_eq!(completed.final_asset_url.as_deref(), Some("https://example.com/final.mp4"));

    let other_job = RenderJob::new(project.id, vec![segment.id], 0);
    store.create_render_job(&other_job).await.expect("failed to create second render job");
    store
        .fail_render_job(other_job.id, "composition failed: no segments available")
        .await
        .expect("fail_render_job failed");
    let failed = store.get_render_job(other_job.id).await.expect("get_render_job failed");
    assert_eq!(failed.status, vf_models::RenderJobStatus::Failed);
}
