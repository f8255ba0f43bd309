//! Redis Streams broker integration tests.

use uuid::Uuid;
use vf_models::{ProjectId, RenderJobId, SegmentId};
use vf_queue::{GenerationTask, JobQueue, QueueConfig, QueueJob};

fn test_queue() -> JobQueue {
    let mut config = QueueConfig::from_env();
    config.stream_name = format!("renderpipe:test:{}", Uuid::new_v4());
    config.consumer_group = "renderpipe:test-workers".to_string();
    config.dlq_stream_name = format!("{}:dlq", config.stream_name);
    JobQueue::new(config).expect("failed to create queue")
}

fn sample_task() -> GenerationTask {
    GenerationTask::new(
        RenderJobId::new(),
        ProjectId::new(),
        SegmentId::new(),
        "a dog running through a field",
        serde_json::json!({"duration_seconds": 5}),
    )
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn connects_and_initializes_consumer_group() {
    dotenvy::dotenv().ok();

    let queue = test_queue();
    queue.init().await.expect("failed to initialize consumer group");

    let len = queue.len().await.expect("failed to get queue length");
    assert_eq!(len, 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_consume_ack_cycle() {
    dotenvy::dotenv().ok();

    let queue = test_queue();
    queue.init().await.expect("failed to initialize consumer group");

    let task = sample_task();
    let segment_id = task.segment_id;
    queue.enqueue_generation_task(task).await.expect("failed to enqueue");

    let jobs = queue.consume("test-consumer", 1000, 10).await.expect("failed to consume");
    assert_eq!(jobs.len(), 1);

    let (message_id, job) = &jobs[0];
    match job {
        QueueJob::Generation(t) => assert_eq!(t.segment_id, segment_id),
        QueueJob::Composition(_) => panic!("expected a generation task"),
    }

    queue.ack(message_id).await.expect("failed to ack");
    assert_eq!(queue.len().await.expect("failed to get queue length"), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn duplicate_task_is_rejected() {
    dotenvy::dotenv().ok();

    let queue = test_queue();
    queue.init().await.expect("failed to initialize consumer group");

    let task = sample_task();
    queue
        .enqueue_generation_task(task.clone())
        .await
        .expect("first enqueue should succeed");

    let result = queue.enqueue_generation_task(task).await;
    assert!(result.is_err(), "re-enqueuing the same (render job, segment) pair should be rejected");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn claim_pending_reclaims_abandoned_tasks() {
    dotenvy::dotenv().ok();

    let queue = test_queue();
    queue.init().await.expect("failed to initialize consumer group");

    queue
        .enqueue_generation_task(sample_task())
        .await
        .expect("failed to enqueue");

    // Consumer A reads it but never acks — simulates a crashed worker.
    let jobs = queue.consume("consumer-a", 1000, 10).await.expect("failed to consume");
    assert_eq!(jobs.len(), 1);

    let claimed = queue
        .claim_pending("consumer-b", 0, 10)
        .await
        .expect("failed to claim pending tasks");
    assert_eq!(claimed.len(), 1, "an idle-0ms claim should reclaim the unacked message immediately");

    queue.ack(&claimed[0].0).await.expect("failed to ack reclaimed task");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn exhausted_retries_move_task_to_dlq() {
    dotenvy::dotenv().ok();

    let queue = test_queue();
    queue.init().await.expect("failed to initialize consumer group");

    let task = sample_task();
    let wrapped = QueueJob::Generation(task.clone());
    queue.enqueue_generation_task(task).await.expect("failed to enqueue");

    let jobs = queue.consume("test-consumer", 1000, 10).await.expect("failed to consume");
    let (message_id, _) = &jobs[0];

    queue
        .dlq(message_id, &wrapped, "adapter exhausted all retries")
        .await
        .expect("failed to move task to DLQ");

    assert_eq!(queue.dlq_len().await.expect("failed to get DLQ length"), 1);
    assert_eq!(queue.len().await.expect("failed to get queue length"), 0);
}
