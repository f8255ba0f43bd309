//! Semaphore-gated task executor for the composition worker: one process is
//! sufficient per spec, but the consume loop still bounds in-flight
//! concatenations per process via a small semaphore.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vf_queue::QueueJob;

use crate::composition::{self, CompositionContext, Outcome};
use crate::config::CompositorConfig;
use crate::error::CompositorResult;

pub struct JobExecutor {
    config: CompositorConfig,
    ctx: CompositionContext,
    semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: CompositorConfig, ctx: CompositionContext) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("vf-compositor-{}", Uuid::new_v4());

        Self {
            config,
            ctx,
            semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub async fn run(&self) -> CompositorResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_concurrent = self.config.max_concurrent_tasks,
            "starting composition worker executor"
        );

        self.ctx.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_once() => {
                    if let Err(e) = result {
                        error!("error consuming composition tasks: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("waiting for in-flight compositions to complete");
        let _ = tokio::time::timeout(Duration::from_secs(120), self.wait_for_idle()).await;
        info!("composition worker executor stopped");
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.ctx.queue.clone();
        let ctx = self.ctx.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let claim_min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue.claim_pending(&consumer_name, claim_min_idle_ms, 10).await {
                            Ok(claimed) if !claimed.is_empty() => {
                                info!(count = claimed.len(), "reclaimed abandoned composition tasks");
                                for (message_id, job) in claimed {
                                    let ctx = ctx.clone();
                                    let permit = match semaphore.clone().acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => break,
                                    };
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        dispatch(&ctx, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("failed to claim pending composition tasks: {e}"),
                        }
                    }
                }
            }
        })
    }

    async fn consume_once(&self) -> CompositorResult<()> {
        let available = self.semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let messages = self
            .ctx
            .queue
            .consume(&self.consumer_name, 1000, available.min(10))
            .await?;

        if messages.is_empty() {
            return Ok(());
        }

        debug!(count = messages.len(), "consumed composition tasks");

        for (message_id, job) in messages {
            let ctx = self.ctx.clone();
            let permit = self.semaphore.clone().acquire_owned().await.map_err(|_| {
                crate::error::CompositorError::config("semaphore closed during shutdown")
            })?;

            tokio::spawn(async move {
                let _permit = permit;
                dispatch(&ctx, message_id, job).await;
            });
        }

        Ok(())
    }

    async fn wait_for_idle(&self) {
        loop {
            if self.semaphore.available_permits() == self.config.max_concurrent_tasks {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

async fn dispatch(ctx: &CompositionContext, message_id: String, job: QueueJob) {
    let task = match job {
        QueueJob::Composition(task) => task,
        QueueJob::Generation(_) => {
            warn!(%message_id, "generation task delivered to the composition worker's stream, acking and dropping");
            ctx.queue.ack(&message_id).await.ok();
            return;
        }
    };

    let render_job_id = task.render_job_id;
    let wrapped = QueueJob::Composition(task.clone());

    match composition::handle(ctx, task).await {
        Outcome::Handled => {
            if let Err(e) = ctx.queue.ack(&message_id).await {
                error!(%render_job_id, "failed to ack composition task: {e}");
            }
            ctx.queue.clear_dedup(&wrapped).await.ok();
        }
        Outcome::Infra(err) => {
            let retry_count = ctx.queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
            let max_retries = ctx.queue.max_retries();

            if retry_count >= max_retries {
                warn!(%render_job_id, retry_count, max_retries, "composition task exceeded max retries, moving to DLQ");
                ctx.queue.dlq(&message_id, &wrapped, &err.to_string()).await.ok();
                ctx.queue.clear_dedup(&wrapped).await.ok();
            } else {
                warn!(%render_job_id, retry_count, max_retries, "infra error, leaving message for redelivery: {err}");
            }
        }
    }
}
