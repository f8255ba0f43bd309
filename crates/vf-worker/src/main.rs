//! AI worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vf_adapter::AdapterFactory;
use vf_queue::{JobQueue, ProgressCache, QueueConfig};
use vf_state::{StateConfig, StateStore};
use vf_storage::ObjectStoreClient;
use vf_worker::{GenerationContext, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("vf_worker=info".parse().unwrap()))
        .init();

    info!("starting vf-worker");

    let config = WorkerConfig::from_env();
    info!(?config, "worker config loaded");

    let state_config = match StateConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load state store config: {e}");
            std::process::exit(1);
        }
    };
    let state = match state_config.connect().await {
        Ok(pool) => StateStore::new(pool),
        Err(e) => {
            error!("failed to connect to the state store: {e}");
            std::process::exit(1);
        }
    };

    let mut queue_config = QueueConfig::from_env();
    if std::env::var("QUEUE_STREAM").is_err() {
        queue_config.stream_name = "renderpipe:generation-tasks".to_string();
    }
    let queue = match JobQueue::new(queue_config) {
        Ok(q) => q,
        Err(e) => {
            error!("failed to create job queue: {e}");
            std::process::exit(1);
        }
    };

    let progress = match ProgressCache::new(
        &std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
    ) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to create progress cache: {e}");
            std::process::exit(1);
        }
    };

    let storage = match ObjectStoreClient::from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to create object store client: {e}");
            std::process::exit(1);
        }
    };

    let adapters = Arc::new(AdapterFactory::new(config.mock_adapter_config()));

    let ctx = GenerationContext {
        config: config.clone(),
        state,
        queue,
        progress,
        storage,
        adapters,
    };

    let executor = Arc::new(JobExecutor::new(config, ctx));

    let shutdown_executor = Arc::clone(&executor);
    let shutdown_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("executor error: {e}");
        std::process::exit(1);
    }

    shutdown_handle.abort();
    info!("vf-worker shutdown complete");
}
