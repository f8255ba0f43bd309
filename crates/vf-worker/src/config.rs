//! AI worker process configuration, read once at startup (§6).

use std::time::Duration;

use vf_adapter::MockAdapterConfig;

/// Configuration for one AI worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How many generation tasks this process handles concurrently. The
    /// broker's own prefetch stays 1 per handler; this is "one task per held
    /// semaphore permit" (§5).
    pub max_concurrent_tasks: usize,
    /// Total wall-clock budget for one segment's initiate+poll lifecycle.
    pub poll_timeout: Duration,
    /// Interval between `get_status` probes.
    pub poll_interval: Duration,
    /// `initiate` retry attempts (counts the first attempt).
    pub initiate_max_attempts: u32,
    pub initiate_base_delay: Duration,
    pub initiate_max_delay: Duration,
    /// How often the reaper scans for abandoned in-flight messages.
    pub claim_interval: Duration,
    /// Minimum idle time before an abandoned message is reclaimed.
    pub claim_min_idle: Duration,
    /// Scratch directory for downloaded segment assets before upload.
    pub work_dir: std::path::PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            poll_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(1),
            initiate_max_attempts: 3,
            initiate_base_delay: Duration::from_secs(2),
            initiate_max_delay: Duration::from_secs(10),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            work_dir: std::env::temp_dir().join("render-pipeline-worker"),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_tasks: env_parse("WORKER_MAX_CONCURRENT_TASKS", default.max_concurrent_tasks),
            poll_timeout: env_secs("WORKER_POLL_TIMEOUT_SECS", default.poll_timeout),
            poll_interval: env_secs("WORKER_POLL_INTERVAL_SECS", default.poll_interval),
            initiate_max_attempts: env_parse("WORKER_INITIATE_MAX_ATTEMPTS", default.initiate_max_attempts),
            initiate_base_delay: env_secs("WORKER_INITIATE_BASE_DELAY_SECS", default.initiate_base_delay),
            initiate_max_delay: env_secs("WORKER_INITIATE_MAX_DELAY_SECS", default.initiate_max_delay),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", default.claim_interval),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS", default.claim_min_idle),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(std::path::PathBuf::from)
                .unwrap_or(default.work_dir),
        }
    }

    /// The mock adapter reads its own behavior knobs from the environment so
    /// local/dev deployments can tune `fail_rate`/timing without code changes.
    pub fn mock_adapter_config(&self) -> MockAdapterConfig {
        MockAdapterConfig {
            generation_delay: env_secs("MOCK_ADAPTER_GENERATION_DELAY_SECS", Duration::from_millis(200)),
            fail_rate: env_parse("MOCK_ADAPTER_FAIL_RATE", 0.0),
            work_dir: self.work_dir.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_budgets() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_secs(180));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.initiate_max_attempts, 3);
    }
}
