//! Composition worker process configuration, read once at startup (§6).

use std::path::PathBuf;

/// Configuration for the composition worker process.
///
/// Spec §4.5 notes one composition-worker process is sufficient (more is
/// safe) — `max_concurrent_tasks` still exists so an operator can run a few
/// composition jobs in flight per process without needing extra processes.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    pub max_concurrent_tasks: usize,
    pub claim_interval: std::time::Duration,
    pub claim_min_idle: std::time::Duration,
    pub work_dir: PathBuf,
    pub ffmpeg_binary: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            claim_interval: std::time::Duration::from_secs(30),
            claim_min_idle: std::time::Duration::from_secs(300),
            work_dir: std::env::temp_dir().join("render-pipeline-compositor"),
            ffmpeg_binary: "ffmpeg".to_string(),
        }
    }
}

impl CompositorConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_tasks: env_parse("COMPOSITOR_MAX_CONCURRENT_TASKS", default.max_concurrent_tasks),
            claim_interval: env_secs("COMPOSITOR_CLAIM_INTERVAL_SECS", default.claim_interval),
            claim_min_idle: env_secs("COMPOSITOR_CLAIM_MIN_IDLE_SECS", default.claim_min_idle),
            work_dir: std::env::var("COMPOSITOR_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.work_dir),
            ffmpeg_binary: std::env::var("COMPOSITOR_FFMPEG_BINARY").unwrap_or(default.ffmpeg_binary),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: std::time::Duration) -> std::time::Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .map(std::time::Duration::from_secs_f64)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CompositorConfig::default();
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.ffmpeg_binary, "ffmpeg");
    }
}
