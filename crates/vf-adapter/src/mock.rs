//! Reference adapter that produces a real, playable video via `ffmpeg`.
//!
//! Grounded on the original mock adapter: a solid-color `lavfi` source with
//! the prompt text drawn over it, encoded libx264/yuv420p so the output
//! satisfies the fixed codec contract the composition step assumes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;
use vf_models::AdapterErrorCode;

use crate::error::{AdapterError, AdapterResult};
use crate::traits::ModelAdapter;
use crate::types::{GenerationResult, GenerationStatus};

#[derive(Debug, Clone)]
struct MockJob {
    status: GenerationStatus,
    prompt: String,
    aspect_ratio: String,
    duration_secs: u32,
    error: Option<(AdapterErrorCode, String)>,
    output_path: Option<String>,
}

/// Configuration for the mock adapter's simulated timing/failure behavior.
#[derive(Debug, Clone)]
pub struct MockAdapterConfig {
    /// How long `get_status` reports PROCESSING before flipping terminal.
    pub generation_delay: Duration,
    /// Probability (0.0-1.0) that a job fails with a random taxonomy code
    /// when `force_error` isn't set.
    pub fail_rate: f64,
    /// Directory where generated video files are written.
    pub work_dir: std::path::PathBuf,
}

impl Default for MockAdapterConfig {
    fn default() -> Self {
        Self {
            generation_delay: Duration::from_millis(200),
            fail_rate: 0.0,
            work_dir: std::env::temp_dir(),
        }
    }
}

/// ffmpeg-backed reference implementation of [`ModelAdapter`].
///
/// Jobs are tracked in memory; `initiate` does the ffmpeg work inline and
/// records the outcome, since the mock has no real external service to poll.
pub struct MockAdapter {
    config: MockAdapterConfig,
    jobs: Mutex<HashMap<String, MockJob>>,
}

impl MockAdapter {
    pub fn new(config: MockAdapterConfig) -> Self {
        Self {
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn resolution_for(aspect_ratio: &str) -> (u32, u32) {
        match aspect_ratio {
            "9:16" => (720, 1280),
            "1:1" => (1024, 1024),
            _ => (1280, 720),
        }
    }

    async fn render_video(prompt: &str, aspect_ratio: &str, duration_secs: u32, output_path: &std::path::Path) -> AdapterResult<()> {
        let (width, height) = Self::resolution_for(aspect_ratio);
        let display_text: String = prompt.chars().take(100).collect();
        let escaped = display_text.replace('\'', "'\\''").replace(':', "\\:");

        let output = tokio::process::Command::new("ffmpeg")
            .arg("-f")
            .arg("lavfi")
            .arg("-i")
            .arg(format!("color=c=blue:s={width}x{height}:d={duration_secs}"))
            .arg("-vf")
            .arg(format!(
                "drawtext=text='{escaped}':fontsize=32:fontcolor=white:x=(w-text_w)/2:y=(h-text_h)/2"
            ))
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-y")
            .arg(output_path)
            .output()
            .await
            .map_err(|e| AdapterError::generation(format!("failed to spawn ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(AdapterError::output(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ModelAdapter for MockAdapter {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn initiate(&self, prompt: &str, params: &serde_json::Value) -> AdapterResult<String> {
        let external_job_id = format!("mock-{}", Uuid::new_v4());
        let aspect_ratio = params.get("aspect_ratio").and_then(|v| v.as_str()).unwrap_or("16:9").to_string();
        let duration_secs = params.get("duration").and_then(|v| v.as_u64()).unwrap_or(5) as u32;
        let force_error = params.get("force_error").and_then(|v| v.as_str());

        let error = match force_error {
            Some(code) => Some((parse_error_code(code)?, format!("forced error: {code}"))),
            None if rand::thread_rng().gen_bool(self.config.fail_rate.clamp(0.0, 1.0)) => {
                Some((AdapterErrorCode::Generation, "simulated generation failure".to_string()))
            }
            None => None,
        };

        let output_path = if error.is_none() {
            let path = self.config.work_dir.join(format!("{external_job_id}.mp4"));
            Some(path.to_string_lossy().to_string())
        } else {
            None
        };

        self.jobs.lock().unwrap().insert(
            external_job_id.clone(),
            MockJob {
                status: GenerationStatus::Processing,
                prompt: prompt.to_string(),
                aspect_ratio,
                duration_secs,
                error,
                output_path,
            },
        );

        debug!(external_job_id = %external_job_id, "Mock adapter job initiated");
        Ok(external_job_id)
    }

    async fn get_status(&self, external_job_id: &str) -> AdapterResult<GenerationStatus> {
        tokio::time::sleep(self.config.generation_delay).await;

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(external_job_id)
            .ok_or_else(|| AdapterError::workflow(format!("unknown job: {external_job_id}")))?;

        if job.status == GenerationStatus::Processing {
            job.status = if job.error.is_some() {
                GenerationStatus::Failed
            } else {
                GenerationStatus::Completed
            };
        }

        Ok(job.status)
    }

    async fn get_result(&self, external_job_id: &str) -> AdapterResult<GenerationResult> {
        let job = {
            let jobs = self.jobs.lock().unwrap();
            jobs.get(external_job_id)
                .cloned()
                .ok_or_else(|| AdapterError::workflow(format!("unknown job: {external_job_id}")))?
        };

        if let Some((code, message)) = job.error {
            return Ok(GenerationResult::failed(code, message));
        }

        let output_path = job
            .output_path
            .as_ref()
            .ok_or_else(|| AdapterError::output("completed job has no output path"))?;

        Self::render_video(&job.prompt, &job.aspect_ratio, job.duration_secs, std::path::Path::new(output_path)).await?;

        Ok(GenerationResult::completed(format!("file://{output_path}")))
    }

    async fn cancel(&self, external_job_id: &str) -> AdapterResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(external_job_id) {
            job.status = GenerationStatus::Failed;
            job.error = Some((AdapterErrorCode::Generation, "cancelled".to_string()));
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn parse_error_code(code: &str) -> AdapterResult<AdapterErrorCode> {
    match code.to_uppercase().as_str() {
        "CONNECTION" => Ok(AdapterErrorCode::Connection),
        "TIMEOUT" => Ok(AdapterErrorCode::Timeout),
        "WORKFLOW" => Ok(AdapterErrorCode::Workflow),
        "PARAMETERS" => Ok(AdapterErrorCode::Parameters),
        "GENERATION" => Ok(AdapterErrorCode::Generation),
        "OUTPUT" => Ok(AdapterErrorCode::Output),
        other => Err(AdapterError::parameters(format!("unknown force_error code: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initiate_and_status_transition_to_completed() {
        let adapter = MockAdapter::new(MockAdapterConfig {
            generation_delay: Duration::from_millis(1),
            fail_rate: 0.0,
            work_dir: std::env::temp_dir(),
        });

        let job_id = adapter.initiate("a dog running", &serde_json::json!({})).await.unwrap();
        let status = adapter.get_status(&job_id).await.unwrap();
        assert_eq!(status, GenerationStatus::Completed);
    }

    #[tokio::test]
    async fn force_error_produces_the_requested_taxonomy_code() {
        let adapter = MockAdapter::new(MockAdapterConfig {
            generation_delay: Duration::from_millis(1),
            fail_rate: 0.0,
            work_dir: std::env::temp_dir(),
        });

        let job_id = adapter
            .initiate("p", &serde_json::json!({"force_error": "WORKFLOW"}))
            .await
            .unwrap();
        let status = adapter.get_status(&job_id).await.unwrap();
        assert_eq!(status, GenerationStatus::Failed);

        let result = adapter.get_result(&job_id).await.unwrap();
        assert_eq!(result.error_code, Some(AdapterErrorCode::Workflow));
    }

    #[tokio::test]
    async fn unknown_job_id_is_a_workflow_error() {
        let adapter = MockAdapter::new(MockAdapterConfig::default());
        let err = adapter.get_status("no-such-job").await.unwrap_err();
        assert_eq!(err.code, AdapterErrorCode::Workflow);
    }
}
