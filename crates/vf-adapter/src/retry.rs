//! Exponential backoff with jitter for retryable adapter calls.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{AdapterError, AdapterResult};

/// Retry an adapter operation on retryable errors, with exponential backoff
/// plus jitter between attempts. `max_attempts` counts the first attempt, so
/// `max_attempts = 3` means up to two retries.
pub async fn with_retry<F, Fut, T>(max_attempts: u32, base_delay: Duration, max_delay: Duration, operation: F) -> AdapterResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = AdapterResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = backoff_with_jitter(base_delay, max_delay, attempt);
                warn!(attempt = attempt + 1, ?delay, "Adapter call failed, retrying: {}", e);
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| AdapterError::connection("retry loop exhausted with no recorded error")))
}

fn backoff_with_jitter(base_delay: Duration, max_delay: Duration, attempt: u32) -> Duration {
    let exp = base_delay.saturating_mul(2u32.saturating_pow(attempt)).min(max_delay);
    let jitter_ms = rand::thread_rng().gen_range(0..=exp.as_millis() as u64 / 2);
    exp + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vf_models::AdapterErrorCode;

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), Duration::from_millis(10), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AdapterError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), Duration::from_millis(10), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(AdapterError::connection("not yet"))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result: AdapterResult<()> = with_retry(3, Duration::from_millis(1), Duration::from_millis(10), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::new(AdapterErrorCode::Parameters, "bad params"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
