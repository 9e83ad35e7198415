//! Bounded retry with exponential backoff
//!
//! Every strategy call runs through [`run_with_retry`]: at most
//! `max_attempts` tries in total, each under its own wall-clock timeout,
//! sleeping `base_delay * 2^attempt` between tries. Only errors for which
//! `DownloadError::is_retryable` holds get another try.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

use super::errors::DownloadError;

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. An attempt that exceeds `attempt_timeout` counts as a
/// `NetworkTimeout`.
pub async fn run_with_retry<F, Fut, T>(
    config: &RetryConfig,
    attempt_timeout: Duration,
    mut operation: F,
) -> Result<T, DownloadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        let outcome = match tokio::time::timeout(attempt_timeout, operation(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(DownloadError::NetworkTimeout(format!(
                "attempt exceeded {}s",
                attempt_timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = config.backoff(attempt);
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with permanent error");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_uses_every_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = run_with_retry(&config(3), Duration::from_secs(60), |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::NetworkTimeout("socket".to_string()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(DownloadError::NetworkTimeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = run_with_retry(&config(3), Duration::from_secs(60), |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::NotFound("gone".to_string()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DownloadError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_exponential() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = run_with_retry(&config(3), Duration::from_secs(60), |_| async {
            Err(DownloadError::CapabilityUnavailable("chrome".to_string()))
        })
        .await;
        // 1s after the first failure, 2s after the second
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out_and_retries() {
        let result = run_with_retry(&config(2), Duration::from_secs(5), |attempt| async move {
            if attempt == 0 {
                std::future::pending::<()>().await;
            }
            Ok(attempt)
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
