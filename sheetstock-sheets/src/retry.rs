//! Exponential backoff around remote calls.
//!
//! Only rate-limit and quota failures are retried (see
//! [`RemoteError::is_retryable`](sheetstock_core::RemoteError::is_retryable)).
//! Delays start at `initial_backoff_ms` and double on each attempt, with no
//! jitter.

use sheetstock_core::{RetryConfig, StockResult};
use std::future::Future;

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `max_retries` attempts have been made.
///
/// `max_retries` caps the total number of calls. When attempts run out the
/// last error is returned unchanged.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, mut operation: F) -> StockResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StockResult<T>>,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(attempts = attempt, error = %e, "Giving up after repeated rate limiting");
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetstock_core::{RemoteError, StockError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn too_many_requests() -> StockError {
        RemoteError::RequestFailed {
            service: "google_sheets".to_string(),
            status: 429,
            reason: Some("rateLimitExceeded".to_string()),
            message: "Too many requests".to_string(),
        }
        .into()
    }

    /// Fails with a 429 `failures` times, then returns the call count.
    async fn flaky(calls: &AtomicU32, failures: u32) -> StockResult<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(too_many_requests())
        } else {
            Ok(n)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_fifth_attempt() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default().with_max_retries(5);

        let result = with_backoff(&config, || flaky(&calls, 4)).await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default().with_max_retries(3);

        let err = with_backoff(&config, || flaky(&calls, 4)).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            StockError::Remote(remote) => assert_eq!(remote.status(), Some(429)),
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let err = with_backoff(&config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StockError::from(RemoteError::RequestFailed {
                service: "google_sheets".to_string(),
                status: 404,
                reason: None,
                message: "Requested entity was not found".to_string(),
            }))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_double() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default()
            .with_max_retries(4)
            .with_initial_backoff(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        with_backoff(&config, || flaky(&calls, 3)).await.unwrap();
        // 500 + 1000 + 2000
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_message_is_retried() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();

        let result = with_backoff(&config, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StockError::from(RemoteError::Transport {
                    service: "google_sheets".to_string(),
                    message: "Quota exceeded for quota metric 'Read requests'".to_string(),
                }))
            } else {
                Ok("ok")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
