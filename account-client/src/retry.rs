use std::future::Future;
use std::time::Duration;

use crate::AccountClientError;

/// Retry policy for outbound calls to the Accounts service (`retry.max-attempts`,
/// `retry.wait-duration`). Only network errors, timeouts, and 5xx responses are
/// retried; the backend maps 4xx responses to non-retryable errors before they
/// ever reach here.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_wait: Duration,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_wait: Duration::from_millis(1000),
            exponential_backoff: false,
        }
    }
}

fn is_retryable(err: &AccountClientError) -> bool {
    matches!(err, AccountClientError::Unavailable(_))
}

/// Runs `operation` up to `config.max_attempts` times, sleeping between attempts.
/// Errors that are not retryable (not-found, rejected) return immediately on the
/// first attempt without consuming the remaining budget.
pub async fn retry_with_backoff<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
    context: &str,
) -> Result<T, AccountClientError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, AccountClientError>>,
{
    let mut wait = config.initial_wait;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => return Err(err),
            Err(err) if attempt >= config.max_attempts => {
                tracing::warn!(context, attempt, "exhausted retry attempts: {err}");
                return Err(err);
            }
            Err(err) => {
                tracing::debug!(context, attempt, "retrying after error: {err}");
                tokio::time::sleep(wait).await;
                if config.exponential_backoff {
                    wait *= 2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn succeeds_first_attempt_without_sleeping() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            initial_wait: Duration::from_millis(1),
            exponential_backoff: false,
        };
        let result = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AccountClientError>(42)
            },
            &config,
            "test",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 5,
            initial_wait: Duration::from_millis(1),
            exponential_backoff: false,
        };
        let result = retry_with_backoff(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(AccountClientError::Unavailable("simulated".into()))
                } else {
                    Ok(42)
                }
            },
            &config,
            "test",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_wait: Duration::from_millis(1),
            exponential_backoff: false,
        };
        let result: Result<(), _> = retry_with_backoff(
            || async { Err(AccountClientError::Unavailable("down".into())) },
            &config,
            "test",
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();
        let result: Result<(), _> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AccountClientError::NotFound("acct-a".into()))
            },
            &config,
            "test",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
