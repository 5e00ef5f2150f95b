use std::future::Future;
use std::time::Duration;

use super::types::GuardError;
use tracing::warn;

/// Retry configuration for outbound calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to one `base_delay` of random jitter to each backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Calculate the backoff before the next attempt (0-indexed).
    ///
    /// Exponential `base * 2^attempt` plus random jitter in `[0, base)`,
    /// capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let exp = base * 2.0_f64.powi(attempt.min(30) as i32);
        let jitter = if self.jitter {
            rand::random::<f64>() * base
        } else {
            0.0
        };
        let secs = (exp + jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Execute an async operation with retry logic.
///
/// Retries only errors classified as transient, up to `max_attempts` total
/// attempts. Permanent failures and breaker rejections return immediately.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, GuardError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GuardError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable() || attempt + 1 >= max_attempts {
                    if !classification.retryable() {
                        warn!(
                            operation = operation_name,
                            error_type = classification.error_type,
                            "Non-retryable error, failing immediately"
                        );
                    } else {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            "Max retries exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = config.backoff_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GuardError::Internal("Retry loop exited unexpectedly".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_is_exponential_without_jitter() {
        let config = no_jitter();
        assert_eq!(config.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_capped() {
        let config = no_jitter();
        assert_eq!(config.backoff_delay(20), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let config = RetryConfig::default();
        let d1 = config.backoff_delay(1);
        // 2 * 0.5s + jitter in [0, 0.5s)
        assert!(d1.as_secs_f64() >= 1.0 && d1.as_secs_f64() < 1.5);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let result = with_retry("test", &no_jitter(), || async {
            Ok::<_, GuardError>(42)
        }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_from_transient() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry("test", &no_jitter(), || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(GuardError::Timeout("slow".into()))
                } else {
                    Ok("ok")
                }
            }
        }).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry("test", &no_jitter(), || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GuardError::NotFound("indexer 9".into()))
            }
        }).await;

        assert!(matches!(result, Err(GuardError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1); // Only 1 attempt
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry("test", &no_jitter(), || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(GuardError::Network("connection refused".into()))
            }
        }).await;

        assert!(matches!(result, Err(GuardError::Network(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
