use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{with_retry, GuardError, RetryConfig};
use crate::models::TargetKey;
use super::breaker::CircuitBreakerRegistry;

/// Breaker check, retry with backoff and a per-attempt timeout around an
/// outbound call.
pub struct ResilientCaller {
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl ResilientCaller {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, retry: RetryConfig, call_timeout: Duration) -> Self {
        Self {
            breakers,
            retry,
            call_timeout,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Call a target through its breaker.
    ///
    /// The breaker sees the call once: a success after retries closes it, and
    /// exhausted retries or a permanent error count as a single failure.
    pub async fn call<F, Fut, T>(&self, key: &TargetKey, operation: &str, factory: F) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GuardError>>,
    {
        self.call_judged(key, operation, factory, |_| true).await
    }

    /// Like [`call`](Self::call), but an `Ok` value that `healthy` rejects is
    /// recorded as a breaker failure. The value is still returned and is not
    /// retried.
    ///
    /// The breaker permit lives for the whole call including retries. If this
    /// future is dropped mid-call, a half-open trial is counted as failed.
    pub async fn call_judged<F, Fut, T, J>(
        &self,
        key: &TargetKey,
        operation: &str,
        factory: F,
        healthy: J,
    ) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GuardError>>,
        J: Fn(&T) -> bool,
    {
        let permit = self.breakers.try_acquire(key)?;

        let result = self.call_unguarded(operation, factory).await;
        match &result {
            Ok(value) if healthy(value) => permit.succeeded(),
            _ => permit.failed(),
        }
        result
    }

    /// Retry and timeout without a breaker, for calls that are not about a
    /// single target's health (listing, configuration updates).
    pub async fn call_unguarded<F, Fut, T>(&self, operation: &str, mut factory: F) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GuardError>>,
    {
        let limit = self.call_timeout;
        with_retry(operation, &self.retry, || {
            let fut = factory();
            async move {
                match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(GuardError::Timeout(format!(
                        "{} exceeded {}s",
                        operation,
                        limit.as_secs_f64()
                    ))),
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use crate::errors::ErrorKind;
    use crate::resilience::breaker::{BreakerConfig, CircuitState};

    fn caller(threshold: u32, attempts: u32) -> ResilientCaller {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_secs(60),
        }));
        let retry = RetryConfig {
            max_attempts: attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };
        ResilientCaller::new(breakers, retry, Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_network() {
        let caller = caller(5, 1);
        let key = TargetKey::new("radarr", 9);
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let calls = calls.clone();
            let result: Result<(), _> = caller
                .call(&key, "test_target", || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(GuardError::Network("refused".into()))
                    }
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        let c = calls.clone();
        let result: Result<(), _> = caller
            .call(&key, "test_target", || {
                let calls = c.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(matches!(result, Err(GuardError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_count_once() {
        let caller = caller(5, 3);
        let key = TargetKey::new("sonarr", 1);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = caller
            .call(&key, "test_target", || {
                let calls = c.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(GuardError::ServiceUnavailable("503".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let snap = caller.breakers().snapshot(&key).unwrap();
        assert_eq!(snap.consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried_but_counted() {
        let caller = caller(5, 3);
        let key = TargetKey::new("sonarr", 1);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), _> = caller
            .call(&key, "test_target", || {
                let calls = c.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(GuardError::NotFound("indexer 1".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(GuardError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(caller.breakers().snapshot(&key).unwrap().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_as_transient() {
        let caller = caller(5, 1);
        let key = TargetKey::new("prowlarr", 2);

        let result: Result<(), _> = caller
            .call(&key, "test_target", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, GuardError::Timeout(_)));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_value_counts_as_failure() {
        let caller = caller(2, 3);
        let key = TargetKey::new("radarr", 5);

        for _ in 0..2 {
            let value = caller
                .call_judged(&key, "test_target", || async { Ok(false) }, |ok: &bool| *ok)
                .await
                .unwrap();
            assert!(!value);
        }
        assert_eq!(caller.breakers().state(&key), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry_closes_breaker() {
        let caller = caller(5, 3);
        let key = TargetKey::new("radarr", 3);
        caller.breakers().record_failure(&key);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = caller
            .call(&key, "test_target", || {
                let calls = c.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(GuardError::Timeout("slow".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(caller.breakers().state(&key), CircuitState::Closed);
        assert_eq!(caller.breakers().snapshot(&key).unwrap().consecutive_failures, 0);
    }

    fn slow_caller() -> Arc<ResilientCaller> {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        }));
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: false,
        };
        Arc::new(ResilientCaller::new(breakers, retry, Duration::from_secs(30)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_outlasting_reset_window_is_exclusive() {
        let caller = slow_caller();
        let key = TargetKey::new("radarr", 8);
        caller.breakers().record_failure(&key);
        tokio::time::advance(Duration::from_secs(61)).await;

        // Three 30s timeouts plus backoff keep the trial busy for over 90s.
        let trial = {
            let caller = caller.clone();
            let key = key.clone();
            tokio::spawn(async move {
                caller
                    .call(&key, "test_target", || async {
                        tokio::time::sleep(Duration::from_secs(45)).await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(caller.breakers().state(&key), CircuitState::HalfOpen);

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let second: Result<(), _> = caller
            .call(&key, "test_target", || {
                let calls = c.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(matches!(second, Err(GuardError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let first = trial.await.unwrap();
        assert!(matches!(first, Err(GuardError::Timeout(_))));
        assert_eq!(caller.breakers().state(&key), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_reopens_breaker() {
        let caller = slow_caller();
        let key = TargetKey::new("sonarr", 8);
        caller.breakers().record_failure(&key);
        tokio::time::advance(Duration::from_secs(61)).await;

        let trial = {
            let caller = caller.clone();
            let key = key.clone();
            tokio::spawn(async move {
                caller
                    .call(&key, "test_target", || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(caller.breakers().state(&key), CircuitState::HalfOpen);

        trial.abort();
        assert!(trial.await.unwrap_err().is_cancelled());
        assert_eq!(caller.breakers().state(&key), CircuitState::Open);
    }
}
