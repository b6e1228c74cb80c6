//! Retry + circuit breaker around an async operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hearth_domain::error::HearthError;
use hearth_domain::resilience::{CircuitState, ResilienceOutcome, ResiliencePolicy};

use super::circuit_breaker::CircuitBreaker;

type RetryPredicate = Arc<dyn Fn(&HearthError) -> bool + Send + Sync>;

/// Executes operations under a [`ResiliencePolicy`].
///
/// Failures accepted by the retry predicate ([`HearthError::is_transient`]
/// by default) are retried with exponential backoff plus jitter and count
/// towards the circuit breaker. Other failures are returned immediately.
/// A rejected call ([`HearthError::CircuitOpen`]) is never retried.
pub struct ResilientExecutor {
    name: String,
    policy: ResiliencePolicy,
    breaker: CircuitBreaker,
    retryable: RetryPredicate,
}

impl ResilientExecutor {
    #[must_use]
    pub fn new(name: impl Into<String>, policy: ResiliencePolicy) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(name.clone(), policy.breaker),
            name,
            policy,
            retryable: Arc::new(HearthError::is_transient),
        }
    }

    /// Replace the predicate deciding which failures are retried.
    #[must_use]
    pub fn with_retryable<F>(mut self, retryable: F) -> Self
    where
        F: Fn(&HearthError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(retryable);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// `operation` is invoked once per attempt.
    ///
    /// # Errors
    ///
    /// Returns the last failure once attempts are exhausted, the first
    /// non-retryable failure, or [`HearthError::CircuitOpen`].
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, HearthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HearthError>>,
    {
        let max_attempts = self.policy.retry.max_attempts.max(1);
        let mut attempts = 0;
        let result = loop {
            let permit = match self.breaker.try_acquire() {
                Ok(permit) => permit,
                Err(err) => break Err(err),
            };
            attempts += 1;
            match operation().await {
                Ok(value) => {
                    self.breaker.record_success(permit);
                    break Ok(value);
                }
                Err(err) if (self.retryable)(&err) => {
                    self.breaker.record_failure(permit);
                    if attempts >= max_attempts {
                        break Err(err);
                    }
                    let delay = self.retry_delay(attempts);
                    tracing::warn!(
                        operation = %self.name,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.breaker.record_ignored(permit);
                    break Err(err);
                }
            }
        };

        self.report(
            ResilienceOutcome {
                succeeded: result.is_ok(),
                attempts,
                circuit_state: self.breaker.state(),
            },
            result.as_ref().err(),
        );
        result
    }

    /// Run `primary` like [`execute`](Self::execute); when it ultimately
    /// fails, run `fallback` once.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::FallbackFailed`] carrying both failures when
    /// the fallback fails too.
    pub async fn execute_with_fallback<T, F, Fut, G, GFut>(
        &self,
        primary: F,
        fallback: G,
    ) -> Result<T, HearthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HearthError>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, HearthError>>,
    {
        let primary_err = match self.execute(primary).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        tracing::warn!(operation = %self.name, error = %primary_err, "running fallback");
        match fallback().await {
            Ok(value) => {
                tracing::info!(operation = %self.name, "fallback succeeded");
                Ok(value)
            }
            Err(fallback_err) => {
                tracing::error!(
                    operation = %self.name,
                    primary = %primary_err,
                    fallback = %fallback_err,
                    "fallback failed"
                );
                Err(HearthError::FallbackFailed {
                    primary: Box::new(primary_err),
                    fallback: Box::new(fallback_err),
                })
            }
        }
    }

    fn retry_delay(&self, retry: u32) -> Duration {
        let jitter = self
            .policy
            .retry
            .max_jitter
            .mul_f64(rand::random::<f64>());
        self.policy.retry.backoff(retry) + jitter
    }

    fn report(&self, outcome: ResilienceOutcome, error: Option<&HearthError>) {
        match error {
            None => tracing::debug!(
                operation = %self.name,
                attempts = outcome.attempts,
                circuit = %outcome.circuit_state,
                "operation succeeded"
            ),
            Some(err) => tracing::warn!(
                operation = %self.name,
                attempts = outcome.attempts,
                circuit = %outcome.circuit_state,
                error = %err,
                "operation failed"
            ),
        }
    }
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use hearth_domain::error::HubError;
    use hearth_domain::resilience::{BreakerPolicy, RetryPolicy};
    use tokio::time::Instant;

    use super::*;

    fn policy() -> ResiliencePolicy {
        ResiliencePolicy {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                max_jitter: Duration::ZERO,
            },
            breaker: BreakerPolicy {
                failure_ratio: 0.5,
                sampling_window: Duration::from_secs(30),
                minimum_throughput: 6,
                break_duration: Duration::from_secs(60),
            },
        }
    }

    fn rejected() -> HearthError {
        HubError::Rejected {
            service: "light.turn_on".to_string(),
            reason: "bad".to_string(),
        }
        .into()
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_transient_failure_until_success() {
        let executor = ResilientExecutor::new("device", policy());
        let calls = &AtomicU32::new(0);

        let result = executor
            .execute(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HubError::Timeout.into())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_back_off_exponentially_between_attempts() {
        let executor = ResilientExecutor::new("device", policy());
        let started = Instant::now();

        let result: Result<(), _> = executor
            .execute(|| async { Err(HubError::Timeout.into()) })
            .await;

        assert!(matches!(result, Err(HearthError::Hub(HubError::Timeout))));
        // 500ms before the 2nd attempt, 1s before the 3rd.
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_after_max_attempts() {
        let executor = ResilientExecutor::new("device", policy());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HubError::Timeout.into())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_retry_permanent_failure() {
        let executor = ResilientExecutor::new("device", policy());
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(rejected())
            })
            .await;

        assert!(matches!(result, Err(HearthError::Hub(HubError::Rejected { .. }))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reject_without_calling_when_circuit_open() {
        let executor = ResilientExecutor::new("device", policy());
        let calls = &AtomicU32::new(0);
        for _ in 0..2 {
            let _: Result<(), _> = executor
                .execute(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(HubError::Timeout.into())
                })
                .await;
        }
        assert_eq!(executor.circuit_state(), CircuitState::Open);
        let before = calls.load(Ordering::SeqCst);

        let result: Result<(), _> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(HearthError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn should_honor_custom_retry_predicate() {
        let executor = ResilientExecutor::new("device", policy()).with_retryable(|_| true);
        let calls = &AtomicU32::new(0);

        let _: Result<(), _> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(rejected())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_use_fallback_when_primary_fails() {
        let executor = ResilientExecutor::new("phone", policy());
        let fallback_calls = &AtomicU32::new(0);

        let result = executor
            .execute_with_fallback(
                || async { Err::<&str, _>(HubError::Timeout.into()) },
                move || async move {
                    fallback_calls.fetch_add(1, Ordering::SeqCst);
                    Ok("fallback")
                },
            )
            .await;

        assert_eq!(result.unwrap(), "fallback");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_use_fallback_when_circuit_open() {
        let executor = ResilientExecutor::new("phone", policy());
        for _ in 0..2 {
            let _: Result<(), _> = executor
                .execute(|| async { Err(HubError::Timeout.into()) })
                .await;
        }
        assert_eq!(executor.circuit_state(), CircuitState::Open);
        let primary_calls = &AtomicU32::new(0);
        let fallback_calls = &AtomicU32::new(0);

        let result = executor
            .execute_with_fallback(
                move || async move {
                    primary_calls.fetch_add(1, Ordering::SeqCst);
                    Ok("primary")
                },
                move || async move {
                    fallback_calls.fetch_add(1, Ordering::SeqCst);
                    Ok("fallback")
                },
            )
            .await;

        assert_eq!(result.unwrap(), "fallback");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_fallback_when_primary_succeeds() {
        let executor = ResilientExecutor::new("phone", policy());
        let fallback_calls = &AtomicU32::new(0);

        let result = executor
            .execute_with_fallback(
                || async { Ok("primary") },
                move || async move {
                    fallback_calls.fetch_add(1, Ordering::SeqCst);
                    Ok("fallback")
                },
            )
            .await;

        assert_eq!(result.unwrap(), "primary");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_both_failures_when_fallback_fails() {
        let executor = ResilientExecutor::new("phone", policy());

        let result: Result<(), _> = executor
            .execute_with_fallback(
                || async { Err(HubError::Timeout.into()) },
                || async { Err(rejected()) },
            )
            .await;

        match result {
            Err(HearthError::FallbackFailed { primary, fallback }) => {
                assert!(matches!(*primary, HearthError::Hub(HubError::Timeout)));
                assert!(matches!(*fallback, HearthError::Hub(HubError::Rejected { .. })));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
