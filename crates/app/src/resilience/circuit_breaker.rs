//! Rolling-window circuit breaker.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use hearth_domain::error::HearthError;
use hearth_domain::resilience::{BreakerPolicy, CircuitState};

/// Right to attempt one call, handed out by [`CircuitBreaker::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// The circuit is closed.
    Normal,
    /// The single probe allowed while half-open.
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// `(recorded_at, failed)` for every counted outcome in the window.
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Opens when the failure ratio over the sampling window reaches the
/// policy's threshold, given enough throughput.
///
/// Once the break duration elapsed, one trial call is let through: success
/// closes the circuit, failure re-opens it for another break.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    policy: BreakerPolicy,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, policy: BreakerPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An open circuit whose break elapsed reports half-open.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Ask for permission to run one call.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::CircuitOpen`] while the circuit is open, or
    /// half-open with its trial call already in flight.
    pub fn try_acquire(&self) -> Result<Permit, HearthError> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        match inner.state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                tracing::debug!(operation = %self.name, "circuit half-open, sending trial call");
                Ok(Permit::Trial)
            }
            CircuitState::Open | CircuitState::HalfOpen => Err(HearthError::CircuitOpen {
                operation: self.name.clone(),
            }),
        }
    }

    pub fn record_success(&self, permit: Permit) {
        let mut inner = self.lock();
        let now = Instant::now();
        match permit {
            Permit::Trial => {
                inner.trial_in_flight = false;
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.outcomes.clear();
                tracing::info!(operation = %self.name, "circuit closed");
            }
            Permit::Normal => {
                inner.outcomes.push_back((now, false));
                self.prune(&mut inner, now);
            }
        }
    }

    pub fn record_failure(&self, permit: Permit) {
        let mut inner = self.lock();
        let now = Instant::now();
        match permit {
            Permit::Trial => {
                inner.trial_in_flight = false;
                self.open(&mut inner, now);
            }
            Permit::Normal => {
                inner.outcomes.push_back((now, true));
                self.prune(&mut inner, now);
                if inner.state == CircuitState::Closed && self.should_open(&inner) {
                    self.open(&mut inner, now);
                }
            }
        }
    }

    /// Release a permit whose call failed in a way the breaker does not
    /// count (validation, rejection).
    pub fn record_ignored(&self, permit: Permit) {
        if permit == Permit::Trial {
            self.lock().trial_in_flight = false;
        }
    }

    fn refresh(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .is_none_or(|opened_at| now.duration_since(opened_at) >= self.policy.break_duration);
        if elapsed {
            inner.state = CircuitState::HalfOpen;
            tracing::info!(operation = %self.name, "circuit half-open");
        }
    }

    fn prune(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some((recorded_at, _)) = inner.outcomes.front() {
            if now.duration_since(*recorded_at) <= self.policy.sampling_window {
                break;
            }
            inner.outcomes.pop_front();
        }
    }

    fn should_open(&self, inner: &BreakerInner) -> bool {
        let total = inner.outcomes.len();
        if total == 0 || total < self.policy.minimum_throughput as usize {
            return false;
        }
        let failures = inner.outcomes.iter().filter(|(_, failed)| *failed).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = failures as f64 / total as f64;
        ratio >= self.policy.failure_ratio
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.outcomes.clear();
        tracing::warn!(
            operation = %self.name,
            break_secs = self.policy.break_duration.as_secs(),
            "circuit opened"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn policy() -> BreakerPolicy {
        BreakerPolicy {
            failure_ratio: 0.5,
            sampling_window: Duration::from_secs(30),
            minimum_throughput: 4,
            break_duration: Duration::from_secs(60),
        }
    }

    fn fail(breaker: &CircuitBreaker, times: usize) {
        for _ in 0..times {
            let permit = breaker.try_acquire().unwrap();
            breaker.record_failure(permit);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_stay_closed_below_minimum_throughput() {
        let breaker = CircuitBreaker::new("device", policy());
        fail(&breaker, 3);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn should_open_when_failure_ratio_reached() {
        let breaker = CircuitBreaker::new("device", policy());
        let permit = breaker.try_acquire().unwrap();
        breaker.record_success(permit);
        let permit = breaker.try_acquire().unwrap();
        breaker.record_success(permit);
        fail(&breaker, 2);

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            breaker.try_acquire(),
            Err(HearthError::CircuitOpen { operation }) if operation == "device"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_stay_closed_below_failure_ratio() {
        let breaker = CircuitBreaker::new("device", policy());
        for _ in 0..3 {
            let permit = breaker.try_acquire().unwrap();
            breaker.record_success(permit);
        }
        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn should_forget_outcomes_outside_the_window() {
        let breaker = CircuitBreaker::new("device", policy());
        fail(&breaker, 3);
        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn should_allow_single_trial_after_break() {
        let breaker = CircuitBreaker::new("device", policy());
        fail(&breaker, 4);
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.try_acquire().unwrap(), Permit::Trial);
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_close_after_successful_trial() {
        let breaker = CircuitBreaker::new("device", policy());
        fail(&breaker, 4);
        tokio::time::advance(Duration::from_secs(60)).await;

        let permit = breaker.try_acquire().unwrap();
        breaker.record_success(permit);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.try_acquire().unwrap(), Permit::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reopen_after_failed_trial() {
        let breaker = CircuitBreaker::new("device", policy());
        fail(&breaker, 4);
        tokio::time::advance(Duration::from_secs(60)).await;

        let permit = breaker.try_acquire().unwrap();
        breaker.record_failure(permit);

        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn should_release_trial_when_outcome_ignored() {
        let breaker = CircuitBreaker::new("device", policy());
        fail(&breaker, 4);
        tokio::time::advance(Duration::from_secs(60)).await;

        let permit = breaker.try_acquire().unwrap();
        breaker.record_ignored(permit);

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.try_acquire().unwrap(), Permit::Trial);
    }
}
