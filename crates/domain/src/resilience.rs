//! Resilience — retry and circuit-breaker policies for outbound calls.
//!
//! Policies are plain values; the executor that applies them lives in the
//! application layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit breaker state for one category of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// One trial call is allowed to probe recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Open => f.write_str("open"),
            Self::HalfOpen => f.write_str("half_open"),
        }
    }
}

/// Summary of a single guarded execution, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResilienceOutcome {
    pub succeeded: bool,
    pub attempts: u32,
    pub circuit_state: CircuitState,
}

/// How transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on every further retry.
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Upper bound for the exponential delay (jitter excluded).
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Upper bound of the random extra delay added to every retry.
    #[serde(with = "millis")]
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), jitter excluded.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// When a circuit opens and how long it stays open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerPolicy {
    /// Failure ratio (0.0–1.0) at or above which the circuit opens.
    pub failure_ratio: f64,
    /// Rolling window over which outcomes are sampled.
    #[serde(with = "millis")]
    pub sampling_window: Duration,
    /// Outcomes required in the window before the ratio is considered.
    pub minimum_throughput: u32,
    /// How long the circuit stays open before a trial call.
    #[serde(with = "millis")]
    pub break_duration: Duration,
}

/// Retry and breaker settings for one category of operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResiliencePolicy {
    pub retry: RetryPolicy,
    pub breaker: BreakerPolicy,
}

impl ResiliencePolicy {
    /// Policy for generic app calls (device control, scenes, …).
    #[must_use]
    pub const fn general() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                max_jitter: Duration::from_millis(250),
            },
            breaker: BreakerPolicy {
                failure_ratio: 0.5,
                sampling_window: Duration::from_secs(30),
                minimum_throughput: 5,
                break_duration: Duration::from_secs(120),
            },
        }
    }

    /// Policy for notification delivery: fewer retries, quicker recovery.
    #[must_use]
    pub const fn notifications() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                max_jitter: Duration::from_millis(250),
            },
            breaker: BreakerPolicy {
                failure_ratio: 0.6,
                sampling_window: Duration::from_secs(30),
                minimum_throughput: 3,
                break_duration: Duration::from_secs(60),
            },
        }
    }

    /// Replace the fields set in `overrides`, keeping the rest.
    #[must_use]
    pub fn with_overrides(self, overrides: &PolicyOverrides) -> Self {
        let retry = &overrides.retry;
        let breaker = &overrides.breaker;
        Self {
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.unwrap_or(self.retry.max_attempts),
                base_delay: retry.base_delay.unwrap_or(self.retry.base_delay),
                max_delay: retry.max_delay.unwrap_or(self.retry.max_delay),
                max_jitter: retry.max_jitter.unwrap_or(self.retry.max_jitter),
            },
            breaker: BreakerPolicy {
                failure_ratio: breaker.failure_ratio.unwrap_or(self.breaker.failure_ratio),
                sampling_window: breaker
                    .sampling_window
                    .unwrap_or(self.breaker.sampling_window),
                minimum_throughput: breaker
                    .minimum_throughput
                    .unwrap_or(self.breaker.minimum_throughput),
                break_duration: breaker.break_duration.unwrap_or(self.breaker.break_duration),
            },
        }
    }
}

/// Partial [`ResiliencePolicy`] read from configuration. Unset fields keep
/// the value of the preset the overrides are applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyOverrides {
    pub retry: RetryOverrides,
    pub breaker: BreakerOverrides,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryOverrides {
    pub max_attempts: Option<u32>,
    #[serde(deserialize_with = "optional_millis")]
    pub base_delay: Option<Duration>,
    #[serde(deserialize_with = "optional_millis")]
    pub max_delay: Option<Duration>,
    #[serde(deserialize_with = "optional_millis")]
    pub max_jitter: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerOverrides {
    pub failure_ratio: Option<f64>,
    #[serde(deserialize_with = "optional_millis")]
    pub sampling_window: Option<Duration>,
    pub minimum_throughput: Option<u32>,
    #[serde(deserialize_with = "optional_millis")]
    pub break_duration: Option<Duration>,
}

fn optional_millis<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
}

/// Serialize [`Duration`]s as integer milliseconds in config files.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
