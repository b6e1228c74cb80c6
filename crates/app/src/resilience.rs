//! Resilient execution of outbound calls.
//!
//! A [`ResilientExecutor`] wraps every call to the hub (device commands,
//! notification channels, state reads) with exponential-backoff retries and
//! a [`CircuitBreaker`]. Executors are created per category of operations so
//! a failing notification channel never trips the breaker of device control.

mod circuit_breaker;
mod executor;

pub use circuit_breaker::{CircuitBreaker, Permit};
pub use executor::ResilientExecutor;
