//! # hearth-app
//!
//! Application layer: the apps (presence, notifications), the ports they
//! talk through, and the infrastructure they share (event bus, scheduler,
//! resilient execution).
//!
//! ## Dependency rule
//!
//! Depends on `hearth-domain` only (no adapter crates). Adapters depend on
//! the port traits defined here and are wired together in `hearthd`.

pub mod automation_runtime;
pub mod event_bus;
pub mod ports;
pub mod resilience;
pub mod scheduler;
pub mod services;

#[cfg(test)]
mod testing;
