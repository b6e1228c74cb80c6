//! # hearth-domain
//!
//! Pure domain model for the hearth automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Describe the **hub vocabulary**: entity snapshots, state-change events,
//!   service calls
//! - Define the **presence state machine** states and its transition table
//! - Define **notifications** (channels, actions, persisted send records) and
//!   the throttle rule
//! - Define **resilience policies** (retry, circuit breaker) and their outcome
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod entity;
pub mod event;
pub mod house_mode;
pub mod notification;
pub mod presence;
pub mod resilience;
pub mod service;
