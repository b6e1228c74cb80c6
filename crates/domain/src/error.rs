//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HearthError`]
//! via `#[from]` (or an explicit `From` impl for adapter errors).

use std::io;

/// Top-level error for every fallible operation in hearth.
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("hub call failed")]
    Hub(#[from] HubError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The circuit guarding `operation` is open; the call was not attempted.
    #[error("circuit for `{operation}` is open")]
    CircuitOpen { operation: String },

    /// A primary operation and its fallback both failed.
    #[error("both primary and fallback failed (fallback: {fallback})")]
    FallbackFailed {
        #[source]
        primary: Box<HearthError>,
        fallback: Box<HearthError>,
    },
}

impl HearthError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Only transport-level hub failures are transient; an open circuit is
    /// deliberately not retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Hub(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("a notification carries at most {max} actions, got {count}")]
    TooManyActions { max: usize, count: usize },

    #[error("invalid cron expression `{expression}`")]
    InvalidCron { expression: String },

    #[error("time of day `{value}` is not a valid HH:MM[:SS] value")]
    InvalidTimeOfDay { value: String },
}

/// Failures reported while talking to the hub or a notification channel.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error")]
    Io(#[from] io::Error),

    #[error("service `{service}` rejected the call: {reason}")]
    Rejected { service: String, reason: String },

    #[error("unknown entity `{entity_id}`")]
    UnknownEntity { entity_id: String },
}

impl HubError {
    /// Timeouts and the connection family of I/O errors are transient;
    /// rejections are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::Interrupted
            ),
            Self::Rejected { .. } | Self::UnknownEntity { .. } => false,
        }
    }
}
