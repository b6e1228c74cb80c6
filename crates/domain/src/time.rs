//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for `last_changed`, `last_sent_at`, event times, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Build a [`chrono::Duration`] from a (possibly fractional) number of minutes.
#[must_use]
pub fn minutes(value: f64) -> chrono::Duration {
    // Millisecond precision is plenty for throttle windows.
    #[allow(clippy::cast_possible_truncation)]
    chrono::Duration::milliseconds((value * 60_000.0).round() as i64)
}
