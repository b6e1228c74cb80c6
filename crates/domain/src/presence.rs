//! Presence — whether the household is away, coming back, or home.
//!
//! The transition table lives here so every caller agrees on it; the
//! state cell and its lock live in the application layer.

use serde::{Deserialize, Serialize};

/// Home presence as tracked by the presence state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// Nobody is home; away automations are active.
    Away,
    /// The away flag cleared; waiting for motion to confirm arrival.
    Returning,
    /// The welcome sequence is running. Further motion is ignored.
    WelcomingHome,
    /// Somebody is home and the welcome sequence has completed.
    #[default]
    Home,
}

impl PresenceState {
    pub const ALL: [Self; 4] = [Self::Away, Self::Returning, Self::WelcomingHome, Self::Home];

    /// Whether moving from `self` to `target` is legal.
    ///
    /// Staying in the same state is always legal (idempotent), leaving is
    /// legal from anywhere, and arrival must go through every step in order.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (_, Self::Away)
                | (Self::Away, Self::Returning)
                | (Self::Returning, Self::WelcomingHome)
                | (Self::WelcomingHome, Self::Home)
        ) || self == target
    }
}

impl std::fmt::Display for PresenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Away => f.write_str("away"),
            Self::Returning => f.write_str("returning"),
            Self::WelcomingHome => f.write_str("welcoming_home"),
            Self::Home => f.write_str("home"),
        }
    }
}
