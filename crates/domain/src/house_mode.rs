//! House mode — the time-of-day bucket the household is in.

use serde::{Deserialize, Serialize};

/// Coarse time-of-day bucket maintained by the hub's house-mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HouseMode {
    Morning,
    #[default]
    Day,
    Evening,
    Night,
}

impl HouseMode {
    /// Parse the selector's option text. Unknown or missing values fall back
    /// to [`HouseMode::Day`].
    #[must_use]
    pub fn from_selector(value: Option<&str>) -> Self {
        match value {
            Some("Morning") => Self::Morning,
            Some("Evening") => Self::Evening,
            Some("Night") => Self::Night,
            _ => Self::Day,
        }
    }

    /// Option text understood by the selector.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "Morning",
            Self::Day => "Day",
            Self::Evening => "Evening",
            Self::Night => "Night",
        }
    }
}

impl std::fmt::Display for HouseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
