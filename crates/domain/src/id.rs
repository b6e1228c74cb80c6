//! Random identifiers for events, scheduled tasks and action tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! random_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.simple(), f)
            }
        }
    };
}

random_id!(
    /// Suffix making a notification action token unique.
    CorrelationId
);

random_id!(
    /// Identifies a [`HubEvent`](crate::event::HubEvent) in logs.
    EventId
);

random_id!(
    /// Identifies a scheduled job in logs.
    TaskId
);
