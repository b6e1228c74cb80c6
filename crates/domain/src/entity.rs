//! Entity — a point-in-time view of a hub entity.
//!
//! Hubs expose entities by string id (`light.hall`, `input_boolean.away`)
//! with a free-form textual state and structured attributes.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Well-known states shared by switch-like entities.
pub mod states {
    pub const ON: &str = "on";
    pub const OFF: &str = "off";
    pub const HOME: &str = "home";
    pub const UNAVAILABLE: &str = "unavailable";
}

/// Current state of one hub entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub last_changed: Timestamp,
}

impl EntitySnapshot {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>, ts: Timestamp) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: serde_json::Map::new(),
            last_changed: ts,
        }
    }

    /// Whether the entity reports `on`.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state == states::ON
    }

    /// Whether the entity reports `off`.
    #[must_use]
    pub fn is_off(&self) -> bool {
        self.state == states::OFF
    }

    /// The domain part of the entity id (`light` for `light.hall`).
    #[must_use]
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }
}

/// Extract the domain part of an entity id.
#[must_use]
pub fn domain_of(entity_id: &str) -> &str {
    entity_id
        .split_once('.')
        .map_or(entity_id, |(domain, _)| domain)
}
