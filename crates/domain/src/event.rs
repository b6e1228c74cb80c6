//! Event — an immutable record of something that happened on the hub.
//!
//! Apps subscribe to entity state changes and to free-form hub events
//! (remote/button presses, notification action presses, …).

use serde::{Deserialize, Serialize};

use crate::entity::states;
use crate::id::EventId;
use crate::time::{Timestamp, now};

/// Event type emitted by the mobile companion app when an action is pressed.
pub const NOTIFICATION_ACTION_EVENT: &str = "mobile_app_notification_action";

/// An entity moved from one state to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub timestamp: Timestamp,
}

impl StateChange {
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        old_state: Option<&str>,
        new_state: Option<&str>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            old_state: old_state.map(str::to_string),
            new_state: new_state.map(str::to_string),
            attributes: serde_json::Map::new(),
            timestamp: now(),
        }
    }

    /// The entity entered `state` (and was not already in it).
    #[must_use]
    pub fn entered(&self, state: &str) -> bool {
        self.new_state.as_deref() == Some(state) && self.old_state.as_deref() != Some(state)
    }

    /// The entity switched to `on`.
    #[must_use]
    pub fn turned_on(&self) -> bool {
        self.entered(states::ON)
    }

    /// The entity switched to `off`.
    #[must_use]
    pub fn turned_off(&self) -> bool {
        self.entered(states::OFF)
    }
}

/// Payload of an event published by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HubEventKind {
    StateChanged(StateChange),
    /// Any other event type, e.g. [`NOTIFICATION_ACTION_EVENT`] or a remote
    /// press carrying `{ "device_id", "type", "subtype" }`.
    Custom {
        event_type: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

/// An event delivered by the hub's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    pub id: EventId,
    pub kind: HubEventKind,
    pub timestamp: Timestamp,
}

impl HubEvent {
    #[must_use]
    pub fn state_changed(change: StateChange) -> Self {
        Self {
            id: EventId::new(),
            timestamp: change.timestamp,
            kind: HubEventKind::StateChanged(change),
        }
    }

    #[must_use]
    pub fn custom(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            kind: HubEventKind::Custom {
                event_type: event_type.into(),
                data,
            },
            timestamp: now(),
        }
    }

    /// The state change carried by this event, if any.
    #[must_use]
    pub fn as_state_change(&self) -> Option<&StateChange> {
        match &self.kind {
            HubEventKind::StateChanged(change) => Some(change),
            HubEventKind::Custom { .. } => None,
        }
    }

    /// The data of a custom event of the given type.
    #[must_use]
    pub fn custom_data(&self, expected_type: &str) -> Option<&serde_json::Value> {
        match &self.kind {
            HubEventKind::Custom { event_type, data } if event_type == expected_type => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_detect_turn_on_transition() {
        let change = StateChange::new("binary_sensor.hall_motion", Some("off"), Some("on"));
        assert!(change.turned_on());
        assert!(!change.turned_off());
    }

    #[test]
    fn should_not_report_entered_when_state_unchanged() {
        let change = StateChange::new("binary_sensor.hall_motion", Some("on"), Some("on"));
        assert!(!change.turned_on());
    }

    #[test]
    fn should_report_entered_when_previous_state_unknown() {
        let change = StateChange::new("person.resident", None, Some("home"));
        assert!(change.entered("home"));
    }

    #[test]
    fn should_expose_custom_data_only_for_matching_type() {
        let event = HubEvent::custom(
            NOTIFICATION_ACTION_EVENT,
            serde_json::json!({"action": "feed-123"}),
        );
        assert!(event.custom_data(NOTIFICATION_ACTION_EVENT).is_some());
        assert!(event.custom_data("zha_event").is_none());
        assert!(event.as_state_change().is_none());
    }

    #[test]
    fn should_serialize_with_kind_tag() {
        let event = HubEvent::state_changed(StateChange::new("light.hall", None, Some("on")));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["kind"], "state_changed");
        assert_eq!(json["kind"]["entity_id"], "light.hall");
    }
}
