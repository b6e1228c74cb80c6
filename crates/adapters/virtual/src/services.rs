//! Simulated service semantics.

use std::collections::HashMap;

use hearth_domain::entity::{EntitySnapshot, domain_of, states};
use hearth_domain::error::HubError;
use hearth_domain::event::StateChange;
use hearth_domain::service::ServiceCall;
use hearth_domain::time::Timestamp;

/// Apply `call` to `entities` and return the resulting state changes.
pub(crate) fn apply(
    entities: &mut HashMap<String, EntitySnapshot>,
    call: &ServiceCall,
    now: Timestamp,
) -> Result<Vec<StateChange>, HubError> {
    match (call.domain.as_str(), call.service.as_str()) {
        // Delivery only, nothing to mutate.
        ("notify" | "tts", _) => Ok(Vec::new()),
        ("scene", "turn_on") => {
            let activated_at = now.to_rfc3339();
            set_each(entities, call, now, |_| activated_at.clone())
        }
        (_, "turn_on") => set_each(entities, call, now, |_| states::ON.to_string()),
        (_, "turn_off") => set_each(entities, call, now, |_| states::OFF.to_string()),
        (_, "toggle") => set_each(entities, call, now, |current| {
            if current == states::ON {
                states::OFF.to_string()
            } else {
                states::ON.to_string()
            }
        }),
        ("input_select", "select_option") => {
            let option = call
                .data
                .get("option")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| rejected(call, "missing `option`"))?
                .to_string();
            set_each(entities, call, now, |_| option.clone())
        }
        ("media_player", "volume_set") => {
            let volume = call
                .data
                .get("volume_level")
                .cloned()
                .ok_or_else(|| rejected(call, "missing `volume_level`"))?;
            for entity_id in targets(entities, call)? {
                if let Some(entity) = entities.get_mut(&entity_id) {
                    entity.attributes.insert("volume_level".to_string(), volume.clone());
                }
            }
            Ok(Vec::new())
        }
        ("media_player", "play_media") => set_each(entities, call, now, |_| "playing".to_string()),
        _ => Err(rejected(call, "unsupported service")),
    }
}

fn rejected(call: &ServiceCall, reason: &str) -> HubError {
    HubError::Rejected {
        service: call.qualified_name(),
        reason: reason.to_string(),
    }
}

/// Entity ids targeted by `call`. `all` expands to every entity of the
/// call's domain.
fn targets(
    entities: &HashMap<String, EntitySnapshot>,
    call: &ServiceCall,
) -> Result<Vec<String>, HubError> {
    if call.target.iter().any(|target| target == "all") {
        let mut all: Vec<String> = entities
            .keys()
            .filter(|entity_id| domain_of(entity_id) == call.domain)
            .cloned()
            .collect();
        all.sort();
        return Ok(all);
    }
    if call.target.is_empty() {
        return Err(rejected(call, "no target"));
    }
    call.target
        .iter()
        .map(|entity_id| {
            if entities.contains_key(entity_id) {
                Ok(entity_id.clone())
            } else {
                Err(HubError::UnknownEntity {
                    entity_id: entity_id.clone(),
                })
            }
        })
        .collect()
}

fn set_each<F>(
    entities: &mut HashMap<String, EntitySnapshot>,
    call: &ServiceCall,
    now: Timestamp,
    next_state: F,
) -> Result<Vec<StateChange>, HubError>
where
    F: Fn(&str) -> String,
{
    let mut changes = Vec::new();
    for entity_id in targets(entities, call)? {
        let Some(entity) = entities.get_mut(&entity_id) else {
            continue;
        };
        let next = next_state(&entity.state);
        if next == entity.state {
            continue;
        }
        let change = StateChange::new(entity_id.as_str(), Some(entity.state.as_str()), Some(next.as_str()));
        entity.state = next;
        entity.last_changed = now;
        changes.push(change);
    }
    Ok(changes)
}
