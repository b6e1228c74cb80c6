//! # hearth-adapter-virtual
//!
//! Virtual/demo hub that simulates entities and services in memory, for
//! testing and demonstration purposes.
//!
//! ## Supported services
//!
//! | Service | Behaviour |
//! |---------|-----------|
//! | `<domain>.turn_on` / `turn_off` / `toggle` | Switches the targeted entities; target `all` covers the whole domain |
//! | `scene.turn_on` | Records the activation time as the scene state |
//! | `input_select.select_option` | Sets the state to `data.option` |
//! | `media_player.volume_set` / `play_media` | Updates the `volume_level` attribute / plays |
//! | `notify.*` / `tts.*` | Recorded only |
//!
//! Every state change is published on the event bus, so automations react
//! to their own service calls the way they would on a real hub.
//!
//! ## Dependency rule
//!
//! Depends on `hearth-app` (port traits) and `hearth-domain` only.

mod seed;
mod services;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hearth_app::ports::{EventPublisher, HubClient};
use hearth_domain::entity::EntitySnapshot;
use hearth_domain::error::{HearthError, HubError};
use hearth_domain::event::{HubEvent, StateChange};
use hearth_domain::service::ServiceCall;
use hearth_domain::time::now;

pub use seed::DEMO_ENTITIES;

/// Injected failure for one `domain.service`.
#[derive(Debug, Clone)]
enum Fault {
    /// Time out the next `remaining` calls.
    Transient { remaining: u32 },
    /// Reject every call.
    Reject,
}

/// In-memory hub publishing its state changes on `P`.
pub struct VirtualHub<P> {
    publisher: P,
    entities: Mutex<HashMap<String, EntitySnapshot>>,
    calls: Mutex<Vec<ServiceCall>>,
    faults: Mutex<HashMap<String, Fault>>,
}

impl<P: EventPublisher + Send + Sync> VirtualHub<P> {
    /// An empty hub.
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            entities: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// A hub seeded with [`DEMO_ENTITIES`].
    pub fn with_demo_entities(publisher: P) -> Self {
        let hub = Self::new(publisher);
        {
            let ts = now();
            let mut entities = lock(&hub.entities);
            for (entity_id, state) in DEMO_ENTITIES {
                entities.insert(
                    (*entity_id).to_string(),
                    EntitySnapshot::new(*entity_id, *state, ts),
                );
            }
        }
        hub
    }

    /// Set an entity's state from the outside (a sensor firing, a person
    /// arriving) and publish the change. Unknown entities are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be published.
    pub async fn set_state(&self, entity_id: &str, state: &str) -> Result<(), HearthError> {
        let change = {
            let mut entities = lock(&self.entities);
            let entity = entities
                .entry(entity_id.to_string())
                .or_insert_with(|| EntitySnapshot::new(entity_id, "unknown", now()));
            if entity.state == state {
                return Ok(());
            }
            let change = StateChange::new(entity_id, Some(entity.state.as_str()), Some(state));
            state.clone_into(&mut entity.state);
            entity.last_changed = change.timestamp;
            change
        };
        tracing::debug!(%entity_id, %state, "virtual state set");
        self.publisher.publish(HubEvent::state_changed(change)).await
    }

    /// Current snapshot of every entity, sorted by id.
    #[must_use]
    pub fn entities(&self) -> Vec<EntitySnapshot> {
        let mut all: Vec<_> = lock(&self.entities).values().cloned().collect();
        all.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        all
    }

    /// Every service call that reached the hub, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ServiceCall> {
        lock(&self.calls).clone()
    }

    /// Time out the next `times` calls to `service` (`domain.service`).
    pub fn fail_next(&self, service: &str, times: u32) {
        lock(&self.faults).insert(service.to_string(), Fault::Transient { remaining: times });
    }

    /// Reject every call to `service` until [`VirtualHub::clear_faults`].
    pub fn reject(&self, service: &str) {
        lock(&self.faults).insert(service.to_string(), Fault::Reject);
    }

    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    fn injected_fault(&self, service: &str) -> Option<HubError> {
        let mut faults = lock(&self.faults);
        match faults.get_mut(service)? {
            Fault::Reject => Some(HubError::Rejected {
                service: service.to_string(),
                reason: "rejected by fault injection".to_string(),
            }),
            Fault::Transient { remaining } => {
                if *remaining <= 1 {
                    faults.remove(service);
                } else {
                    *remaining -= 1;
                }
                Some(HubError::Timeout)
            }
        }
    }
}

impl<P: EventPublisher + Send + Sync> HubClient for VirtualHub<P> {
    async fn call_service(&self, call: ServiceCall) -> Result<(), HearthError> {
        let service = call.qualified_name();
        if let Some(err) = self.injected_fault(&service) {
            tracing::warn!(%service, error = %err, "virtual service call failed");
            return Err(err.into());
        }

        let changes = services::apply(&mut lock(&self.entities), &call, now())?;
        tracing::debug!(%call, changes = changes.len(), "virtual service call");
        lock(&self.calls).push(call);

        for change in changes {
            self.publisher.publish(HubEvent::state_changed(change)).await?;
        }
        Ok(())
    }

    async fn get_state(&self, entity_id: &str) -> Result<Option<EntitySnapshot>, HearthError> {
        Ok(lock(&self.entities).get(entity_id).cloned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
