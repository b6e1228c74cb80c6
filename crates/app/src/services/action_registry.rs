//! Correlation of push-notification action presses with their callbacks.
//!
//! When a notification carries an action with a callback, the dispatcher
//! registers it here and sends the returned token as the action id. The
//! companion app echoes that token back in a
//! [`NOTIFICATION_ACTION_EVENT`]; the matching callback runs once and is
//! forgotten. Tokens nobody pressed expire after the registry's TTL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hearth_domain::event::{HubEvent, NOTIFICATION_ACTION_EVENT};
use hearth_domain::id::CorrelationId;
use hearth_domain::notification::ActionCallback;
use hearth_domain::time::Timestamp;

use crate::ports::{Clock, SystemClock};

/// How long an unanswered action stays registered.
pub const DEFAULT_ACTION_TTL_HOURS: i64 = 24;

struct PendingAction {
    callback: ActionCallback,
    expires_at: Timestamp,
}

/// Pending action callbacks keyed by correlation token.
pub struct ActionRegistry<C = SystemClock> {
    clock: C,
    ttl: chrono::Duration,
    pending: Mutex<HashMap<String, PendingAction>>,
}

impl<C: Clock> ActionRegistry<C> {
    pub fn new(clock: C, ttl: chrono::Duration) -> Self {
        Self {
            clock,
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingAction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` and return the unique token to send as the
    /// action id.
    pub fn register(&self, action: &str, callback: ActionCallback) -> String {
        let token = format!("{action}-{}", CorrelationId::new());
        let now = self.clock.now();
        let mut pending = self.lock();
        let expired = purge(&mut pending, now);
        if expired > 0 {
            tracing::debug!(expired, "dropped expired notification actions");
        }
        pending.insert(
            token.clone(),
            PendingAction {
                callback,
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Remove and return the callback registered under `token`.
    pub fn take(&self, token: &str) -> Option<ActionCallback> {
        let now = self.clock.now();
        let entry = self.lock().remove(token)?;
        if entry.expires_at <= now {
            tracing::debug!(token, "notification action expired");
            return None;
        }
        Some(entry.callback)
    }

    /// Run the callback of a pressed action. Returns whether one ran.
    pub async fn handle_event(&self, event: &HubEvent) -> bool {
        let Some(token) = event
            .custom_data(NOTIFICATION_ACTION_EVENT)
            .and_then(|data| data.get("action"))
            .and_then(serde_json::Value::as_str)
        else {
            return false;
        };
        let Some(callback) = self.take(token) else {
            tracing::debug!(token, "no callback for notification action");
            return false;
        };
        tracing::info!(token, "running notification action");
        callback().await;
        true
    }

    /// Drop expired registrations. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        purge(&mut self.lock(), now)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}

fn purge(pending: &mut HashMap<String, PendingAction>, now: Timestamp) -> usize {
    let before = pending.len();
    pending.retain(|_, entry| entry.expires_at > now);
    before - pending.len()
}
