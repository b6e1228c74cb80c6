//! Notification history records and the throttle rule.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Interval applied when a caller does not specify one.
pub const DEFAULT_MIN_INTERVAL_MINUTES: f64 = 60.0;

/// Last delivery of a named notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub name: String,
    pub last_message: String,
    pub last_sent_at: Timestamp,
}

/// The persisted collection of records, at most one per name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationRecords(Vec<NotificationRecord>);

impl NotificationRecords {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NotificationRecord> {
        self.0.iter().find(|record| record.name == name)
    }

    /// Update the record for `name`, creating it on first send.
    pub fn upsert(&mut self, name: &str, message: &str, sent_at: Timestamp) {
        if let Some(record) = self.0.iter_mut().find(|record| record.name == name) {
            message.clone_into(&mut record.last_message);
            record.last_sent_at = sent_at;
        } else {
            self.0.push(NotificationRecord {
                name: name.to_string(),
                last_message: message.to_string(),
                last_sent_at: sent_at,
            });
        }
    }

    /// Remove the record for `name`. Returns whether one existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|record| record.name != name);
        self.0.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotificationRecord> {
        self.0.iter()
    }
}

/// Whether a notification may be sent given its previous delivery.
///
/// Forced notifications always pass; a never-sent notification passes;
/// otherwise the next allowed time (`last_sent_at + min_interval`) must
/// not be in the future. This is a cooldown measured from the last send.
#[must_use]
pub fn may_send(
    previous: Option<&NotificationRecord>,
    force: bool,
    min_interval: chrono::Duration,
    now: Timestamp,
) -> bool {
    if force {
        return true;
    }
    previous.is_none_or(|record| record.last_sent_at + min_interval <= now)
}
