//! Persistent per-title notification history used for throttling.
//!
//! The whole history is one JSON document under [`HISTORY_KEY`]. Reads
//! fail open: a missing, unreadable or corrupt document behaves like an
//! empty history so notifications are never lost to a storage fault.

use hearth_domain::notification::{
    DEFAULT_MIN_INTERVAL_MINUTES, NotificationRecord, NotificationRecords, may_send,
};
use hearth_domain::time::minutes;

use crate::ports::{Clock, KeyValueStore, SystemClock};

/// Storage key of the history document.
pub const HISTORY_KEY: &str = "notificationHistory";

/// Throttle state of every notification title.
pub struct NotificationHistory<K, C = SystemClock> {
    store: K,
    clock: C,
}

impl<K: KeyValueStore, C: Clock> NotificationHistory<K, C> {
    pub fn new(store: K, clock: C) -> Self {
        Self { store, clock }
    }

    /// Whether `name` may be sent now.
    ///
    /// `min_interval_minutes` defaults to [`DEFAULT_MIN_INTERVAL_MINUTES`].
    pub async fn can_send(&self, name: &str, force: bool, min_interval_minutes: Option<f64>) -> bool {
        if force {
            return true;
        }
        let records = self.load().await;
        let interval = minutes(min_interval_minutes.unwrap_or(DEFAULT_MIN_INTERVAL_MINUTES));
        may_send(records.get(name), false, interval, self.clock.now())
    }

    /// Remember that `name` was sent now with `message`.
    pub async fn record_send(&self, name: &str, message: &str) {
        let mut records = self.load().await;
        records.upsert(name, message, self.clock.now());
        self.persist(&records).await;
    }

    /// Forget `name`, so its next send is never throttled.
    pub async fn reset_history(&self, name: &str) {
        let mut records = self.load().await;
        if records.remove(name) {
            self.persist(&records).await;
            tracing::debug!(name, "notification history reset");
        }
    }

    /// The last delivery of `name`, if any.
    pub async fn record(&self, name: &str) -> Option<NotificationRecord> {
        self.load().await.get(name).cloned()
    }

    async fn load(&self) -> NotificationRecords {
        match self.store.get(HISTORY_KEY).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "corrupt notification history, starting fresh");
                NotificationRecords::default()
            }),
            Ok(None) => NotificationRecords::default(),
            Err(err) => {
                tracing::error!(error = %err, "failed to load notification history");
                NotificationRecords::default()
            }
        }
    }

    async fn persist(&self, records: &NotificationRecords) {
        let value = match serde_json::to_value(records) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode notification history");
                return;
            }
        };
        if let Err(err) = self.store.save(HISTORY_KEY, value).await {
            tracing::error!(error = %err, "failed to save notification history");
        }
    }
}
