//! In-memory port implementations shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, TimeZone, Utc};

use hearth_domain::entity::EntitySnapshot;
use hearth_domain::error::{HearthError, HubError};
use hearth_domain::notification::{Channel, Delivery, Notification};
use hearth_domain::service::ServiceCall;
use hearth_domain::time::Timestamp;

use crate::ports::{Clock, HubClient, KeyValueStore, Notifier};

/// Clock that only moves when told to. Starts on Monday 2024-03-04 08:00.
/// Local time equals UTC.
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<Timestamp>>);

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap())
    }
}

impl ManualClock {
    pub fn at(now: Timestamp) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    pub fn set(&self, now: Timestamp) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *self.0.lock().unwrap() += chrono::Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.0.lock().unwrap()
    }

    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_utc()
    }
}

#[derive(Default)]
struct StoreInner {
    documents: Mutex<HashMap<String, serde_json::Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// Key/value store in a hash map, with switchable faults.
#[derive(Clone, Default)]
pub struct InMemoryStore(Arc<StoreInner>);

impl InMemoryStore {
    pub fn insert(&self, key: &str, value: serde_json::Value) {
        self.0.documents.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn snapshot(&self, key: &str) -> Option<serde_json::Value> {
        self.0.documents.lock().unwrap().get(key).cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.0.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn storage_fault() -> HearthError {
    HearthError::Storage(Box::new(std::io::Error::other("disk unavailable")))
}

impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, HearthError> {
        if self.0.fail_reads.load(Ordering::SeqCst) {
            return Err(storage_fault());
        }
        Ok(self.snapshot(key))
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), HearthError> {
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(storage_fault());
        }
        self.insert(key, value);
        Ok(())
    }
}

enum Fault {
    Transient(usize),
    Rejected,
}

#[derive(Default)]
struct HubInner {
    states: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<ServiceCall>>,
    attempts: Mutex<Vec<String>>,
    faults: Mutex<HashMap<String, Fault>>,
    fail_reads: AtomicBool,
}

/// Hub that records service calls and serves states from a map.
#[derive(Clone, Default)]
pub struct SpyHub(Arc<HubInner>);

impl SpyHub {
    pub fn set_state(&self, entity_id: &str, state: &str) {
        self.0
            .states
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), state.to_string());
    }

    /// Successful calls, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.0.calls.lock().unwrap().clone()
    }

    /// Successful calls to `domain.service`.
    pub fn calls_to(&self, qualified: &str) -> Vec<ServiceCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.qualified_name() == qualified)
            .collect()
    }

    /// Every attempted call to `domain.service`, failed ones included.
    pub fn attempts_to(&self, qualified: &str) -> usize {
        self.0
            .attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|name| *name == qualified)
            .count()
    }

    /// Fail the next `times` calls to `domain.service` with a timeout.
    pub fn fail_times(&self, qualified: &str, times: usize) {
        self.0
            .faults
            .lock()
            .unwrap()
            .insert(qualified.to_string(), Fault::Transient(times));
    }

    pub fn fail_always(&self, qualified: &str) {
        self.fail_times(qualified, usize::MAX);
    }

    /// Reject every call to `domain.service`.
    pub fn reject(&self, qualified: &str) {
        self.0
            .faults
            .lock()
            .unwrap()
            .insert(qualified.to_string(), Fault::Rejected);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.0.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn fault_for(&self, qualified: &str) -> Option<HearthError> {
        let mut faults = self.0.faults.lock().unwrap();
        match faults.get_mut(qualified) {
            Some(Fault::Transient(remaining)) if *remaining > 0 => {
                *remaining = remaining.saturating_sub(1);
                Some(HubError::Timeout.into())
            }
            Some(Fault::Rejected) => Some(
                HubError::Rejected {
                    service: qualified.to_string(),
                    reason: "rejected by test".to_string(),
                }
                .into(),
            ),
            _ => None,
        }
    }
}

impl HubClient for SpyHub {
    async fn call_service(&self, call: ServiceCall) -> Result<(), HearthError> {
        let qualified = call.qualified_name();
        self.0.attempts.lock().unwrap().push(qualified.clone());
        if let Some(err) = self.fault_for(&qualified) {
            return Err(err);
        }
        self.0.calls.lock().unwrap().push(call);
        Ok(())
    }

    async fn get_state(&self, entity_id: &str) -> Result<Option<EntitySnapshot>, HearthError> {
        if self.0.fail_reads.load(Ordering::SeqCst) {
            return Err(HubError::Timeout.into());
        }
        Ok(self
            .0
            .states
            .lock()
            .unwrap()
            .get(entity_id)
            .map(|state| EntitySnapshot::new(entity_id, state.as_str(), Utc::now())))
    }
}

/// What a [`SpyNotifier`] was asked to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub channel: Channel,
    pub title: String,
    pub message: String,
    pub force: bool,
}

#[derive(Default)]
struct NotifierInner {
    sent: Mutex<Vec<SentNotification>>,
    failing_titles: Mutex<HashSet<String>>,
}

/// Notifier that records requests instead of delivering them.
#[derive(Clone, Default)]
pub struct SpyNotifier(Arc<NotifierInner>);

impl SpyNotifier {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.0.sent.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent().into_iter().map(|sent| sent.title).collect()
    }

    pub fn fail_title(&self, title: &str) {
        self.0
            .failing_titles
            .lock()
            .unwrap()
            .insert(title.to_string());
    }
}

impl Notifier for SpyNotifier {
    async fn notify(&self, notification: Notification) -> Result<Delivery, HearthError> {
        if self
            .0
            .failing_titles
            .lock()
            .unwrap()
            .contains(&notification.title)
        {
            return Err(HubError::Timeout.into());
        }
        self.0.sent.lock().unwrap().push(SentNotification {
            channel: notification.channel,
            title: notification.title,
            message: notification.message,
            force: notification.force,
        });
        Ok(Delivery::Sent)
    }

    async fn reset_history(&self, _title: &str) {}
}
