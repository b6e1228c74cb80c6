//! Key/value storage port — small JSON documents persisted across restarts.

use std::future::Future;
use std::sync::Arc;

use hearth_domain::error::HearthError;

/// Durable JSON document store keyed by name.
pub trait KeyValueStore: Send + Sync {
    /// Load the document stored under `key`.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, HearthError>> + Send;

    /// Replace the document stored under `key`.
    fn save(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> impl Future<Output = Result<(), HearthError>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, HearthError>> + Send {
        (**self).get(key)
    }

    fn save(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> impl Future<Output = Result<(), HearthError>> + Send {
        (**self).save(key, value)
    }
}
