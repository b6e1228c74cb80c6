//! `SQLite` implementation of [`KeyValueStore`].

use sqlx::{Row, SqlitePool};

use hearth_app::ports::KeyValueStore;
use hearth_domain::error::HearthError;

use crate::error::StorageError;

const SELECT_BY_KEY: &str = "SELECT value FROM kv_store WHERE key = ?";

const UPSERT: &str = r"
    INSERT INTO kv_store (key, value, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

/// `SQLite`-backed JSON document store.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Create a new store using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, HearthError> {
        let row = sqlx::query(SELECT_BY_KEY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("value").map_err(StorageError::from)?;
        let value = serde_json::from_str(&raw).map_err(StorageError::from)?;
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), HearthError> {
        let raw = serde_json::to_string(&value).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(key)
            .bind(&raw)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        tracing::trace!(key, "document saved");
        Ok(())
    }
}
