//! Key/value persistence shared by every store in the engine.
//!
//! Values are JSON documents with an optional expiry. `Store` is the typed
//! front used by the rest of the crate; backends implement `KeyValueStore`.

pub mod keys;
pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Insert or replace. `ttl` makes the entry disappear after that long.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Insert only when no live entry exists, checked and written as one
    /// atomic step. Returns whether the value was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Every requested key that exists, in one round trip
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, serde_json::Value>, StoreError>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// A stored value with its expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    pub fn new(value: serde_json::Value, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expires_at = ttl.map(|ttl| {
            now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36500))
        });
        Self { value, expires_at }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// Typed access to a `KeyValueStore`
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn KeyValueStore>,
}

impl Store {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// A value that no longer decodes is logged and treated as absent
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.inner.get(key).await? {
            Some(value) => Ok(decode(key, value)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.inner.set(key, value, ttl).await
    }

    pub async fn set_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let value = serde_json::to_value(value)?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    pub async fn get_many<T: DeserializeOwned>(&self, keys: &[String]) -> Result<HashMap<String, T>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let values = self.inner.get_many(keys).await?;
        Ok(values
            .into_iter()
            .filter_map(|(key, value)| decode(&key, value).map(|v| (key, v)))
            .collect())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys_with_prefix(prefix).await
    }

    /// Delete every key under `prefix`, returning how many were removed
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in self.inner.keys_with_prefix(prefix).await? {
            if self.inner.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring undecodable store value for '{}': {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_typed_round_trip_and_bad_values() {
        let store = Store::memory();
        store.set("a", &vec![1u32, 2, 3], None).await.unwrap();
        store.set("b", &"text", None).await.unwrap();

        let a: Option<Vec<u32>> = store.get("a").await.unwrap();
        assert_eq!(a, Some(vec![1, 2, 3]));

        // Wrong shape reads as absent
        let b: Option<Vec<u32>> = store.get("b").await.unwrap();
        assert_eq!(b, None);

        let many: HashMap<String, Vec<u32>> = store
            .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(many.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = Store::memory();
        store.set("map:1", &1, None).await.unwrap();
        store.set("map:2", &2, None).await.unwrap();
        store.set("mapping:1", &3, None).await.unwrap();

        assert_eq!(store.delete_prefix("map:").await.unwrap(), 2);
        assert_eq!(store.keys_with_prefix("map").await.unwrap(), vec!["mapping:1".to_string()]);
    }
}
