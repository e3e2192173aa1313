use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{KeyValueStore, StoredEntry};

/// In-process store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = StoredEntry::new(value, ttl, Utc::now());
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), StoredEntry::new(value, ttl, now));
        Ok(true)
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, serde_json::Value>, StoreError> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(key)
                    .filter(|e| e.is_live(now))
                    .map(|e| (key.clone(), e.value.clone()))
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store.set("gone", serde_json::json!(1), Some(Duration::ZERO)).await.unwrap();
        store.set("kept", serde_json::json!(2), Some(Duration::from_secs(60))).await.unwrap();

        assert_eq!(store.get("gone").await.unwrap(), None);
        assert_eq!(store.get("kept").await.unwrap(), Some(serde_json::json!(2)));
        assert_eq!(store.keys_with_prefix("").await.unwrap(), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_set_if_absent_only_replaces_expired_entries() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", serde_json::json!(1), None).await.unwrap());
        assert!(!store.set_if_absent("k", serde_json::json!(2), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!(1)));

        store.set("old", serde_json::json!(1), Some(Duration::ZERO)).await.unwrap();
        assert!(store.set_if_absent("old", serde_json::json!(2), None).await.unwrap());
        assert_eq!(store.get("old").await.unwrap(), Some(serde_json::json!(2)));
    }
}
