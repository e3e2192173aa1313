use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::KeyValueStore;

const SCHEMA: &str = "
PRAGMA busy_timeout = 5000;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
CREATE TABLE IF NOT EXISTS entries (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    expires_at INTEGER
);";

/// Expiry columns hold unix milliseconds; NULL never expires
const SELECT_LIVE: &str = "SELECT value FROM entries WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)";

/// SQLite database under the data dir. Every write is a single-row upsert,
/// so processes sharing the file never overwrite each other's keys.
pub struct SqliteStore {
    path: PathBuf,
    max_value_bytes: usize,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`. A file that is not a usable
    /// database is moved aside and replaced by an empty one.
    pub fn open(path: &Path, max_value_bytes: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            info!("Creating new store at {:?}", path);
        }

        let conn = match init(path) {
            Ok(conn) => conn,
            Err(StoreError::Database(e)) if is_corrupt(&e) => {
                let backup_path = path.with_extension(format!("corrupt-{}.db", Utc::now().timestamp()));
                warn!(
                    "Store corruption detected in {:?}: {}. Moving it to {:?}",
                    path, e, backup_path
                );
                std::fs::rename(path, &backup_path)?;
                init(path)?
            }
            Err(e) => return Err(e),
        };

        let purged = conn.execute(
            "DELETE FROM entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now_ms()],
        )?;
        debug!("Opened store {:?} ({} expired keys purged)", path, purged);

        Ok(Self {
            path: path.to_path_buf(),
            max_value_bytes,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn encode(&self, key: &str, value: &serde_json::Value) -> Result<String, StoreError> {
        let text = serde_json::to_string(value)?;
        if text.len() > self.max_value_bytes {
            return Err(StoreError::ValueTooLarge {
                key: key.to_string(),
                size: text.len(),
                limit: self.max_value_bytes,
            });
        }
        Ok(text)
    }
}

fn init(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn is_corrupt(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt)
    )
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)))
}

fn parse(key: &str, text: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(text).map_err(|e| {
        warn!("Stored value for {} is not JSON: {}", key, e);
        StoreError::Serialization(e)
    })
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let text: Option<String> = self
            .conn()?
            .query_row(SELECT_LIVE, params![key, now_ms()], |row| row.get(0))
            .optional()?;
        text.map(|t| parse(key, &t)).transpose()
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let text = self.encode(key, &value)?;
        self.conn()?.execute(
            "INSERT INTO entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, text, expiry(ttl)],
        )?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let text = self.encode(key, &value)?;
        let changed = self.conn()?.execute(
            "INSERT INTO entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
             WHERE entries.expires_at IS NOT NULL AND entries.expires_at <= ?4",
            params![key, text, expiry(ttl), now_ms()],
        )?;
        Ok(changed == 1)
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, serde_json::Value>, StoreError> {
        let now = now_ms();
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(SELECT_LIVE)?;

        let mut found = HashMap::new();
        for key in keys {
            let text: Option<String> = stmt.query_row(params![key, now], |row| row.get(0)).optional()?;
            if let Some(text) = text {
                found.insert(key.clone(), parse(key, &text)?);
            }
        }
        Ok(found)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.conn()?.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT key FROM entries
             WHERE substr(key, 1, length(?1)) = ?1 AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY key",
        )?;
        let keys = stmt
            .query_map(params![prefix, now_ms()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}
