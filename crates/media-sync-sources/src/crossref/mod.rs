pub mod fribb;
pub mod otaku;
pub mod storage;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use media_sync_models::{ExternalIds, SourceShowId};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SourceError;
use crate::traits::CrossReference;
pub use storage::DatasetStorage;

/// In-memory index of one dataset
#[derive(Debug, Clone)]
pub struct DatasetIndex {
    pub entries: HashMap<SourceShowId, ExternalIds>,
    pub refreshed_at: DateTime<Utc>,
}

impl DatasetIndex {
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.refreshed_at >= max_age
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Fribb's anime-list-full.json
    Fribb,
    /// Otaku-Mappings SQLite database
    Otaku,
}

impl DatasetKind {
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Fribb => fribb::NAME,
            DatasetKind::Otaku => otaku::NAME,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub name: String,
    pub entries: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub snapshot_bytes: u64,
}

/// A downloadable dataset with a disk snapshot and an in-memory index
pub struct CrossRefDataset {
    kind: DatasetKind,
    url: String,
    client: Client,
    storage: DatasetStorage,
    scratch_dir: PathBuf,
    max_age: Duration,
    index: Mutex<Option<Arc<DatasetIndex>>>,
}

impl CrossRefDataset {
    pub fn new(kind: DatasetKind, url: String, client: Client, dataset_dir: PathBuf, refresh_days: u32) -> Self {
        Self {
            kind,
            url,
            client,
            storage: DatasetStorage::new(&dataset_dir, kind.name()),
            scratch_dir: dataset_dir,
            max_age: Duration::days(i64::from(refresh_days.max(1))),
            index: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    async fn download(&self) -> Result<DatasetIndex, SourceError> {
        let name = self.kind.name();
        info!("Downloading {} dataset from {}", name, self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(name, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                service: name.to_string(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let entries = match self.kind {
            DatasetKind::Fribb => {
                let body = response.text().await.map_err(|e| SourceError::from_reqwest(name, e))?;
                fribb::parse(&body)?
            }
            DatasetKind::Otaku => {
                let bytes = response.bytes().await.map_err(|e| SourceError::from_reqwest(name, e))?;
                otaku::parse(bytes.to_vec(), &self.scratch_dir).await?
            }
        };

        if entries.is_empty() {
            return Err(SourceError::dataset(name, "download contained no entries"));
        }
        Ok(DatasetIndex {
            entries,
            refreshed_at: Utc::now(),
        })
    }

    /// Download, index and snapshot the dataset. On failure the previous
    /// snapshot stays in place.
    pub async fn refresh(&self) -> Result<DatasetStatus, SourceError> {
        let mut slot = self.index.lock().await;
        let index = Arc::new(self.download().await?);
        if let Err(e) = self.storage.save(&index) {
            warn!("Failed to save {} snapshot: {}", self.kind.name(), e);
        }
        info!("Refreshed {} dataset: {} entries", self.kind.name(), index.entries.len());
        *slot = Some(index);
        drop(slot);
        Ok(self.status().await)
    }

    /// Loaded index, reading the snapshot or downloading as needed
    async fn index(&self) -> Result<Arc<DatasetIndex>, SourceError> {
        let mut slot = self.index.lock().await;

        if slot.is_none() {
            match self.storage.load() {
                Ok(Some(index)) => *slot = Some(Arc::new(index)),
                Ok(None) => {}
                Err(e) => warn!("Failed to read {} snapshot: {}", self.kind.name(), e),
            }
        }

        let stale = slot
            .as_ref()
            .map(|index| index.is_stale(self.max_age, Utc::now()))
            .unwrap_or(true);
        if stale {
            match self.download().await {
                Ok(index) => {
                    if let Err(e) = self.storage.save(&index) {
                        warn!("Failed to save {} snapshot: {}", self.kind.name(), e);
                    }
                    *slot = Some(Arc::new(index));
                }
                Err(e) if slot.is_some() => {
                    warn!("Keeping previous {} snapshot, refresh failed: {}", self.kind.name(), e);
                }
                Err(e) => return Err(e),
            }
        }

        slot.clone()
            .ok_or_else(|| SourceError::dataset(self.kind.name(), "no data available"))
    }

    pub async fn status(&self) -> DatasetStatus {
        let loaded = self.index.lock().await.clone();
        let index = match loaded {
            Some(index) => Some(index),
            None => self.storage.load().ok().flatten().map(Arc::new),
        };
        DatasetStatus {
            name: self.kind.name().to_string(),
            entries: index.as_ref().map(|i| i.entries.len()).unwrap_or(0),
            refreshed_at: index.as_ref().map(|i| i.refreshed_at),
            snapshot_bytes: self.storage.size(),
        }
    }

    pub async fn clear(&self) -> Result<bool, SourceError> {
        *self.index.lock().await = None;
        self.storage.remove()
    }
}

#[async_trait]
impl CrossReference for CrossRefDataset {
    fn dataset_name(&self) -> &str {
        self.kind.name()
    }

    async fn lookup(&self, source_show_id: SourceShowId) -> Result<Option<ExternalIds>, SourceError> {
        let index = self.index().await?;
        Ok(index.entries.get(&source_show_id).cloned())
    }
}
