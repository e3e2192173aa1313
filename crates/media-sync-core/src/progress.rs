use std::collections::HashMap;

use chrono::Utc;
use media_sync_models::{SourceShowId, SyncProgress, SyncWatermark};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{keys, Store};

/// Per-show "last synced absolute episode" watermarks and the global cursor.
/// Both only move forward.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Store,
}

impl ProgressTracker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Watermark for one show; 0 when nothing was synced yet
    pub async fn get(&self, source_show_id: SourceShowId) -> Result<u32, StoreError> {
        let progress: Option<SyncProgress> = self.store.get(&keys::progress(source_show_id)).await?;
        Ok(progress.map(|p| p.last_synced_absolute_episode).unwrap_or(0))
    }

    /// Watermarks for many shows in one read; absent shows map to 0
    pub async fn get_many(&self, ids: &[SourceShowId]) -> Result<HashMap<SourceShowId, u32>, StoreError> {
        let keys: Vec<String> = ids.iter().map(|id| keys::progress(*id)).collect();
        let found: HashMap<String, SyncProgress> = self.store.get_many(&keys).await?;
        let mut watermarks: HashMap<SourceShowId, u32> = ids.iter().map(|id| (*id, 0)).collect();
        for progress in found.into_values() {
            watermarks.insert(progress.source_show_id, progress.last_synced_absolute_episode);
        }
        Ok(watermarks)
    }

    /// Raise a show's watermark. Values at or below the stored one are ignored;
    /// returns whether a write happened.
    pub async fn commit(&self, source_show_id: SourceShowId, value: u32) -> Result<bool, StoreError> {
        let current = self.get(source_show_id).await?;
        if value <= current {
            if value < current {
                warn!(
                    "Ignoring watermark regression for show {}: {} < {}",
                    source_show_id, value, current
                );
            }
            return Ok(false);
        }

        let progress = SyncProgress {
            source_show_id,
            last_synced_absolute_episode: value,
            updated_at: Utc::now(),
        };
        self.store.set(&keys::progress(source_show_id), &progress, None).await?;
        debug!("Show {} watermark {} -> {}", source_show_id, current, value);
        Ok(true)
    }

    pub async fn list(&self) -> Result<Vec<SyncProgress>, StoreError> {
        let keys = self.store.keys_with_prefix(keys::PROGRESS_PREFIX).await?;
        let found: HashMap<String, SyncProgress> = self.store.get_many(&keys).await?;
        let mut all: Vec<SyncProgress> = found.into_values().collect();
        all.sort_by_key(|p| p.source_show_id);
        Ok(all)
    }

    /// Forget a show's watermark so it is synced from the start again
    pub async fn reset(&self, source_show_id: SourceShowId) -> Result<bool, StoreError> {
        self.store.delete(&keys::progress(source_show_id)).await
    }

    pub async fn cursor(&self) -> Result<SyncWatermark, StoreError> {
        Ok(self.store.get(keys::SYNC_CURSOR).await?.unwrap_or_default())
    }

    /// Advance the global cursor; an older value is ignored
    pub async fn commit_cursor(&self, watermark: SyncWatermark) -> Result<bool, StoreError> {
        let current = self.cursor().await?;
        if watermark.last_processed_event_cursor <= current.last_processed_event_cursor {
            return Ok(false);
        }
        self.store.set(keys::SYNC_CURSOR, &watermark, None).await?;
        Ok(true)
    }

    /// Explicit operator reset; the only way the cursor moves backwards
    pub async fn reset_cursor(&self, watermark: SyncWatermark) -> Result<(), StoreError> {
        self.store.set(keys::SYNC_CURSOR, &watermark, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watermark_never_regresses() {
        let tracker = ProgressTracker::new(Store::memory());
        assert_eq!(tracker.get(1).await.unwrap(), 0);

        assert!(tracker.commit(1, 10).await.unwrap());
        assert!(!tracker.commit(1, 7).await.unwrap());
        assert!(!tracker.commit(1, 10).await.unwrap());
        assert_eq!(tracker.get(1).await.unwrap(), 10);

        assert!(tracker.commit(1, 11).await.unwrap());
        assert_eq!(tracker.get(1).await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_get_many_defaults_to_zero() {
        let tracker = ProgressTracker::new(Store::memory());
        tracker.commit(1, 5).await.unwrap();

        let watermarks = tracker.get_many(&[1, 2]).await.unwrap();
        assert_eq!(watermarks[&1], 5);
        assert_eq!(watermarks[&2], 0);
        assert_eq!(tracker.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_moves_forward_unless_reset() {
        let tracker = ProgressTracker::new(Store::memory());
        assert!(tracker.commit_cursor(SyncWatermark::new(100)).await.unwrap());
        assert!(!tracker.commit_cursor(SyncWatermark::new(50)).await.unwrap());
        assert_eq!(tracker.cursor().await.unwrap(), SyncWatermark::new(100));

        tracker.reset_cursor(SyncWatermark::new(0)).await.unwrap();
        assert_eq!(tracker.cursor().await.unwrap(), SyncWatermark::new(0));
    }
}
