use std::collections::HashMap;

use chrono::Utc;
use media_sync_models::{DestinationShowId, ExternalIds, MappingOrigin, ShowMapping, SourceShowId};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{keys, Store};

/// Source show -> destination show links, manual and automatic
#[derive(Clone)]
pub struct MappingStore {
    store: Store,
}

impl MappingStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, source_show_id: SourceShowId) -> Result<Option<ShowMapping>, StoreError> {
        self.store.get(&keys::mapping(source_show_id)).await
    }

    pub async fn get_many(&self, ids: &[SourceShowId]) -> Result<HashMap<SourceShowId, ShowMapping>, StoreError> {
        let keys: Vec<String> = ids.iter().map(|id| keys::mapping(*id)).collect();
        let found: HashMap<String, ShowMapping> = self.store.get_many(&keys).await?;
        Ok(found
            .into_values()
            .map(|mapping| (mapping.source_show_id, mapping))
            .collect())
    }

    /// Persist an automatic resolution. An existing manual mapping is left
    /// untouched and returned instead.
    pub async fn save_auto(
        &self,
        source_show_id: SourceShowId,
        destination_show_id: DestinationShowId,
        secondary_ids: ExternalIds,
        title: Option<String>,
    ) -> Result<ShowMapping, StoreError> {
        if let Some(existing) = self.get(source_show_id).await? {
            if existing.is_manual() {
                debug!("Keeping manual mapping for source show {}", source_show_id);
                return Ok(existing);
            }
        }

        let mapping = ShowMapping {
            source_show_id,
            destination_show_id,
            secondary_ids,
            origin: MappingOrigin::Auto,
            title,
            updated_at: Utc::now(),
        };
        self.store.set(&keys::mapping(source_show_id), &mapping, None).await?;
        Ok(mapping)
    }

    /// Operator-entered mapping; always replaces whatever was stored
    pub async fn set_manual(
        &self,
        source_show_id: SourceShowId,
        destination_show_id: DestinationShowId,
        title: Option<String>,
    ) -> Result<ShowMapping, StoreError> {
        let previous = self.get(source_show_id).await?;
        let mapping = ShowMapping {
            source_show_id,
            destination_show_id,
            secondary_ids: previous.as_ref().map(|m| m.secondary_ids.clone()).unwrap_or_default(),
            origin: MappingOrigin::Manual,
            title: title.or_else(|| previous.and_then(|m| m.title)),
            updated_at: Utc::now(),
        };
        self.store.set(&keys::mapping(source_show_id), &mapping, None).await?;
        info!(
            "Manual mapping saved: source show {} -> destination show {}",
            source_show_id, destination_show_id
        );
        Ok(mapping)
    }

    pub async fn remove(&self, source_show_id: SourceShowId) -> Result<bool, StoreError> {
        self.store.delete(&keys::mapping(source_show_id)).await
    }

    /// All mappings, optionally only one origin, sorted by source id
    pub async fn list(&self, origin: Option<MappingOrigin>) -> Result<Vec<ShowMapping>, StoreError> {
        let keys = self.store.keys_with_prefix(keys::MAPPING_PREFIX).await?;
        let found: HashMap<String, ShowMapping> = self.store.get_many(&keys).await?;
        let mut mappings: Vec<ShowMapping> = found
            .into_values()
            .filter(|m| origin.map(|o| m.origin == o).unwrap_or(true))
            .collect();
        mappings.sort_by_key(|m| m.source_show_id);
        Ok(mappings)
    }
}
