use std::collections::HashMap;

use media_sync_models::{DestinationShowId, EpisodeOverride, EpisodeRef, OverrideSet};
use tracing::info;

use crate::error::StoreError;
use crate::store::{keys, Store};

/// Per-episode manual corrections, one set per destination show
#[derive(Clone)]
pub struct OverrideStore {
    store: Store,
}

impl OverrideStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, destination_show_id: DestinationShowId) -> Result<OverrideSet, StoreError> {
        Ok(self
            .store
            .get(&keys::overrides(destination_show_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn get_many(
        &self,
        ids: &[DestinationShowId],
    ) -> Result<HashMap<DestinationShowId, OverrideSet>, StoreError> {
        let keys: Vec<String> = ids.iter().map(|id| keys::overrides(*id)).collect();
        let found: HashMap<String, OverrideSet> = self.store.get_many(&keys).await?;
        Ok(found
            .into_iter()
            .filter_map(|(key, set)| keys::id_suffix(&key, keys::OVERRIDE_PREFIX).map(|id| (id, set)))
            .collect())
    }

    pub async fn set(&self, entry: &EpisodeOverride) -> Result<(), StoreError> {
        let mut set = self.get(entry.destination_show_id).await?;
        set.insert(entry.absolute_episode, entry.target());
        self.store.set(&keys::overrides(entry.destination_show_id), &set, None).await?;
        info!(
            "Override saved: show {} episode {} -> S{}E{}",
            entry.destination_show_id, entry.absolute_episode, entry.season, entry.episode
        );
        Ok(())
    }

    /// Returns the removed target, if there was one
    pub async fn remove(
        &self,
        destination_show_id: DestinationShowId,
        absolute_episode: u32,
    ) -> Result<Option<EpisodeRef>, StoreError> {
        let mut set = self.get(destination_show_id).await?;
        let removed = set.remove(absolute_episode);
        if removed.is_some() {
            let key = keys::overrides(destination_show_id);
            if set.is_empty() {
                self.store.delete(&key).await?;
            } else {
                self.store.set(&key, &set, None).await?;
            }
        }
        Ok(removed)
    }

    /// Every override, optionally for one show, ordered by show and episode
    pub async fn list(&self, destination_show_id: Option<DestinationShowId>) -> Result<Vec<EpisodeOverride>, StoreError> {
        let ids: Vec<DestinationShowId> = match destination_show_id {
            Some(id) => vec![id],
            None => self
                .store
                .keys_with_prefix(keys::OVERRIDE_PREFIX)
                .await?
                .iter()
                .filter_map(|key| keys::id_suffix(key, keys::OVERRIDE_PREFIX))
                .collect(),
        };

        let mut entries: Vec<EpisodeOverride> = self
            .get_many(&ids)
            .await?
            .into_iter()
            .flat_map(|(show, set)| {
                set.iter()
                    .map(|(absolute_episode, target)| EpisodeOverride {
                        destination_show_id: show,
                        absolute_episode,
                        season: target.season,
                        episode: target.episode,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort_by_key(|e| (e.destination_show_id, e.absolute_episode));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(show: u64, absolute_episode: u32, season: u32, episode: u32) -> EpisodeOverride {
        EpisodeOverride {
            destination_show_id: show,
            absolute_episode,
            season,
            episode,
        }
    }

    #[tokio::test]
    async fn test_set_list_remove() {
        let overrides = OverrideStore::new(Store::memory());
        overrides.set(&entry(7, 100, 0, 1)).await.unwrap();
        overrides.set(&entry(7, 12, 1, 12)).await.unwrap();
        overrides.set(&entry(3, 1, 2, 1)).await.unwrap();

        let listed = overrides.list(None).await.unwrap();
        assert_eq!(
            listed.iter().map(|e| (e.destination_show_id, e.absolute_episode)).collect::<Vec<_>>(),
            vec![(3, 1), (7, 12), (7, 100)]
        );
        assert_eq!(overrides.get(7).await.unwrap().get(100), Some(EpisodeRef::new(0, 1)));

        assert_eq!(overrides.remove(7, 100).await.unwrap(), Some(EpisodeRef::new(0, 1)));
        assert_eq!(overrides.remove(7, 100).await.unwrap(), None);
        assert_eq!(overrides.list(Some(7)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_removing_last_override_drops_the_key() {
        let store = Store::memory();
        let overrides = OverrideStore::new(store.clone());
        overrides.set(&entry(9, 5, 1, 5)).await.unwrap();
        overrides.remove(9, 5).await.unwrap();

        assert!(store.keys_with_prefix(keys::OVERRIDE_PREFIX).await.unwrap().is_empty());
        assert!(overrides.get_many(&[9]).await.unwrap().is_empty());
    }
}
