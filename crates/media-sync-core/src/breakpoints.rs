use std::sync::Arc;
use std::time::Duration;

use media_sync_models::{Breakpoint, BreakpointMap, DestinationShowId, SeasonMetadata};
use media_sync_sources::{DestinationCatalog, SourceError};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{keys, Store};

/// Compute where each destination season starts in absolute-episode terms.
///
/// Season 0 (specials) is dropped and seasons are processed in ascending
/// order. A season whose episodes carry positive absolute numbers starts at
/// the smallest of them and pushes the next projected start past the largest.
/// Otherwise the season starts at the running projection, which then grows by
/// the season's episode count, or by its episode list length when the count
/// is missing or zero.
pub fn compute_breakpoints(seasons: &[SeasonMetadata]) -> BreakpointMap {
    let mut ordered: Vec<&SeasonMetadata> = seasons.iter().filter(|s| s.number > 0).collect();
    ordered.sort_by_key(|s| s.number);

    let mut projected: u32 = 1;
    let mut entries = Vec::with_capacity(ordered.len());

    for season in ordered {
        let absolutes = season
            .episodes
            .iter()
            .filter_map(|e| e.absolute_number)
            .filter(|n| *n > 0)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX));

        let (min, max) = absolutes.fold((None::<u32>, None::<u32>), |(min, max), n| {
            (Some(min.map_or(n, |m| m.min(n))), Some(max.map_or(n, |m| m.max(n))))
        });

        match (min, max) {
            (Some(min), Some(max)) => {
                entries.push(Breakpoint {
                    season: season.number,
                    starts_at: min,
                });
                projected = max.saturating_add(1);
            }
            _ => {
                entries.push(Breakpoint {
                    season: season.number,
                    starts_at: projected,
                });
                let count = season
                    .episode_count
                    .filter(|c| *c > 0)
                    .unwrap_or_else(|| u32::try_from(season.episodes.len()).unwrap_or(u32::MAX));
                projected = projected.saturating_add(count);
            }
        }
    }

    BreakpointMap::new(entries)
}

/// Cached per-show breakpoint maps backed by the destination catalog
#[derive(Clone)]
pub struct BreakpointBuilder {
    catalog: Arc<dyn DestinationCatalog>,
    store: Store,
    ttl: Duration,
}

impl BreakpointBuilder {
    pub fn new(catalog: Arc<dyn DestinationCatalog>, store: Store, ttl: Duration) -> Self {
        Self { catalog, store, ttl }
    }

    /// Cached map, or a freshly built one. A catalog failure caches nothing.
    pub async fn build(&self, destination_show_id: DestinationShowId) -> Result<BreakpointMap, SourceError> {
        let key = keys::breakpoint_map(destination_show_id);
        match self.store.get::<BreakpointMap>(&key).await {
            Ok(Some(map)) => {
                debug!("Breakpoint map cache hit for show {}", destination_show_id);
                return Ok(map);
            }
            Ok(None) => {}
            Err(e) => warn!("Breakpoint map cache read failed for show {}: {}", destination_show_id, e),
        }

        let seasons = self.catalog.get_seasons(destination_show_id).await?;
        let map = compute_breakpoints(&seasons);
        debug!(
            "Built breakpoint map for show {}: {:?}",
            destination_show_id,
            map.entries()
        );

        if let Err(e) = self.store.set(&key, &map, Some(self.ttl)).await {
            warn!("Could not cache breakpoint map for show {}: {}", destination_show_id, e);
        }
        Ok(map)
    }

    pub async fn invalidate(&self, destination_show_id: DestinationShowId) -> Result<bool, StoreError> {
        self.store.delete(&keys::breakpoint_map(destination_show_id)).await
    }

    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        self.store.delete_prefix(keys::BREAKPOINT_PREFIX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCatalog;
    use crate::translate::translate;
    use media_sync_models::{EpisodeMetadata, EpisodeRef, OverrideSet};

    fn season(number: u32, count: Option<u32>, absolutes: &[Option<i64>]) -> SeasonMetadata {
        SeasonMetadata {
            number,
            episode_count: count,
            episodes: absolutes
                .iter()
                .enumerate()
                .map(|(i, abs)| EpisodeMetadata {
                    number: i as u32 + 1,
                    absolute_number: *abs,
                })
                .collect(),
        }
    }

    fn starts(map: &BreakpointMap) -> Vec<(u32, u32)> {
        map.entries().iter().map(|b| (b.season, b.starts_at)).collect()
    }

    #[test]
    fn test_counts_project_starts() {
        let map = compute_breakpoints(&[season(2, Some(12), &[]), season(1, Some(25), &[]), season(0, Some(3), &[])]);
        assert_eq!(starts(&map), vec![(1, 1), (2, 26)]);
    }

    #[test]
    fn test_absolute_numbers_win_over_projection() {
        let map = compute_breakpoints(&[
            season(1, Some(24), &[Some(1), Some(2), Some(24)]),
            season(2, Some(12), &[Some(30), Some(31)]),
            season(3, None, &[None, None]),
            season(4, None, &[Some(0), Some(-1)]),
        ]);
        assert_eq!(starts(&map), vec![(1, 1), (2, 30), (3, 32), (4, 34)]);
    }

    #[test]
    fn test_count_preferred_over_list_length() {
        // Airing season: 3 episodes listed, 12 announced
        let map = compute_breakpoints(&[season(1, Some(12), &[None, None, None]), season(2, None, &[])]);
        assert_eq!(starts(&map), vec![(1, 1), (2, 13)]);

        let map = compute_breakpoints(&[season(1, None, &[None, None, None]), season(2, None, &[])]);
        assert_eq!(starts(&map), vec![(1, 1), (2, 4)]);
    }

    #[test]
    fn test_zero_count_falls_back_to_list_length() {
        let map = compute_breakpoints(&[season(1, Some(0), &[None; 12]), season(2, Some(12), &[])]);
        assert_eq!(starts(&map), vec![(1, 1), (2, 13)]);
        let none = OverrideSet::new();
        assert_eq!(translate(12, &map, &none), EpisodeRef::new(1, 12));
        assert_eq!(translate(13, &map, &none), EpisodeRef::new(2, 1));
    }

    #[test]
    fn test_empty_catalog() {
        assert!(compute_breakpoints(&[]).is_empty());
        assert!(compute_breakpoints(&[season(0, Some(5), &[])]).is_empty());
    }

    #[tokio::test]
    async fn test_build_caches_and_failure_caches_nothing() {
        let catalog = Arc::new(FakeCatalog::new());
        catalog.set_seasons(10, vec![season(1, Some(25), &[]), season(2, Some(25), &[])]);
        let store = Store::memory();
        let builder = BreakpointBuilder::new(catalog.clone(), store.clone(), Duration::from_secs(3600));

        let first = builder.build(10).await.unwrap();
        let second = builder.build(10).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.season_calls(), 1);

        assert!(builder.build(11).await.is_err());
        assert!(store.get::<BreakpointMap>(&keys::breakpoint_map(11)).await.unwrap().is_none());

        assert!(builder.invalidate(10).await.unwrap());
        builder.build(10).await.unwrap();
        assert_eq!(catalog.season_calls(), 3);
    }
}
