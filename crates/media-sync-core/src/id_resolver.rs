//! Source show id -> destination show id resolution.
//!
//! The resolver walks an ordered chain of strategies. Each one either settles
//! the show, hands an enriched context to the next, or gives up for the run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use media_sync_models::{DestinationShowId, ExternalIds, IdType, ShowMapping, SourceShowId};
use media_sync_sources::{CrossReference, DestinationCatalog, ExternalIdsProvider};
use tracing::{debug, info, warn};

use crate::error::{StoreError, SyncError};
use crate::mapping_store::MappingStore;

/// What the chain knows about one show while resolving it
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub source_show_id: SourceShowId,
    pub title: Option<String>,
    pub ids: ExternalIds,
    pub stored: Option<ShowMapping>,
}

impl ResolveContext {
    pub fn new(source_show_id: SourceShowId, title: Option<String>, stored: Option<ShowMapping>) -> Self {
        Self {
            source_show_id,
            title,
            ids: ExternalIds::default(),
            stored,
        }
    }

    fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("'{}' ({})", title, self.source_show_id),
            None => self.source_show_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Resolved(DestinationShowId),
    /// Nothing decided yet, try the next strategy
    Continue,
    /// Stop the chain; the show is skipped this run
    NotFound,
}

#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a result from this strategy must be written back as an auto mapping
    fn persists_result(&self) -> bool {
        true
    }

    async fn try_resolve(&self, ctx: &mut ResolveContext) -> Step;
}

pub struct ManualMapping;

#[async_trait]
impl ResolveStrategy for ManualMapping {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn persists_result(&self) -> bool {
        false
    }

    async fn try_resolve(&self, ctx: &mut ResolveContext) -> Step {
        match &ctx.stored {
            Some(mapping) if mapping.is_manual() => Step::Resolved(mapping.destination_show_id),
            _ => Step::Continue,
        }
    }
}

pub struct CachedMapping;

#[async_trait]
impl ResolveStrategy for CachedMapping {
    fn name(&self) -> &'static str {
        "cached"
    }

    fn persists_result(&self) -> bool {
        false
    }

    async fn try_resolve(&self, ctx: &mut ResolveContext) -> Step {
        match &ctx.stored {
            Some(mapping) if !mapping.is_manual() => Step::Resolved(mapping.destination_show_id),
            _ => Step::Continue,
        }
    }
}

/// Community datasets keyed by source id. Ids from every dataset are merged,
/// earlier datasets winning on conflicts.
pub struct CrossReferenceLookup {
    datasets: Vec<Arc<dyn CrossReference>>,
}

impl CrossReferenceLookup {
    pub fn new(datasets: Vec<Arc<dyn CrossReference>>) -> Self {
        Self { datasets }
    }
}

#[async_trait]
impl ResolveStrategy for CrossReferenceLookup {
    fn name(&self) -> &'static str {
        "crossref"
    }

    async fn try_resolve(&self, ctx: &mut ResolveContext) -> Step {
        let mut found = false;
        for dataset in &self.datasets {
            match dataset.lookup(ctx.source_show_id).await {
                Ok(Some(ids)) => {
                    debug!("{} knows show {}: {:?}", dataset.dataset_name(), ctx.source_show_id, ids);
                    ctx.ids.merge(&ids);
                    found = true;
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "Dataset {} lookup failed for show {}: {}",
                    dataset.dataset_name(),
                    ctx.source_show_id,
                    e
                ),
            }
        }

        if !found {
            info!("No cross-reference entry for show {}", ctx.label());
            return Step::NotFound;
        }
        if let Some(trakt_id) = ctx.ids.trakt_id {
            return Step::Resolved(trakt_id);
        }
        if !ctx.ids.has_searchable_id() {
            warn!("Cross-reference entry for show {} carries no searchable id", ctx.label());
            return Step::NotFound;
        }
        Step::Continue
    }
}

/// Best-effort id expansion through the metadata service
pub struct MetadataExpansion {
    provider: Arc<dyn ExternalIdsProvider>,
}

impl MetadataExpansion {
    pub fn new(provider: Arc<dyn ExternalIdsProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ResolveStrategy for MetadataExpansion {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn try_resolve(&self, ctx: &mut ResolveContext) -> Step {
        if let Some(tmdb_id) = ctx.ids.tmdb_id {
            match self.provider.external_ids(tmdb_id).await {
                Ok(ids) => ctx.ids.merge(&ids),
                Err(e) => warn!("Could not expand TMDB id {} for show {}: {}", tmdb_id, ctx.label(), e),
            }
        }
        Step::Continue
    }
}

/// Exact-id search on the destination, first match wins
pub struct DestinationSearch {
    catalog: Arc<dyn DestinationCatalog>,
    priority: Vec<IdType>,
}

impl DestinationSearch {
    pub fn new(catalog: Arc<dyn DestinationCatalog>, priority: Vec<IdType>) -> Self {
        Self { catalog, priority }
    }
}

#[async_trait]
impl ResolveStrategy for DestinationSearch {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn try_resolve(&self, ctx: &mut ResolveContext) -> Step {
        for id_type in &self.priority {
            let Some(value) = ctx.ids.search_value(*id_type) else {
                continue;
            };
            match self.catalog.search_by_external_id(*id_type, &value).await {
                Ok(Some(show)) => {
                    debug!("Show {} found on destination by {} {}", ctx.label(), id_type, value);
                    return Step::Resolved(show);
                }
                Ok(None) => debug!("No destination match for {} {}", id_type, value),
                Err(e) => warn!("Destination search by {} {} failed: {}", id_type, value, e),
            }
        }
        Step::NotFound
    }
}

pub struct IdentifierResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
    mappings: MappingStore,
    concurrency: usize,
}

impl IdentifierResolver {
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>, mappings: MappingStore, concurrency: usize) -> Self {
        Self {
            strategies,
            mappings,
            concurrency: concurrency.max(1),
        }
    }

    /// The standard chain: manual, cached, datasets, metadata (when
    /// available), destination search.
    pub fn standard(
        mappings: MappingStore,
        datasets: Vec<Arc<dyn CrossReference>>,
        metadata: Option<Arc<dyn ExternalIdsProvider>>,
        catalog: Arc<dyn DestinationCatalog>,
        priority: Vec<IdType>,
        concurrency: usize,
    ) -> Self {
        let mut strategies: Vec<Box<dyn ResolveStrategy>> = vec![
            Box::new(ManualMapping),
            Box::new(CachedMapping),
            Box::new(CrossReferenceLookup::new(datasets)),
        ];
        if let Some(provider) = metadata {
            strategies.push(Box::new(MetadataExpansion::new(provider)));
        }
        strategies.push(Box::new(DestinationSearch::new(catalog, priority)));
        Self::new(strategies, mappings, concurrency)
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    pub async fn resolve(&self, source_show_id: SourceShowId, title: Option<&str>) -> Result<DestinationShowId, SyncError> {
        let stored = self.mappings.get(source_show_id).await?;
        let ctx = ResolveContext::new(source_show_id, title.map(str::to_string), stored);
        self.run_chain(ctx)
            .await
            .ok_or(SyncError::NotFound { source_show_id })
    }

    /// Resolve many shows, reading every stored mapping in one round trip.
    /// Shows that cannot be resolved are absent from the result.
    pub async fn resolve_many(
        &self,
        shows: &[(SourceShowId, Option<String>)],
    ) -> Result<HashMap<SourceShowId, DestinationShowId>, StoreError> {
        let ids: Vec<SourceShowId> = shows.iter().map(|(id, _)| *id).collect();
        let mut stored = self.mappings.get_many(&ids).await?;

        let contexts: Vec<ResolveContext> = shows
            .iter()
            .map(|(id, title)| ResolveContext::new(*id, title.clone(), stored.remove(id)))
            .collect();

        let resolved: Vec<(SourceShowId, Option<DestinationShowId>)> = stream::iter(contexts)
            .map(|ctx| async move {
                let id = ctx.source_show_id;
                (id, self.run_chain(ctx).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        Ok(resolved
            .into_iter()
            .filter_map(|(id, dest)| dest.map(|dest| (id, dest)))
            .collect())
    }

    async fn run_chain(&self, mut ctx: ResolveContext) -> Option<DestinationShowId> {
        for strategy in &self.strategies {
            match strategy.try_resolve(&mut ctx).await {
                Step::Resolved(destination_show_id) => {
                    debug!(
                        "Show {} resolved to {} by {}",
                        ctx.label(),
                        destination_show_id,
                        strategy.name()
                    );
                    if strategy.persists_result() {
                        if let Err(e) = self
                            .mappings
                            .save_auto(ctx.source_show_id, destination_show_id, ctx.ids.clone(), ctx.title.clone())
                            .await
                        {
                            warn!("Could not save mapping for show {}: {}", ctx.label(), e);
                        }
                    }
                    return Some(destination_show_id);
                }
                Step::Continue => {}
                Step::NotFound => {
                    debug!("Show {} not resolved ({})", ctx.label(), strategy.name());
                    return None;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{keys, Store};
    use crate::testing::{FakeCatalog, FakeDataset, FakeMetadata};
    use media_sync_models::MappingOrigin;

    struct Fixture {
        store: Store,
        dataset: Arc<FakeDataset>,
        metadata: Arc<FakeMetadata>,
        catalog: Arc<FakeCatalog>,
        resolver: IdentifierResolver,
    }

    fn fixture() -> Fixture {
        let store = Store::memory();
        let dataset = Arc::new(FakeDataset::new());
        let metadata = Arc::new(FakeMetadata::new());
        let catalog = Arc::new(FakeCatalog::new());
        let resolver = IdentifierResolver::standard(
            MappingStore::new(store.clone()),
            vec![dataset.clone() as Arc<dyn CrossReference>],
            Some(metadata.clone() as Arc<dyn ExternalIdsProvider>),
            catalog.clone(),
            vec![IdType::Tmdb, IdType::Imdb, IdType::Tvdb],
            4,
        );
        Fixture {
            store,
            dataset,
            metadata,
            catalog,
            resolver,
        }
    }

    async fn stored_mappings(store: &Store) -> usize {
        store.keys_with_prefix(keys::MAPPING_PREFIX).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_manual_mapping_short_circuits() {
        let f = fixture();
        f.resolver.mappings().set_manual(21, 999, None).await.unwrap();
        f.dataset.insert(
            21,
            ExternalIds {
                tmdb_id: Some(37854),
                ..ExternalIds::default()
            },
        );

        assert_eq!(f.resolver.resolve(21, None).await.unwrap(), 999);
        assert_eq!(f.dataset.lookups(), 0);
        assert_eq!(f.catalog.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_search_success_persists_once() {
        let f = fixture();
        f.dataset.insert(
            21,
            ExternalIds {
                tmdb_id: Some(37854),
                mal_id: Some(21),
                ..ExternalIds::default()
            },
        );
        f.catalog.add_search(IdType::Tmdb, "37854", 30857);

        assert_eq!(f.resolver.resolve(21, Some("One Piece")).await.unwrap(), 30857);
        let mapping = f.resolver.mappings().get(21).await.unwrap().unwrap();
        assert_eq!(mapping.origin, MappingOrigin::Auto);
        assert_eq!(mapping.secondary_ids.mal_id, Some(21));
        assert_eq!(mapping.title.as_deref(), Some("One Piece"));
        assert_eq!(stored_mappings(&f.store).await, 1);

        // Second call is a cache hit: no dataset or search traffic
        let lookups = f.dataset.lookups();
        assert_eq!(f.resolver.resolve(21, None).await.unwrap(), 30857);
        assert_eq!(f.dataset.lookups(), lookups);
        assert_eq!(f.catalog.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_dataset_entry_is_not_found() {
        let f = fixture();
        let err = f.resolver.resolve(5, None).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { source_show_id: 5 }));
        assert_eq!(f.catalog.search_calls(), 0);
        assert_eq!(stored_mappings(&f.store).await, 0);
    }

    #[tokio::test]
    async fn test_entry_without_searchable_id_is_not_found() {
        let f = fixture();
        f.dataset.insert(
            6,
            ExternalIds {
                mal_id: Some(6),
                ..ExternalIds::default()
            },
        );
        assert!(f.resolver.resolve(6, None).await.is_err());
        assert_eq!(f.catalog.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_dataset_trakt_id_resolves_directly() {
        let f = fixture();
        f.dataset.insert(
            7,
            ExternalIds {
                trakt_id: Some(1234),
                ..ExternalIds::default()
            },
        );
        assert_eq!(f.resolver.resolve(7, None).await.unwrap(), 1234);
        assert_eq!(f.catalog.search_calls(), 0);
        assert_eq!(stored_mappings(&f.store).await, 1);
    }

    #[tokio::test]
    async fn test_search_failure_falls_through_to_next_id_type() {
        let f = fixture();
        f.dataset.insert(
            8,
            ExternalIds {
                tmdb_id: Some(1),
                tvdb_id: Some(81797),
                ..ExternalIds::default()
            },
        );
        f.catalog.fail_search(IdType::Tmdb);
        f.catalog.add_search(IdType::Tvdb, "81797", 55);

        assert_eq!(f.resolver.resolve(8, None).await.unwrap(), 55);
        assert_eq!(f.catalog.search_calls(), 2);
    }

    #[tokio::test]
    async fn test_metadata_expansion_and_its_failures() {
        let f = fixture();
        f.dataset.insert(
            9,
            ExternalIds {
                tmdb_id: Some(100),
                ..ExternalIds::default()
            },
        );
        f.metadata.insert(
            100,
            ExternalIds {
                imdb_id: Some("tt0388629".to_string()),
                ..ExternalIds::default()
            },
        );
        f.catalog.add_search(IdType::Imdb, "tt0388629", 77);
        assert_eq!(f.resolver.resolve(9, None).await.unwrap(), 77);

        // Metadata outage is swallowed; the search still runs on what is known
        f.dataset.insert(
            10,
            ExternalIds {
                tmdb_id: Some(200),
                ..ExternalIds::default()
            },
        );
        f.metadata.set_failing(true);
        f.catalog.add_search(IdType::Tmdb, "200", 88);
        assert_eq!(f.resolver.resolve(10, None).await.unwrap(), 88);
    }

    #[tokio::test]
    async fn test_exhausted_search_writes_nothing() {
        let f = fixture();
        f.dataset.insert(
            11,
            ExternalIds {
                tmdb_id: Some(1),
                imdb_id: Some("tt1".to_string()),
                ..ExternalIds::default()
            },
        );
        assert!(f.resolver.resolve(11, None).await.is_err());
        assert_eq!(stored_mappings(&f.store).await, 0);
    }

    #[tokio::test]
    async fn test_resolve_many_mixes_cached_and_fresh() {
        let f = fixture();
        f.resolver.mappings().set_manual(1, 10, None).await.unwrap();
        f.dataset.insert(
            2,
            ExternalIds {
                tmdb_id: Some(2),
                ..ExternalIds::default()
            },
        );
        f.catalog.add_search(IdType::Tmdb, "2", 20);

        let resolved = f
            .resolver
            .resolve_many(&[(1, None), (2, Some("Two".to_string())), (3, None)])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&1], 10);
        assert_eq!(resolved[&2], 20);
        assert!(!resolved.contains_key(&3));
        assert_eq!(stored_mappings(&f.store).await, 2);
    }
}
