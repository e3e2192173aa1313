//! Sync runs: activity feed, single show and whole-library catch-up.
//!
//! Every run goes through the same pipeline. Distinct shows are resolved,
//! their watermarks, overrides and breakpoint maps are loaded once, events are
//! translated oldest-first and submitted as one history write per batch.
//! Watermarks are committed only after the destination confirmed the write.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use media_sync_config::SyncConfig;
use media_sync_models::{
    BreakpointMap, DestinationShowId, HistoryItem, IdType, LibraryStatus, OverrideSet, SourceShowId,
    SyncWatermark, WatchEvent,
};
use media_sync_sources::{ActivitySource, CrossReference, DestinationCatalog, ExternalIdsProvider, HistoryWriter};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::breakpoints::BreakpointBuilder;
use crate::error::{StoreError, SyncError, SyncResult};
use crate::id_resolver::IdentifierResolver;
use crate::mapping_store::MappingStore;
use crate::overrides::OverrideStore;
use crate::progress::ProgressTracker;
use crate::report::{RunKind, RunStatus, SyncReport, Translation};
use crate::run_lock::{RunLease, RunLock};
use crate::run_log::{RunLog, RunRecord};
use crate::store::{keys, Store};
use crate::translate::translate;

#[cfg(test)]
mod tests;

/// Catch-up ceiling for shows whose episode total is unknown
const MAX_CATCH_UP_EPISODE: u32 = 5_000;

/// External collaborators a sync run talks to
#[derive(Clone)]
pub struct SyncServices {
    pub source: Arc<dyn ActivitySource>,
    pub catalog: Arc<dyn DestinationCatalog>,
    pub writer: Arc<dyn HistoryWriter>,
    pub metadata: Option<Arc<dyn ExternalIdsProvider>>,
    pub datasets: Vec<Arc<dyn CrossReference>>,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub search_priority: Vec<IdType>,
    pub concurrency: usize,
    pub max_batch_episodes: usize,
    pub map_ttl: Duration,
    pub lock_ttl: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            search_priority: config.search_priority.clone(),
            concurrency: config.concurrency.max(1),
            max_batch_episodes: config.max_batch_episodes.max(1),
            map_ttl: Duration::from_secs(u64::from(config.map_ttl_days) * 24 * 3600),
            lock_ttl: Duration::from_secs(u64::from(config.lock_ttl_minutes) * 60),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Translate and report only; nothing is submitted or committed
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub cursor: SyncWatermark,
    pub lock_holder: Option<RunLease>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_runs: Vec<(RunKind, Option<DateTime<Utc>>)>,
    pub mappings: usize,
    pub tracked_shows: usize,
}

impl EngineStatus {
    /// Read-only snapshot of the persisted sync state
    pub async fn load(store: &Store) -> SyncResult<Self> {
        let progress = ProgressTracker::new(store.clone());
        let run_log = RunLog::new(store.clone());
        Ok(Self {
            cursor: progress.cursor().await?,
            lock_holder: store.get(keys::RUN_LOCK).await?,
            last_run: run_log.last_run().await?,
            last_runs: run_log.last_runs().await?,
            mappings: store.keys_with_prefix(keys::MAPPING_PREFIX).await?.len(),
            tracked_shows: store.keys_with_prefix(keys::PROGRESS_PREFIX).await?.len(),
        })
    }
}

/// Everything known about how one source show lands on the destination
#[derive(Debug, Clone, Serialize)]
pub struct ShowInspection {
    pub source_show_id: SourceShowId,
    pub destination_show_id: DestinationShowId,
    pub watermark: u32,
    pub breakpoints: BreakpointMap,
    pub overrides: OverrideSet,
}

pub struct SyncEngine {
    store: Store,
    source: Arc<dyn ActivitySource>,
    writer: Arc<dyn HistoryWriter>,
    resolver: IdentifierResolver,
    breakpoints: BreakpointBuilder,
    overrides: OverrideStore,
    progress: ProgressTracker,
    run_log: RunLog,
    lock: RunLock,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(services: SyncServices, store: Store, settings: SyncSettings) -> Self {
        let resolver = IdentifierResolver::standard(
            MappingStore::new(store.clone()),
            services.datasets,
            services.metadata,
            services.catalog.clone(),
            settings.search_priority.clone(),
            settings.concurrency,
        );
        Self {
            store: store.clone(),
            source: services.source,
            writer: services.writer,
            resolver,
            breakpoints: BreakpointBuilder::new(services.catalog, store.clone(), settings.map_ttl),
            overrides: OverrideStore::new(store.clone()),
            progress: ProgressTracker::new(store.clone()),
            run_log: RunLog::new(store.clone()),
            lock: RunLock::new(store, settings.lock_ttl),
            settings,
        }
    }

    pub fn mappings(&self) -> &MappingStore {
        self.resolver.mappings()
    }

    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn breakpoints(&self) -> &BreakpointBuilder {
        &self.breakpoints
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Incremental run over the activity feed starting after `watermark`.
    ///
    /// Returns the cursor to persist next. It is unchanged after a failed
    /// submission or a dry run.
    pub async fn run(&self, watermark: SyncWatermark, options: SyncOptions) -> SyncResult<(SyncWatermark, SyncReport)> {
        let cursor = watermark.last_processed_event_cursor;
        info!("Fetching {} activity after {}", self.source.source_name(), cursor);

        let feed = self.source.list_watched_episodes_since(cursor).await?;
        let mut events = feed.events;
        events.retain(|e| e.created_at > cursor);
        events.sort_by_key(|e| e.created_at);

        if events.is_empty() && feed.complete {
            info!("No new activity");
            let next = if options.dry_run {
                watermark
            } else {
                SyncWatermark::new(cursor.max(Utc::now().timestamp()))
            };
            return Ok((next, SyncReport::new(RunKind::Activity, options.dry_run)));
        }

        // A truncated feed may hold more activity in its last second on unread
        // pages, so that second is read again next run.
        let newest = events.iter().map(|e| e.created_at).max().unwrap_or(cursor);
        let newest = if feed.complete {
            newest
        } else {
            feed.read_through.unwrap_or(newest).max(newest).saturating_sub(1)
        };
        let report = self.process_batch(&events, RunKind::Activity, options).await?;

        let next = if report.is_success() && !options.dry_run {
            SyncWatermark::new(cursor.max(newest))
        } else {
            watermark
        };
        Ok((next, report))
    }

    /// Full activity run: lock, read the stored cursor, run, persist.
    #[instrument(skip(self))]
    pub async fn sync(&self, options: SyncOptions) -> SyncResult<SyncReport> {
        let lease = self.lock.acquire().await?;
        let started_at = Utc::now();
        let result = self.sync_activity(options).await;
        self.finish(RunKind::Activity, options, &lease, started_at, &result).await;
        result
    }

    /// Catch one show up from its watermark to `up_to`, or to the progress on
    /// the user's list when no target is given.
    #[instrument(skip(self))]
    pub async fn sync_show(
        &self,
        source_show_id: SourceShowId,
        up_to: Option<u32>,
        options: SyncOptions,
    ) -> SyncResult<SyncReport> {
        let lease = self.lock.acquire().await?;
        let started_at = Utc::now();
        let result = self.catch_up_show(source_show_id, up_to, options).await;
        self.finish(RunKind::Show, options, &lease, started_at, &result).await;
        result
    }

    /// Catch every list entry with the given status up to its progress
    #[instrument(skip(self))]
    pub async fn sync_library(&self, status: LibraryStatus, options: SyncOptions) -> SyncResult<SyncReport> {
        let lease = self.lock.acquire().await?;
        let started_at = Utc::now();
        let result = self.catch_up_library(status, options).await;
        self.finish(RunKind::Library, options, &lease, started_at, &result).await;
        result
    }

    pub async fn status(&self) -> SyncResult<EngineStatus> {
        EngineStatus::load(&self.store).await
    }

    /// Resolve a show and load everything used to translate its episodes
    pub async fn inspect_show(&self, source_show_id: SourceShowId) -> SyncResult<ShowInspection> {
        let destination_show_id = self.resolver.resolve(source_show_id, None).await?;
        Ok(ShowInspection {
            source_show_id,
            destination_show_id,
            watermark: self.progress.get(source_show_id).await?,
            breakpoints: self.breakpoints.build(destination_show_id).await?,
            overrides: self.overrides.get(destination_show_id).await?,
        })
    }

    pub async fn clear_maps(&self) -> Result<usize, StoreError> {
        let removed = self.breakpoints.clear_all().await?;
        info!("Removed {} cached breakpoint maps", removed);
        Ok(removed)
    }

    /// Move the activity cursor, backwards included
    pub async fn reset_cursor(&self, to: Option<DateTime<Utc>>) -> Result<SyncWatermark, StoreError> {
        let watermark = SyncWatermark::new(to.map(|t| t.timestamp()).unwrap_or(0));
        self.progress.reset_cursor(watermark).await?;
        info!("Cursor reset to {}", watermark.last_processed_event_cursor);
        Ok(watermark)
    }

    async fn sync_activity(&self, options: SyncOptions) -> SyncResult<SyncReport> {
        let cursor = self.progress.cursor().await?;
        let (next, report) = self.run(cursor, options).await?;
        if report.is_success() && !options.dry_run {
            self.progress.commit_cursor(next).await?;
            debug!("Cursor now {}", next.last_processed_event_cursor);
        }
        Ok(report)
    }

    async fn catch_up_show(
        &self,
        source_show_id: SourceShowId,
        up_to: Option<u32>,
        options: SyncOptions,
    ) -> SyncResult<SyncReport> {
        let entry = self.source.library_entry(source_show_id).await?;
        let target = match (up_to, &entry) {
            (Some(target), _) => target,
            (None, Some(entry)) => entry.progress,
            (None, None) => return Err(SyncError::NotInLibrary { source_show_id }),
        };
        let last_episode = entry
            .as_ref()
            .and_then(|e| e.total_episodes)
            .filter(|total| *total > 0)
            .unwrap_or(MAX_CATCH_UP_EPISODE);
        if target > last_episode {
            return Err(SyncError::InvalidInput(format!(
                "episode {} is past the last episode ({}) of show {}",
                target, last_episode, source_show_id
            )));
        }
        let title = entry
            .as_ref()
            .map(|e| e.display_title().to_string())
            .unwrap_or_default();
        let watched_at = entry.as_ref().and_then(|e| e.completed_at).unwrap_or_else(Utc::now);

        let watermark = self.progress.get(source_show_id).await?;
        info!(
            "Catching up show {} from episode {} to {}",
            source_show_id,
            watermark.saturating_add(1),
            target
        );
        let events = synthesize(source_show_id, &title, watermark, target, watched_at);
        let batches = plan_batches(vec![events], self.settings.max_batch_episodes);
        self.run_batches(batches, RunKind::Show, options).await
    }

    async fn catch_up_library(&self, status: LibraryStatus, options: SyncOptions) -> SyncResult<SyncReport> {
        let entries = self.source.list_library(status).await?;
        let ids: Vec<SourceShowId> = entries.iter().map(|e| e.source_show_id).collect();
        let watermarks = self.progress.get_many(&ids).await?;
        let now = Utc::now();

        let groups: Vec<Vec<WatchEvent>> = entries
            .iter()
            .filter_map(|entry| {
                let watermark = watermarks.get(&entry.source_show_id).copied().unwrap_or(0);
                if entry.progress <= watermark {
                    return None;
                }
                let watched_at = entry.completed_at.unwrap_or(now);
                Some(synthesize(
                    entry.source_show_id,
                    entry.display_title(),
                    watermark,
                    entry.progress,
                    watched_at,
                ))
            })
            .collect();

        info!(
            "{} {:?} list entries, {} behind on the destination",
            entries.len(),
            status,
            groups.len()
        );
        let batches = plan_batches(groups, self.settings.max_batch_episodes);
        self.run_batches(batches, RunKind::Library, options).await
    }

    async fn run_batches(
        &self,
        batches: Vec<Vec<WatchEvent>>,
        kind: RunKind,
        options: SyncOptions,
    ) -> SyncResult<SyncReport> {
        let mut total = SyncReport::new(kind, options.dry_run);
        let count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            debug!("Batch {}/{}: {} episodes", i + 1, count, batch.len());
            let report = self.process_batch(&batch, kind, options).await?;
            let failed = !report.is_success();
            total.absorb(report);
            if failed {
                warn!("Stopping after failed batch {}/{}", i + 1, count);
                break;
            }
        }
        Ok(total)
    }

    /// Translate, submit and commit one batch of oldest-first events
    async fn process_batch(&self, events: &[WatchEvent], kind: RunKind, options: SyncOptions) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(kind, options.dry_run);
        report.found = events.len();
        if events.is_empty() {
            return Ok(report);
        }

        let mut seen = HashSet::new();
        let shows: Vec<(SourceShowId, Option<String>)> = events
            .iter()
            .filter(|e| seen.insert(e.source_show_id))
            .map(|e| {
                let title = Some(e.show_title.clone()).filter(|t| !t.is_empty());
                (e.source_show_id, title)
            })
            .collect();
        let show_ids: Vec<SourceShowId> = shows.iter().map(|(id, _)| *id).collect();

        let destinations = self.resolver.resolve_many(&shows).await?;
        let watermarks = self.progress.get_many(&show_ids).await?;

        let mut destination_ids: Vec<DestinationShowId> = destinations.values().copied().collect();
        destination_ids.sort_unstable();
        destination_ids.dedup();
        let overrides = self.overrides.get_many(&destination_ids).await?;
        let maps = self.load_maps(&destination_ids).await;

        let no_overrides = OverrideSet::new();
        let mut staged: HashMap<SourceShowId, u32> = HashMap::new();
        let mut translations = Vec::new();

        for event in events {
            let show = event.source_show_id;
            let Some(&destination_show_id) = destinations.get(&show) else {
                report.skipped_unmapped += 1;
                continue;
            };
            let Some(map) = maps.get(&destination_show_id) else {
                report.skipped_map_unavailable += 1;
                continue;
            };

            let persisted = watermarks.get(&show).copied().unwrap_or(0);
            let guard = staged.get(&show).copied().unwrap_or(0).max(persisted);
            if event.absolute_episode <= guard {
                report.skipped_already_synced += 1;
                continue;
            }

            let set = overrides.get(&destination_show_id).unwrap_or(&no_overrides);
            let target = translate(i64::from(event.absolute_episode), map, set);
            staged.insert(show, event.absolute_episode);
            translations.push(Translation {
                source_show_id: show,
                show_title: event.show_title.clone(),
                destination_show_id,
                absolute_episode: event.absolute_episode,
                season: target.season,
                episode: target.episode,
                watched_at: event.watched_at,
            });
        }
        report.translated = translations.len();

        info!(
            "{} events: {} translated, {} unmapped, {} without map, {} already synced",
            report.found,
            report.translated,
            report.skipped_unmapped,
            report.skipped_map_unavailable,
            report.skipped_already_synced
        );

        if options.dry_run {
            report.translations = translations;
            return Ok(report);
        }
        if translations.is_empty() {
            return Ok(report);
        }

        let items: Vec<HistoryItem> = translations
            .iter()
            .map(|t| HistoryItem {
                destination_show_id: t.destination_show_id,
                season: t.season,
                episode: t.episode,
                watched_at: t.watched_at,
            })
            .collect();
        report.submitted = items.len();
        report.batches = 1;

        let receipt = match self.writer.submit_history(&items).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!("History submission of {} episodes failed: {}", items.len(), e);
                report.status = RunStatus::Failed;
                report.error = Some(e.to_string());
                return Ok(report);
            }
        };
        report.accepted = receipt.accepted;
        report.not_found = receipt.not_found;
        if receipt.not_found > 0 {
            warn!("Destination did not recognise {} submitted episodes", receipt.not_found);
        }

        let mut highest: HashMap<SourceShowId, u32> = HashMap::new();
        for t in &translations {
            let entry = highest.entry(t.source_show_id).or_insert(0);
            *entry = (*entry).max(t.absolute_episode);
        }
        let committed = try_join_all(
            highest
                .iter()
                .map(|(show, episode)| self.progress.commit(*show, *episode)),
        )
        .await?;
        report.shows_committed = committed.into_iter().filter(|written| *written).count();

        info!(
            "Submitted {} episodes: {} accepted, {} watermarks advanced",
            report.submitted, report.accepted, report.shows_committed
        );
        Ok(report)
    }

    async fn load_maps(&self, destination_ids: &[DestinationShowId]) -> HashMap<DestinationShowId, BreakpointMap> {
        let built: Vec<_> = stream::iter(destination_ids.iter().copied())
            .map(|id| async move { (id, self.breakpoints.build(id).await) })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        built
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(map) => Some((id, map)),
                Err(e) => {
                    warn!("No breakpoint map for destination show {}: {}", id, e);
                    None
                }
            })
            .collect()
    }

    async fn finish(
        &self,
        kind: RunKind,
        options: SyncOptions,
        lease: &RunLease,
        started_at: DateTime<Utc>,
        result: &SyncResult<SyncReport>,
    ) {
        let finished_at = Utc::now();
        let record = match result {
            Ok(report) => RunRecord::from_report(report, started_at, finished_at),
            Err(e) => {
                let mut report = SyncReport::new(kind, options.dry_run);
                report.status = RunStatus::Failed;
                report.error = Some(e.to_string());
                RunRecord::from_report(&report, started_at, finished_at)
            }
        };
        if let Err(e) = self.run_log.record(record).await {
            warn!("Could not write run log: {}", e);
        }
        if let Err(e) = self.lock.release(lease).await {
            warn!("Could not release run lock: {}", e);
        }
    }
}

/// Events for episodes `after + 1 ..= up_to` of one show, oldest first
fn synthesize(
    source_show_id: SourceShowId,
    title: &str,
    after: u32,
    up_to: u32,
    watched_at: DateTime<Utc>,
) -> Vec<WatchEvent> {
    (after.saturating_add(1)..=up_to)
        .map(|episode| WatchEvent {
            source_show_id,
            show_title: title.to_string(),
            absolute_episode: episode,
            watched_at,
            source_event_id: None,
            created_at: watched_at.timestamp(),
        })
        .collect()
}

/// Pack per-show event groups into batches of at most `max` events without
/// splitting a show, unless the show alone is larger than `max`.
pub(crate) fn plan_batches(groups: Vec<Vec<WatchEvent>>, max: usize) -> Vec<Vec<WatchEvent>> {
    let max = max.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<WatchEvent> = Vec::new();

    for group in groups.into_iter().filter(|g| !g.is_empty()) {
        if current.len() + group.len() <= max {
            current.extend(group);
            continue;
        }
        if !current.is_empty() {
            batches.push(std::mem::take(&mut current));
        }
        if group.len() > max {
            batches.extend(group.chunks(max).map(|chunk| chunk.to_vec()));
        } else {
            current = group;
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
