//! Scripted in-memory collaborators for engine tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use media_sync_models::{
    ActivityFeed, DestinationShowId, EpisodeMetadata, ExternalIds, HistoryItem, HistoryReceipt, IdType,
    LibraryEntry, LibraryStatus, SeasonMetadata, SourceShowId, WatchEvent,
};
use media_sync_sources::{
    ActivitySource, CrossReference, DestinationCatalog, ExternalIdsProvider, HistoryWriter, SourceError,
};

pub fn at(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap()
}

pub fn event(show: SourceShowId, episode: u32, created_at: i64) -> WatchEvent {
    WatchEvent {
        source_show_id: show,
        show_title: format!("Show {}", show),
        absolute_episode: episode,
        watched_at: at(created_at),
        source_event_id: None,
        created_at,
    }
}

/// Seasons with known episode counts and no absolute numbering
pub fn seasons(counts: &[u32]) -> Vec<SeasonMetadata> {
    counts
        .iter()
        .enumerate()
        .map(|(i, count)| SeasonMetadata {
            number: i as u32 + 1,
            episode_count: Some(*count),
            episodes: (1..=*count)
                .map(|n| EpisodeMetadata {
                    number: n,
                    absolute_number: None,
                })
                .collect(),
        })
        .collect()
}

fn not_found(what: &str) -> SourceError {
    SourceError::Status {
        service: "fake".to_string(),
        status: 404,
        body: what.to_string(),
    }
}

fn transport() -> SourceError {
    SourceError::Unavailable {
        service: "fake".to_string(),
        attempts: 3,
        reason: "connection refused".to_string(),
    }
}

#[derive(Default)]
pub struct FakeSource {
    events: Mutex<Vec<WatchEvent>>,
    library: Mutex<Vec<LibraryEntry>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    fetch_limit: Mutex<Option<usize>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: WatchEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn add_entry(&self, entry: LibraryEntry) {
        self.library.lock().unwrap().push(entry);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Cap each read at `limit` events, reporting the feed as truncated
    pub fn set_fetch_limit(&self, limit: usize) {
        *self.fetch_limit.lock().unwrap() = Some(limit);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    fn source_name(&self) -> &str {
        "fake-source"
    }

    async fn list_watched_episodes_since(&self, cursor: i64) -> Result<ActivityFeed, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(transport());
        }
        let mut events: Vec<WatchEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.created_at > cursor)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);

        match *self.fetch_limit.lock().unwrap() {
            Some(limit) if events.len() > limit => {
                events.truncate(limit);
                let read_through = events.last().map(|e| e.created_at);
                Ok(ActivityFeed::truncated(events, read_through))
            }
            _ => Ok(ActivityFeed::complete(events)),
        }
    }

    async fn list_library(&self, status: LibraryStatus) -> Result<Vec<LibraryEntry>, SourceError> {
        Ok(self
            .library
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.status == status)
            .cloned()
            .collect())
    }

    async fn library_entry(&self, source_show_id: SourceShowId) -> Result<Option<LibraryEntry>, SourceError> {
        Ok(self
            .library
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.source_show_id == source_show_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    seasons: Mutex<HashMap<DestinationShowId, Vec<SeasonMetadata>>>,
    search: Mutex<HashMap<(IdType, String), DestinationShowId>>,
    failing_search: Mutex<HashSet<IdType>>,
    season_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_seasons(&self, show: DestinationShowId, seasons: Vec<SeasonMetadata>) {
        self.seasons.lock().unwrap().insert(show, seasons);
    }

    pub fn add_search(&self, id_type: IdType, id: &str, show: DestinationShowId) {
        self.search.lock().unwrap().insert((id_type, id.to_string()), show);
    }

    pub fn fail_search(&self, id_type: IdType) {
        self.failing_search.lock().unwrap().insert(id_type);
    }

    pub fn season_calls(&self) -> usize {
        self.season_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationCatalog for FakeCatalog {
    async fn get_seasons(&self, show_id: DestinationShowId) -> Result<Vec<SeasonMetadata>, SourceError> {
        self.season_calls.fetch_add(1, Ordering::SeqCst);
        self.seasons
            .lock()
            .unwrap()
            .get(&show_id)
            .cloned()
            .ok_or_else(|| not_found("show"))
    }

    async fn search_by_external_id(
        &self,
        id_type: IdType,
        id: &str,
    ) -> Result<Option<DestinationShowId>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_search.lock().unwrap().contains(&id_type) {
            return Err(transport());
        }
        Ok(self.search.lock().unwrap().get(&(id_type, id.to_string())).copied())
    }
}

#[derive(Default)]
pub struct FakeWriter {
    submissions: Mutex<Vec<Vec<HistoryItem>>>,
    failing: AtomicBool,
    fail_after: Mutex<Option<usize>>,
}

impl FakeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accept `count` more submissions, then fail every one after
    pub fn fail_after(&self, count: usize) {
        *self.fail_after.lock().unwrap() = Some(count);
    }

    pub fn submissions(&self) -> Vec<Vec<HistoryItem>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryWriter for FakeWriter {
    async fn submit_history(&self, items: &[HistoryItem]) -> Result<HistoryReceipt, SourceError> {
        let exhausted = {
            let mut remaining = self.fail_after.lock().unwrap();
            match remaining.as_mut() {
                Some(0) => true,
                Some(n) => {
                    *n -= 1;
                    false
                }
                None => false,
            }
        };
        if exhausted || self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                service: "fake".to_string(),
                status: 500,
                body: "server error".to_string(),
            });
        }
        self.submissions.lock().unwrap().push(items.to_vec());
        Ok(HistoryReceipt {
            accepted: items.len() as u64,
            not_found: 0,
        })
    }
}

#[derive(Default)]
pub struct FakeMetadata {
    ids: Mutex<HashMap<u32, ExternalIds>>,
    failing: AtomicBool,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tmdb_id: u32, ids: ExternalIds) {
        self.ids.lock().unwrap().insert(tmdb_id, ids);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExternalIdsProvider for FakeMetadata {
    async fn external_ids(&self, tmdb_id: u32) -> Result<ExternalIds, SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(transport());
        }
        self.ids
            .lock()
            .unwrap()
            .get(&tmdb_id)
            .cloned()
            .ok_or_else(|| not_found("tv"))
    }
}

#[derive(Default)]
pub struct FakeDataset {
    entries: Mutex<HashMap<SourceShowId, ExternalIds>>,
    lookups: AtomicUsize,
}

impl FakeDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, show: SourceShowId, ids: ExternalIds) {
        self.entries.lock().unwrap().insert(show, ids);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrossReference for FakeDataset {
    fn dataset_name(&self) -> &str {
        "fake-dataset"
    }

    async fn lookup(&self, source_show_id: SourceShowId) -> Result<Option<ExternalIds>, SourceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().get(&source_show_id).cloned())
    }
}
