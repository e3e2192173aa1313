use std::fmt;

use chrono::{DateTime, Utc};
use media_sync_models::{DestinationShowId, SourceShowId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Incremental run over the activity feed
    Activity,
    /// Catch-up of a single show
    Show,
    /// Catch-up of the whole completed or watching list
    Library,
}

impl RunKind {
    pub const ALL: [RunKind; 3] = [RunKind::Activity, RunKind::Show, RunKind::Library];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Activity => "activity",
            RunKind::Show => "show",
            RunKind::Library => "library",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    /// A history submission failed; nothing from the failed batch was committed
    Failed,
}

/// One translated episode, as submitted (or as it would be in a dry run)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Translation {
    pub source_show_id: SourceShowId,
    pub show_title: String,
    pub destination_show_id: DestinationShowId,
    pub absolute_episode: u32,
    pub season: u32,
    pub episode: u32,
    pub watched_at: DateTime<Utc>,
}

/// Structured summary every run produces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub kind: RunKind,
    pub status: RunStatus,
    pub dry_run: bool,
    pub found: usize,
    pub translated: usize,
    pub skipped_unmapped: usize,
    pub skipped_map_unavailable: usize,
    pub skipped_already_synced: usize,
    pub submitted: usize,
    pub accepted: u64,
    pub not_found: u64,
    pub batches: usize,
    pub shows_committed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translations: Vec<Translation>,
}

impl SyncReport {
    pub fn new(kind: RunKind, dry_run: bool) -> Self {
        Self {
            kind,
            status: RunStatus::Completed,
            dry_run,
            found: 0,
            translated: 0,
            skipped_unmapped: 0,
            skipped_map_unavailable: 0,
            skipped_already_synced: 0,
            submitted: 0,
            accepted: 0,
            not_found: 0,
            batches: 0,
            shows_committed: 0,
            error: None,
            translations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn skipped(&self) -> usize {
        self.skipped_unmapped + self.skipped_map_unavailable + self.skipped_already_synced
    }

    /// Fold a batch report into this one
    pub fn absorb(&mut self, batch: SyncReport) {
        self.found += batch.found;
        self.translated += batch.translated;
        self.skipped_unmapped += batch.skipped_unmapped;
        self.skipped_map_unavailable += batch.skipped_map_unavailable;
        self.skipped_already_synced += batch.skipped_already_synced;
        self.submitted += batch.submitted;
        self.accepted += batch.accepted;
        self.not_found += batch.not_found;
        self.batches += batch.batches;
        self.shows_committed += batch.shows_committed;
        self.translations.extend(batch.translations);
        if batch.status == RunStatus::Failed {
            self.status = RunStatus::Failed;
            self.error = batch.error;
        }
    }
}
