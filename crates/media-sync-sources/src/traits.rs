use async_trait::async_trait;
use media_sync_models::{
    ActivityFeed, DestinationShowId, ExternalIds, HistoryItem, HistoryReceipt, IdType, LibraryEntry,
    LibraryStatus, SeasonMetadata, SourceShowId,
};

use crate::error::SourceError;

/// The service users log their watching on
#[async_trait]
pub trait ActivitySource: Send + Sync {
    fn source_name(&self) -> &str;

    /// "Watched episode" events created strictly after `cursor` (unix seconds),
    /// oldest first. A feed cut short keeps the oldest events.
    async fn list_watched_episodes_since(&self, cursor: i64) -> Result<ActivityFeed, SourceError>;

    async fn list_library(&self, status: LibraryStatus) -> Result<Vec<LibraryEntry>, SourceError>;

    /// The user's list entry for one show, if the show is on their list
    async fn library_entry(&self, source_show_id: SourceShowId) -> Result<Option<LibraryEntry>, SourceError>;
}

/// Read side of the destination: season layout and id search
#[async_trait]
pub trait DestinationCatalog: Send + Sync {
    async fn get_seasons(&self, show_id: DestinationShowId) -> Result<Vec<SeasonMetadata>, SourceError>;

    /// Exact-id show search; `Ok(None)` when the destination has no match
    async fn search_by_external_id(
        &self,
        id_type: IdType,
        id: &str,
    ) -> Result<Option<DestinationShowId>, SourceError>;
}

/// Write side of the destination
#[async_trait]
pub trait HistoryWriter: Send + Sync {
    async fn submit_history(&self, items: &[HistoryItem]) -> Result<HistoryReceipt, SourceError>;
}

/// Metadata service able to expand one id into the others it knows
#[async_trait]
pub trait ExternalIdsProvider: Send + Sync {
    async fn external_ids(&self, tmdb_id: u32) -> Result<ExternalIds, SourceError>;
}

/// Community dataset mapping source show ids to third-party ids
#[async_trait]
pub trait CrossReference: Send + Sync {
    fn dataset_name(&self) -> &str;

    async fn lookup(&self, source_show_id: SourceShowId) -> Result<Option<ExternalIds>, SourceError>;
}
