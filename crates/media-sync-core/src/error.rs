use media_sync_models::SourceShowId;
use media_sync_sources::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store connection is unusable after a panic")]
    Poisoned,

    #[error("Value for '{key}' is {size} bytes, over the {limit} byte limit")]
    ValueTooLarge { key: String, size: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No destination show found for source show {source_show_id}")]
    NotFound { source_show_id: SourceShowId },

    #[error("Source show {source_show_id} is not on the user's list")]
    NotInLibrary { source_show_id: SourceShowId },

    #[error("Another sync run is in progress (held by {owner})")]
    RunInProgress { owner: String },

    #[error("History submission failed: {0}")]
    Submission(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
