use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SourceShowId;

/// Highest absolute episode confirmed written to the destination for a show
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncProgress {
    pub source_show_id: SourceShowId,
    pub last_synced_absolute_episode: u32,
    pub updated_at: DateTime<Utc>,
}

/// Global "fetch events since" cursor (source `createdAt`, unix seconds)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncWatermark {
    pub last_processed_event_cursor: i64,
}

impl SyncWatermark {
    pub fn new(cursor: i64) -> Self {
        Self {
            last_processed_event_cursor: cursor,
        }
    }
}
