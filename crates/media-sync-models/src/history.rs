use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DestinationShowId;

/// A translated watch, ready for the destination history write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryItem {
    pub destination_show_id: DestinationShowId,
    pub season: u32,
    pub episode: u32,
    pub watched_at: DateTime<Utc>,
}

/// What the destination reported for a history write
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryReceipt {
    pub accepted: u64,
    #[serde(default)]
    pub not_found: u64,
}
