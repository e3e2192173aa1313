use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SourceShowId;

/// One "watched episode" activity from the source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEvent {
    pub source_show_id: SourceShowId,
    pub show_title: String,
    pub absolute_episode: u32,
    pub watched_at: DateTime<Utc>,
    /// Source activity id; synthetic catch-up events have none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<u64>,
    /// Monotonic source cursor (unix seconds)
    pub created_at: i64,
}

/// Result of one read of the activity feed, oldest event first.
///
/// `complete` is false when the read stopped at the page limit with newer
/// activity left on the source. `read_through` is then the creation time of
/// the newest activity read, including activity that produced no event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFeed {
    pub events: Vec<WatchEvent>,
    pub complete: bool,
    pub read_through: Option<i64>,
}

impl ActivityFeed {
    pub fn complete(events: Vec<WatchEvent>) -> Self {
        Self {
            events,
            complete: true,
            read_through: None,
        }
    }

    pub fn truncated(events: Vec<WatchEvent>, read_through: Option<i64>) -> Self {
        Self {
            events,
            complete: false,
            read_through,
        }
    }
}
