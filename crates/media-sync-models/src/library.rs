use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SourceShowId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LibraryStatus {
    Completed,
    Watching,
}

/// A show on the user's source list with its current progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryEntry {
    pub source_show_id: SourceShowId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_english: Option<String>,
    pub status: LibraryStatus,
    /// Absolute number of the last watched episode
    pub progress: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_episodes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl LibraryEntry {
    pub fn display_title(&self) -> &str {
        self.title_english.as_deref().unwrap_or(&self.title)
    }
}
