use serde::{Deserialize, Serialize};

/// One destination season as reported by the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeasonMetadata {
    pub number: u32,
    /// Authoritative episode count (may exceed `episodes.len()` while airing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_count: Option<u32>,
    #[serde(default)]
    pub episodes: Vec<EpisodeMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodeMetadata {
    pub number: u32,
    /// Absolute number across the show; zero or negative means "unknown"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_number: Option<i64>,
}
