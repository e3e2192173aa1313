use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Third-party identifiers known for a show
///
/// Collected from the cross-reference datasets and the metadata service, then
/// used to look the show up on the destination by exact id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mal_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kitsu_id: Option<u32>,
    /// Destination id when a dataset already knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trakt_id: Option<u64>,
}

/// Kinds of identifier a destination search can be keyed by
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    Tmdb,
    Imdb,
    Tvdb,
}

impl IdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Tmdb => "tmdb",
            IdType::Imdb => "imdb",
            IdType::Tvdb => "tvdb",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tmdb" => Ok(IdType::Tmdb),
            "imdb" => Ok(IdType::Imdb),
            "tvdb" => Ok(IdType::Tvdb),
            other => Err(format!("Unknown id type: {}. Use 'tmdb', 'imdb' or 'tvdb'", other)),
        }
    }
}

impl ExternalIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge ids from another lookup, only filling in missing values.
    /// Existing values are never overwritten.
    pub fn merge(&mut self, other: &ExternalIds) {
        if self.tmdb_id.is_none() {
            self.tmdb_id = other.tmdb_id;
        }
        if self.tvdb_id.is_none() {
            self.tvdb_id = other.tvdb_id;
        }
        if self.imdb_id.is_none() {
            self.imdb_id = other.imdb_id.clone();
        }
        if self.mal_id.is_none() {
            self.mal_id = other.mal_id;
        }
        if self.kitsu_id.is_none() {
            self.kitsu_id = other.kitsu_id;
        }
        if self.trakt_id.is_none() {
            self.trakt_id = other.trakt_id;
        }
    }

    /// Value to search the destination with, as it appears in the search URL
    pub fn search_value(&self, id_type: IdType) -> Option<String> {
        match id_type {
            IdType::Tmdb => self.tmdb_id.map(|id| id.to_string()),
            IdType::Tvdb => self.tvdb_id.map(|id| id.to_string()),
            IdType::Imdb => self
                .imdb_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    /// True when at least one id usable for a destination search is present
    pub fn has_searchable_id(&self) -> bool {
        [IdType::Tmdb, IdType::Imdb, IdType::Tvdb]
            .iter()
            .any(|t| self.search_value(*t).is_some())
    }

    pub fn is_empty(&self) -> bool {
        !self.has_searchable_id()
            && self.mal_id.is_none()
            && self.kitsu_id.is_none()
            && self.trakt_id.is_none()
    }
}
