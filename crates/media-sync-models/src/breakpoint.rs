use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::DestinationShowId;

/// Where a destination season begins, in absolute-episode terms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Breakpoint {
    pub season: u32,
    pub starts_at: u32,
}

/// Per-show lookup from absolute episode number to destination season
///
/// Entries are kept in the order they were computed (ascending season), which
/// is non-decreasing in `starts_at` for well-formed catalogs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct BreakpointMap(Vec<Breakpoint>);

impl BreakpointMap {
    pub fn new(entries: Vec<Breakpoint>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[Breakpoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_at(&self, season: u32) -> Option<u32> {
        self.0.iter().find(|b| b.season == season).map(|b| b.starts_at)
    }
}

impl From<Vec<Breakpoint>> for BreakpointMap {
    fn from(entries: Vec<Breakpoint>) -> Self {
        Self(entries)
    }
}

/// A destination (season, episode-within-season) pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeRef {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeRef {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }
}

/// Manual correction for one absolute episode of a destination show
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodeOverride {
    pub destination_show_id: DestinationShowId,
    pub absolute_episode: u32,
    pub season: u32,
    pub episode: u32,
}

impl EpisodeOverride {
    pub fn target(&self) -> EpisodeRef {
        EpisodeRef::new(self.season, self.episode)
    }
}

/// All overrides of one destination show, keyed by absolute episode
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct OverrideSet(BTreeMap<u32, EpisodeRef>);

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, absolute_episode: u32) -> Option<EpisodeRef> {
        self.0.get(&absolute_episode).copied()
    }

    pub fn insert(&mut self, absolute_episode: u32, target: EpisodeRef) -> Option<EpisodeRef> {
        self.0.insert(absolute_episode, target)
    }

    pub fn remove(&mut self, absolute_episode: u32) -> Option<EpisodeRef> {
        self.0.remove(&absolute_episode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, EpisodeRef)> + '_ {
        self.0.iter().map(|(abs, target)| (*abs, *target))
    }
}

impl FromIterator<(u32, EpisodeRef)> for OverrideSet {
    fn from_iter<I: IntoIterator<Item = (u32, EpisodeRef)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
