use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bincode::{deserialize, serialize};
use chrono::{TimeZone, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use media_sync_models::{ExternalIds, SourceShowId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crossref::DatasetIndex;
use crate::error::SourceError;

/// On-disk row. Kept separate from `ExternalIds` because bincode needs every
/// field written, with no skipping.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    source_show_id: SourceShowId,
    tmdb_id: Option<u32>,
    tvdb_id: Option<u32>,
    imdb_id: Option<String>,
    mal_id: Option<u32>,
    kitsu_id: Option<u32>,
    trakt_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    refreshed_at: i64,
    entries: Vec<SnapshotEntry>,
}

/// Gzip-compressed bincode snapshot of one dataset index
pub struct DatasetStorage {
    path: PathBuf,
}

impl DatasetStorage {
    pub fn new(dataset_dir: &Path, name: &str) -> Self {
        Self {
            path: dataset_dir.join(format!("{}.bin.gz", name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no snapshot exists or the snapshot is unreadable.
    /// Unreadable snapshots are backed up next to the original.
    pub fn load(&self) -> Result<Option<DatasetIndex>, SourceError> {
        if !self.path.exists() {
            debug!("No dataset snapshot at {:?}", self.path);
            return Ok(None);
        }

        let start = std::time::Instant::now();
        let data = std::fs::read(&self.path)?;

        let snapshot: Snapshot = match decode(&data) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let backup_path = self.path.with_extension("gz.bak");
                match std::fs::rename(&self.path, &backup_path) {
                    Ok(()) => warn!(
                        "Dataset snapshot unreadable ({}). Moved it to {:?}",
                        e, backup_path
                    ),
                    Err(backup_err) => warn!(
                        "Dataset snapshot unreadable ({}) and could not be moved aside: {}",
                        e, backup_err
                    ),
                }
                return Ok(None);
            }
        };

        let refreshed_at = Utc
            .timestamp_opt(snapshot.refreshed_at, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let entries: HashMap<SourceShowId, ExternalIds> = snapshot
            .entries
            .into_iter()
            .map(|e| {
                (
                    e.source_show_id,
                    ExternalIds {
                        tmdb_id: e.tmdb_id,
                        tvdb_id: e.tvdb_id,
                        imdb_id: e.imdb_id,
                        mal_id: e.mal_id,
                        kitsu_id: e.kitsu_id,
                        trakt_id: e.trakt_id,
                    },
                )
            })
            .collect();

        info!(
            "Loaded dataset snapshot {:?}: {} entries in {:?}",
            self.path.file_name().unwrap_or_default(),
            entries.len(),
            start.elapsed()
        );
        Ok(Some(DatasetIndex { entries, refreshed_at }))
    }

    pub fn save(&self, index: &DatasetIndex) -> Result<(), SourceError> {
        let start = std::time::Instant::now();
        let snapshot = Snapshot {
            refreshed_at: index.refreshed_at.timestamp(),
            entries: index
                .entries
                .iter()
                .map(|(id, ids)| SnapshotEntry {
                    source_show_id: *id,
                    tmdb_id: ids.tmdb_id,
                    tvdb_id: ids.tvdb_id,
                    imdb_id: ids.imdb_id.clone(),
                    mal_id: ids.mal_id,
                    kitsu_id: ids.kitsu_id,
                    trakt_id: ids.trakt_id,
                })
                .collect(),
        };

        let serialized = serialize(&snapshot).map_err(|e| SourceError::dataset("snapshot", e))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let encoded = encoder.finish()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write to a temp file, then rename
        let temp_path = self.path.with_extension("gz.tmp");
        std::fs::write(&temp_path, encoded)?;
        std::fs::rename(&temp_path, &self.path)?;

        debug!(
            "Saved dataset snapshot {:?}: {} entries in {:?}",
            self.path,
            index.entries.len(),
            start.elapsed()
        );
        Ok(())
    }

    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn remove(&self) -> Result<bool, SourceError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn decode(data: &[u8]) -> Result<Snapshot, String> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).map_err(|e| e.to_string())?;
    deserialize(&decompressed).map_err(|e| e.to_string())
}
