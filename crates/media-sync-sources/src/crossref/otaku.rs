use std::collections::HashMap;
use std::path::{Path, PathBuf};

use media_sync_models::{ExternalIds, SourceShowId};
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::SourceError;

pub(crate) const NAME: &str = "otaku";

/// Anything smaller cannot be a real mapping database
const MIN_DATABASE_BYTES: usize = 1024;

const MAPPING_QUERY: &str = "SELECT anilist_id, thetvdb_id, themoviedb_id, imdb_id, trakt_id \
                             FROM anime WHERE anilist_id IS NOT NULL";

fn as_u64(value: Value) -> Option<u64> {
    match value {
        Value::Integer(n) if n > 0 => Some(n as u64),
        Value::Real(f) if f >= 1.0 => Some(f as u64),
        Value::Text(s) => s.trim().parse().ok().filter(|n| *n > 0),
        _ => None,
    }
}

fn as_u32(value: Value) -> Option<u32> {
    as_u64(value).and_then(|n| u32::try_from(n).ok())
}

fn as_text(value: Value) -> Option<String> {
    match value {
        Value::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Read the `anime` table of an Otaku-Mappings database
pub fn read_database(path: &Path) -> Result<HashMap<SourceShowId, ExternalIds>, SourceError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| SourceError::dataset(NAME, e))?;
    let mut stmt = conn
        .prepare(MAPPING_QUERY)
        .map_err(|e| SourceError::dataset(NAME, e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Value>(0)?,
                row.get::<_, Value>(1)?,
                row.get::<_, Value>(2)?,
                row.get::<_, Value>(3)?,
                row.get::<_, Value>(4)?,
            ))
        })
        .map_err(|e| SourceError::dataset(NAME, e))?;

    let mut index = HashMap::new();
    for row in rows {
        let (anilist_id, tvdb_id, tmdb_id, imdb_id, trakt_id) =
            row.map_err(|e| SourceError::dataset(NAME, e))?;
        let Some(anilist_id) = as_u64(anilist_id) else {
            continue;
        };
        index.insert(
            anilist_id,
            ExternalIds {
                tmdb_id: as_u32(tmdb_id),
                tvdb_id: as_u32(tvdb_id),
                imdb_id: as_text(imdb_id),
                trakt_id: as_u64(trakt_id),
                ..ExternalIds::default()
            },
        );
    }

    debug!("Read {} rows from Otaku mapping database", index.len());
    Ok(index)
}

/// Write a downloaded database to `scratch_dir` and index it off the async runtime
pub async fn parse(bytes: Vec<u8>, scratch_dir: &Path) -> Result<HashMap<SourceShowId, ExternalIds>, SourceError> {
    if bytes.len() < MIN_DATABASE_BYTES {
        return Err(SourceError::dataset(NAME, "downloaded database is too small"));
    }

    std::fs::create_dir_all(scratch_dir)?;
    let db_path: PathBuf = scratch_dir.join("otaku-download.db");
    std::fs::write(&db_path, &bytes)?;

    let read_path = db_path.clone();
    let result = tokio::task::spawn_blocking(move || read_database(&read_path))
        .await
        .map_err(|e| SourceError::dataset(NAME, e))?;

    if let Err(e) = std::fs::remove_file(&db_path) {
        debug!("Could not remove {:?}: {}", db_path, e);
    }
    result
}
