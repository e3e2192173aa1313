use std::collections::HashMap;

use media_sync_models::{ExternalIds, SourceShowId};
use serde_json::Value;

use crate::error::SourceError;

pub(crate) const NAME: &str = "fribb";

/// Numbers in this dataset are sometimes strings; accept both
pub(crate) fn lenient_u32(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
}

fn lenient_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Index `anime-list-full.json` by AniList id
pub fn parse(body: &str) -> Result<HashMap<SourceShowId, ExternalIds>, SourceError> {
    if body.trim_start().starts_with('<') {
        return Err(SourceError::dataset(NAME, "received HTML instead of JSON"));
    }

    let items: Vec<serde_json::Map<String, Value>> =
        serde_json::from_str(body).map_err(|e| SourceError::dataset(NAME, e))?;

    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        let Some(anilist_id) = lenient_u32(item.get("anilist_id")) else {
            continue;
        };
        index.insert(
            anilist_id as SourceShowId,
            ExternalIds {
                tmdb_id: lenient_u32(item.get("themoviedb_id")),
                tvdb_id: lenient_u32(item.get("thetvdb_id")),
                imdb_id: lenient_string(item.get("imdb_id")),
                mal_id: lenient_u32(item.get("mal_id")),
                kitsu_id: lenient_u32(item.get("kitsu_id")),
                trakt_id: None,
            },
        );
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indexes_by_anilist_id() {
        let index = parse(
            r#"[
                {"anilist_id": 21, "themoviedb_id": 37854, "thetvdb_id": 81797, "imdb_id": "tt0388629", "mal_id": 21, "type": "TV"},
                {"anilist_id": "1535", "themoviedb_id": "13916", "imdb_id": ""},
                {"mal_id": 5}
            ]"#,
        )
        .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index[&21].tvdb_id, Some(81797));
        assert_eq!(index[&1535].tmdb_id, Some(13916));
        assert_eq!(index[&1535].imdb_id, None);
    }

    #[test]
    fn test_html_body_is_rejected() {
        assert!(parse("<!DOCTYPE html><html></html>").is_err());
    }
}
