use std::sync::OnceLock;

use media_sync_models::SourceShowId;
use regex::Regex;

use crate::error::SyncError;

fn anilist_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"anilist\.co/anime/(\d+)").expect("anime url regex should compile"))
}

/// Accept a bare AniList id or an `anilist.co/anime/{id}` URL
pub fn parse_source_show_id(input: &str) -> Result<SourceShowId, SyncError> {
    let trimmed = input.trim();
    if let Ok(id) = trimmed.parse::<SourceShowId>() {
        if id > 0 {
            return Ok(id);
        }
    }
    anilist_url()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<SourceShowId>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| SyncError::InvalidInput(format!("'{}' is not an AniList id or anime URL", trimmed)))
}
