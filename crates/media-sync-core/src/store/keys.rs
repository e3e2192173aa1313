use media_sync_models::{DestinationShowId, SourceShowId};

pub const MAPPING_PREFIX: &str = "mapping:";
pub const BREAKPOINT_PREFIX: &str = "map:";
pub const OVERRIDE_PREFIX: &str = "override:";
pub const PROGRESS_PREFIX: &str = "progress:";

pub const SYNC_CURSOR: &str = "sync:cursor";
pub const RUN_LOCK: &str = "lock:sync";
pub const RUN_LOG: &str = "log:runs";
pub const LAST_RUN: &str = "status:sync:last-run";

pub fn mapping(source_show_id: SourceShowId) -> String {
    format!("{}{}", MAPPING_PREFIX, source_show_id)
}

pub fn breakpoint_map(destination_show_id: DestinationShowId) -> String {
    format!("{}{}", BREAKPOINT_PREFIX, destination_show_id)
}

pub fn overrides(destination_show_id: DestinationShowId) -> String {
    format!("{}{}", OVERRIDE_PREFIX, destination_show_id)
}

pub fn progress(source_show_id: SourceShowId) -> String {
    format!("{}{}", PROGRESS_PREFIX, source_show_id)
}

pub fn last_run(kind: &str) -> String {
    format!("status:sync:{}:last-run", kind)
}

/// Numeric id at the end of a prefixed key
pub fn id_suffix(key: &str, prefix: &str) -> Option<u64> {
    key.strip_prefix(prefix)?.parse().ok()
}
