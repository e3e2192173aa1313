pub mod breakpoint;
pub mod catalog;
pub mod external_ids;
pub mod history;
pub mod library;
pub mod mapping;
pub mod progress;
pub mod watch_event;

pub use breakpoint::{Breakpoint, BreakpointMap, EpisodeOverride, EpisodeRef, OverrideSet};
pub use catalog::{EpisodeMetadata, SeasonMetadata};
pub use external_ids::{ExternalIds, IdType};
pub use history::{HistoryItem, HistoryReceipt};
pub use library::{LibraryEntry, LibraryStatus};
pub use mapping::{MappingOrigin, ShowMapping};
pub use progress::{SyncProgress, SyncWatermark};
pub use watch_event::{ActivityFeed, WatchEvent};

/// Show identifier on the source service (AniList media id).
pub type SourceShowId = u64;

/// Show identifier on the destination service (Trakt numeric id).
pub type DestinationShowId = u64;
