pub mod anilist;
pub mod crossref;
pub mod error;
pub mod factory;
pub mod retry;
pub mod tmdb;
pub mod traits;
pub mod trakt;

pub use anilist::AnilistClient;
pub use crossref::{CrossRefDataset, DatasetIndex, DatasetKind, DatasetStatus};
pub use error::SourceError;
pub use factory::SourceFactory;
pub use retry::{build_http_client, RetryPolicy};
pub use tmdb::TmdbClient;
pub use traits::{ActivitySource, CrossReference, DestinationCatalog, ExternalIdsProvider, HistoryWriter};
pub use trakt::TraktClient;
