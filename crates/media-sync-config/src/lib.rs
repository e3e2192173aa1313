pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{AnilistConfig, Config, CrossRefConfig, HttpConfig, SchedulerConfig, StoreConfig, SyncConfig, TmdbConfig, TraktConfig, default_scheduler_config};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
