pub mod clear;
pub mod config;
pub mod daemon;
pub mod datasets;
pub mod mappings;
pub mod overrides;
pub mod prompts;
pub mod status;
pub mod sync;

use std::sync::Arc;

use color_eyre::Result;
use media_sync_config::{Config, CredentialStore, PathManager};
use media_sync_core::{parse_source_show_id, SqliteStore, Store, SyncEngine, SyncServices, SyncSettings};
use media_sync_models::SourceShowId;
use media_sync_sources::{CrossReference, ExternalIdsProvider, SourceFactory};
use tracing::debug;

pub fn paths() -> PathManager {
    PathManager::default()
}

/// Configuration, credentials and paths shared by every command
pub struct Context {
    pub paths: PathManager,
    pub config: Config,
    pub credentials: CredentialStore,
}

impl Context {
    pub fn load() -> Result<Self> {
        let paths = paths();
        paths
            .ensure_directories()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories: {}", e))?;

        let config_path = paths.config_file();
        let config = if config_path.exists() {
            Config::load_from_file(&config_path)
                .map_err(|e| color_eyre::eyre::eyre!("Failed to load config {:?}: {}", config_path, e))?
        } else {
            debug!("No config at {:?}, using defaults", config_path);
            Config::default()
        };

        let mut credentials = CredentialStore::new(paths.credentials_file());
        credentials
            .load()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials: {}", e))?;

        Ok(Self {
            paths,
            config,
            credentials,
        })
    }

    pub fn save_config(&self) -> Result<()> {
        self.config
            .save_to_file(&self.paths.config_file())
            .map_err(|e| color_eyre::eyre::eyre!("Failed to save config: {}", e))
    }

    /// Opens the store database
    pub fn store(&self) -> Result<Store> {
        let db = SqliteStore::open(&self.paths.store_file(), self.config.store.max_value_bytes)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to open store: {}", e))?;
        Ok(Store::new(Arc::new(db)))
    }

    pub fn factory(&self) -> Result<SourceFactory<'_>> {
        SourceFactory::new(&self.config, &self.credentials, &self.paths)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))
    }

    /// Engine wired to AniList, Trakt, TMDB (when configured) and the datasets
    pub async fn engine(&self) -> Result<SyncEngine> {
        self.config
            .validate()
            .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration: {}. Run 'episync config trakt'", e))?;

        let factory = self.factory()?;
        let source = factory
            .anilist()
            .map_err(|e| color_eyre::eyre::eyre!("{}. Run 'episync config anilist'", e))?;
        let trakt = Arc::new(factory.trakt().map_err(|e| color_eyre::eyre::eyre!("{}", e))?);
        if !trakt.is_authenticated().await {
            return Err(color_eyre::eyre::eyre!(
                "Not authenticated with Trakt. Run 'episync config trakt'"
            ));
        }

        let metadata = factory
            .tmdb()
            .map(|tmdb| Arc::new(tmdb) as Arc<dyn ExternalIdsProvider>);
        let datasets = factory
            .datasets()
            .into_iter()
            .map(|dataset| dataset as Arc<dyn CrossReference>)
            .collect();

        let services = SyncServices {
            source: Arc::new(source),
            catalog: trakt.clone(),
            writer: trakt,
            metadata,
            datasets,
        };
        Ok(SyncEngine::new(
            services,
            self.store()?,
            SyncSettings::from_config(&self.config.sync),
        ))
    }
}

pub fn parse_show(input: &str) -> Result<SourceShowId> {
    parse_source_show_id(input).map_err(|e| color_eyre::eyre::eyre!("{}", e))
}
