use media_sync_models::IdType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trakt: Option<TraktConfig>,
    #[serde(default)]
    pub tmdb: Option<TmdbConfig>,
    #[serde(default)]
    pub anilist: AnilistConfig,
    #[serde(default)]
    pub crossref: CrossRefConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TraktConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TmdbConfig {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnilistConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Upper bound on activity pages read per run
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CrossRefConfig {
    #[serde(default = "default_true")]
    pub fribb_enabled: bool,
    #[serde(default = "default_true")]
    pub otaku_enabled: bool,
    #[serde(default = "default_refresh_days")]
    pub refresh_days: u32,
    #[serde(default = "default_fribb_url")]
    pub fribb_url: String,
    #[serde(default = "default_otaku_url")]
    pub otaku_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Lifetime of a cached breakpoint map
    #[serde(default = "default_map_ttl_days")]
    pub map_ttl_days: u32,
    /// Order in which secondary ids are tried against the destination search
    #[serde(default = "default_search_priority")]
    pub search_priority: Vec<IdType>,
    /// Parallel resolver / map-builder calls within one run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Largest history write issued by library catch-up syncs
    #[serde(default = "default_max_batch_episodes")]
    pub max_batch_episodes: usize,
    #[serde(default = "default_lock_ttl_minutes")]
    pub lock_ttl_minutes: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Values larger than this are refused by the file store
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    50
}

fn default_max_pages() -> u32 {
    10
}

fn default_refresh_days() -> u32 {
    7
}

fn default_fribb_url() -> String {
    "https://raw.githubusercontent.com/Fribb/anime-lists/master/anime-list-full.json".to_string()
}

fn default_otaku_url() -> String {
    "https://github.com/Goldenfreddy0703/Otaku-Mappings/raw/refs/heads/main/anime_mappings.db".to_string()
}

fn default_map_ttl_days() -> u32 {
    7
}

fn default_search_priority() -> Vec<IdType> {
    vec![IdType::Tmdb, IdType::Imdb, IdType::Tvdb]
}

fn default_concurrency() -> usize {
    4
}

fn default_max_batch_episodes() -> usize {
    500
}

fn default_lock_ttl_minutes() -> u32 {
    30
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_schedule() -> String {
    "0 0 */6 * * *".to_string()  // Every 6 hours (sec min hour dom mon dow)
}

fn default_max_value_bytes() -> usize {
    1024 * 1024
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        schedule: default_schedule(),
        run_on_startup: default_true(),
    }
}

impl Default for AnilistConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for CrossRefConfig {
    fn default() -> Self {
        Self {
            fribb_enabled: true,
            otaku_enabled: true,
            refresh_days: default_refresh_days(),
            fribb_url: default_fribb_url(),
            otaku_url: default_otaku_url(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            map_ttl_days: default_map_ttl_days(),
            search_priority: default_search_priority(),
            concurrency: default_concurrency(),
            max_batch_episodes: default_max_batch_episodes(),
            lock_ttl_minutes: default_lock_ttl_minutes(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_value_bytes: default_max_value_bytes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trakt: Some(TraktConfig {
                client_id: "YOUR_CLIENT_ID".to_string(),
                client_secret: "YOUR_CLIENT_SECRET".to_string(),
            }),
            tmdb: None,
            anilist: AnilistConfig::default(),
            crossref: CrossRefConfig::default(),
            sync: SyncConfig::default(),
            http: HttpConfig::default(),
            scheduler: Some(default_scheduler_config()),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.is_trakt_configured() {
            return Err(anyhow::anyhow!("Trakt client_id and client_secret must be configured"));
        }

        if self.sync.search_priority.is_empty() {
            return Err(anyhow::anyhow!("sync.search_priority cannot be empty"));
        }
        for (i, id_type) in self.sync.search_priority.iter().enumerate() {
            if self.sync.search_priority[..i].contains(id_type) {
                return Err(anyhow::anyhow!("sync.search_priority lists '{}' more than once", id_type));
            }
        }

        if self.sync.concurrency == 0 {
            return Err(anyhow::anyhow!("sync.concurrency must be at least 1"));
        }
        if self.sync.max_batch_episodes == 0 {
            return Err(anyhow::anyhow!("sync.max_batch_episodes must be at least 1"));
        }
        if self.sync.map_ttl_days == 0 {
            return Err(anyhow::anyhow!("sync.map_ttl_days must be at least 1"));
        }
        if self.http.max_attempts == 0 {
            return Err(anyhow::anyhow!("http.max_attempts must be at least 1"));
        }
        if self.http.timeout_secs == 0 {
            return Err(anyhow::anyhow!("http.timeout_secs must be at least 1"));
        }
        if self.anilist.page_size == 0 || self.anilist.page_size > 50 {
            return Err(anyhow::anyhow!("anilist.page_size must be between 1 and 50"));
        }

        Ok(())
    }

    pub fn is_trakt_configured(&self) -> bool {
        if let Some(ref trakt) = self.trakt {
            !trakt.client_id.is_empty()
                && trakt.client_id != "YOUR_CLIENT_ID"
                && !trakt.client_secret.is_empty()
                && trakt.client_secret != "YOUR_CLIENT_SECRET"
        } else {
            false
        }
    }

    pub fn tmdb_api_key(&self) -> Option<&str> {
        self.tmdb
            .as_ref()
            .map(|t| t.api_key.as_str())
            .filter(|key| !key.is_empty())
    }
}
