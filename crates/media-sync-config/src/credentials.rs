use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    pub fn get_anilist_access_token(&self) -> Option<&String> {
        self.get("anilist_access_token")
    }

    pub fn set_anilist_access_token(&mut self, token: String) {
        self.set("anilist_access_token".to_string(), token);
    }

    pub fn get_trakt_access_token(&self) -> Option<&String> {
        self.get("trakt_access_token")
    }

    pub fn set_trakt_access_token(&mut self, token: String) {
        self.set("trakt_access_token".to_string(), token);
    }

    pub fn get_trakt_refresh_token(&self) -> Option<&String> {
        self.get("trakt_refresh_token")
    }

    pub fn set_trakt_refresh_token(&mut self, token: String) {
        self.set("trakt_refresh_token".to_string(), token);
    }

    pub fn get_trakt_token_expires(&self) -> Option<DateTime<Utc>> {
        self.get("trakt_token_expires")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn set_trakt_token_expires(&mut self, expires: DateTime<Utc>) {
        self.set("trakt_token_expires".to_string(), expires.to_rfc3339());
    }

    pub fn clear_trakt_tokens(&mut self) {
        self.remove("trakt_access_token");
        self.remove("trakt_refresh_token");
        self.remove("trakt_token_expires");
    }

    pub fn get_all_keys(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }
}
