//! Builds the concrete service clients from configuration and stored credentials.

use std::sync::Arc;

use media_sync_config::{Config, CredentialStore, PathManager};
use reqwest::Client;
use tracing::debug;

use crate::anilist::AnilistClient;
use crate::crossref::{CrossRefDataset, DatasetKind};
use crate::error::SourceError;
use crate::retry::{build_http_client, RetryPolicy};
use crate::tmdb::TmdbClient;
use crate::trakt::TraktClient;

pub struct SourceFactory<'a> {
    config: &'a Config,
    credentials: &'a CredentialStore,
    paths: &'a PathManager,
    client: Client,
    retry: RetryPolicy,
}

impl<'a> SourceFactory<'a> {
    pub fn new(config: &'a Config, credentials: &'a CredentialStore, paths: &'a PathManager) -> Result<Self, SourceError> {
        Ok(Self {
            config,
            credentials,
            paths,
            client: build_http_client(&config.http)?,
            retry: RetryPolicy::from_config(&config.http),
        })
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    pub fn anilist(&self) -> Result<AnilistClient, SourceError> {
        let token = self
            .credentials
            .get_anilist_access_token()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SourceError::NotAuthenticated("anilist".to_string()))?;

        Ok(AnilistClient::new(
            self.client.clone(),
            token.clone(),
            &self.config.anilist,
            self.retry.clone(),
        ))
    }

    pub fn trakt(&self) -> Result<TraktClient, SourceError> {
        let trakt = self
            .config
            .trakt
            .as_ref()
            .filter(|_| self.config.is_trakt_configured())
            .ok_or_else(|| SourceError::Validation("Trakt client_id/client_secret are not configured".to_string()))?;

        Ok(TraktClient::new(
            self.client.clone(),
            trakt.client_id.clone(),
            trakt.client_secret.clone(),
            self.retry.clone(),
        )
        .with_credentials(self.credentials, self.paths.credentials_file()))
    }

    /// `None` when no TMDB key is configured; the id expansion step is then skipped
    pub fn tmdb(&self) -> Option<TmdbClient> {
        let key = self.config.tmdb_api_key()?;
        Some(TmdbClient::new(self.client.clone(), key.to_string(), self.retry.clone()))
    }

    /// Enabled datasets in lookup order: Otaku first, then Fribb
    pub fn datasets(&self) -> Vec<Arc<CrossRefDataset>> {
        let crossref = &self.config.crossref;
        let mut datasets = Vec::new();

        if crossref.otaku_enabled {
            datasets.push(Arc::new(CrossRefDataset::new(
                DatasetKind::Otaku,
                crossref.otaku_url.clone(),
                self.client.clone(),
                self.paths.dataset_dir(),
                crossref.refresh_days,
            )));
        }
        if crossref.fribb_enabled {
            datasets.push(Arc::new(CrossRefDataset::new(
                DatasetKind::Fribb,
                crossref.fribb_url.clone(),
                self.client.clone(),
                self.paths.dataset_dir(),
                crossref.refresh_days,
            )));
        }

        debug!("Configured {} cross-reference datasets", datasets.len());
        datasets
    }
}
