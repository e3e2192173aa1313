use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_sync_config::CredentialStore;
use media_sync_models::{
    DestinationShowId, HistoryItem, HistoryReceipt, IdType, SeasonMetadata,
};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::SourceError;
use crate::retry::RetryPolicy;
use crate::traits::{DestinationCatalog, HistoryWriter};
use crate::trakt::api::{self, SERVICE};
use crate::trakt::auth::{self, TokenInfo};

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

pub struct TraktClient {
    client: Client,
    client_id: String,
    client_secret: String,
    retry: RetryPolicy,
    tokens: Mutex<TokenState>,
    /// Where refreshed tokens are persisted; `None` keeps them in memory only
    credentials_path: Option<PathBuf>,
}

impl TraktClient {
    pub fn new(client: Client, client_id: String, client_secret: String, retry: RetryPolicy) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            retry,
            tokens: Mutex::new(TokenState::default()),
            credentials_path: None,
        }
    }

    /// Seed tokens from the credential store and persist refreshes back to it
    pub fn with_credentials(mut self, credentials: &CredentialStore, path: PathBuf) -> Self {
        self.tokens = Mutex::new(TokenState {
            access_token: credentials.get_trakt_access_token().cloned(),
            refresh_token: credentials.get_trakt_refresh_token().cloned(),
            expires_at: credentials.get_trakt_token_expires(),
        });
        self.credentials_path = Some(path);
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.lock().await.access_token.is_some()
    }

    /// Current access token, refreshed first when it is about to expire
    async fn access_token(&self) -> Result<Option<String>, SourceError> {
        let mut tokens = self.tokens.lock().await;

        if tokens.access_token.is_some() && !auth::needs_refresh(tokens.expires_at, Utc::now()) {
            return Ok(tokens.access_token.clone());
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            return Ok(tokens.access_token.clone());
        };

        if let Some(expires_at) = tokens.expires_at {
            info!("Trakt access token expires at {}, refreshing", expires_at);
        }
        let refreshed = self
            .retry
            .run(SERVICE, || {
                auth::refresh_access_token(&self.client, &self.client_id, &self.client_secret, &refresh_token)
            })
            .await;

        match refreshed {
            Ok(token_info) => {
                self.persist(&token_info);
                tokens.access_token = Some(token_info.access_token);
                tokens.refresh_token = Some(token_info.refresh_token);
                tokens.expires_at = Some(token_info.expires_at);
                Ok(tokens.access_token.clone())
            }
            Err(e) => {
                warn!("Trakt token refresh failed: {}", e);
                // An expired token cannot be used; a not-yet-expired one still can
                let still_valid = tokens.expires_at.map(|at| at > Utc::now()).unwrap_or(false);
                if still_valid {
                    Ok(tokens.access_token.clone())
                } else {
                    Err(SourceError::NotAuthenticated(SERVICE.to_string()))
                }
            }
        }
    }

    async fn required_token(&self) -> Result<String, SourceError> {
        self.access_token()
            .await?
            .ok_or_else(|| SourceError::NotAuthenticated(SERVICE.to_string()))
    }

    fn persist(&self, token_info: &TokenInfo) {
        let Some(path) = &self.credentials_path else {
            return;
        };
        let mut store = CredentialStore::new(path.clone());
        let result = store.load().and_then(|_| {
            store.set_trakt_access_token(token_info.access_token.clone());
            store.set_trakt_refresh_token(token_info.refresh_token.clone());
            store.set_trakt_token_expires(token_info.expires_at);
            store.save()
        });
        match result {
            Ok(()) => info!("Saved refreshed Trakt tokens (expire at {})", token_info.expires_at),
            Err(e) => warn!("Failed to persist refreshed Trakt tokens: {}", e),
        }
    }

    /// Username for the current token; used to confirm authorization
    pub async fn username(&self) -> Result<String, SourceError> {
        let token = self.required_token().await?;
        self.retry
            .run(SERVICE, || api::get_username(&self.client, &self.client_id, &token))
            .await
    }
}

#[async_trait]
impl DestinationCatalog for TraktClient {
    #[instrument(skip(self), fields(operation = "get_seasons"))]
    async fn get_seasons(&self, show_id: DestinationShowId) -> Result<Vec<SeasonMetadata>, SourceError> {
        let token = self.access_token().await?;
        self.retry
            .run(SERVICE, || api::get_seasons(&self.client, &self.client_id, token.as_deref(), show_id))
            .await
    }

    async fn search_by_external_id(
        &self,
        id_type: IdType,
        id: &str,
    ) -> Result<Option<DestinationShowId>, SourceError> {
        let token = self.access_token().await?;
        self.retry
            .run(SERVICE, || {
                api::search_by_external_id(&self.client, &self.client_id, token.as_deref(), id_type, id)
            })
            .await
    }
}

#[async_trait]
impl HistoryWriter for TraktClient {
    #[instrument(skip(self, items), fields(operation = "submit_history", items = items.len()))]
    async fn submit_history(&self, items: &[HistoryItem]) -> Result<HistoryReceipt, SourceError> {
        if items.is_empty() {
            return Ok(HistoryReceipt::default());
        }
        let token = self.required_token().await?;
        let receipt = self
            .retry
            .run_write(SERVICE, || api::add_history(&self.client, &self.client_id, &token, items))
            .await?;
        info!("Trakt accepted {} of {} submitted episodes", receipt.accepted, items.len());
        Ok(receipt)
    }
}
