use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;

const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const TOKEN_URL: &str = "https://api.trakt.tv/oauth/token";
const AUTHORIZE_URL: &str = "https://trakt.tv/oauth/authorize";
const SERVICE: &str = "trakt";

/// Tokens are refreshed once they are this close to expiry
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenInfo {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        needs_refresh(Some(self.expires_at), now)
    }
}

/// True when a token with this expiry should be refreshed before use.
/// Unknown expiry is treated as still valid.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => expires_at <= now + Duration::minutes(REFRESH_MARGIN_MINUTES),
        None => false,
    }
}

/// Page the user opens to obtain an out-of-band authorization code
pub fn authorization_url(client_id: &str) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}",
        AUTHORIZE_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(REDIRECT_URI)
    )
}

pub async fn refresh_access_token(
    client: &Client,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenInfo, SourceError> {
    debug!("Refreshing Trakt access token");
    request_token(
        client,
        serde_json::json!({
            "refresh_token": refresh_token,
            "client_id": client_id,
            "client_secret": client_secret,
            "redirect_uri": REDIRECT_URI,
            "grant_type": "refresh_token"
        }),
    )
    .await
}

pub async fn exchange_code(
    client: &Client,
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> Result<TokenInfo, SourceError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(SourceError::Validation("Authorization code cannot be empty".to_string()));
    }

    request_token(
        client,
        serde_json::json!({
            "code": code,
            "client_id": client_id,
            "client_secret": client_secret,
            "redirect_uri": REDIRECT_URI,
            "grant_type": "authorization_code"
        }),
    )
    .await
}

async fn request_token(client: &Client, payload: serde_json::Value) -> Result<TokenInfo, SourceError> {
    let response = client
        .post(TOKEN_URL)
        .json(&payload)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Status {
            service: SERVICE.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;
    let expires_at = Utc::now() + Duration::seconds(token_response.expires_in as i64);

    Ok(TokenInfo {
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token,
        expires_at,
    })
}
