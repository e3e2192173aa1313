use async_trait::async_trait;
use media_sync_models::ExternalIds;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;
use crate::retry::RetryPolicy;
use crate::traits::ExternalIdsProvider;

const API_URL: &str = "https://api.themoviedb.org/3";
const SERVICE: &str = "tmdb";

#[derive(Debug, Deserialize)]
struct TvExternalIds {
    imdb_id: Option<String>,
    tvdb_id: Option<u32>,
}

impl TvExternalIds {
    fn into_external_ids(self, tmdb_id: u32) -> ExternalIds {
        ExternalIds {
            tmdb_id: Some(tmdb_id),
            tvdb_id: self.tvdb_id.filter(|id| *id > 0),
            imdb_id: self.imdb_id.filter(|id| !id.trim().is_empty()),
            ..ExternalIds::default()
        }
    }
}

/// TMDB TV external-id lookup
pub struct TmdbClient {
    client: Client,
    api_key: String,
    retry: RetryPolicy,
}

impl TmdbClient {
    pub fn new(client: Client, api_key: String, retry: RetryPolicy) -> Self {
        Self { client, api_key, retry }
    }

    async fn fetch(&self, tmdb_id: u32) -> Result<TvExternalIds, SourceError> {
        let url = format!("{}/tv/{}/external_ids", API_URL, tmdb_id);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response.json().await.map_err(|e| SourceError::from_reqwest(SERVICE, e))
    }
}

#[async_trait]
impl ExternalIdsProvider for TmdbClient {
    async fn external_ids(&self, tmdb_id: u32) -> Result<ExternalIds, SourceError> {
        let ids = self.retry.run(SERVICE, || self.fetch(tmdb_id)).await?;
        let ids = ids.into_external_ids(tmdb_id);
        debug!("TMDB {} expanded to imdb={:?} tvdb={:?}", tmdb_id, ids.imdb_id, ids.tvdb_id);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_dropped() {
        let raw: TvExternalIds = serde_json::from_value(serde_json::json!({
            "id": 1399,
            "imdb_id": "",
            "tvdb_id": 121361,
            "facebook_id": "GameOfThrones"
        }))
        .unwrap();

        let ids = raw.into_external_ids(1399);
        assert_eq!(ids.tmdb_id, Some(1399));
        assert_eq!(ids.tvdb_id, Some(121361));
        assert_eq!(ids.imdb_id, None);
    }
}
