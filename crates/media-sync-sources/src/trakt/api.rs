use media_sync_models::{
    DestinationShowId, EpisodeMetadata, HistoryItem, HistoryReceipt, IdType, SeasonMetadata,
};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SourceError;

const API_URL: &str = "https://api.trakt.tv";
pub(crate) const SERVICE: &str = "trakt";

#[derive(Debug, Clone, Deserialize)]
pub struct TraktIds {
    pub trakt: Option<u64>,
    pub slug: Option<String>,
    pub imdb: Option<String>,
    pub tmdb: Option<u32>,
    pub tvdb: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TraktSeason {
    number: u32,
    episode_count: Option<u32>,
    #[serde(default)]
    episodes: Option<Vec<TraktEpisode>>,
}

#[derive(Debug, Deserialize)]
struct TraktEpisode {
    number: u32,
    number_abs: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TraktSearchResult {
    show: Option<TraktShow>,
}

#[derive(Debug, Deserialize)]
struct TraktShow {
    ids: TraktIds,
}

#[derive(Debug, Deserialize)]
struct TraktUser {
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    added: AddedCounts,
    #[serde(default)]
    not_found: NotFoundLists,
}

#[derive(Debug, Default, Deserialize)]
struct AddedCounts {
    #[serde(default)]
    episodes: u64,
}

#[derive(Debug, Default, Deserialize)]
struct NotFoundLists {
    #[serde(default)]
    shows: Vec<serde_json::Value>,
    #[serde(default)]
    seasons: Vec<serde_json::Value>,
    #[serde(default)]
    episodes: Vec<serde_json::Value>,
}

/// Common Trakt headers; the bearer token is optional for public reads
fn with_headers(builder: RequestBuilder, client_id: &str, access_token: Option<&str>) -> RequestBuilder {
    let builder = builder
        .header("trakt-api-version", "2")
        .header("trakt-api-key", client_id)
        .header("Accept", "application/json")
        .header("Content-Type", "application/json");
    match access_token {
        Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
        None => builder,
    }
}

async fn send(builder: RequestBuilder) -> Result<reqwest::Response, SourceError> {
    let response = builder
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
    Ok(response)
}

/// Username behind the access token
pub async fn get_username(client: &Client, client_id: &str, access_token: &str) -> Result<String, SourceError> {
    let request = with_headers(client.get(format!("{}/users/me", API_URL)), client_id, Some(access_token));
    let user: TraktUser = send(request)
        .await?
        .json()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;
    Ok(user.username)
}

/// All seasons of a show with their episodes
pub async fn get_seasons(
    client: &Client,
    client_id: &str,
    access_token: Option<&str>,
    show_id: DestinationShowId,
) -> Result<Vec<SeasonMetadata>, SourceError> {
    let url = format!("{}/shows/{}/seasons?extended=full,episodes", API_URL, show_id);
    let seasons: Vec<TraktSeason> = send(with_headers(client.get(&url), client_id, access_token))
        .await?
        .json()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;

    debug!("Fetched {} seasons for Trakt show {}", seasons.len(), show_id);
    Ok(seasons.into_iter().map(season_metadata).collect())
}

fn season_metadata(season: TraktSeason) -> SeasonMetadata {
    SeasonMetadata {
        number: season.number,
        episode_count: season.episode_count,
        episodes: season
            .episodes
            .unwrap_or_default()
            .into_iter()
            .map(|e| EpisodeMetadata {
                number: e.number,
                absolute_number: e.number_abs,
            })
            .collect(),
    }
}

/// Exact id lookup restricted to shows. A 404 or an empty result is `Ok(None)`.
pub async fn search_by_external_id(
    client: &Client,
    client_id: &str,
    access_token: Option<&str>,
    id_type: IdType,
    id: &str,
) -> Result<Option<DestinationShowId>, SourceError> {
    let url = format!(
        "{}/search/{}/{}?type=show",
        API_URL,
        id_type.as_str(),
        urlencoding::encode(id)
    );

    let response = match send(with_headers(client.get(&url), client_id, access_token)).await {
        Ok(response) => response,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    };
    let results: Vec<TraktSearchResult> = response
        .json()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;

    Ok(first_show_id(&results))
}

fn first_show_id(results: &[TraktSearchResult]) -> Option<DestinationShowId> {
    results
        .iter()
        .find_map(|r| r.show.as_ref().and_then(|s| s.ids.trakt))
}

/// Nested shows -> seasons -> episodes payload, keeping first-seen order
pub fn build_history_payload(items: &[HistoryItem]) -> serde_json::Value {
    let mut shows: Vec<(DestinationShowId, Vec<(u32, Vec<serde_json::Value>)>)> = Vec::new();

    for item in items {
        let show_index = match shows.iter().position(|(id, _)| *id == item.destination_show_id) {
            Some(index) => index,
            None => {
                shows.push((item.destination_show_id, Vec::new()));
                shows.len() - 1
            }
        };
        let seasons = &mut shows[show_index].1;
        let season_index = match seasons.iter().position(|(number, _)| *number == item.season) {
            Some(index) => index,
            None => {
                seasons.push((item.season, Vec::new()));
                seasons.len() - 1
            }
        };
        seasons[season_index].1.push(serde_json::json!({
            "number": item.episode,
            "watched_at": item.watched_at.to_rfc3339(),
        }));
    }

    let shows: Vec<serde_json::Value> = shows
        .into_iter()
        .map(|(id, seasons)| {
            let seasons: Vec<serde_json::Value> = seasons
                .into_iter()
                .map(|(number, episodes)| serde_json::json!({ "number": number, "episodes": episodes }))
                .collect();
            serde_json::json!({ "ids": { "trakt": id }, "seasons": seasons })
        })
        .collect();

    serde_json::json!({ "shows": shows })
}

pub async fn add_history(
    client: &Client,
    client_id: &str,
    access_token: &str,
    items: &[HistoryItem],
) -> Result<HistoryReceipt, SourceError> {
    let payload = build_history_payload(items);
    let request = with_headers(client.post(format!("{}/sync/history", API_URL)), client_id, Some(access_token))
        .json(&payload);

    let response: HistoryResponse = send(request)
        .await?
        .json()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;

    let receipt = receipt_from_response(&response);
    if receipt.not_found > 0 {
        warn!("Trakt could not match {} submitted show/season/episode entries", receipt.not_found);
    }
    Ok(receipt)
}

fn receipt_from_response(response: &HistoryResponse) -> HistoryReceipt {
    HistoryReceipt {
        accepted: response.added.episodes,
        not_found: (response.not_found.shows.len()
            + response.not_found.seasons.len()
            + response.not_found.episodes.len()) as u64,
    }
}
