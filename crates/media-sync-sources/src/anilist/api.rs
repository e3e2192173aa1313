use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use media_sync_models::{LibraryEntry, LibraryStatus, SourceShowId, WatchEvent};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::SourceError;

pub const ANILIST_API_URL: &str = "https://graphql.anilist.co";
pub(crate) const SERVICE: &str = "anilist";

/// Activity status AniList uses for single-episode progress updates
const WATCHED_EPISODE: &str = "watched episode";

/// Ranges wider than this are treated as malformed rather than expanded
const MAX_PROGRESS_RANGE: u32 = 500;

const VIEWER_QUERY: &str = "query { Viewer { id name } }";

const ACTIVITY_QUERY: &str = r#"
query($userId: Int, $minCreatedAt: Int, $page: Int, $perPage: Int) {
  Page(page: $page, perPage: $perPage) {
    pageInfo { hasNextPage }
    activities(userId: $userId, type: ANIME_LIST, sort: ID, createdAt_greater: $minCreatedAt) {
      ... on ListActivity {
        id
        media { id title { romaji } }
        status
        progress
        createdAt
      }
    }
  }
}"#;

const LIST_COLLECTION_QUERY: &str = r#"
query($userId: Int, $status: MediaListStatus) {
  MediaListCollection(userId: $userId, type: ANIME, status: $status) {
    lists {
      entries {
        mediaId
        status
        progress
        completedAt { year month day }
        media { title { romaji english } episodes }
      }
    }
  }
}"#;

const LIST_ENTRY_QUERY: &str = r#"
query($userId: Int, $mediaId: Int) {
  MediaList(userId: $userId, mediaId: $mediaId, type: ANIME) {
    mediaId
    status
    progress
    completedAt { year month day }
    media { title { romaji english } episodes }
  }
}"#;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Viewer {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    status: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    #[serde(rename = "Viewer")]
    viewer: Option<Viewer>,
}

#[derive(Debug, Deserialize)]
struct ActivityPageData {
    #[serde(rename = "Page")]
    page: ActivityPage,
}

#[derive(Debug, Deserialize)]
struct ActivityPage {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    #[serde(default)]
    activities: Vec<ListActivity>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
}

/// Non-list activities come back as empty objects, so every field is optional
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListActivity {
    id: Option<u64>,
    media: Option<ActivityMedia>,
    status: Option<String>,
    progress: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ActivityMedia {
    id: SourceShowId,
    title: MediaTitle,
}

#[derive(Debug, Default, Deserialize)]
struct MediaTitle {
    romaji: Option<String>,
    english: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListCollectionData {
    #[serde(rename = "MediaListCollection")]
    collection: Option<ListCollection>,
}

#[derive(Debug, Deserialize)]
struct ListCollection {
    #[serde(default)]
    lists: Vec<ListGroup>,
}

#[derive(Debug, Deserialize)]
struct ListGroup {
    #[serde(default)]
    entries: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntryData {
    #[serde(rename = "MediaList")]
    entry: Option<ListEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListEntry {
    #[serde(rename = "mediaId")]
    media_id: SourceShowId,
    status: Option<String>,
    progress: Option<u32>,
    #[serde(rename = "completedAt")]
    completed_at: Option<FuzzyDate>,
    media: Option<ListEntryMedia>,
}

#[derive(Debug, Deserialize)]
struct ListEntryMedia {
    title: MediaTitle,
    episodes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FuzzyDate {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

impl FuzzyDate {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(self.year?, self.month?, self.day?)?;
        Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
    }
}

async fn post_query<T: DeserializeOwned>(
    client: &Client,
    access_token: &str,
    query: &str,
    variables: serde_json::Value,
) -> Result<T, SourceError> {
    let response = client
        .post(ANILIST_API_URL)
        .header("Authorization", format!("Bearer {}", access_token))
        .header("Accept", "application/json")
        .json(&serde_json::json!({ "query": query, "variables": variables }))
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SourceError::from_reqwest(SERVICE, e))?;

    let parsed: GraphQlResponse<T> = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => return Err(SourceError::decode(SERVICE, e)),
        Err(_) => {
            return Err(SourceError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    };

    if let Some(error) = parsed.errors.first() {
        return Err(SourceError::Status {
            service: SERVICE.to_string(),
            status: error.status.unwrap_or_else(|| status.as_u16()),
            body: error.message.clone(),
        });
    }

    parsed
        .data
        .ok_or_else(|| SourceError::decode(SERVICE, "response carried neither data nor errors"))
}

/// Identity behind the access token
pub async fn get_viewer(client: &Client, access_token: &str) -> Result<Viewer, SourceError> {
    let data: ViewerData = post_query(client, access_token, VIEWER_QUERY, serde_json::json!({})).await?;
    data.viewer
        .ok_or_else(|| SourceError::NotAuthenticated(SERVICE.to_string()))
}

/// One page of the activity feed reduced to watched-episode events
#[derive(Debug, Default)]
pub struct WatchedPage {
    pub events: Vec<WatchEvent>,
    pub has_next: bool,
    /// Creation time of the newest activity on the page, of any kind
    pub newest_created_at: Option<i64>,
}

/// One page of watched-episode events, oldest first
pub async fn get_watched_page(
    client: &Client,
    access_token: &str,
    user_id: u64,
    cursor: i64,
    page: u32,
    per_page: u32,
) -> Result<WatchedPage, SourceError> {
    let variables = serde_json::json!({
        "userId": user_id,
        "minCreatedAt": cursor,
        "page": page,
        "perPage": per_page,
    });
    let data: ActivityPageData = post_query(client, access_token, ACTIVITY_QUERY, variables).await?;
    let raw_count = data.page.activities.len();
    let newest_created_at = data.page.activities.iter().filter_map(|a| a.created_at).max();
    let events = activities_to_events(data.page.activities);

    debug!(
        page = page,
        activities = raw_count,
        events = events.len(),
        "Fetched AniList activity page"
    );

    Ok(WatchedPage {
        events,
        has_next: data.page.page_info.has_next_page,
        newest_created_at,
    })
}

pub async fn get_list_collection(
    client: &Client,
    access_token: &str,
    user_id: u64,
    status: LibraryStatus,
) -> Result<Vec<LibraryEntry>, SourceError> {
    let variables = serde_json::json!({
        "userId": user_id,
        "status": list_status_name(status),
    });
    let data: ListCollectionData =
        post_query(client, access_token, LIST_COLLECTION_QUERY, variables).await?;

    Ok(data
        .collection
        .map(|c| c.lists)
        .unwrap_or_default()
        .into_iter()
        .flat_map(|group| group.entries)
        .map(ListEntry::into_library_entry)
        .collect())
}

/// `Ok(None)` when the show is not on the user's list
pub async fn get_list_entry(
    client: &Client,
    access_token: &str,
    user_id: u64,
    media_id: SourceShowId,
) -> Result<Option<LibraryEntry>, SourceError> {
    let variables = serde_json::json!({ "userId": user_id, "mediaId": media_id });
    match post_query::<ListEntryData>(client, access_token, LIST_ENTRY_QUERY, variables).await {
        Ok(data) => Ok(data.entry.map(ListEntry::into_library_entry)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn list_status_name(status: LibraryStatus) -> &'static str {
    match status {
        LibraryStatus::Completed => "COMPLETED",
        LibraryStatus::Watching => "CURRENT",
    }
}

impl ListEntry {
    fn into_library_entry(self) -> LibraryEntry {
        // Paused, dropped and rewatching entries still carry usable progress
        let status = match self.status.as_deref() {
            Some("COMPLETED") => LibraryStatus::Completed,
            _ => LibraryStatus::Watching,
        };
        let (title, title_english, total_episodes) = match self.media {
            Some(media) => (
                media.title.romaji.unwrap_or_default(),
                media.title.english,
                media.episodes,
            ),
            None => (String::new(), None, None),
        };

        LibraryEntry {
            source_show_id: self.media_id,
            title,
            title_english,
            status,
            progress: self.progress.unwrap_or(0),
            total_episodes,
            completed_at: self.completed_at.as_ref().and_then(FuzzyDate::to_datetime),
        }
    }
}

/// Parse an activity progress string: "5" or a range such as "4 - 6".
/// Unparseable or zero values yield nothing.
pub fn parse_progress(progress: &str) -> Vec<u32> {
    let progress = progress.trim();
    if let Some((start, end)) = progress.split_once('-') {
        match (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
            (Ok(start), Ok(end)) if start >= 1 && start <= end && end - start < MAX_PROGRESS_RANGE => {
                (start..=end).collect()
            }
            _ => Vec::new(),
        }
    } else {
        match progress.parse::<u32>() {
            Ok(n) if n >= 1 => vec![n],
            _ => Vec::new(),
        }
    }
}

/// Keep "watched episode" activities, one event per episode, preserving the
/// oldest-first provider order (ranges are emitted lowest episode first).
pub(crate) fn activities_to_events(activities: Vec<ListActivity>) -> Vec<WatchEvent> {
    let mut events = Vec::new();

    for activity in activities {
        if activity.status.as_deref() != Some(WATCHED_EPISODE) {
            continue;
        }
        let (Some(media), Some(progress), Some(created_at)) =
            (activity.media, activity.progress, activity.created_at)
        else {
            continue;
        };
        let Some(watched_at) = Utc.timestamp_opt(created_at, 0).single() else {
            continue;
        };
        let title = media.title.romaji.or(media.title.english).unwrap_or_default();

        for episode in parse_progress(&progress) {
            events.push(WatchEvent {
                source_show_id: media.id,
                show_title: title.clone(),
                absolute_episode: episode,
                watched_at,
                source_event_id: activity.id,
                created_at,
            });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activities(json: serde_json::Value) -> Vec<ListActivity> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("12"), vec![12]);
        assert_eq!(parse_progress("4 - 6"), vec![4, 5, 6]);
        assert_eq!(parse_progress(" 7-7 "), vec![7]);
        assert!(parse_progress("0").is_empty());
        assert!(parse_progress("6 - 4").is_empty());
        assert!(parse_progress("abc").is_empty());
        assert!(parse_progress("").is_empty());
    }

    #[test]
    fn test_only_watched_episode_activities_are_kept() {
        let events = activities_to_events(activities(serde_json::json!([
            {
                "id": 3,
                "media": { "id": 21, "title": { "romaji": "One Piece" } },
                "status": "watched episode",
                "progress": "1000",
                "createdAt": 1700000300
            },
            {
                "id": 2,
                "media": { "id": 21, "title": { "romaji": "One Piece" } },
                "status": "plans to watch",
                "progress": null,
                "createdAt": 1700000200
            },
            {}
        ])));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source_show_id, 21);
        assert_eq!(events[0].absolute_episode, 1000);
        assert_eq!(events[0].source_event_id, Some(3));
        assert_eq!(events[0].watched_at.timestamp(), 1700000300);
    }

    #[test]
    fn test_progress_range_expands_in_watch_order() {
        let events = activities_to_events(activities(serde_json::json!([
            {
                "id": 9,
                "media": { "id": 5, "title": { "romaji": "Show" } },
                "status": "watched episode",
                "progress": "4 - 6",
                "createdAt": 1700000000
            }
        ])));

        let episodes: Vec<u32> = events.iter().map(|e| e.absolute_episode).collect();
        assert_eq!(episodes, vec![4, 5, 6]);
        assert!(events.iter().all(|e| e.created_at == 1700000000));
    }

    #[test]
    fn test_list_entry_conversion() {
        let entry: ListEntry = serde_json::from_value(serde_json::json!({
            "mediaId": 1535,
            "status": "COMPLETED",
            "progress": 37,
            "completedAt": { "year": 2021, "month": 3, "day": 14 },
            "media": { "title": { "romaji": "Death Note", "english": "Death Note" }, "episodes": 37 }
        }))
        .unwrap();

        let entry = entry.into_library_entry();
        assert_eq!(entry.status, LibraryStatus::Completed);
        assert_eq!(entry.progress, 37);
        assert_eq!(entry.completed_at.unwrap().to_rfc3339(), "2021-03-14T00:00:00+00:00");
    }

    #[test]
    fn test_partial_completion_date_is_ignored() {
        let entry: ListEntry = serde_json::from_value(serde_json::json!({
            "mediaId": 1,
            "status": "PAUSED",
            "progress": 3,
            "completedAt": { "year": 2021, "month": null, "day": null },
            "media": null
        }))
        .unwrap();

        let entry = entry.into_library_entry();
        assert_eq!(entry.status, LibraryStatus::Watching);
        assert!(entry.completed_at.is_none());
    }
}
