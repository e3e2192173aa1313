use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use media_sync_config::AnilistConfig;
use media_sync_models::{ActivityFeed, LibraryEntry, LibraryStatus, SourceShowId};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::anilist::api::{self, Viewer, WatchedPage, SERVICE};
use crate::error::SourceError;
use crate::retry::RetryPolicy;
use crate::traits::ActivitySource;

const VIEWER_TTL: Duration = Duration::from_secs(10 * 60);

struct CachedViewer {
    token: String,
    viewer: Viewer,
    fetched_at: Instant,
}

pub struct AnilistClient {
    client: Client,
    access_token: String,
    retry: RetryPolicy,
    page_size: u32,
    max_pages: u32,
    viewer: Mutex<Option<CachedViewer>>,
}

impl AnilistClient {
    pub fn new(client: Client, access_token: String, config: &AnilistConfig, retry: RetryPolicy) -> Self {
        Self {
            client,
            access_token,
            retry,
            page_size: config.page_size.clamp(1, 50),
            max_pages: config.max_pages.max(1),
            viewer: Mutex::new(None),
        }
    }

    /// The authenticated user, memoized per token for a few minutes
    pub async fn viewer(&self) -> Result<Viewer, SourceError> {
        let mut cached = self.viewer.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.token == self.access_token && entry.fetched_at.elapsed() < VIEWER_TTL {
                return Ok(entry.viewer.clone());
            }
        }

        let viewer = self
            .retry
            .run(SERVICE, || api::get_viewer(&self.client, &self.access_token))
            .await?;
        info!("Authenticated to AniList as {} (id {})", viewer.name, viewer.id);

        *cached = Some(CachedViewer {
            token: self.access_token.clone(),
            viewer: viewer.clone(),
            fetched_at: Instant::now(),
        });
        Ok(viewer)
    }
}

/// Read pages oldest first until the feed is exhausted or `max_pages` is hit.
/// Stopping early leaves the newest events unread and marks the feed truncated.
async fn collect_pages<F, Fut>(max_pages: u32, mut fetch_page: F) -> Result<ActivityFeed, SourceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<WatchedPage, SourceError>>,
{
    let mut events = Vec::new();
    let mut read_through = None;

    for page in 1..=max_pages {
        let mut batch = fetch_page(page).await?;
        events.append(&mut batch.events);
        read_through = read_through.max(batch.newest_created_at);
        if !batch.has_next {
            return Ok(ActivityFeed::complete(events));
        }
    }

    warn!(
        "AniList activity feed still has more pages after {} pages; newer activity is left for the next run",
        max_pages
    );
    Ok(ActivityFeed::truncated(events, read_through))
}

#[async_trait]
impl ActivitySource for AnilistClient {
    fn source_name(&self) -> &str {
        SERVICE
    }

    #[instrument(skip(self), fields(operation = "list_watched_episodes"))]
    async fn list_watched_episodes_since(&self, cursor: i64) -> Result<ActivityFeed, SourceError> {
        let user_id = self.viewer().await?.id;
        let feed = collect_pages(self.max_pages, |page| {
            self.retry.run(SERVICE, move || {
                api::get_watched_page(
                    &self.client,
                    &self.access_token,
                    user_id,
                    cursor,
                    page,
                    self.page_size,
                )
            })
        })
        .await?;

        debug!("Fetched {} watched-episode events since {}", feed.events.len(), cursor);
        Ok(feed)
    }

    #[instrument(skip(self), fields(operation = "list_library"))]
    async fn list_library(&self, status: LibraryStatus) -> Result<Vec<LibraryEntry>, SourceError> {
        let viewer = self.viewer().await?;
        let entries = self
            .retry
            .run(SERVICE, || {
                api::get_list_collection(&self.client, &self.access_token, viewer.id, status)
            })
            .await?;
        info!("Found {} {:?} entries on AniList", entries.len(), status);
        Ok(entries)
    }

    async fn library_entry(&self, source_show_id: SourceShowId) -> Result<Option<LibraryEntry>, SourceError> {
        let viewer = self.viewer().await?;
        self.retry
            .run(SERVICE, || {
                api::get_list_entry(&self.client, &self.access_token, viewer.id, source_show_id)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use media_sync_models::WatchEvent;

    fn event(created_at: i64) -> WatchEvent {
        WatchEvent {
            source_show_id: 1,
            show_title: "Show".to_string(),
            absolute_episode: created_at as u32,
            watched_at: Utc.timestamp_opt(created_at, 0).unwrap(),
            source_event_id: Some(created_at as u64),
            created_at,
        }
    }

    /// Feed of `total` activities, one per second, served `per_page` at a time
    /// oldest first. Every `skip_every`th activity is not a watched episode.
    fn page(total: i64, per_page: i64, page: u32, skip_every: i64) -> WatchedPage {
        let start = (page as i64 - 1) * per_page + 1;
        let end = (start + per_page - 1).min(total);
        WatchedPage {
            events: (start..=end).filter(|n| n % skip_every != 0).map(event).collect(),
            has_next: end < total,
            newest_created_at: (start <= end).then_some(end),
        }
    }

    #[tokio::test]
    async fn test_collect_pages_reads_until_exhausted() {
        let feed = collect_pages(10, |p| async move { Ok(page(120, 50, p, i64::MAX)) })
            .await
            .unwrap();
        assert!(feed.complete);
        assert_eq!(feed.events.len(), 120);
        assert_eq!(feed.read_through, None);
    }

    #[tokio::test]
    async fn test_collect_pages_keeps_oldest_when_truncated() {
        let feed = collect_pages(10, |p| async move { Ok(page(600, 50, p, i64::MAX)) })
            .await
            .unwrap();

        assert!(!feed.complete);
        assert_eq!(feed.events.len(), 500);
        assert_eq!(feed.events.first().map(|e| e.created_at), Some(1));
        assert_eq!(feed.events.last().map(|e| e.created_at), Some(500));
        assert_eq!(feed.read_through, Some(500));
    }

    #[tokio::test]
    async fn test_truncated_feed_reads_through_non_episode_activity() {
        // activity 500 is a status change, so the last event is 499
        let feed = collect_pages(10, |p| async move { Ok(page(600, 50, p, 100)) })
            .await
            .unwrap();

        assert!(!feed.complete);
        assert_eq!(feed.events.last().map(|e| e.created_at), Some(499));
        assert_eq!(feed.read_through, Some(500));
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_page_errors() {
        let result = collect_pages(3, |p| async move {
            if p == 2 {
                Err(SourceError::NotAuthenticated(SERVICE.to_string()))
            } else {
                Ok(page(600, 50, p, i64::MAX))
            }
        })
        .await;
        assert!(result.is_err());
    }
}
