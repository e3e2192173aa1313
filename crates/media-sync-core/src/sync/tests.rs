use super::*;
use crate::testing::{at, event, seasons, FakeCatalog, FakeDataset, FakeSource, FakeWriter};
use media_sync_models::{EpisodeOverride, ExternalIds, LibraryEntry};

struct Harness {
    source: Arc<FakeSource>,
    catalog: Arc<FakeCatalog>,
    writer: Arc<FakeWriter>,
    dataset: Arc<FakeDataset>,
    engine: SyncEngine,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(SyncSettings::default())
    }

    fn with_settings(settings: SyncSettings) -> Self {
        let source = Arc::new(FakeSource::new());
        let catalog = Arc::new(FakeCatalog::new());
        let writer = Arc::new(FakeWriter::new());
        let dataset = Arc::new(FakeDataset::new());

        let services = SyncServices {
            source: source.clone(),
            catalog: catalog.clone(),
            writer: writer.clone(),
            metadata: None,
            datasets: vec![dataset.clone() as Arc<dyn CrossReference>],
        };
        let engine = SyncEngine::new(services, Store::memory(), settings);

        Self {
            source,
            catalog,
            writer,
            dataset,
            engine,
        }
    }

    /// Make `source` resolve to `dest` and give `dest` seasons of these sizes
    fn map_show(&self, source: SourceShowId, dest: DestinationShowId, counts: &[u32]) {
        self.dataset.insert(
            source,
            ExternalIds {
                trakt_id: Some(dest),
                ..ExternalIds::default()
            },
        );
        self.catalog.set_seasons(dest, seasons(counts));
    }

    fn submitted(&self) -> Vec<(DestinationShowId, u32, u32)> {
        self.writer
            .submissions()
            .iter()
            .flatten()
            .map(|item| (item.destination_show_id, item.season, item.episode))
            .collect()
    }

    async fn cursor(&self) -> i64 {
        self.engine.progress().cursor().await.unwrap().last_processed_event_cursor
    }
}

fn library_entry(show: SourceShowId, status: LibraryStatus, progress: u32, completed_at: Option<i64>) -> LibraryEntry {
    LibraryEntry {
        source_show_id: show,
        title: format!("Show {}", show),
        title_english: None,
        status,
        progress,
        total_episodes: None,
        completed_at: completed_at.map(at),
    }
}

#[tokio::test]
async fn test_activity_run_translates_submits_and_commits() {
    let h = Harness::new();
    h.map_show(1, 100, &[25, 25]);
    h.source.push(event(1, 25, 10));
    h.source.push(event(1, 26, 20));
    h.source.push(event(1, 30, 30));

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.found, 3);
    assert_eq!(report.translated, 3);
    assert_eq!(report.accepted, 3);
    assert_eq!(report.batches, 1);

    assert_eq!(h.writer.submissions().len(), 1);
    assert_eq!(h.submitted(), vec![(100, 1, 25), (100, 2, 1), (100, 2, 5)]);
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 30);
    assert_eq!(h.cursor().await, 30);

    assert!(h.engine.lock().holder().await.unwrap().is_none());
    let log = h.engine.run_log().recent(5).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, RunKind::Activity);
    assert_eq!(log[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn test_truncated_feed_keeps_cursor_behind_unread_activity() {
    let h = Harness::new();
    h.map_show(1, 100, &[25]);
    h.source.set_fetch_limit(2);
    h.source.push(event(1, 1, 10));
    h.source.push(event(1, 2, 20));
    h.source.push(event(1, 3, 30));
    h.source.push(event(1, 4, 30));

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.translated, 2);
    assert_eq!(h.cursor().await, 19);

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.skipped_already_synced, 1);
    assert_eq!(report.translated, 1);
    assert_eq!(h.cursor().await, 29);

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.skipped_already_synced, 1);
    assert_eq!(report.translated, 1);
    assert_eq!(h.cursor().await, 30);

    assert_eq!(h.submitted(), vec![(100, 1, 1), (100, 1, 2), (100, 1, 3), (100, 1, 4)]);
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 4);
}

#[tokio::test]
async fn test_second_run_without_new_events_changes_nothing() {
    let h = Harness::new();
    h.map_show(1, 100, &[12]);
    h.source.push(event(1, 1, 10));
    h.source.push(event(1, 2, 20));
    h.engine.sync(SyncOptions::default()).await.unwrap();

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.found, 0);
    assert_eq!(h.writer.submissions().len(), 1);
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 2);

    // Replaying the same events is absorbed by the per-show watermark
    h.engine.reset_cursor(None).await.unwrap();
    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.found, 2);
    assert_eq!(report.skipped_already_synced, 2);
    assert_eq!(report.submitted, 0);
    assert_eq!(h.writer.submissions().len(), 1);
    assert_eq!(h.cursor().await, 20);
}

#[tokio::test]
async fn test_failed_submission_leaves_every_watermark_unchanged() {
    let h = Harness::new();
    for show in 1..=5u64 {
        h.map_show(show, 100 + show, &[12]);
        h.source.push(event(show, 1, show as i64 * 10));
    }
    h.writer.set_failing(true);

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.submitted, 5);
    assert_eq!(report.accepted, 0);
    assert!(report.error.is_some());
    for show in 1..=5u64 {
        assert_eq!(h.engine.progress().get(show).await.unwrap(), 0);
    }
    assert_eq!(h.cursor().await, 0);
    assert!(h.engine.run_log().last_run().await.unwrap().is_none());

    // The next run retries the same events
    h.writer.set_failing(false);
    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.accepted, 5);
    for show in 1..=5u64 {
        assert_eq!(h.engine.progress().get(show).await.unwrap(), 1);
    }
    assert_eq!(h.cursor().await, 50);
}

#[tokio::test]
async fn test_unmapped_and_mapless_shows_are_skipped_but_cursor_advances() {
    let h = Harness::new();
    h.map_show(1, 100, &[12]);
    // Show 3 resolves, but its destination has no season data
    h.dataset.insert(
        3,
        ExternalIds {
            trakt_id: Some(300),
            ..ExternalIds::default()
        },
    );
    h.source.push(event(1, 1, 10));
    h.source.push(event(2, 1, 20));
    h.source.push(event(3, 4, 30));

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.translated, 1);
    assert_eq!(report.skipped_unmapped, 1);
    assert_eq!(report.skipped_map_unavailable, 1);
    assert_eq!(report.skipped(), 2);
    assert_eq!(h.submitted(), vec![(100, 1, 1)]);
    assert_eq!(h.engine.progress().get(3).await.unwrap(), 0);
    assert_eq!(h.cursor().await, 30);
}

#[tokio::test]
async fn test_source_failure_aborts_and_releases_lock() {
    let h = Harness::new();
    h.source.set_failing(true);

    let err = h.engine.sync(SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert_eq!(h.cursor().await, 0);
    assert!(h.engine.lock().holder().await.unwrap().is_none());
    let log = h.engine.run_log().recent(1).await.unwrap();
    assert_eq!(log[0].status, RunStatus::Failed);

    h.source.set_failing(false);
    assert!(h.engine.sync(SyncOptions::default()).await.is_ok());
}

#[tokio::test]
async fn test_run_refused_while_another_holds_the_lock() {
    let h = Harness::new();
    let lease = h.engine.lock().acquire().await.unwrap();

    let err = h.engine.sync(SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::RunInProgress { .. }));
    assert_eq!(h.source.fetches(), 0);

    h.engine.lock().release(&lease).await.unwrap();
    assert!(h.engine.sync(SyncOptions::default()).await.is_ok());
}

#[tokio::test]
async fn test_dry_run_reports_without_side_effects() {
    let h = Harness::new();
    h.map_show(1, 100, &[25, 25]);
    h.source.push(event(1, 25, 10));
    h.source.push(event(1, 26, 20));

    let report = h.engine.sync(SyncOptions { dry_run: true }).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.translations.len(), 2);
    assert_eq!((report.translations[1].season, report.translations[1].episode), (2, 1));
    assert!(h.writer.submissions().is_empty());
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 0);
    assert_eq!(h.cursor().await, 0);
    assert!(h.engine.run_log().last_run().await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_fetch_moves_cursor_to_now() {
    let h = Harness::new();
    let before = Utc::now().timestamp();
    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.found, 0);
    assert!(h.cursor().await >= before);
}

#[tokio::test]
async fn test_run_takes_and_returns_explicit_cursor() {
    let h = Harness::new();
    h.map_show(1, 100, &[12]);
    h.source.push(event(1, 1, 10));
    h.source.push(event(1, 2, 20));
    h.source.push(event(1, 3, 30));

    let (next, report) = h
        .engine
        .run(SyncWatermark::new(25), SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.found, 1);
    assert_eq!(next.last_processed_event_cursor, 30);
    assert_eq!(h.submitted(), vec![(100, 1, 3)]);
    // `run` leaves persisting the cursor to the caller
    assert_eq!(h.cursor().await, 0);
}

#[tokio::test]
async fn test_older_episode_after_newer_one_in_same_run_is_skipped() {
    let h = Harness::new();
    h.map_show(1, 100, &[12]);
    h.source.push(event(1, 5, 10));
    h.source.push(event(1, 3, 20));
    h.source.push(event(1, 6, 30));

    let report = h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(report.translated, 2);
    assert_eq!(report.skipped_already_synced, 1);
    assert_eq!(h.submitted(), vec![(100, 1, 5), (100, 1, 6)]);
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 6);
}

#[tokio::test]
async fn test_override_replaces_computed_position() {
    let h = Harness::new();
    h.map_show(1, 100, &[25, 25]);
    h.engine
        .overrides()
        .set(&EpisodeOverride {
            destination_show_id: 100,
            absolute_episode: 26,
            season: 0,
            episode: 1,
        })
        .await
        .unwrap();
    h.source.push(event(1, 26, 10));
    h.source.push(event(1, 27, 20));

    h.engine.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(h.submitted(), vec![(100, 0, 1), (100, 2, 2)]);
}

#[tokio::test]
async fn test_show_resolved_once_across_runs() {
    let h = Harness::new();
    h.map_show(1, 100, &[12]);
    h.source.push(event(1, 1, 10));
    h.engine.sync(SyncOptions::default()).await.unwrap();

    h.source.push(event(1, 2, Utc::now().timestamp() + 60));
    h.engine.sync(SyncOptions::default()).await.unwrap();

    assert_eq!(h.dataset.lookups(), 1);
    assert_eq!(h.catalog.season_calls(), 1);
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 2);
}

#[tokio::test]
async fn test_sync_show_catches_up_from_watermark() {
    let h = Harness::new();
    h.map_show(1, 100, &[12]);
    h.source.add_entry(library_entry(1, LibraryStatus::Watching, 4, None));

    let report = h.engine.sync_show(1, None, SyncOptions::default()).await.unwrap();
    assert_eq!(report.kind, RunKind::Show);
    assert_eq!(report.accepted, 4);
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 4);

    let report = h.engine.sync_show(1, Some(6), SyncOptions::default()).await.unwrap();
    assert_eq!(report.accepted, 2);
    assert_eq!(h.submitted().last(), Some(&(100, 1, 6)));

    let report = h.engine.sync_show(1, Some(3), SyncOptions::default()).await.unwrap();
    assert_eq!(report.found, 0);

    let err = h.engine.sync_show(99, None, SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotInLibrary { source_show_id: 99 }));
}

#[tokio::test]
async fn test_sync_show_rejects_targets_past_the_last_episode() {
    let h = Harness::new();
    h.map_show(1, 100, &[12]);
    h.map_show(2, 200, &[12]);
    h.source.add_entry(LibraryEntry {
        total_episodes: Some(12),
        ..library_entry(1, LibraryStatus::Watching, 4, None)
    });

    let err = h.engine.sync_show(1, Some(13), SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));

    // unknown total: only absurd targets are refused
    let err = h.engine.sync_show(2, Some(4_000_000_000), SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidInput(_)));

    assert!(h.writer.submissions().is_empty());
    assert!(h.engine.lock().holder().await.unwrap().is_none());
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 0);
}

#[tokio::test]
async fn test_library_sync_batches_along_show_boundaries() {
    let h = Harness::with_settings(SyncSettings {
        max_batch_episodes: 3,
        ..SyncSettings::default()
    });
    for show in 1..=3u64 {
        h.map_show(show, 100 + show, &[24]);
    }
    h.source.add_entry(library_entry(1, LibraryStatus::Completed, 2, Some(1_000)));
    h.source.add_entry(library_entry(2, LibraryStatus::Completed, 2, Some(2_000)));
    h.source.add_entry(library_entry(3, LibraryStatus::Completed, 5, Some(3_000)));
    h.source.add_entry(library_entry(4, LibraryStatus::Watching, 7, None));

    let report = h
        .engine
        .sync_library(LibraryStatus::Completed, SyncOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.batches, 4);
    assert_eq!(report.accepted, 9);

    let sizes: Vec<usize> = h.writer.submissions().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 3, 2]);
    assert_eq!(h.writer.submissions()[0][0].watched_at, at(1_000));
    assert_eq!(h.engine.progress().get(3).await.unwrap(), 5);
    assert_eq!(h.engine.progress().get(4).await.unwrap(), 0);
}

#[tokio::test]
async fn test_library_sync_stops_at_first_failed_batch() {
    let h = Harness::with_settings(SyncSettings {
        max_batch_episodes: 3,
        ..SyncSettings::default()
    });
    for show in 1..=3u64 {
        h.map_show(show, 100 + show, &[24]);
    }
    h.source.add_entry(library_entry(1, LibraryStatus::Completed, 2, Some(1_000)));
    h.source.add_entry(library_entry(2, LibraryStatus::Completed, 2, Some(2_000)));
    h.source.add_entry(library_entry(3, LibraryStatus::Completed, 5, Some(3_000)));
    h.writer.fail_after(1);

    let report = h
        .engine
        .sync_library(LibraryStatus::Completed, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.batches, 2);
    assert_eq!(report.accepted, 2);
    assert_eq!(h.engine.progress().get(1).await.unwrap(), 2);
    assert_eq!(h.engine.progress().get(2).await.unwrap(), 0);
    assert_eq!(h.engine.progress().get(3).await.unwrap(), 0);

    h.writer.fail_after(10);
    let report = h
        .engine
        .sync_library(LibraryStatus::Completed, SyncOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.accepted, 7);
    assert_eq!(report.batches, 3);
}

#[tokio::test]
async fn test_status_and_inspection() {
    let h = Harness::new();
    h.map_show(1, 100, &[25, 25]);
    h.source.push(event(1, 3, 10));
    h.engine.sync(SyncOptions::default()).await.unwrap();

    let status = h.engine.status().await.unwrap();
    assert_eq!(status.cursor.last_processed_event_cursor, 10);
    assert!(status.lock_holder.is_none());
    assert!(status.last_run.is_some());
    assert_eq!(status.mappings, 1);
    assert_eq!(status.tracked_shows, 1);

    let inspection = h.engine.inspect_show(1).await.unwrap();
    assert_eq!(inspection.destination_show_id, 100);
    assert_eq!(inspection.watermark, 3);
    assert_eq!(inspection.breakpoints.starts_at(2), Some(26));

    assert_eq!(h.engine.clear_maps().await.unwrap(), 1);
}

#[test]
fn test_plan_batches() {
    let group = |show: u64, n: u32| (1..=n).map(|ep| event(show, ep, 0)).collect::<Vec<_>>();
    let sizes = |batches: Vec<Vec<WatchEvent>>| batches.iter().map(Vec::len).collect::<Vec<_>>();

    assert_eq!(sizes(plan_batches(vec![group(1, 2), group(2, 2), group(3, 5)], 3)), vec![2, 2, 3, 2]);
    assert_eq!(sizes(plan_batches(vec![group(1, 1), group(2, 1), group(3, 1)], 3)), vec![3]);
    assert_eq!(sizes(plan_batches(vec![group(1, 0), group(2, 2)], 3)), vec![2]);
    assert_eq!(sizes(plan_batches(vec![group(1, 2)], 0)), vec![1, 1]);
    assert!(plan_batches(Vec::new(), 3).is_empty());
}
