use crate::commands::{parse_show, Context};
use crate::output::Output;
use color_eyre::Result;
use indicatif::ProgressBar;
use media_sync_core::{SyncError, SyncOptions, SyncReport};
use media_sync_models::LibraryStatus;
use tracing::info;

pub async fn run_sync(dry_run: bool, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let engine = ctx.engine().await?;

    let spinner = output.spinner("Syncing AniList activity...");
    let result = engine.sync(SyncOptions { dry_run }).await;
    clear_spinner(spinner);
    let report = result.map_err(|e| color_eyre::eyre::eyre!("Sync failed: {}", e))?;
    finish(report, output)
}

pub async fn run_show(show: &str, up_to: Option<u32>, dry_run: bool, output: &Output) -> Result<()> {
    let source_show_id = parse_show(show)?;
    let ctx = Context::load()?;
    let engine = ctx.engine().await?;

    let spinner = output.spinner(format!("Catching up AniList {}...", source_show_id));
    let result = engine.sync_show(source_show_id, up_to, SyncOptions { dry_run }).await;
    clear_spinner(spinner);
    let report = result.map_err(|e| color_eyre::eyre::eyre!("Show sync failed: {}", e))?;
    finish(report, output)
}

pub async fn run_library(status: LibraryStatus, dry_run: bool, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let engine = ctx.engine().await?;

    let spinner = output.spinner("Catching up the AniList list...");
    let result = engine.sync_library(status, SyncOptions { dry_run }).await;
    clear_spinner(spinner);
    let report = result.map_err(|e| color_eyre::eyre::eyre!("Library sync failed: {}", e))?;
    finish(report, output)
}

fn clear_spinner(spinner: Option<ProgressBar>) {
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
}

fn finish(report: SyncReport, output: &Output) -> Result<()> {
    info!(
        operation = "sync_complete",
        kind = %report.kind,
        found = report.found,
        translated = report.translated,
        accepted = report.accepted,
        "Sync finished"
    );
    print_report(&report, output);

    if !report.is_success() {
        let message = report.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(SyncError::Submission(message).into());
    }
    Ok(())
}

pub fn print_report(report: &SyncReport, output: &Output) {
    if !output.is_human() {
        output.json(&serde_json::to_value(report).unwrap_or_default());
        return;
    }

    if report.dry_run && !report.translations.is_empty() {
        output.table(
            &["Show", "AniList", "Trakt", "Abs", "Episode", "Watched"],
            report.translations.iter().map(|t| {
                vec![
                    t.show_title.clone(),
                    t.source_show_id.to_string(),
                    t.destination_show_id.to_string(),
                    t.absolute_episode.to_string(),
                    format!("S{:02}E{:02}", t.season, t.episode),
                    t.watched_at.format("%Y-%m-%d %H:%M").to_string(),
                ]
            }),
        );
    }

    let skipped = report.skipped();
    let summary = format!(
        "{} sync: {} found, {} translated, {} skipped",
        report.kind, report.found, report.translated, skipped
    );

    if report.dry_run {
        output.info(format!("{} (dry run, nothing sent)", summary));
    } else if report.is_success() {
        output.success(format!(
            "{}, {} added to Trakt history across {} shows",
            summary, report.accepted, report.shows_committed
        ));
    } else {
        output.error(format!(
            "{}; submission failed: {}",
            summary,
            report.error.as_deref().unwrap_or("unknown error")
        ));
    }

    if skipped > 0 {
        output.info(format!(
            "  unmapped: {}, no season data: {}, already synced: {}",
            report.skipped_unmapped, report.skipped_map_unavailable, report.skipped_already_synced
        ));
    }
    if report.not_found > 0 {
        output.warn(format!("Trakt did not recognise {} episodes", report.not_found));
    }
}
