use crate::commands::{parse_show, Context};
use crate::output::Output;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use media_sync_core::{EngineStatus, ProgressTracker, RunLog, RunStatus};
use serde_json::json;

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

pub async fn run_status(output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let store = ctx.store()?;
    let status = EngineStatus::load(&store)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read status: {}", e))?;

    if !output.is_human() {
        output.json(&serde_json::to_value(&status).unwrap_or_default());
        return Ok(());
    }

    let cursor = status.cursor.last_processed_event_cursor;
    let cursor_text = if cursor == 0 {
        "not set (next sync reads all activity)".to_string()
    } else {
        when(DateTime::from_timestamp(cursor, 0))
    };
    output.info(format!("Activity cursor: {}", cursor_text));
    output.info(format!("Last run:        {}", when(status.last_run)));
    for (kind, at) in &status.last_runs {
        output.info(format!("  {:<9} {}", kind.as_str(), when(*at)));
    }
    output.info(format!("Mappings:        {}", status.mappings));
    output.info(format!("Tracked shows:   {}", status.tracked_shows));
    match &status.lock_holder {
        Some(lease) => output.warn(format!(
            "Run lock held by {} until {} (episync clear --lock removes a stale lock)",
            lease.owner,
            when(Some(lease.expires_at))
        )),
        None => output.info("Run lock:        free"),
    }
    Ok(())
}

pub async fn run_progress(show: Option<&str>, reset: bool, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let progress = ProgressTracker::new(ctx.store()?);

    if let Some(show) = show {
        let source_show_id = parse_show(show)?;
        if reset {
            let removed = progress
                .reset(source_show_id)
                .await
                .map_err(|e| color_eyre::eyre::eyre!("Failed to reset progress: {}", e))?;
            output.json(&json!({ "source_show_id": source_show_id, "reset": removed }));
            if removed {
                output.success(format!("AniList {} will be synced from episode 1 again", source_show_id));
            } else {
                output.warn(format!("AniList {} has no stored progress", source_show_id));
            }
            return Ok(());
        }

        let watermark = progress
            .get(source_show_id)
            .await
            .map_err(|e| color_eyre::eyre::eyre!("Failed to read progress: {}", e))?;
        output.json(&json!({ "source_show_id": source_show_id, "last_synced_absolute_episode": watermark }));
        output.info(format!("AniList {} synced through episode {}", source_show_id, watermark));
        return Ok(());
    }

    let all = progress
        .list()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read progress: {}", e))?;
    if !output.is_human() {
        output.json(&json!({ "progress": all }));
        return Ok(());
    }
    if all.is_empty() {
        output.info("Nothing synced yet");
        return Ok(());
    }
    output.table(
        &["AniList", "Synced through", "Updated"],
        all.iter().map(|p| {
            vec![
                p.source_show_id.to_string(),
                p.last_synced_absolute_episode.to_string(),
                p.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        }),
    );
    Ok(())
}

pub async fn run_logs(limit: usize, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let log = RunLog::new(ctx.store()?);
    let records = log
        .recent(limit)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read run log: {}", e))?;

    if !output.is_human() {
        output.json(&json!({ "runs": records }));
        return Ok(());
    }
    if records.is_empty() {
        output.info("No runs recorded yet");
        return Ok(());
    }
    output.table(
        &["Started", "Kind", "Status", "Found", "Translated", "Accepted", "Error"],
        records.iter().map(|r| {
            let status = match (r.status, r.dry_run) {
                (RunStatus::Completed, true) => "dry run",
                (RunStatus::Completed, false) => "ok",
                (RunStatus::Failed, _) => "failed",
            };
            vec![
                r.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                r.kind.to_string(),
                status.to_string(),
                r.found.to_string(),
                r.translated.to_string(),
                r.accepted.to_string(),
                r.error.clone().unwrap_or_default(),
            ]
        }),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_when_formats_or_says_never() {
        assert_eq!(when(None), "never");
        assert_eq!(when(DateTime::from_timestamp(0, 0)), "1970-01-01 00:00:00 UTC");
    }
}
