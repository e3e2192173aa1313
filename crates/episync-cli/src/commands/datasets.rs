use crate::commands::Context;
use crate::output::Output;
use color_eyre::Result;
use media_sync_sources::DatasetStatus;
use serde_json::json;
use tracing::{error, info};

fn status_row(status: &DatasetStatus) -> Vec<String> {
    vec![
        status.name.clone(),
        status.entries.to_string(),
        status
            .refreshed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string()),
        format!("{:.1} MiB", status.snapshot_bytes as f64 / (1024.0 * 1024.0)),
    ]
}

pub async fn refresh(output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let datasets = ctx.factory()?.datasets();
    if datasets.is_empty() {
        output.warn("All datasets are disabled in the [crossref] config section");
        return Ok(());
    }

    let mut refreshed = Vec::new();
    let mut failures = 0;
    for dataset in &datasets {
        let name = dataset.kind().name();
        let spinner = output.spinner(format!("Downloading {}...", name));
        let result = dataset.refresh().await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        match result {
            Ok(status) => {
                info!(operation = "dataset_refreshed", dataset = name, entries = status.entries);
                output.success(format!("{}: {} entries", name, status.entries));
                refreshed.push(status);
            }
            Err(e) => {
                error!(operation = "dataset_refresh_failed", dataset = name, error = %e);
                output.error(format!("{}: {}", name, e));
                failures += 1;
            }
        }
    }

    output.json(&json!({ "datasets": refreshed, "failed": failures }));
    if failures == datasets.len() {
        return Err(color_eyre::eyre::eyre!("No dataset could be refreshed"));
    }
    Ok(())
}

pub async fn status(output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let mut all = Vec::new();
    for dataset in ctx.factory()?.datasets() {
        all.push(dataset.status().await);
    }

    if !output.is_human() {
        output.json(&json!({ "datasets": all }));
        return Ok(());
    }
    if all.is_empty() {
        output.info("All datasets are disabled");
        return Ok(());
    }
    output.table(&["Dataset", "Entries", "Refreshed", "Snapshot"], all.iter().map(status_row));
    Ok(())
}
