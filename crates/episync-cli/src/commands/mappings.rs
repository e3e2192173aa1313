use crate::commands::{parse_show, Context};
use crate::output::Output;
use color_eyre::Result;
use media_sync_core::MappingStore;
use media_sync_models::{ExternalIds, MappingOrigin};
use serde_json::json;

fn origin_label(origin: MappingOrigin) -> &'static str {
    match origin {
        MappingOrigin::Manual => "manual",
        MappingOrigin::Auto => "auto",
    }
}

fn describe_ids(ids: &ExternalIds) -> String {
    let mut parts = Vec::new();
    if let Some(id) = ids.tmdb_id {
        parts.push(format!("tmdb:{}", id));
    }
    if let Some(id) = &ids.imdb_id {
        parts.push(format!("imdb:{}", id));
    }
    if let Some(id) = ids.tvdb_id {
        parts.push(format!("tvdb:{}", id));
    }
    if let Some(id) = ids.mal_id {
        parts.push(format!("mal:{}", id));
    }
    parts.join(" ")
}

pub async fn list(manual: bool, auto: bool, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let mappings = MappingStore::new(ctx.store()?);

    let origin = match (manual, auto) {
        (true, _) => Some(MappingOrigin::Manual),
        (_, true) => Some(MappingOrigin::Auto),
        _ => None,
    };
    let all = mappings
        .list(origin)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read mappings: {}", e))?;

    if !output.is_human() {
        output.json(&json!({ "mappings": all }));
        return Ok(());
    }
    if all.is_empty() {
        output.info("No mappings stored yet");
        return Ok(());
    }

    output.table(
        &["AniList", "Trakt", "Origin", "Title", "Ids", "Updated"],
        all.iter().map(|m| {
            vec![
                m.source_show_id.to_string(),
                m.destination_show_id.to_string(),
                origin_label(m.origin).to_string(),
                m.title.clone().unwrap_or_default(),
                describe_ids(&m.secondary_ids),
                m.updated_at.format("%Y-%m-%d").to_string(),
            ]
        }),
    );
    output.info(format!("{} mappings", all.len()));
    Ok(())
}

pub async fn set(show: &str, trakt_id: u64, title: Option<String>, output: &Output) -> Result<()> {
    let source_show_id = parse_show(show)?;
    if trakt_id == 0 {
        return Err(color_eyre::eyre::eyre!("Trakt id must be greater than 0"));
    }

    let ctx = Context::load()?;
    let mappings = MappingStore::new(ctx.store()?);
    let mapping = mappings
        .set_manual(source_show_id, trakt_id, title)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save mapping: {}", e))?;

    output.json(&json!({ "mapping": mapping }));
    output.success(format!(
        "AniList {} now maps to Trakt {} (manual)",
        source_show_id, trakt_id
    ));
    Ok(())
}

pub async fn remove(show: &str, output: &Output) -> Result<()> {
    let source_show_id = parse_show(show)?;
    let ctx = Context::load()?;
    let mappings = MappingStore::new(ctx.store()?);

    let removed = mappings
        .remove(source_show_id)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to remove mapping: {}", e))?;

    output.json(&json!({ "source_show_id": source_show_id, "removed": removed }));
    if removed {
        output.success(format!("Removed mapping for AniList {}", source_show_id));
    } else {
        output.warn(format!("No mapping stored for AniList {}", source_show_id));
    }
    Ok(())
}

pub async fn inspect(show: &str, output: &Output) -> Result<()> {
    let source_show_id = parse_show(show)?;
    let ctx = Context::load()?;
    let engine = ctx.engine().await?;

    let inspection = engine
        .inspect_show(source_show_id)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to inspect show {}: {}", source_show_id, e))?;

    if !output.is_human() {
        output.json(&serde_json::to_value(&inspection).unwrap_or_default());
        return Ok(());
    }

    output.info(format!(
        "AniList {} -> Trakt {} (synced through episode {})",
        inspection.source_show_id, inspection.destination_show_id, inspection.watermark
    ));
    if inspection.breakpoints.is_empty() {
        output.warn("Trakt lists no regular seasons for this show");
    } else {
        output.table(
            &["Season", "Starts at"],
            inspection
                .breakpoints
                .entries()
                .iter()
                .map(|b| vec![b.season.to_string(), b.starts_at.to_string()]),
        );
    }
    if !inspection.overrides.is_empty() {
        output.table(
            &["Episode", "Override"],
            inspection
                .overrides
                .iter()
                .map(|(abs, target)| vec![abs.to_string(), format!("S{:02}E{:02}", target.season, target.episode)]),
        );
    }
    Ok(())
}
