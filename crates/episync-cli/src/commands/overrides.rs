use crate::commands::Context;
use crate::output::Output;
use color_eyre::Result;
use media_sync_core::OverrideStore;
use media_sync_models::{DestinationShowId, EpisodeOverride};
use serde_json::json;

pub async fn set(
    trakt_id: DestinationShowId,
    episode: u32,
    season: u32,
    as_episode: u32,
    output: &Output,
) -> Result<()> {
    if episode == 0 || as_episode == 0 {
        return Err(color_eyre::eyre::eyre!("Episode numbers start at 1"));
    }

    let ctx = Context::load()?;
    let overrides = OverrideStore::new(ctx.store()?);
    let entry = EpisodeOverride {
        destination_show_id: trakt_id,
        absolute_episode: episode,
        season,
        episode: as_episode,
    };
    overrides
        .set(&entry)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save override: {}", e))?;

    output.json(&json!({ "override": entry }));
    output.success(format!(
        "Trakt {} episode {} will be sent as S{:02}E{:02}",
        trakt_id, episode, season, as_episode
    ));
    Ok(())
}

pub async fn list(trakt_id: Option<DestinationShowId>, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let overrides = OverrideStore::new(ctx.store()?);
    let all = overrides
        .list(trakt_id)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read overrides: {}", e))?;

    if !output.is_human() {
        output.json(&json!({ "overrides": all }));
        return Ok(());
    }
    if all.is_empty() {
        output.info("No overrides");
        return Ok(());
    }
    output.table(
        &["Trakt", "Episode", "Sent as"],
        all.iter().map(|o| {
            vec![
                o.destination_show_id.to_string(),
                o.absolute_episode.to_string(),
                format!("S{:02}E{:02}", o.season, o.episode),
            ]
        }),
    );
    Ok(())
}

pub async fn remove(trakt_id: DestinationShowId, episode: u32, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let overrides = OverrideStore::new(ctx.store()?);
    let removed = overrides
        .remove(trakt_id, episode)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to remove override: {}", e))?;

    output.json(&json!({ "destination_show_id": trakt_id, "absolute_episode": episode, "removed": removed }));
    match removed {
        Some(target) => output.success(format!(
            "Removed override S{:02}E{:02} for Trakt {} episode {}",
            target.season, target.episode, trakt_id, episode
        )),
        None => output.warn(format!("No override for Trakt {} episode {}", trakt_id, episode)),
    }
    Ok(())
}
