use crate::commands::{prompts, Context};
use crate::output::{mask, Output};
use crate::ConfigCommands;
use color_eyre::Result;
use media_sync_config::{TmdbConfig, TraktConfig};
use media_sync_sources::trakt::auth;
use serde_json::json;
use tracing::info;

pub async fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(full, output),
        ConfigCommands::Trakt {
            client_id,
            client_secret,
        } => configure_trakt(client_id, client_secret, output).await,
        ConfigCommands::Anilist { token } => configure_anilist(token, output).await,
        ConfigCommands::Tmdb { api_key } => configure_tmdb(api_key, output),
    }
}

fn show_config(full: bool, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let config = &ctx.config;
    let secret = |s: &str| if full { s.to_string() } else { mask(s) };

    let trakt_id = config.trakt.as_ref().map(|t| secret(&t.client_id)).unwrap_or_else(|| mask(""));
    let trakt_secret = config
        .trakt
        .as_ref()
        .map(|t| secret(&t.client_secret))
        .unwrap_or_else(|| mask(""));
    let trakt_token = secret(ctx.credentials.get_trakt_access_token().map(String::as_str).unwrap_or(""));
    let anilist_token = secret(ctx.credentials.get_anilist_access_token().map(String::as_str).unwrap_or(""));
    let tmdb_key = secret(config.tmdb_api_key().unwrap_or(""));
    let priority: Vec<&str> = config.sync.search_priority.iter().map(|t| t.as_str()).collect();
    let schedule = config
        .scheduler
        .as_ref()
        .map(|s| s.schedule.clone())
        .unwrap_or_else(|| "(default)".to_string());

    if !output.is_human() {
        output.json(&json!({
            "config_file": ctx.paths.config_file(),
            "store_file": ctx.paths.store_file(),
            "trakt": { "client_id": trakt_id, "client_secret": trakt_secret, "access_token": trakt_token },
            "anilist": { "access_token": anilist_token, "page_size": config.anilist.page_size },
            "tmdb": { "api_key": tmdb_key },
            "sync": {
                "search_priority": priority,
                "concurrency": config.sync.concurrency,
                "max_batch_episodes": config.sync.max_batch_episodes,
                "map_ttl_days": config.sync.map_ttl_days,
            },
            "crossref": { "fribb": config.crossref.fribb_enabled, "otaku": config.crossref.otaku_enabled },
            "schedule": schedule,
        }));
        return Ok(());
    }

    output.info(format!("Config file: {}", ctx.paths.config_file().display()));
    output.info(format!("Store:       {}", ctx.paths.store_file().display()));
    output.table(
        &["Setting", "Value"],
        [
            ("Trakt client id", trakt_id),
            ("Trakt client secret", trakt_secret),
            ("Trakt access token", trakt_token),
            ("AniList access token", anilist_token),
            ("TMDB api key", tmdb_key),
            ("Search priority", priority.join(", ")),
            ("Concurrency", config.sync.concurrency.to_string()),
            ("Library batch size", config.sync.max_batch_episodes.to_string()),
            ("Map lifetime", format!("{} days", config.sync.map_ttl_days)),
            ("Fribb dataset", config.crossref.fribb_enabled.to_string()),
            ("Otaku dataset", config.crossref.otaku_enabled.to_string()),
            ("Schedule", schedule),
        ]
        .into_iter()
        .map(|(name, value)| vec![name.to_string(), value]),
    );
    Ok(())
}

async fn configure_trakt(client_id: Option<String>, client_secret: Option<String>, output: &Output) -> Result<()> {
    let mut ctx = Context::load()?;

    output.info("Trakt API setup");
    output.info("  1. Open https://trakt.tv/oauth/applications and create an application named 'episync'");
    output.info("  2. Use 'urn:ietf:wg:oauth:2.0:oob' as the Redirect URI");
    output.info("");

    let existing = ctx.config.trakt.as_ref().filter(|_| ctx.config.is_trakt_configured());
    let client_id = match client_id {
        Some(id) => id.trim().to_string(),
        None => prompts::prompt_string("Trakt Client ID", existing.map(|t| t.client_id.as_str()))?,
    };
    prompts::validate_credential(&client_id, "Client ID")?;

    let client_secret = match client_secret {
        Some(secret) => secret.trim().to_string(),
        None => prompts::prompt_secret("Trakt Client Secret")?,
    };
    prompts::validate_credential(&client_secret, "Client secret")?;

    ctx.config.trakt = Some(TraktConfig {
        client_id: client_id.clone(),
        client_secret: client_secret.clone(),
    });
    ctx.save_config()?;
    output.success("Trakt application saved");

    output.info("");
    output.info("Open this URL, approve episync and paste the code shown:");
    output.info(format!("  {}", auth::authorization_url(&client_id)));
    let code = prompts::prompt_string("Authorization code", None)?;

    let factory = ctx.factory()?;
    let tokens = auth::exchange_code(factory.http_client(), &client_id, &client_secret, &code)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Trakt authorization failed: {}", e))?;
    drop(factory);

    ctx.credentials.set_trakt_access_token(tokens.access_token);
    ctx.credentials.set_trakt_refresh_token(tokens.refresh_token);
    ctx.credentials.set_trakt_token_expires(tokens.expires_at);
    ctx.credentials
        .save()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials: {}", e))?;

    let username = ctx
        .factory()?
        .trakt()
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?
        .username()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Authorized, but reading the Trakt profile failed: {}", e))?;
    info!(operation = "trakt_authorized", username = %username);
    output.success(format!("Authorized as Trakt user {}", username));
    Ok(())
}

async fn configure_anilist(token: Option<String>, output: &Output) -> Result<()> {
    let mut ctx = Context::load()?;

    let token = match token {
        Some(token) => token.trim().to_string(),
        None => {
            output.info("Create an AniList API client at https://anilist.co/settings/developer, then open");
            output.info("  https://anilist.co/api/v2/oauth/authorize?client_id=<id>&response_type=token");
            output.info("and paste the access token shown.");
            prompts::prompt_secret("AniList access token")?
        }
    };
    prompts::validate_credential(&token, "Access token")?;

    ctx.credentials.set_anilist_access_token(token);
    let viewer = ctx
        .factory()?
        .anilist()
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?
        .viewer()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("AniList rejected the token: {}", e))?;

    ctx.credentials
        .save()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials: {}", e))?;
    info!(operation = "anilist_authorized", user_id = viewer.id);
    output.success(format!("AniList token saved for {} (id {})", viewer.name, viewer.id));
    Ok(())
}

fn configure_tmdb(api_key: Option<String>, output: &Output) -> Result<()> {
    let mut ctx = Context::load()?;

    let api_key = match api_key {
        Some(key) => key.trim().to_string(),
        None => prompts::prompt_secret("TMDB API key (v3)")?,
    };
    prompts::validate_credential(&api_key, "API key")?;

    ctx.config.tmdb = Some(TmdbConfig { api_key });
    ctx.save_config()?;
    output.success("TMDB key saved; shows without dataset ids will be expanded through TMDB");
    Ok(())
}
