use std::sync::Arc;

use crate::commands::Context;
use crate::output::Output;
use color_eyre::Result;
use media_sync_config::default_scheduler_config;
use media_sync_core::{SyncEngine, SyncError, SyncOptions};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// One scheduled activity sync; failures are logged and the daemon keeps going
async fn run_scheduled(engine: &SyncEngine, trigger: &'static str) {
    info!(operation = "scheduled_sync_start", trigger, "Starting sync");
    match engine.sync(SyncOptions::default()).await {
        Ok(report) if report.is_success() => {
            info!(
                operation = "scheduled_sync_complete",
                trigger,
                found = report.found,
                translated = report.translated,
                accepted = report.accepted,
                "Sync completed"
            );
        }
        Ok(report) => {
            error!(
                operation = "scheduled_sync_error",
                trigger,
                error = report.error.as_deref().unwrap_or("unknown error"),
                "History submission failed, will retry on the next run"
            );
        }
        Err(SyncError::RunInProgress { owner }) => {
            warn!(operation = "scheduled_sync_skipped", trigger, owner = %owner, "Previous run still in progress");
        }
        Err(e) => {
            error!(operation = "scheduled_sync_error", trigger, error = %e, "Sync failed");
        }
    }
}

pub async fn run_daemon(schedule: Option<String>, no_startup_sync: bool, output: &Output) -> Result<()> {
    let ctx = Context::load()?;
    let defaults = default_scheduler_config();
    let configured = ctx.config.scheduler.as_ref().unwrap_or(&defaults);
    let schedule = schedule.unwrap_or_else(|| configured.schedule.clone());
    let run_on_startup = configured.run_on_startup && !no_startup_sync;

    let engine = Arc::new(ctx.engine().await?);

    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create scheduler: {}", e))?;

    let job_engine = engine.clone();
    let job = Job::new_async(schedule.as_str(), move |_uuid, _sched| {
        let engine = job_engine.clone();
        Box::pin(async move {
            run_scheduled(&engine, "schedule").await;
        })
    })
    .map_err(|e| color_eyre::eyre::eyre!("Invalid cron schedule '{}': {}", schedule, e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to add scheduled job: {}", e))?;

    if run_on_startup {
        run_scheduled(&engine, "startup").await;
    }

    scheduler
        .start()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to start scheduler: {}", e))?;
    info!(operation = "scheduler_started", schedule = %schedule, "Scheduler started");
    output.success(format!("Daemon running with schedule '{}' (Ctrl+C to stop)", schedule));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to listen for shutdown signal: {}", e))?;

    info!(operation = "scheduler_stopping", "Shutdown requested");
    scheduler
        .shutdown()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to stop scheduler: {}", e))?;
    output.info("Daemon stopped");
    Ok(())
}
