use crate::commands::Context;
use crate::output::Output;
use color_eyre::Result;
use media_sync_core::store::keys;
use media_sync_core::{ProgressTracker, RunLock, SyncSettings};
use media_sync_models::SyncWatermark;
use tracing::info;

pub struct ClearTargets {
    pub maps: bool,
    pub datasets: bool,
    pub cursor: bool,
    pub lock: bool,
    pub credentials: bool,
}

impl ClearTargets {
    fn any(&self) -> bool {
        self.maps || self.datasets || self.cursor || self.lock || self.credentials
    }
}

pub async fn run_clear(targets: ClearTargets, output: &Output) -> Result<()> {
    if !targets.any() {
        output.warn("Nothing selected. Use --maps, --datasets, --cursor, --lock, --credentials or --all");
        output.info("\nExample: episync clear --maps");
        return Ok(());
    }

    let mut ctx = Context::load()?;

    if targets.maps || targets.cursor || targets.lock {
        let store = ctx.store()?;

        if targets.maps {
            let removed = store
                .delete_prefix(keys::BREAKPOINT_PREFIX)
                .await
                .map_err(|e| color_eyre::eyre::eyre!("Failed to clear breakpoint maps: {}", e))?;
            info!(operation = "clear_maps", removed);
            output.success(format!("Cleared {} cached breakpoint maps", removed));
        }

        if targets.cursor {
            ProgressTracker::new(store.clone())
                .reset_cursor(SyncWatermark::default())
                .await
                .map_err(|e| color_eyre::eyre::eyre!("Failed to reset cursor: {}", e))?;
            output.success("Activity cursor reset; the next sync reads all activity");
        }

        if targets.lock {
            let lock = RunLock::new(store, SyncSettings::from_config(&ctx.config.sync).lock_ttl);
            let released = lock
                .force_release()
                .await
                .map_err(|e| color_eyre::eyre::eyre!("Failed to release run lock: {}", e))?;
            if released {
                output.success("Removed run lock");
            } else {
                output.info("No run lock held");
            }
        }
    }

    if targets.datasets {
        for dataset in ctx.factory()?.datasets() {
            let name = dataset.kind().name();
            match dataset.clear().await {
                Ok(true) => output.success(format!("Removed {} snapshot", name)),
                Ok(false) => output.info(format!("No {} snapshot found", name)),
                Err(e) => output.warn(format!("Failed to remove {} snapshot: {}", name, e)),
            }
        }
    }

    if targets.credentials {
        for key in ctx.credentials.get_all_keys() {
            ctx.credentials.remove(&key);
        }
        ctx.credentials
            .save()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials: {}", e))?;
        output.success(format!(
            "Cleared stored credentials in {}",
            ctx.paths.credentials_file().display()
        ));
    }

    Ok(())
}
