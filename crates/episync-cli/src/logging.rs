use anyhow::Result;
use std::io;
use std::io::IsTerminal;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter used when RUST_LOG is not set
///
/// 0 = info, 1 = debug with noisy hyper internals kept at warn, 2+ = trace.
pub fn default_directives(verbose_level: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose_level {
        0 => "info",
        1 => "debug,hyper::proto::h1=warn,hyper::client::pool=warn",
        _ => "trace",
    }
}

/// Split `episync.log` into the rolling appender's directory and file prefix
fn rotation_target(log_path: &Path) -> Result<(&Path, &str)> {
    let log_dir = log_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no parent directory"))?;
    let log_filename = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log filename"))?;
    let prefix = log_filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(log_filename);
    Ok((log_dir, prefix))
}

pub fn init_logging(verbose_level: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let directives = default_directives(verbose_level, quiet);
    // Quiet always wins over RUST_LOG
    let filter = if quiet {
        EnvFilter::new(directives)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
    };

    let json = std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stdout().is_terminal());

    let registry = Registry::default().with(filter);

    match log_file {
        Some(log_path) => {
            let (log_dir, prefix) = rotation_target(log_path)?;
            std::fs::create_dir_all(log_dir)?;
            // episync.log.2026-01-17, episync.log.2026-01-18, ...
            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, prefix);

            if json {
                let layer = fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(file_appender);
                registry.with(layer).init();
            } else {
                let layer = fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(file_appender);
                registry.with(layer).init();
            }
        }
        None => {
            if json {
                let layer = fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(io::stderr);
                registry.with(layer).init();
            } else {
                let layer = fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(io::stderr);
                registry.with(layer).init();
            }
        }
    }

    Ok(())
}
