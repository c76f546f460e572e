//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

const LOG_FILE_NAME: &str = "hivekeeper.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/hivekeeper/logs/` so stdout stays
/// free for the NDJSON event stream.
/// Log level is controlled by `HIVEKEEPER_LOG` environment variable.
///
/// # Examples
/// ```bash
/// HIVEKEEPER_LOG=debug hivekeeper run
/// HIVEKEEPER_LOG=hivekeeper_app=trace hivekeeper run
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    // Default to info, allow override via HIVEKEEPER_LOG
    let env_filter = EnvFilter::try_from_env("HIVEKEEPER_LOG").unwrap_or_else(|_| {
        EnvFilter::new("hivekeeper=info,hivekeeper_app=info,hivekeeper_daemon=info,warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("hivekeeper starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("hivekeeper").join("logs"))
}

/// Get the log file path for the current day
pub fn get_current_log_file() -> Result<PathBuf> {
    let dir = get_log_directory()?;
    Ok(dir.join(LOG_FILE_NAME))
}
