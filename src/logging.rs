use std::path::Path;

use anyhow::Context;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config;

pub const LOG_FILE_PREFIX: &str = "ics-forms.log";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Install the JSON stderr subscriber. Safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config::log_filter()))
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Install stderr logging plus a daily-rolling JSON file sink under `log_dir`.
///
/// The background writer guard lives for the rest of the process.
pub fn init_file_logging(log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let stderr_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(EnvFilter::new(config::log_filter()))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    let _ = FILE_GUARD.set(guard);
    tracing::info!(
        target: "ics_forms",
        event = "file_logging_ready",
        dir = %log_dir.display()
    );
    Ok(())
}
