//! Tracing setup for binaries.
//!
//! Diagnostics go to stderr so stdout stays free for the conversation
//! transcript. With `logging.file_logging` enabled a daily-rolling copy is
//! also written under [`app_dirs::logs_dir`](crate::app_dirs::logs_dir).

use crate::config::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "kanha=info,warn";

/// Log file name prefix inside the logs directory.
pub const LOG_FILE_PREFIX: &str = "kanha-chat.log";

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and closes the log file.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// directory cannot be created.
pub fn init(config: &LoggingConfig, logs_dir: &Path) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !config.file_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()?;
        return Ok(None);
    }

    std::fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    tracing::info!("file logging to {}", logs_dir.display());
    Ok(Some(guard))
}
