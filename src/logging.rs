use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Warnings go to stderr by default; `verbose` raises the level to debug and,
/// when `log_dir` is given, also writes a daily-rolling `ftpc.log` there.
/// `RUST_LOG` overrides the level either way. Keep the returned guard alive
/// until exit or buffered file lines are lost.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ftpcourier={},ftpc={}", level, level)));

    let (file_layer, guard) = match log_dir.filter(|_| verbose) {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "ftpc.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;
    Ok(guard)
}
