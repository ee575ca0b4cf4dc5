use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "hotswap.log";
const DEFAULT_FILTER: &str = "hotswap=info";

/// Routes tracing output to `hotswap.log` under `log_dir`. Stdout stays free
/// for the CI result line.
///
/// The returned guard flushes the writer on drop and must outlive the run.
/// Returns `None` when a global subscriber is already installed.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .try_init()
        .ok()
        .map(|()| guard)
}
