//! Tracing setup.
//!
//! Logs go to a daily rolling file under `<base>/logs`; stdout and stderr
//! stay reserved for command output. The filter comes from `BINGEWATCH_LOG`
//! and defaults to `bingewatch=info`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::paths;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "BINGEWATCH_LOG";

const LOG_FILE_PREFIX: &str = "bingewatch.log";

/// Builds the filter: `BINGEWATCH_LOG` if set, otherwise `bingewatch=<level>`.
pub fn build_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "bingewatch={default_level},bingewatch_core={default_level}"
        ))
    })
}

/// Installs the global subscriber writing into the default logs directory.
///
/// The returned guard flushes buffered lines on drop; hold it for the whole
/// process lifetime.
pub fn init(verbose: bool) -> Result<WorkerGuard> {
    init_in(&paths::logs_dir(), verbose)
}

/// Installs the global subscriber writing into `dir`.
pub fn init_in(dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose))
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to install tracing subscriber: {err}"))?;

    Ok(guard)
}
