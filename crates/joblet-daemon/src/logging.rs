// SPDX-License-Identifier: MIT
//! Logging setup (§6): a non-blocking file appender plus an `EnvFilter`
//! defaulted from the config's `logging.level`.

use crate::config::LoggingConfig;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber. The returned guard must be
/// held for the process lifetime — dropping it stops the background flush
/// task and the remainder of the log buffer is lost.
pub fn setup_logging(config: &LoggingConfig) -> io::Result<WorkerGuard> {
    if let Some(parent) = config.file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = config.file.file_name().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?;
    let parent = config.file.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
