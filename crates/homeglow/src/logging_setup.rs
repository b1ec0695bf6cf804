//! Tracing bootstrap for the binary.
//!
//! Builds the global subscriber from [`LogConfig`]: an stderr layer for
//! interactive use and an optional non-blocking file layer. File creation
//! and retention pruning live on `LogConfig` itself.

use anyhow::{Context, Result};
use homeglow_core::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Keeps the file writer's worker thread alive; dropping it flushes and
/// ends file logging.
pub struct LogGuard {
    _file_worker: WorkerGuard,
}

/// Install the global subscriber. When file output is enabled, the
/// returned guard must be held for the life of the process.
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    // RUST_LOG overrides the configured default level.
    let env_filter = || {
        EnvFilter::builder()
            .with_default_directive(config.parse_level().into())
            .from_env_lossy()
    };

    let mut guard = None;
    let file_layer = if config.file_output {
        let file = config
            .create_log_file()
            .context("failed to set up the log file")?;
        let (writer, worker) = tracing_appender::non_blocking(file);
        guard = Some(LogGuard {
            _file_worker: worker,
        });
        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter()),
        )
    } else {
        None
    };

    let stderr_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .with_filter(env_filter())
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    tracing::info!("logging ready at level {}", config.level);
    if config.file_output {
        tracing::info!("log file: {}", config.current_log_path().display());
    }
    Ok(guard)
}
