use anyhow::{Context, Result};
use soundflow_core::LogConfig;
use std::fs::File;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Handle to keep the logging worker thread alive
pub struct LogGuard {
    // Kept alive until dropped
    _guard: WorkerGuard,
}

/// Initialize the logging system
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    // Default level comes from the config; RUST_LOG takes precedence.
    let make_filter = || {
        EnvFilter::builder()
            .with_default_directive(config.parse_level().into())
            .from_env_lossy()
    };

    let console_layer = if config.console_output {
        Some(
            fmt::layer()
                .with_writer(std::io::stderr) // stderr for logs, stdout for CLI output
                .with_ansi(true)
                .with_target(false)
                .with_filter(make_filter()),
        )
    } else {
        None
    };

    let (file_layer, guard) = if config.file_output {
        config
            .ensure_log_directory()
            .context("Failed to create log directory")?;
        if let Err(e) = config.cleanup_old_logs() {
            eprintln!("Warning: Failed to cleanup old log files: {e}");
        }

        let log_path = config.current_log_path();
        let file = File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {log_path:?}"))?;
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(make_filter());

        (
            Some(layer),
            Some(LogGuard {
                _guard: worker_guard,
            }),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("Logging initialized at level: {}", config.level);
    Ok(guard)
}
