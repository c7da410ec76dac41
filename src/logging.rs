//! Logging configuration for dual output (console + file) with rotation.
//!
//! The profiler reports status and recoverable errors through `tracing`. This
//! module builds the sink: a colored, human-readable console layer plus a
//! dedicated rotating profiler log file, so long-running nodes keep a separate
//! on-disk record of profiler activity.

use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use tracing_appender::non_blocking;

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory to store log files
    pub log_dir: String,
    /// Log level filter (e.g., "info", "chain_profiler=debug")
    pub level_filter: String,
    /// When to rotate the profiler log file
    pub rotation: LogRotation,
    /// Whether to include timestamps in console output
    pub console_timestamps: bool,
    /// Whether to use JSON format for file logs (structured)
    pub file_json_format: bool,
}

/// Log rotation configuration
#[derive(Debug, Clone)]
pub enum LogRotation {
    /// Rotate daily (recommended for production)
    Daily,
    /// Rotate hourly (for debugging heavy loads)
    Hourly,
    /// Rotate when file reaches size limit (MB)
    SizeBased(u64),
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            level_filter: "info,chain_profiler=info".to_string(),
            rotation: LogRotation::Daily,
            console_timestamps: true,
            file_json_format: true,
        }
    }
}

/// Initialize dual output logging (console + rotating profiler log file).
///
/// Returns a guard that must be kept alive for the duration of the process so
/// the background logging thread keeps draining writes.
pub fn init_dual_logging(
    config: LoggingConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level_filter));
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level_filter));

    let file_appender = match config.rotation {
        LogRotation::Daily => tracing_appender::rolling::daily(&config.log_dir, "profiler.log"),
        LogRotation::Hourly => tracing_appender::rolling::hourly(&config.log_dir, "profiler.log"),
        LogRotation::SizeBased(_size_mb) => {
            // tracing_appender doesn't support size-based rotation natively
            tracing_appender::rolling::daily(&config.log_dir, "profiler.log")
        }
    };

    let (file_writer, guard) = non_blocking(file_appender);

    // Console layer: human-readable with colors
    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_timer(if config.console_timestamps {
            ChronoUtc::new("%Y-%m-%d %H:%M:%S%.3f UTC".to_string())
        } else {
            ChronoUtc::new("".to_string())
        })
        .with_filter(console_filter);

    // File layer: structured, with thread attribution for cross-thread traces
    let file_layer = if config.file_json_format {
        fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_level(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::new("%Y-%m-%dT%H:%M:%S%.3fZ".to_string()))
            .with_filter(file_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_level(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::new("%Y-%m-%d %H:%M:%S%.3f UTC".to_string()))
            .with_filter(file_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %config.log_dir,
        rotation = ?config.rotation,
        json_format = config.file_json_format,
        "📁 Profiler logging initialized - console + rotating file"
    );

    Ok(guard)
}

/// Initialize simple console logging for tests or minimal setups
pub fn init_simple_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter("info,chain_profiler=info")
        .init();

    tracing::info!("🖥️ Simple console logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.log_dir, "logs");
        assert_eq!(config.level_filter, "info,chain_profiler=info");
        assert!(matches!(config.rotation, LogRotation::Daily));
        assert!(config.console_timestamps);
        assert!(config.file_json_format);
    }
}
