//! Administrative configuration for the profiler.
//!
//! All switches and limits the node operator controls: the global on/off flag,
//! finish-time sampling, arrival tracking, retention caps, the flush interval
//! and the locations of the two persisted documents. Loadable from the node's
//! `config.toml` (`[profiler]` and `[logging]` sections), with every field
//! optional and falling back to the defaults below.
//!
//! Profiling is a timing side channel: enabling it on a node that handles
//! private keys makes timing attacks against signature generation easier. The
//! profiler only offers the on/off switch and a logged warning; the tradeoff
//! belongs to the operator.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{ProfilingError, ProfilingResult};
use crate::function_stats::{DEFAULT_MAX_FINISH_TIME_SAMPLES, DEFAULT_SAMPLING_INTERVAL};
use crate::logging::{LogRotation, LoggingConfig};
use crate::stats::{DEFAULT_HISTOGRAM_BOUNDARIES, DEFAULT_WARM_UP_SAMPLES};

/// Activations between periodic flushes to disk.
pub const DEFAULT_WRITE_STATISTICS_EVERY_CALLS: u64 = 500;

/// Cap on distinct transaction ids retained in the arrival map.
pub const DEFAULT_MAX_TRACKED_ARRIVALS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// Global switch. When off, activation tokens are no-ops end to end.
    pub enabled: bool,
    /// Whether completions are periodically snapshotted into finish-time rings.
    pub sample_finish_times: bool,
    /// Whether external arrival events are tracked. Independent of `enabled`.
    pub track_arrivals: bool,
    /// Activations between periodic persistence flushes.
    pub write_statistics_every_calls: u64,
    pub max_finish_time_samples: usize,
    pub max_tracked_arrivals: usize,
    /// Boundaries generated per histogram (99 boundaries = 100 buckets).
    pub desired_histogram_boundaries: usize,
    /// Samples buffered before a histogram is built.
    pub warm_up_samples: usize,
    /// Default interval between finish-time snapshots for new call paths.
    pub default_sampling_interval: u64,
    pub stats_path: PathBuf,
    pub arrivals_path: PathBuf,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_finish_times: true,
            track_arrivals: true,
            write_statistics_every_calls: DEFAULT_WRITE_STATISTICS_EVERY_CALLS,
            max_finish_time_samples: DEFAULT_MAX_FINISH_TIME_SAMPLES,
            max_tracked_arrivals: DEFAULT_MAX_TRACKED_ARRIVALS,
            desired_histogram_boundaries: DEFAULT_HISTOGRAM_BOUNDARIES,
            warm_up_samples: DEFAULT_WARM_UP_SAMPLES,
            default_sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            stats_path: PathBuf::from("profiler_data/profiler_stats.json"),
            arrivals_path: PathBuf::from("profiler_data/profiler_arrivals.json"),
        }
    }
}

/// `[profiler]` section of config.toml
#[derive(Debug, Deserialize)]
struct ProfilerTomlConfig {
    enabled: Option<bool>,
    sample_finish_times: Option<bool>,
    track_arrivals: Option<bool>,
    write_statistics_every_calls: Option<u64>,
    max_finish_time_samples: Option<usize>,
    max_tracked_arrivals: Option<usize>,
    desired_histogram_boundaries: Option<usize>,
    warm_up_samples: Option<usize>,
    default_sampling_interval: Option<u64>,
    stats_path: Option<String>,
    arrivals_path: Option<String>,
}

/// `[logging]` section of config.toml
#[derive(Debug, Deserialize)]
struct LoggingTomlConfig {
    log_dir: Option<String>,
    level_filter: Option<String>,
    rotation: Option<String>,
    console_timestamps: Option<bool>,
    file_json_format: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TomlConfig {
    profiler: Option<ProfilerTomlConfig>,
    logging: Option<LoggingTomlConfig>,
}

impl ProfilerConfig {
    /// Load profiler and logging configuration from a config.toml file.
    pub fn from_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> ProfilingResult<(Self, LoggingConfig)> {
        let config_content = std::fs::read_to_string(path)?;
        let toml_config: TomlConfig = toml::from_str(&config_content)?;
        Self::from_toml_config(toml_config)
    }

    fn from_toml_config(toml_config: TomlConfig) -> ProfilingResult<(Self, LoggingConfig)> {
        let defaults = Self::default();
        let config = if let Some(profiler) = toml_config.profiler {
            let config = Self {
                enabled: profiler.enabled.unwrap_or(defaults.enabled),
                sample_finish_times: profiler
                    .sample_finish_times
                    .unwrap_or(defaults.sample_finish_times),
                track_arrivals: profiler.track_arrivals.unwrap_or(defaults.track_arrivals),
                write_statistics_every_calls: profiler
                    .write_statistics_every_calls
                    .unwrap_or(defaults.write_statistics_every_calls),
                max_finish_time_samples: profiler
                    .max_finish_time_samples
                    .unwrap_or(defaults.max_finish_time_samples),
                max_tracked_arrivals: profiler
                    .max_tracked_arrivals
                    .unwrap_or(defaults.max_tracked_arrivals),
                desired_histogram_boundaries: profiler
                    .desired_histogram_boundaries
                    .unwrap_or(defaults.desired_histogram_boundaries),
                warm_up_samples: profiler.warm_up_samples.unwrap_or(defaults.warm_up_samples),
                default_sampling_interval: profiler
                    .default_sampling_interval
                    .unwrap_or(defaults.default_sampling_interval),
                stats_path: profiler
                    .stats_path
                    .map(PathBuf::from)
                    .unwrap_or(defaults.stats_path),
                arrivals_path: profiler
                    .arrivals_path
                    .map(PathBuf::from)
                    .unwrap_or(defaults.arrivals_path),
            };
            config.validate()?;
            config
        } else {
            defaults
        };

        let logging_defaults = LoggingConfig::default();
        let logging_config = if let Some(logging) = toml_config.logging {
            let rotation = logging
                .rotation
                .map(|value| match value.as_str() {
                    "hourly" => LogRotation::Hourly,
                    "daily" => LogRotation::Daily,
                    other if other.starts_with("size:") => {
                        let size_text = other.strip_prefix("size:").unwrap_or("100");
                        let size_mb = size_text.parse().unwrap_or(100);
                        LogRotation::SizeBased(size_mb)
                    }
                    _ => LogRotation::Daily,
                })
                .unwrap_or(LogRotation::Daily);
            LoggingConfig {
                log_dir: logging.log_dir.unwrap_or(logging_defaults.log_dir),
                level_filter: logging.level_filter.unwrap_or(logging_defaults.level_filter),
                rotation,
                console_timestamps: logging
                    .console_timestamps
                    .unwrap_or(logging_defaults.console_timestamps),
                file_json_format: logging
                    .file_json_format
                    .unwrap_or(logging_defaults.file_json_format),
            }
        } else {
            logging_defaults
        };

        Ok((config, logging_config))
    }

    fn validate(&self) -> ProfilingResult<()> {
        if self.write_statistics_every_calls == 0 {
            return Err(ProfilingError::Configuration(
                "write_statistics_every_calls must be at least 1".to_string(),
            ));
        }
        if self.warm_up_samples == 0 {
            return Err(ProfilingError::Configuration(
                "warm_up_samples must be at least 1".to_string(),
            ));
        }
        if self.desired_histogram_boundaries < 2 {
            return Err(ProfilingError::Configuration(
                "desired_histogram_boundaries must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
