//! Process-wide profiler registry.
//!
//! One [`Profiler`] exists per process. It owns the call-path aggregates, the
//! bounded transaction arrival map and the persistence bookkeeping, all behind
//! a single mutex. Critical sections are short - map lookups and arithmetic -
//! and never perform I/O: the periodic flush serializes a snapshot under the
//! lock and writes it to disk after the lock is released.
//!
//! The registry is constructed explicitly at startup, installed once for
//! call-site access, loaded from persisted state and flushed either every
//! `write_statistics_every_calls` completed activations or explicitly at
//! shutdown. Losing the tail since the last flush on an abrupt exit is
//! accepted.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::ProfilerConfig;
use crate::error::ProfilingResult;
use crate::function_stats::FunctionStats;
use crate::guard::FunctionProfile;
use crate::persistence::{self, ArrivalsDocument, StatsDocument};

/// Cap on retained past-session and past-flush timestamps.
const MAX_RETAINED_TIMESTAMPS: usize = 1024;

#[derive(Debug)]
pub struct Profiler {
    config: ProfilerConfig,
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    function_stats: FxHashMap<String, FunctionStats>,
    /// Insertion order of `arrivals` keys; eviction is strict FIFO by
    /// insertion, not by timestamp value. Always the same size as `arrivals`.
    arrival_order: VecDeque<String>,
    arrivals: FxHashMap<String, i64>,
    /// Lifetime count of registered arrivals, unaffected by eviction.
    total_tx_ids_received: u64,
    /// Activations completed since construction.
    session_activations: u64,
    /// Activations since the last flush; drives the periodic write.
    activations_since_flush: u64,
    time_past_starts: Vec<i64>,
    time_past_samplings: Vec<i64>,
    /// Threads that have completed at least one activation.
    seen_threads: BTreeSet<String>,
}

impl Profiler {
    /// Construct the registry, restoring any state the previous session
    /// persisted. Unreadable or malformed documents are logged and discarded -
    /// a profiler that lost its history still has to start.
    pub fn new(config: ProfilerConfig) -> Self {
        let mut inner = RegistryInner::default();
        Self::load_function_stats(&config, &mut inner);
        Self::load_arrivals(&config, &mut inner);
        push_bounded(&mut inner.time_past_starts, Utc::now().timestamp_millis());

        if config.enabled {
            warn!(
                "⚠️ Profiling enabled - timing measurements ease timing attacks, \
                 keep profiling off on nodes handling private keys"
            );
        }
        info!(
            restored_paths = inner.function_stats.len(),
            restored_arrivals = inner.arrivals.len(),
            past_sessions = inner.time_past_starts.len().saturating_sub(1),
            "✅ Profiler created"
        );
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Open a scoped activation named `name`, using the configured defaults for
    /// finish-time sampling and histogram warm-up.
    pub fn scope(self: &Arc<Self>, name: &str) -> FunctionProfile {
        self.scope_with(
            name,
            self.config.default_sampling_interval,
            self.config.warm_up_samples,
        )
    }

    /// Open a scoped activation with per-path overrides. The overrides apply
    /// when this call path is seen for the first time; existing aggregates keep
    /// the parameters they were created with.
    pub fn scope_with(
        self: &Arc<Self>,
        name: &str,
        sampling_interval: u64,
        warm_up_samples: usize,
    ) -> FunctionProfile {
        if !self.config.enabled {
            return FunctionProfile::disabled();
        }
        FunctionProfile::enter(Arc::clone(self), name, sampling_interval, warm_up_samples)
    }

    /// Record one completed activation. Called from the token's drop.
    pub(crate) fn record_completed(
        &self,
        full_path: &str,
        duration_micros: u64,
        subordinate_micros: u64,
        completed_at_ms: i64,
        sampling_interval: u64,
        warm_up_samples: usize,
    ) {
        let pending_write = {
            let mut inner = self.inner.lock().unwrap();
            let entry = inner
                .function_stats
                .entry(full_path.to_string())
                .or_insert_with(|| {
                    FunctionStats::new(
                        full_path,
                        sampling_interval,
                        self.config.desired_histogram_boundaries,
                        warm_up_samples,
                        self.config.max_finish_time_samples,
                    )
                });
            entry.account_finish_time(
                duration_micros,
                subordinate_micros,
                completed_at_ms,
                self.config.sample_finish_times,
            );
            inner
                .seen_threads
                .insert(format!("{:?}", std::thread::current().id()));
            inner.session_activations += 1;
            inner.activations_since_flush += 1;
            if inner.activations_since_flush >= self.config.write_statistics_every_calls {
                inner.activations_since_flush = 0;
                push_bounded(&mut inner.time_past_samplings, completed_at_ms);
                Some(Self::snapshot_documents(&inner))
            } else {
                None
            }
        };
        // Outside the lock: the periodic write must never stall other threads,
        // and a failure only costs this flush.
        if let Some((stats, arrivals)) = pending_write {
            self.write_documents(&stats, &arrivals);
        }
    }

    /// Timestamp an externally observed event (a transaction id entering the
    /// mempool). Idempotent per key, bounded FIFO eviction past the cap, and
    /// entirely independent of the call-stack machinery; works even with
    /// profiling disabled as long as arrival tracking is on.
    pub fn register_received_tx(&self, tx_id: &str) {
        if !self.config.track_arrivals {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.arrivals.contains_key(tx_id) {
            return;
        }
        inner.arrival_order.push_back(tx_id.to_string());
        inner
            .arrivals
            .insert(tx_id.to_string(), Utc::now().timestamp_millis());
        inner.total_tx_ids_received += 1;
        while inner.arrival_order.len() > self.config.max_tracked_arrivals {
            if let Some(oldest) = inner.arrival_order.pop_front() {
                inner.arrivals.remove(&oldest);
            }
        }
    }

    /// Diagnostic snapshot with derived fields, readable histogram ranges and
    /// the list of threads that have recorded activations.
    pub fn verbose_snapshot(&self) -> Value {
        let inner = self.inner.lock().unwrap();
        let mut function_stats = serde_json::Map::new();
        let mut paths: Vec<&String> = inner.function_stats.keys().collect();
        paths.sort();
        for path in paths {
            function_stats.insert(path.clone(), inner.function_stats[path].verbose_value());
        }
        json!({
            "functionStats": function_stats,
            "threads": inner.seen_threads.iter().cloned().collect::<Vec<_>>(),
            "numberOfSamplingsThisSession": inner.session_activations,
            "timePastStarts": inner.time_past_starts,
            "timePastSamplings": inner.time_past_samplings,
            "arrivals": {
                "tracked": inner.arrivals.len(),
                "totalTxIdsReceived": inner.total_tx_ids_received,
            },
        })
    }

    /// Compact snapshot in the persisted form, taken under the lock.
    pub fn storage_snapshot(&self) -> (StatsDocument, ArrivalsDocument) {
        let inner = self.inner.lock().unwrap();
        Self::snapshot_documents(&inner)
    }

    /// Write both documents now. Used for the final flush at shutdown; unlike
    /// the periodic flush this propagates failures to the caller.
    pub fn flush(&self) -> ProfilingResult<()> {
        let (stats, arrivals) = {
            let mut inner = self.inner.lock().unwrap();
            inner.activations_since_flush = 0;
            push_bounded(&mut inner.time_past_samplings, Utc::now().timestamp_millis());
            Self::snapshot_documents(&inner)
        };
        persistence::write_document(&self.config.stats_path, &stats)?;
        persistence::write_document(&self.config.arrivals_path, &arrivals)?;
        debug!(paths = stats.function_stats.len(), "profiler state flushed");
        Ok(())
    }

    fn snapshot_documents(inner: &RegistryInner) -> (StatsDocument, ArrivalsDocument) {
        let stats = StatsDocument {
            function_stats: inner
                .function_stats
                .iter()
                .map(|(path, stats)| (path.clone(), stats.snapshot()))
                .collect(),
            time_past_starts: inner.time_past_starts.clone(),
            time_past_samplings: inner.time_past_samplings.clone(),
        };
        let arrivals = ArrivalsDocument {
            arrivals: inner
                .arrivals
                .iter()
                .map(|(tx_id, timestamp)| (tx_id.clone(), *timestamp))
                .collect(),
            total_tx_ids_received: inner.total_tx_ids_received,
        };
        (stats, arrivals)
    }

    fn write_documents(&self, stats: &StatsDocument, arrivals: &ArrivalsDocument) {
        if let Err(error) = persistence::write_document(&self.config.stats_path, stats) {
            warn!(
                path = %self.config.stats_path.display(),
                "Failed to write function statistics ({}), will retry next flush", error
            );
        }
        if let Err(error) = persistence::write_document(&self.config.arrivals_path, arrivals) {
            warn!(
                path = %self.config.arrivals_path.display(),
                "Failed to write arrival times ({}), will retry next flush", error
            );
        }
    }

    fn load_function_stats(config: &ProfilerConfig, inner: &mut RegistryInner) {
        let document = match persistence::load_document::<StatsDocument>(&config.stats_path) {
            Ok(Some(document)) => document,
            Ok(None) => return,
            Err(error) => {
                warn!(
                    path = %config.stats_path.display(),
                    "Discarding unreadable function statistics: {}", error
                );
                return;
            }
        };
        let mut restored = FxHashMap::default();
        for (path, snapshot) in &document.function_stats {
            let mut stats = FunctionStats::new(
                path,
                config.default_sampling_interval,
                config.desired_histogram_boundaries,
                config.warm_up_samples,
                config.max_finish_time_samples,
            );
            if let Err(error) = stats.restore(snapshot) {
                warn!(
                    path = %config.stats_path.display(),
                    "Discarding malformed function statistics: {}", error
                );
                return;
            }
            restored.insert(path.clone(), stats);
        }
        inner.function_stats = restored;
        inner.time_past_starts = document.time_past_starts;
        inner.time_past_samplings = document.time_past_samplings;
        truncate_bounded(&mut inner.time_past_starts);
        truncate_bounded(&mut inner.time_past_samplings);
    }

    fn load_arrivals(config: &ProfilerConfig, inner: &mut RegistryInner) {
        let document = match persistence::load_document::<ArrivalsDocument>(&config.arrivals_path) {
            Ok(Some(document)) => document,
            Ok(None) => return,
            Err(error) => {
                warn!(
                    path = %config.arrivals_path.display(),
                    "Discarding unreadable arrival times: {}", error
                );
                return;
            }
        };
        // The document is a plain map, so the original insertion order is
        // gone; oldest-by-timestamp is the closest reconstruction for FIFO
        // eviction to keep working across restarts.
        let mut entries: Vec<(String, i64)> = document.arrivals.into_iter().collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        if entries.len() > config.max_tracked_arrivals {
            let excess = entries.len() - config.max_tracked_arrivals;
            entries.drain(..excess);
        }
        for (tx_id, timestamp) in entries {
            inner.arrival_order.push_back(tx_id.clone());
            inner.arrivals.insert(tx_id, timestamp);
        }
        inner.total_tx_ids_received = document.total_tx_ids_received;
    }
}

fn push_bounded(history: &mut Vec<i64>, timestamp: i64) {
    history.push(timestamp);
    truncate_bounded(history);
}

fn truncate_bounded(history: &mut Vec<i64>) {
    if history.len() > MAX_RETAINED_TIMESTAMPS {
        let excess = history.len() - MAX_RETAINED_TIMESTAMPS;
        history.drain(..excess);
    }
}

/// Global profiler instance
static PROFILER: OnceLock<Arc<Profiler>> = OnceLock::new();

/// Install the process-wide profiler. Call once at startup, after the
/// deployment profile decided whether profiling is allowed.
pub fn init_profiler(config: ProfilerConfig) -> Arc<Profiler> {
    let profiler = Arc::new(Profiler::new(config));
    PROFILER
        .set(profiler.clone())
        .expect("Profiler already initialized");
    info!(
        enabled = profiler.config.enabled,
        "Profiler installed as process-wide instance"
    );
    profiler
}

/// Get the process-wide profiler, if one was installed.
pub fn get_profiler() -> Option<Arc<Profiler>> {
    PROFILER.get().cloned()
}

/// Profile a code block against the process-wide profiler.
#[macro_export]
macro_rules! profile_scope {
    ($name:expr, $code:block) => {{
        let _guard = match $crate::registry::get_profiler() {
            Some(profiler) => profiler.scope($name),
            None => $crate::guard::FunctionProfile::disabled(),
        };
        $code
    }};
}
