//! On-disk persistence of profiler state.
//!
//! The profiler persists two human-readable JSON documents: one holding the per
//! call-path statistics plus the timestamps of past sessions and flushes, one
//! holding the transaction arrival map. Both use compact storage forms that are
//! sufficient to resume accounting exactly; derived state (bucket boundaries,
//! readable ranges) is reconstructed on load and never written.
//!
//! Reads are best-effort: a missing file is a normal first run, and a malformed
//! document is reported by the caller and treated as "no prior state".

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ProfilingResult;

/// Storage form of a [`crate::stats::Statistic`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticSnapshot {
    #[serde(rename = "numberOfSamples")]
    pub number_of_samples: u64,
    #[serde(rename = "totalRunTime")]
    pub total: u64,
    /// String-encoded double; absent when the histogram was never initialized.
    #[serde(
        rename = "meanUsedToCenterHistogram",
        skip_serializing_if = "Option::is_none"
    )]
    pub mean: Option<String>,
    #[serde(
        rename = "desiredNumberOfHistograms",
        skip_serializing_if = "Option::is_none"
    )]
    pub desired_boundaries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<HistogramSnapshot>,
}

/// Sparse bucket counts, keyed by bucket index. JSON object keys are strings,
/// so the indices are string-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    #[serde(rename = "histogramContent")]
    pub content: BTreeMap<String, u64>,
    #[serde(rename = "numberOfRecursiveHistogramUpdateCalls")]
    pub update_calls: u64,
}

/// Storage form of a [`crate::function_stats::FunctionStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionStatsSnapshot {
    #[serde(rename = "runTime")]
    pub run_time: StatisticSnapshot,
    #[serde(
        rename = "runTimeSubordinates",
        skip_serializing_if = "Option::is_none"
    )]
    pub subordinates: Option<StatisticSnapshot>,
}

/// The function-statistics document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsDocument {
    #[serde(rename = "functionStats")]
    pub function_stats: BTreeMap<String, FunctionStatsSnapshot>,
    #[serde(rename = "timePastStarts")]
    pub time_past_starts: Vec<i64>,
    #[serde(rename = "timePastSamplings")]
    pub time_past_samplings: Vec<i64>,
}

/// The transaction arrival-times document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArrivalsDocument {
    pub arrivals: BTreeMap<String, i64>,
    #[serde(rename = "totalTxIdsReceived")]
    pub total_tx_ids_received: u64,
}

/// Read and parse a persisted document. `Ok(None)` means the file does not
/// exist yet (a normal first run); parse and schema failures surface as errors
/// for the caller to log and discard.
pub fn load_document<T>(path: &Path) -> ProfilingResult<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

/// Serialize and write a document, creating parent directories as needed.
pub fn write_document<T: Serialize>(path: &Path, document: &T) -> ProfilingResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let text = serde_json::to_string_pretty(document)?;
    fs::write(path, text)?;
    Ok(())
}
