//! Per call-path aggregates.
//!
//! One [`FunctionStats`] exists for every distinct call path observed by the
//! profiler (e.g. `"validate_block->check_transaction->hash"`). It owns two
//! [`Statistic`] streams, one for the full run time of the path and one for the
//! time spent in subordinate (nested) activations, plus a bounded ring of
//! periodically sampled finish-time snapshots used to compare "when did the Kth
//! call complete" across machines without storing every timestamp.

use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::error::ProfilingResult;
use crate::persistence::FunctionStatsSnapshot;
use crate::stats::Statistic;

/// Default number of calls between finish-time snapshots.
pub const DEFAULT_SAMPLING_INTERVAL: u64 = 100;

/// Default cap on retained finish-time snapshots per call path.
pub const DEFAULT_MAX_FINISH_TIME_SAMPLES: usize = 100;

#[derive(Debug, Clone)]
pub struct FunctionStats {
    name: String,
    run_time: Statistic,
    subordinates: Statistic,
    /// Every Nth completion is snapshotted into `finish_times`; 0 disables
    /// snapshots for this path.
    sampling_interval: u64,
    max_finish_time_samples: usize,
    /// (call index, unix-ms completion timestamp), oldest first.
    finish_times: VecDeque<(u64, i64)>,
}

impl FunctionStats {
    pub fn new(
        name: &str,
        sampling_interval: u64,
        desired_boundaries: usize,
        warm_up_samples: usize,
        max_finish_time_samples: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            run_time: Statistic::new(desired_boundaries, warm_up_samples),
            subordinates: Statistic::new(desired_boundaries, warm_up_samples),
            sampling_interval,
            max_finish_time_samples,
            finish_times: VecDeque::new(),
        }
    }

    /// Record one completed activation of this call path.
    pub fn account_finish_time(
        &mut self,
        duration_micros: u64,
        subordinate_micros: u64,
        completed_at_ms: i64,
        sample_finish_times: bool,
    ) {
        self.run_time.account(duration_micros);
        self.subordinates.account(subordinate_micros);
        if !sample_finish_times || self.sampling_interval == 0 {
            return;
        }
        let call_index = self.run_time.number_of_samples();
        if call_index % self.sampling_interval != 0 {
            return;
        }
        self.finish_times.push_back((call_index, completed_at_ms));
        while self.finish_times.len() > self.max_finish_time_samples {
            self.finish_times.pop_front();
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_time(&self) -> &Statistic {
        &self.run_time
    }

    pub fn subordinates(&self) -> &Statistic {
        &self.subordinates
    }

    /// Time spent in the path's own body, derived as total minus subordinates.
    /// Saturating: clock adjustments can make nested timings overshoot.
    pub fn self_time_micros(&self) -> u64 {
        self.run_time.total().saturating_sub(self.subordinates.total())
    }

    pub fn finish_times(&self) -> impl Iterator<Item = (u64, i64)> + '_ {
        self.finish_times.iter().copied()
    }

    /// Storage form. `runTimeSubordinates` is omitted entirely when no nested
    /// time was ever recorded, which keeps leaf call paths compact on disk.
    pub fn snapshot(&self) -> FunctionStatsSnapshot {
        FunctionStatsSnapshot {
            run_time: self.run_time.snapshot(),
            subordinates: (self.subordinates.total() > 0).then(|| self.subordinates.snapshot()),
        }
    }

    pub fn restore(&mut self, snapshot: &FunctionStatsSnapshot) -> ProfilingResult<()> {
        self.run_time.restore(&snapshot.run_time)?;
        if let Some(subordinates) = &snapshot.subordinates {
            self.subordinates.restore(subordinates)?;
        }
        Ok(())
    }

    pub fn verbose_value(&self) -> Value {
        json!({
            "numCalls": self.run_time.number_of_samples(),
            "runTimeTotalInMicroseconds": self.run_time.total(),
            "runTimeSubordinatesInMicroseconds": self.subordinates.total(),
            "runTimeExcludingSubordinatesInMicroseconds": self.self_time_micros(),
            "runTime": self.run_time.verbose_value(),
            "runTimeSubordinates": self.subordinates.verbose_value(),
            "finishTimes": self
                .finish_times
                .iter()
                .map(|(call_index, timestamp)| json!([call_index, timestamp]))
                .collect::<Vec<_>>(),
        })
    }
}
