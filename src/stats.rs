//! Online statistics for profiled call paths.
//!
//! A [`Statistic`] keeps a running count and sum for a stream of non-negative
//! integer samples (microsecond durations), plus a sparse histogram whose buckets
//! are centered on the stream's own mean. The histogram is built exactly once,
//! after a warm-up number of samples has been observed, so it adapts to the scale
//! of the measured code path (microseconds or milliseconds) without configuration.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::error::{ProfilingError, ProfilingResult};
use crate::persistence::{HistogramSnapshot, StatisticSnapshot};

/// Number of bucket boundaries generated when the histogram is initialized
/// (99 boundaries yield 100 buckets).
pub const DEFAULT_HISTOGRAM_BOUNDARIES: usize = 99;

/// Number of raw samples buffered before the histogram is built.
pub const DEFAULT_WARM_UP_SAMPLES: usize = 100;

/// Running summary of one stream of non-negative microsecond samples.
#[derive(Debug, Clone)]
pub struct Statistic {
    number_of_samples: u64,
    total: u64,
    desired_boundaries: usize,
    warm_up_samples: usize,
    /// Strictly increasing; empty until the histogram is initialized.
    boundaries: Vec<u64>,
    /// Sparse bucket index -> sample count. Index `boundaries.len()` is the
    /// overflow bucket.
    histogram: BTreeMap<usize, u64>,
    histogram_initialized: bool,
    mean_used_to_center: f64,
    bucket_width: u64,
    /// Raw samples retained until the histogram is built, then dropped.
    first_samples: Vec<u64>,
    histogram_update_calls: u64,
}

impl Statistic {
    pub fn new(desired_boundaries: usize, warm_up_samples: usize) -> Self {
        Self {
            number_of_samples: 0,
            total: 0,
            desired_boundaries,
            warm_up_samples: warm_up_samples.max(1),
            boundaries: Vec::new(),
            histogram: BTreeMap::new(),
            histogram_initialized: false,
            mean_used_to_center: 0.0,
            bucket_width: 0,
            first_samples: Vec::new(),
            histogram_update_calls: 0,
        }
    }

    /// Record one sample. Until the warm-up threshold is reached the raw value is
    /// buffered; the call that completes the warm-up derives the bucket boundaries
    /// from the mean observed so far and replays every buffered sample into the
    /// histogram. Afterwards each new sample lands in exactly one bucket.
    pub fn account(&mut self, value: u64) {
        self.number_of_samples += 1;
        self.total += value;
        if self.histogram_initialized {
            self.bucket_sample(value);
            return;
        }
        self.first_samples.push(value);
        if self.first_samples.len() >= self.warm_up_samples {
            self.initialize_histogram();
        }
    }

    /// Mean of all accounted samples. Non-finite when no sample has been
    /// accounted yet; callers either guarantee a sample exists or tolerate NaN.
    pub fn mean(&self) -> f64 {
        self.total as f64 / self.number_of_samples as f64
    }

    pub fn number_of_samples(&self) -> u64 {
        self.number_of_samples
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_histogram_initialized(&self) -> bool {
        self.histogram_initialized
    }

    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    pub fn bucket_count(&self, index: usize) -> u64 {
        self.histogram.get(&index).copied().unwrap_or(0)
    }

    /// Index of the bucket `value` falls in. Boundaries `b[0..n-1]` define the
    /// buckets `(-inf, b0], (b0, b1], ..., (b[n-1], +inf)`, so the result is in
    /// `[0, n]`: the first index whose boundary is >= `value`, or `n` when the
    /// value exceeds every boundary.
    pub fn bucket_index(&self, value: u64) -> usize {
        assert!(
            !self.boundaries.is_empty(),
            "bucket lookup attempted before histogram initialization"
        );
        self.boundaries.partition_point(|&boundary| boundary < value)
    }

    fn bucket_sample(&mut self, value: u64) {
        self.histogram_update_calls += 1;
        let index = self.bucket_index(value);
        *self.histogram.entry(index).or_insert(0) += 1;
    }

    fn initialize_histogram(&mut self) {
        let mean = self.mean();
        let (boundaries, width) = Self::build_boundaries(mean, self.desired_boundaries);
        self.install_boundaries(mean, boundaries, width);
        for value in std::mem::take(&mut self.first_samples) {
            self.bucket_sample(value);
        }
    }

    fn install_boundaries(&mut self, mean: f64, boundaries: Vec<u64>, width: u64) {
        assert!(
            !boundaries.is_empty(),
            "histogram boundary construction produced no usable boundaries (mean {mean})"
        );
        self.mean_used_to_center = mean;
        self.bucket_width = width;
        self.boundaries = boundaries;
        self.histogram_initialized = true;
    }

    /// Generate about `desired / 2` boundaries on each side of the mean, spaced
    /// `max(1, floor(mean / (desired / 2)))` apart. Boundaries <= 0 are discarded:
    /// samples are non-negative, so such a boundary is redundant with the first
    /// bucket.
    fn build_boundaries(mean: f64, desired_boundaries: usize) -> (Vec<u64>, u64) {
        let half = (desired_boundaries / 2).max(1) as i64;
        let width = ((mean / half as f64).floor() as i64).max(1);
        let first = mean.floor() as i64 - half * width;
        let mut boundaries = Vec::with_capacity(desired_boundaries);
        for step in 0..desired_boundaries as i64 {
            let boundary = first + step * width;
            if boundary <= 0 {
                continue;
            }
            boundaries.push(boundary as u64);
        }
        (boundaries, width as u64)
    }

    /// Compact storage form: enough to resume accounting exactly, nothing more.
    /// The boundary list itself is not persisted; it is reconstructed from the
    /// stored mean on restore.
    pub fn snapshot(&self) -> StatisticSnapshot {
        let histogram = self.histogram_initialized.then(|| HistogramSnapshot {
            content: self
                .histogram
                .iter()
                .map(|(index, count)| (index.to_string(), *count))
                .collect(),
            update_calls: self.histogram_update_calls,
        });
        StatisticSnapshot {
            number_of_samples: self.number_of_samples,
            total: self.total,
            mean: self
                .histogram_initialized
                .then(|| self.mean_used_to_center.to_string()),
            desired_boundaries: self
                .histogram_initialized
                .then(|| self.desired_boundaries as u64),
            histogram,
        }
    }

    /// Merge persisted state into this statistic: counts and sums add, and the
    /// histogram is rebuilt from the stored mean with the stored bucket counts
    /// loaded verbatim. A snapshot without a mean leaves the histogram
    /// uninitialized; it will initialize itself again once enough new samples
    /// arrive.
    pub fn restore(&mut self, snapshot: &StatisticSnapshot) -> ProfilingResult<()> {
        self.number_of_samples += snapshot.number_of_samples;
        self.total += snapshot.total;
        let Some(mean_text) = &snapshot.mean else {
            return Ok(());
        };
        let mean: f64 = mean_text.parse().map_err(|_| {
            ProfilingError::MalformedDocument(format!("unreadable stored mean {mean_text:?}"))
        })?;
        if let Some(desired) = snapshot.desired_boundaries {
            self.desired_boundaries = desired as usize;
        }
        let (boundaries, width) = Self::build_boundaries(mean, self.desired_boundaries);
        self.install_boundaries(mean, boundaries, width);
        self.histogram.clear();
        if let Some(histogram) = &snapshot.histogram {
            for (key, count) in &histogram.content {
                let index: usize = key.parse().map_err(|_| {
                    ProfilingError::MalformedDocument(format!("non-numeric bucket index {key:?}"))
                })?;
                self.histogram.insert(index, *count);
            }
            self.histogram_update_calls = histogram.update_calls;
        }
        self.first_samples.clear();
        Ok(())
    }

    /// Verbose form for interactive inspection: adds the derived mean, readable
    /// bucket ranges and the update-call diagnostic on top of the raw counters.
    pub fn verbose_value(&self) -> Value {
        let mut value = json!({
            "numberOfSamples": self.number_of_samples,
            "totalRunTimeInMicroseconds": self.total,
        });
        if self.number_of_samples > 0 {
            value["meanInMicroseconds"] = json!(self.mean());
        }
        if self.histogram_initialized {
            let buckets: Vec<Value> = self
                .histogram
                .iter()
                .map(|(index, count)| {
                    json!({
                        "bucket": index,
                        "range": self.bucket_label(*index),
                        "count": count,
                    })
                })
                .collect();
            value["histogram"] = json!({
                "meanUsedToCenterHistogram": self.mean_used_to_center,
                "bucketWidthInMicroseconds": self.bucket_width,
                "numberOfHistogramUpdateCalls": self.histogram_update_calls,
                "buckets": buckets,
            });
        }
        value
    }

    fn bucket_label(&self, index: usize) -> String {
        let count = self.boundaries.len();
        if index == 0 {
            format!("(-inf, {}]", self.boundaries[0])
        } else if index >= count {
            format!("({}, +inf)", self.boundaries[count - 1])
        } else {
            format!("({}, {}]", self.boundaries[index - 1], self.boundaries[index])
        }
    }
}

impl Default for Statistic {
    fn default() -> Self {
        Self::new(DEFAULT_HISTOGRAM_BOUNDARIES, DEFAULT_WARM_UP_SAMPLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucketed_total(statistic: &Statistic) -> u64 {
        (0..=statistic.boundaries().len())
            .map(|index| statistic.bucket_count(index))
            .sum()
    }

    #[test]
    fn test_count_and_sum_track_every_sample() {
        let mut statistic = Statistic::new(DEFAULT_HISTOGRAM_BOUNDARIES, 5);
        let samples = [0u64, 3, 7, 120, 4, 4, 9_000, 1];
        let mut expected_total = 0;
        for (position, sample) in samples.iter().enumerate() {
            statistic.account(*sample);
            expected_total += sample;
            assert_eq!(statistic.number_of_samples(), position as u64 + 1);
            assert_eq!(statistic.total(), expected_total);
        }
    }

    #[test]
    fn test_warm_up_initializes_histogram_once() {
        let mut statistic = Statistic::new(DEFAULT_HISTOGRAM_BOUNDARIES, 3);
        statistic.account(10);
        statistic.account(20);
        assert!(!statistic.is_histogram_initialized());
        statistic.account(30);
        assert!(statistic.is_histogram_initialized());

        // mean 20, half = 49 boundaries per side, width clamped to 1:
        // candidates -29..=69, non-positive discarded.
        assert_eq!(statistic.boundaries().first(), Some(&1));
        assert_eq!(statistic.boundaries().last(), Some(&69));
        assert_eq!(bucketed_total(&statistic), 3);

        statistic.account(40);
        assert_eq!(statistic.number_of_samples(), 4);
        assert_eq!(statistic.total(), 100);
        // 40 lands in the bucket whose right boundary is the first boundary >= 40.
        let index = statistic.bucket_index(40);
        assert_eq!(statistic.boundaries()[index], 40);
        assert_eq!(statistic.bucket_count(index), 1);
        assert_eq!(bucketed_total(&statistic), 4);
    }

    #[test]
    fn test_bucket_assignment_is_total_and_deterministic() {
        let mut statistic = Statistic::new(DEFAULT_HISTOGRAM_BOUNDARIES, 3);
        for sample in [10, 20, 30] {
            statistic.account(sample);
        }
        let boundary_count = statistic.boundaries().len();
        for value in [0u64, 1, 2, 35, 69, 70, 1_000, u64::MAX] {
            let index = statistic.bucket_index(value);
            assert!(index <= boundary_count);
            assert_eq!(statistic.bucket_index(value), index);
        }
        // Values beyond every boundary land in the overflow bucket.
        assert_eq!(statistic.bucket_index(70), boundary_count);
        // A value equal to a boundary belongs to the bucket it closes.
        assert_eq!(statistic.boundaries()[statistic.bucket_index(69)], 69);
    }

    #[test]
    fn test_boundaries_strictly_increasing() {
        for samples in [vec![0u64, 0, 0], vec![1, 1, 1], vec![500_000, 1_500_000, 990_000]] {
            let mut statistic = Statistic::new(DEFAULT_HISTOGRAM_BOUNDARIES, samples.len());
            for sample in samples {
                statistic.account(sample);
            }
            assert!(statistic.is_histogram_initialized());
            let boundaries = statistic.boundaries();
            assert!(!boundaries.is_empty());
            assert!(boundaries.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut original = Statistic::new(DEFAULT_HISTOGRAM_BOUNDARIES, 4);
        for sample in [15u64, 25, 35, 45, 55, 5] {
            original.account(sample);
        }
        let snapshot = original.snapshot();

        let mut restored = Statistic::default();
        restored.restore(&snapshot).unwrap();
        assert_eq!(restored.number_of_samples(), original.number_of_samples());
        assert_eq!(restored.total(), original.total());
        assert_eq!(restored.boundaries(), original.boundaries());

        // Identical subsequent streams produce identical bucket counts.
        for sample in [1u64, 30, 30, 44, 900] {
            original.account(sample);
            restored.account(sample);
        }
        for index in 0..=original.boundaries().len() {
            assert_eq!(restored.bucket_count(index), original.bucket_count(index));
        }
    }

    #[test]
    fn test_restore_without_mean_leaves_histogram_uninitialized() {
        let snapshot = StatisticSnapshot {
            number_of_samples: 7,
            total: 700,
            mean: None,
            desired_boundaries: None,
            histogram: None,
        };
        let mut statistic = Statistic::new(DEFAULT_HISTOGRAM_BOUNDARIES, 2);
        statistic.restore(&snapshot).unwrap();
        assert_eq!(statistic.number_of_samples(), 7);
        assert!(!statistic.is_histogram_initialized());

        // New samples still trigger self-initialization.
        statistic.account(90);
        statistic.account(110);
        assert!(statistic.is_histogram_initialized());
        assert_eq!(statistic.number_of_samples(), 9);
    }

    #[test]
    fn test_restore_rejects_unreadable_mean() {
        let snapshot = StatisticSnapshot {
            number_of_samples: 1,
            total: 10,
            mean: Some("not-a-number".to_string()),
            desired_boundaries: Some(99),
            histogram: None,
        };
        let mut statistic = Statistic::default();
        assert!(statistic.restore(&snapshot).is_err());
    }

    #[test]
    fn test_all_zero_samples_still_build_usable_histogram() {
        let mut statistic = Statistic::new(DEFAULT_HISTOGRAM_BOUNDARIES, 3);
        for _ in 0..3 {
            statistic.account(0);
        }
        assert!(statistic.is_histogram_initialized());
        assert_eq!(statistic.bucket_index(0), 0);
        assert_eq!(statistic.bucket_count(0), 3);
    }
}
