//! Logarithmic-bucket sketch.

use snafu::ensure;

use crate::{
    error::{CapacityExceeded, EmptyState, InvalidParameter, InvalidRank, Result},
    histogram::Histogram,
    summary::{counter_bits, QuantileSummary, SummaryKind, SummaryTuning},
};

/// Largest value the bucket range is sized to cover.
const MAX_TRACKED_VALUE: f64 = 1e9;

/// A quantile sketch with a relative-error guarantee, backed by logarithmically-spaced counters.
///
/// Bucket `i` counts values in `(gamma^(i-1), gamma^i]`, where `gamma = (1 + alpha) / (1 - alpha)`, so that any value
/// decoded from a bucket is within `alpha` relative error of every value counted in it. The number of buckets is fixed
/// at construction and covers values up to 10^9; larger values are counted in the last bucket.
///
/// Each counter saturates at the configured capacity, at which point the sketch is full.
#[derive(Clone, Debug)]
pub struct LogBucketSketch {
    relative_accuracy: f64,
    gamma: f64,
    multiplier: f64,
    capacity: u32,
    counters: Vec<u32>,
    total: u64,
    max_counter: u32,
}

impl LogBucketSketch {
    /// Creates a new `LogBucketSketch` with the given relative accuracy and per-bucket capacity.
    ///
    /// # Errors
    ///
    /// If the relative accuracy is not between `0` and `1` (exclusive), or the capacity is zero, an error is returned.
    pub fn new(relative_accuracy: f64, capacity: u32) -> Result<Self> {
        ensure!(
            relative_accuracy > 0.0 && relative_accuracy < 1.0,
            InvalidParameter {
                name: "alpha",
                reason: format!("{} is not between 0 and 1 (exclusive)", relative_accuracy),
            }
        );
        ensure!(
            capacity > 0,
            InvalidParameter {
                name: "capacity",
                reason: "must be nonzero",
            }
        );

        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        let buckets = (MAX_TRACKED_VALUE.log2() / gamma.log2()).ceil() as usize + 1;

        Ok(Self {
            relative_accuracy,
            gamma,
            multiplier: 1.0 / gamma.ln(),
            capacity,
            counters: vec![0; buckets],
            total: 0,
            max_counter: 0,
        })
    }

    /// Returns the relative accuracy of this sketch.
    pub fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    /// Returns the base of the bucket boundaries.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Returns the bucket counters.
    pub fn counters(&self) -> &[u32] {
        &self.counters
    }

    fn index(&self, value: u32) -> usize {
        if value <= 1 {
            return 0;
        }

        let index = (f64::from(value).ln() * self.multiplier).ceil() as usize;
        index.min(self.counters.len() - 1)
    }

    fn decode(&self, index: usize) -> u32 {
        if index == 0 {
            return 1;
        }

        // Midpoint of the bucket's bounds in terms of relative error: 2 * gamma^i / (gamma + 1).
        let value = 2.0 * self.gamma.powi(index as i32) / (self.gamma + 1.0);
        value.round_ties_even() as u32
    }
}

impl QuantileSummary for LogBucketSketch {
    const KIND: SummaryKind = SummaryKind::LogBucket;

    fn with_tuning(tuning: &SummaryTuning, _seed: u64) -> Result<Self> {
        Self::new(tuning.alpha, tuning.capacity)
    }

    fn append(&mut self, value: u32) -> Result<()> {
        let index = self.index(value);
        let counter = &mut self.counters[index];
        ensure!(
            *counter < self.capacity,
            CapacityExceeded {
                summary: "LogBucketSketch"
            }
        );

        *counter += 1;
        self.max_counter = self.max_counter.max(*counter);
        self.total += 1;
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.max_counter >= self.capacity
    }

    fn size(&self) -> u64 {
        self.total
    }

    fn memory_bytes(&self) -> u32 {
        (counter_bits(self.capacity) * self.counters.len() as u32).div_ceil(8)
    }

    fn quantile(&self, rank: f64) -> Result<u32> {
        ensure!((0.0..=1.0).contains(&rank), InvalidRank { rank });
        ensure!(
            self.total > 0,
            EmptyState {
                summary: "LogBucketSketch"
            }
        );

        let target = (rank * (self.total - 1) as f64) as u64;
        let mut cumulative = 0u64;
        for (index, count) in self.counters.iter().enumerate() {
            cumulative += u64::from(*count);
            if cumulative > target {
                return Ok(self.decode(index));
            }
        }

        Ok(self.decode(self.counters.len() - 1))
    }

    fn to_histogram(&self) -> Result<Histogram> {
        ensure!(
            self.total > 0,
            EmptyState {
                summary: "LogBucketSketch"
            }
        );

        let split_points = std::iter::once(0.0)
            .chain((0..self.counters.len()).map(|i| self.gamma.powi(i as i32)))
            .collect();
        Ok(Histogram::from_parts(split_points, self.counters.clone()))
    }
}
