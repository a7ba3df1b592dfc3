//! Multi-level, multi-replica per-flow aggregation.

use quantile_summary::{Histogram, QuantileSummary, SaturatingCounter, SubSlot, SummaryTuning};
use rand::{rngs::SmallRng, Rng as _, SeedableRng as _};
use smallvec::SmallVec;
use snafu::{ensure, ResultExt as _};
use tracing::{debug, trace, warn};

use crate::{
    config::AggregatorConfig,
    error::{AggregatorError, FatalCapacity, InsufficientMemory, NotSupported, Summary},
    flow::{FlowQuantileEstimator, FlowType},
    hash::HashFn,
};

/// Number of levels, including the counter level.
pub const LEVELS: usize = 4;

/// Number of counters packed into each slot of the counter level.
const SUB_SLOTS: u64 = 4;

/// Summary tuning for levels 1, 2 and 3.
const LEVEL_TUNING: [SummaryTuning; LEVELS - 1] = [
    SummaryTuning {
        capacity: u8::MAX as u32,
        alpha: 0.5,
        compactor_capacity: 2,
        delta: 4,
    },
    SummaryTuning {
        capacity: u16::MAX as u32,
        alpha: 0.5,
        compactor_capacity: 2,
        delta: 8,
    },
    SummaryTuning {
        capacity: u32::MAX,
        alpha: 0.3,
        compactor_capacity: 4,
        delta: 16,
    },
];

type Replicas<T> = SmallVec<[T; 4]>;

/// A per-flow quantile estimator that spreads flows over levels of increasingly large summaries.
///
/// Level 0 is a pool of [`SaturatingCounter`]s, and levels 1 through 3 are pools of summaries with increasing
/// capacity. Every level has `hash_num` hash replicas, each addressing one slot per flow, and no per-flow metadata is
/// stored anywhere: a flow's position is implied entirely by the fill state of the slots it hashes to.
///
/// A value is recorded at the lowest level where no addressed slot is full yet, or some addressed slot is still
/// empty, and is added to every addressed slot on that level that is not full. As slots saturate, a flow
/// escalates to the next level. Queries take the minimum across replicas on each level, since collisions with other
/// flows only ever inflate a slot, and then sum the levels the flow has filled.
#[derive(Clone, Debug)]
pub struct MultiLevelAggregator<S> {
    counters: Vec<SaturatingCounter>,
    summaries: Vec<Vec<S>>,
    hashers: Vec<Replicas<HashFn>>,
}

impl<S: QuantileSummary> MultiLevelAggregator<S> {
    /// Creates a new `MultiLevelAggregator` from the given configuration.
    ///
    /// Each level receives its configured fraction of the memory budget, divided by the memory footprint of a single
    /// slot on that level.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or the budget leaves some level without any slots, an error is returned.
    pub fn new(config: &AggregatorConfig) -> Result<Self, AggregatorError> {
        config.validate()?;

        let budget_bytes = config.memory_limit.as_u64();
        let slots_for = |level: usize, unit_bytes: u32| -> Result<usize, AggregatorError> {
            let slots = (budget_bytes as f64 * config.level_fractions[level] / f64::from(unit_bytes)) as usize;
            ensure!(slots > 0, InsufficientMemory { level, budget_bytes });
            Ok(slots)
        };

        let mut rng = SmallRng::seed_from_u64(config.seed);
        let hashers: Vec<Replicas<HashFn>> = (0..LEVELS)
            .map(|_| {
                (0..config.hash_num)
                    .map(|_| HashFn::new(rng.random()))
                    .collect::<Replicas<HashFn>>()
            })
            .collect();

        let counter_slots = slots_for(0, SaturatingCounter::new().memory_bytes())?;
        let counters = vec![SaturatingCounter::new(); counter_slots];

        let mut summaries = Vec::with_capacity(LEVELS - 1);
        for (i, tuning) in LEVEL_TUNING.iter().enumerate() {
            let prototype = S::with_tuning(tuning, 0).context(Summary)?;
            let slots = slots_for(i + 1, prototype.memory_bytes())?;
            let pool = (0..slots)
                .map(|_| S::with_tuning(tuning, rng.random()))
                .collect::<Result<Vec<_>, _>>()
                .context(Summary)?;
            summaries.push(pool);
        }

        let aggregator = Self {
            counters,
            summaries,
            hashers,
        };
        debug!(
            summary = %S::KIND,
            slots = ?aggregator.level_slots(),
            memory_bytes = aggregator.memory_bytes(),
            "Created multi-level aggregator."
        );

        Ok(aggregator)
    }

    /// Returns the number of slots on each level.
    pub fn level_slots(&self) -> [usize; LEVELS] {
        [
            self.counters.len(),
            self.summaries[0].len(),
            self.summaries[1].len(),
            self.summaries[2].len(),
        ]
    }

    fn counter_addresses(&self, key: u32) -> Replicas<(usize, SubSlot)> {
        let len = self.counters.len() as u64 * SUB_SLOTS;
        self.hashers[0]
            .iter()
            .map(|hash| {
                let digest = u64::from(hash.digest(key)) % len;
                ((digest / SUB_SLOTS) as usize, SubSlot::from_digest(digest as u32))
            })
            .collect()
    }

    fn summary_addresses(&self, level: usize, key: u32) -> Replicas<usize> {
        let len = self.summaries[level - 1].len();
        self.hashers[level].iter().map(|hash| hash.index(key, len)).collect()
    }

    fn has_any_full(&self, level: usize, key: u32) -> bool {
        if level == 0 {
            return self
                .counter_addresses(key)
                .iter()
                .any(|(pos, slot)| self.counters[*pos].is_full(*slot));
        }

        let pool = &self.summaries[level - 1];
        self.summary_addresses(level, key).iter().any(|i| pool[*i].is_full())
    }

    fn has_any_empty(&self, level: usize, key: u32) -> bool {
        if level == 0 {
            return self
                .counter_addresses(key)
                .iter()
                .any(|(pos, slot)| self.counters[*pos].is_empty(*slot));
        }

        let pool = &self.summaries[level - 1];
        self.summary_addresses(level, key).iter().any(|i| pool[*i].is_empty())
    }

    /// Returns the level that the next value of `key` is recorded at.
    fn append_level(&self, key: u32) -> Result<usize, AggregatorError> {
        for level in 0..LEVELS {
            if !self.has_any_full(level, key) || self.has_any_empty(level, key) {
                return Ok(level);
            }
        }

        warn!(key, "Every addressed slot is saturated on all levels.");
        FatalCapacity { key }.fail()
    }

    /// Returns the highest level that holds a complete picture of `key`.
    fn query_level(&self, key: u32) -> Result<usize, AggregatorError> {
        for level in 0..LEVELS {
            if level != 0 && self.has_any_empty(level, key) {
                return Ok(level - 1);
            }
            if !self.has_any_full(level, key) {
                return Ok(level);
            }
        }

        FatalCapacity { key }.fail()
    }

    /// Records `value` for the flow `key`.
    ///
    /// # Errors
    ///
    /// If every addressed slot on every level is saturated, an error is returned.
    pub fn append(&mut self, key: u32, value: u32) -> Result<(), AggregatorError> {
        let level = self.append_level(key)?;
        if level == 0 {
            for (pos, slot) in self.counter_addresses(key) {
                let counter = &mut self.counters[pos];
                if !counter.is_full(slot) {
                    counter.append(value, slot).context(Summary)?;
                }
            }
            return Ok(());
        }

        for index in self.summary_addresses(level, key) {
            let summary = &mut self.summaries[level - 1][index];
            if summary.is_full() {
                continue;
            }
            if summary.is_empty() {
                trace!(key, level, index, "Flow escalated into an empty slot.");
            }
            summary.append(value).context(Summary)?;
        }

        Ok(())
    }

    /// Returns the position-wise minimum of the histograms of every addressed slot on `level`.
    fn min_histogram(&self, level: usize, key: u32) -> Result<Histogram, AggregatorError> {
        let pool = &self.summaries[level - 1];
        let mut combined: Option<Histogram> = None;
        for index in self.summary_addresses(level, key) {
            let histogram = pool[index].to_histogram().context(Summary)?;
            combined = Some(match combined {
                Some(acc) => Histogram::min(&acc, &histogram),
                None => histogram,
            });
        }

        Ok(combined.unwrap_or_default())
    }

    /// Returns the combined histogram of the flow `key`.
    ///
    /// The histogram is the minimum across replicas at the flow's query level, summed with the minimum across
    /// replicas of every lower summary level whose addressed slots are all nonempty.
    ///
    /// # Errors
    ///
    /// If the flow is only tracked by counters, or every addressed slot is saturated, an error is returned.
    pub fn combined_histogram(&self, key: u32) -> Result<Histogram, AggregatorError> {
        let level = self.query_level(key)?;
        ensure!(level != 0, NotSupported { key, level });

        let mut histogram = self.min_histogram(level, key)?;
        for lower in (1..level).rev() {
            if self.has_any_empty(lower, key) {
                continue;
            }
            histogram = Histogram::sum(&histogram, &self.min_histogram(lower, key)?);
        }

        Ok(histogram)
    }

    /// Returns the estimated value at the given rank for the flow `key`.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, the flow is only tracked by counters, or every addressed slot is saturated, an
    /// error is returned.
    pub fn quantile(&self, key: u32, rank: f64) -> Result<u32, AggregatorError> {
        self.combined_histogram(key)?.quantile(rank).context(Summary)
    }

    /// Returns the size class of the flow `key`, judged by the level it is answered from.
    ///
    /// # Errors
    ///
    /// If every addressed slot is saturated, an error is returned.
    pub fn flow_type(&self, key: u32) -> Result<FlowType, AggregatorError> {
        Ok(match self.query_level(key)? {
            0 => FlowType::Tiny,
            1 => FlowType::Mid,
            _ => FlowType::Huge,
        })
    }

    /// Returns the estimated number of values recorded for the flow `key`.
    ///
    /// This is the smallest counter across replicas, plus the total height of the combined histogram once the flow
    /// has escalated past the counters.
    ///
    /// # Errors
    ///
    /// If every addressed slot is saturated, an error is returned.
    pub fn estimated_size(&self, key: u32) -> Result<u64, AggregatorError> {
        let counted = self
            .counter_addresses(key)
            .iter()
            .map(|(pos, slot)| u64::from(self.counters[*pos].count(*slot)))
            .min()
            .unwrap_or_default();

        if self.query_level(key)? == 0 {
            return Ok(counted);
        }
        Ok(counted + self.combined_histogram(key)?.total_height())
    }

    /// Returns the nominal memory footprint of every slot, in bytes.
    pub fn memory_bytes(&self) -> u64 {
        let counters = self
            .counters
            .iter()
            .map(|c| u64::from(c.memory_bytes()))
            .sum::<u64>();
        let summaries = self
            .summaries
            .iter()
            .flatten()
            .map(|s| u64::from(s.memory_bytes()))
            .sum::<u64>();
        counters + summaries
    }
}

impl<S: QuantileSummary> FlowQuantileEstimator for MultiLevelAggregator<S> {
    fn append(&mut self, key: u32, value: u32) -> Result<(), AggregatorError> {
        MultiLevelAggregator::append(self, key, value)
    }

    fn quantile(&self, key: u32, rank: f64) -> Result<u32, AggregatorError> {
        MultiLevelAggregator::quantile(self, key, rank)
    }

    fn memory_bytes(&self) -> u64 {
        MultiLevelAggregator::memory_bytes(self)
    }
}
