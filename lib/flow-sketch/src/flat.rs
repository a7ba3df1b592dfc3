//! Flat hashed-bucket per-flow aggregation.

use quantile_summary::{QuantileSummary, SummaryTuning};
use rand::{rngs::SmallRng, Rng as _, SeedableRng as _};
use snafu::{ensure, ResultExt as _};
use tracing::debug;

use crate::{
    config::AggregatorConfig,
    error::{AggregatorError, InsufficientMemory, Summary},
    flow::FlowQuantileEstimator,
    hash::HashFn,
};

/// Number of hash tables.
const TABLES: usize = 3;

/// Size, in bytes, of the owner key stored alongside each slot.
const OWNER_BYTES: u32 = 4;

/// Tuning of the summary in each table slot.
const SLOT_TUNING: SummaryTuning = SummaryTuning {
    capacity: u32::MAX,
    alpha: 0.3,
    compactor_capacity: 4,
    delta: 16,
};

/// Tuning of the shared fallback summary.
const FALLBACK_TUNING: SummaryTuning = SummaryTuning {
    capacity: u32::MAX,
    alpha: 0.5,
    compactor_capacity: 2,
    delta: 4,
};

#[derive(Clone, Debug)]
struct Slot<S> {
    owner: Option<u32>,
    summary: S,
}

/// A per-flow quantile estimator backed by a few hash tables of full-size summaries.
///
/// Each flow may claim one slot in one of the tables, the first unclaimed slot among those it hashes to. Once claimed,
/// a slot belongs to that flow for good. Flows that find every addressed slot taken by other flows are only recorded in
/// a single fallback summary shared by all flows, which also receives every value of every flow.
#[derive(Clone, Debug)]
pub struct FlatHashedAggregator<S> {
    tables: Vec<Vec<Slot<S>>>,
    hashers: [HashFn; TABLES],
    fallback: S,
    range: Option<(u32, u32)>,
}

impl<S: QuantileSummary> FlatHashedAggregator<S> {
    /// Creates a new `FlatHashedAggregator` from the given configuration.
    ///
    /// The memory budget is split evenly between the tables, each slot costing the footprint of its summary plus its
    /// owner key. Only the memory budget and seed of the configuration are used.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or the budget is too small for a single slot per table, an error is returned.
    pub fn new(config: &AggregatorConfig) -> Result<Self, AggregatorError> {
        config.validate()?;

        let budget_bytes = config.memory_limit.as_u64();
        let unit_bytes = S::with_tuning(&SLOT_TUNING, 0).context(Summary)?.memory_bytes() + OWNER_BYTES;
        let slots = (budget_bytes / u64::from(unit_bytes) / TABLES as u64) as usize;
        ensure!(slots > 0, InsufficientMemory { level: 0usize, budget_bytes });

        let mut rng = SmallRng::seed_from_u64(config.seed);
        let mut tables = Vec::with_capacity(TABLES);
        for _ in 0..TABLES {
            let table = (0..slots)
                .map(|_| {
                    S::with_tuning(&SLOT_TUNING, rng.random()).map(|summary| Slot { owner: None, summary })
                })
                .collect::<Result<Vec<_>, _>>()
                .context(Summary)?;
            tables.push(table);
        }

        let hashers = std::array::from_fn(|i| HashFn::new(config.seed.wrapping_add(i as u64)));
        let fallback = S::with_tuning(&FALLBACK_TUNING, rng.random()).context(Summary)?;

        let aggregator = Self {
            tables,
            hashers,
            fallback,
            range: None,
        };
        debug!(
            summary = %S::KIND,
            slots_per_table = slots,
            memory_bytes = aggregator.memory_bytes(),
            "Created flat hashed aggregator."
        );

        Ok(aggregator)
    }

    fn addresses(&self, key: u32) -> [usize; TABLES] {
        std::array::from_fn(|i| self.hashers[i].index(key, self.tables[i].len()))
    }

    /// Returns the smallest and largest values recorded across all flows, or `None` if nothing has been recorded.
    pub fn observed_range(&self) -> Option<(u32, u32)> {
        self.range
    }

    /// Returns `true` if the flow `key` owns a slot.
    pub fn is_tracked(&self, key: u32) -> bool {
        let addresses = self.addresses(key);
        (0..TABLES).any(|t| self.tables[t][addresses[t]].owner == Some(key))
    }

    /// Records `value` for the flow `key`.
    ///
    /// # Errors
    ///
    /// If a summary the value is recorded in has reached its capacity, an error is returned. When the flow's own slot
    /// rejects the value, neither the fallback summary nor the observed range is updated.
    pub fn append(&mut self, key: u32, value: u32) -> Result<(), AggregatorError> {
        let addresses = self.addresses(key);
        let target = (0..TABLES)
            .find(|t| self.tables[*t][addresses[*t]].owner == Some(key))
            .or_else(|| (0..TABLES).find(|t| self.tables[*t][addresses[*t]].owner.is_none()));

        if let Some(t) = target {
            let slot = &mut self.tables[t][addresses[t]];
            slot.summary.append(value).context(Summary)?;
            slot.owner = Some(key);
        }

        self.fallback.append(value).context(Summary)?;
        self.range = Some(match self.range {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });

        Ok(())
    }

    /// Returns the estimated value at the given rank for the flow `key`.
    ///
    /// Flows that own a slot are answered from it, and all other flows from the shared fallback summary.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, or nothing has been recorded, an error is returned.
    pub fn quantile(&self, key: u32, rank: f64) -> Result<u32, AggregatorError> {
        let addresses = self.addresses(key);
        let summary = (0..TABLES)
            .map(|t| &self.tables[t][addresses[t]])
            .find(|slot| slot.owner == Some(key))
            .map_or(&self.fallback, |slot| &slot.summary);

        summary.quantile(rank).context(Summary)
    }

    /// Returns the nominal memory footprint of every slot and the fallback summary, in bytes.
    pub fn memory_bytes(&self) -> u64 {
        let slots = self
            .tables
            .iter()
            .flatten()
            .map(|slot| u64::from(slot.summary.memory_bytes() + OWNER_BYTES))
            .sum::<u64>();
        slots + u64::from(self.fallback.memory_bytes())
    }
}

impl<S: QuantileSummary> FlowQuantileEstimator for FlatHashedAggregator<S> {
    fn append(&mut self, key: u32, value: u32) -> Result<(), AggregatorError> {
        FlatHashedAggregator::append(self, key, value)
    }

    fn quantile(&self, key: u32, rank: f64) -> Result<u32, AggregatorError> {
        FlatHashedAggregator::quantile(self, key, rank)
    }

    fn memory_bytes(&self) -> u64 {
        FlatHashedAggregator::memory_bytes(self)
    }
}
