use std::{hint::black_box, time::Instant};

use anyhow::{Context as _, Error};
use flow_sketch::{
    AggregatorConfig, ExactDistribution, FlatHashedAggregator, FlowQuantileEstimator, FlowType, MultiLevelAggregator,
};
use quantile_summary::{AdaptiveCentroidSketch, CompactorCascadeSketch, LogBucketSketch, QuantileSummary, SummaryKind};
use tracing::{debug, info, warn};

use crate::{config::BenchConfig, dataset::Dataset};

/// Rank that estimation error is measured at.
const QUERY_RANK: f64 = 0.5;

/// Number of passes over every scored flow when measuring query throughput.
const QUERY_PASSES: usize = 10;

/// Error and throughput metrics of a single estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModelMetrics {
    /// Average absolute log2 ratio between estimated and exact quantiles.
    pub ale: f64,

    /// Average absolute difference between the exact rank of the estimate and the queried rank.
    pub ape: f64,

    /// Appends per second, in millions.
    pub append_mops: f64,

    /// Queries per second, in millions.
    pub query_mops: f64,
}

impl ModelMetrics {
    fn accumulate(&mut self, other: &ModelMetrics) {
        self.ale += other.ale;
        self.ape += other.ape;
        self.append_mops += other.append_mops;
        self.query_mops += other.query_mops;
    }

    fn averaged(mut self, runs: u32) -> Self {
        let runs = f64::from(runs);
        self.ale /= runs;
        self.ape /= runs;
        self.append_mops /= runs;
        self.query_mops /= runs;
        self
    }
}

/// Metrics of both estimators, averaged over every run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Metrics {
    pub multi_level: ModelMetrics,
    pub flat: ModelMetrics,
}

pub struct Runner {
    aggregator: AggregatorConfig,
    summary: SummaryKind,
    repeat: u32,
}

impl Runner {
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            aggregator: config.aggregator_config(),
            summary: config.summary,
            repeat: config.repeat,
        }
    }

    /// Runs both estimators over `dataset` once per repeat and averages their metrics.
    ///
    /// Each run reseeds the estimators, starting from the configured seed.
    pub fn run(&self, dataset: &Dataset) -> Result<Metrics, Error> {
        match self.summary {
            SummaryKind::LogBucket => self.run_with::<LogBucketSketch>(dataset),
            SummaryKind::CompactorCascade => self.run_with::<CompactorCascadeSketch>(dataset),
            SummaryKind::AdaptiveCentroid => self.run_with::<AdaptiveCentroidSketch>(dataset),
        }
    }

    fn run_with<S: QuantileSummary>(&self, dataset: &Dataset) -> Result<Metrics, Error> {
        let mut exact = ExactDistribution::new();
        for (key, value) in dataset.items() {
            exact.append(*key, *value);
        }
        exact.seal();

        let scored = exact
            .keys()
            .filter(|key| exact.flow_type(*key) != FlowType::Tiny)
            .collect::<Vec<_>>();
        info!(flows = exact.len(), scored = scored.len(), "Computed exact distributions.");

        let mut totals = Metrics::default();
        for run in 0..self.repeat {
            info!("Running test {} of {} with {} summaries...", run + 1, self.repeat, S::KIND);

            let config = self.aggregator.clone().with_seed(self.aggregator.seed.wrapping_add(u64::from(run)));

            let mut multi_level =
                MultiLevelAggregator::<S>::new(&config).context("Failed to create multi-level aggregator.")?;
            let metrics = measure(&mut multi_level, dataset, &exact, &scored);
            debug!(
                ?metrics,
                memory_bytes = multi_level.memory_bytes(),
                "Multi-level aggregator run complete."
            );
            totals.multi_level.accumulate(&metrics);

            let mut flat =
                FlatHashedAggregator::<S>::new(&config).context("Failed to create flat hashed aggregator.")?;
            let metrics = measure(&mut flat, dataset, &exact, &scored);
            debug!(?metrics, memory_bytes = flat.memory_bytes(), "Flat hashed aggregator run complete.");
            totals.flat.accumulate(&metrics);
        }

        Ok(Metrics {
            multi_level: totals.multi_level.averaged(self.repeat),
            flat: totals.flat.averaged(self.repeat),
        })
    }
}

fn measure<E: FlowQuantileEstimator>(
    estimator: &mut E, dataset: &Dataset, exact: &ExactDistribution, scored: &[u32],
) -> ModelMetrics {
    let append_mops = append_throughput(estimator, dataset);
    let (ale, ape) = score(estimator, exact, scored);
    let query_mops = query_throughput(estimator, scored);

    ModelMetrics {
        ale,
        ape,
        append_mops,
        query_mops,
    }
}

fn mops(operations: usize, started: Instant) -> f64 {
    let seconds = started.elapsed().as_secs_f64();
    if seconds == 0.0 {
        return 0.0;
    }
    operations as f64 / seconds / 1e6
}

fn append_throughput<E: FlowQuantileEstimator>(estimator: &mut E, dataset: &Dataset) -> f64 {
    let mut rejected = 0usize;
    let started = Instant::now();
    for (key, value) in dataset.items() {
        if estimator.append(*key, *value).is_err() {
            rejected += 1;
        }
    }
    let throughput = mops(dataset.len(), started);

    if rejected > 0 {
        warn!(rejected, "Some items could not be recorded.");
    }
    throughput
}

/// Returns the average log error and the average rank error at the query rank over `scored` flows.
///
/// Flows the estimator cannot answer for, or answers with zero, contribute no error.
fn score<E: FlowQuantileEstimator>(estimator: &E, exact: &ExactDistribution, scored: &[u32]) -> (f64, f64) {
    if scored.is_empty() {
        return (0.0, 0.0);
    }

    let (mut ale, mut ape) = (0.0, 0.0);
    for key in scored {
        let estimate = estimator.quantile(*key, QUERY_RANK).unwrap_or(0);
        if estimate == 0 {
            continue;
        }

        if let Ok(truth) = exact.quantile(*key, QUERY_RANK) {
            ale += (f64::from(estimate) / f64::from(truth)).log2().abs();
        }
        if let Ok(rank) = exact.normalized_rank(*key, estimate, true) {
            ape += (rank - QUERY_RANK).abs();
        }
    }

    let flows = scored.len() as f64;
    (ale / flows, ape / flows)
}

fn query_throughput<E: FlowQuantileEstimator>(estimator: &E, scored: &[u32]) -> f64 {
    let started = Instant::now();
    for _ in 0..QUERY_PASSES {
        for key in scored {
            let _ = black_box(estimator.quantile(*key, QUERY_RANK));
        }
    }
    mops(QUERY_PASSES * scored.len(), started)
}
