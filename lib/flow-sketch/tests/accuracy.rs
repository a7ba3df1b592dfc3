//! End-to-end accuracy of the bounded estimators against exact per-flow distributions.

use bytesize::ByteSize;
use flow_sketch::{
    AggregatorConfig, ExactDistribution, FlatHashedAggregator, FlowType, MultiLevelAggregator,
};
use quantile_summary::{AdaptiveCentroidSketch, CompactorCascadeSketch, LogBucketSketch, QuantileSummary};

use crate::common::{assert_close, feed, huge_keys, make_workload, mid_keys};

mod common;

fn config() -> AggregatorConfig {
    AggregatorConfig::from_memory_limit(ByteSize::mib(1)).with_seed(42)
}

fn check_multi_level<S: QuantileSummary>() {
    let items = make_workload();
    let mut aggregator = MultiLevelAggregator::<S>::new(&config()).unwrap();
    let mut exact = ExactDistribution::new();
    feed(&mut aggregator, &mut exact, &items);

    for key in huge_keys() {
        // Whether a flow this size escalates past the first summary level depends on how its values spread.
        assert_eq!(exact.flow_type(key), FlowType::Huge);
        assert_ne!(aggregator.flow_type(key).unwrap(), FlowType::Tiny, "flow {}", key);

        for rank in [0.25, 0.5, 0.75] {
            assert_close(aggregator.quantile(key, rank).unwrap(), exact.quantile(key, rank).unwrap(), key, rank);
        }

        let size = aggregator.estimated_size(key).unwrap() as f64;
        assert!((200.0..=800.0).contains(&size), "flow {} estimated size {}", key, size);
    }

    for key in mid_keys() {
        assert_ne!(aggregator.flow_type(key).unwrap(), FlowType::Tiny, "flow {}", key);
        let low = aggregator.quantile(key, 0.1).unwrap();
        let high = aggregator.quantile(key, 0.9).unwrap();
        assert!(low <= high, "flow {}: {} > {}", key, low, high);
    }
}

fn check_flat<S: QuantileSummary>() {
    let items = make_workload();
    let mut aggregator = FlatHashedAggregator::<S>::new(&config()).unwrap();
    let mut exact = ExactDistribution::new();
    feed(&mut aggregator, &mut exact, &items);

    for key in huge_keys().chain(mid_keys()) {
        for rank in [0.25, 0.5, 0.75] {
            assert_close(aggregator.quantile(key, rank).unwrap(), exact.quantile(key, rank).unwrap(), key, rank);
        }
    }

    let (min, max) = aggregator.observed_range().unwrap();
    assert!(min >= 1_000 && max < 2 * 1_000 * 100);
}

#[test]
fn multi_level_log_bucket() {
    check_multi_level::<LogBucketSketch>();
}

#[test]
fn multi_level_compactor_cascade() {
    check_multi_level::<CompactorCascadeSketch>();
}

#[test]
fn multi_level_adaptive_centroid() {
    check_multi_level::<AdaptiveCentroidSketch>();
}

#[test]
fn flat_log_bucket() {
    check_flat::<LogBucketSketch>();
}

#[test]
fn flat_compactor_cascade() {
    check_flat::<CompactorCascadeSketch>();
}

#[test]
fn flat_adaptive_centroid() {
    check_flat::<AdaptiveCentroidSketch>();
}
