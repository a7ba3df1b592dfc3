use flow_sketch::{ExactDistribution, FlowQuantileEstimator};
use rand::{rngs::SmallRng, seq::SliceRandom as _, Rng as _, SeedableRng as _};

pub const HUGE_FLOWS: u32 = 8;
pub const MID_FLOWS: u32 = 8;
pub const TINY_FLOWS: u32 = 32;

/// Builds an interleaved stream of flows of every size class.
///
/// Huge flows carry 400 values, mid flows 50, and tiny flows 2. The values of flow `k` are drawn uniformly from
/// `[base, 2 * base)` where `base` grows with `k`, so flows are distinguishable by their quantiles.
pub fn make_workload() -> Vec<(u32, u32)> {
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    let mut items = Vec::new();

    let classes = [(0, HUGE_FLOWS, 400), (100, MID_FLOWS, 50), (200, TINY_FLOWS, 2)];
    for (first_key, flows, size) in classes {
        for key in first_key..first_key + flows {
            let base = 1_000 * (key % 100 + 1);
            for _ in 0..size {
                items.push((key, rng.random_range(base..2 * base)));
            }
        }
    }

    items.shuffle(&mut rng);
    items
}

pub fn huge_keys() -> impl Iterator<Item = u32> {
    0..HUGE_FLOWS
}

pub fn mid_keys() -> impl Iterator<Item = u32> {
    100..100 + MID_FLOWS
}

pub fn feed<E: FlowQuantileEstimator>(estimator: &mut E, exact: &mut ExactDistribution, items: &[(u32, u32)]) {
    for (key, value) in items {
        estimator.append(*key, *value).expect("append should not fail");
        exact.append(*key, *value);
    }
    exact.seal();
}

/// Asserts that the estimate is within a factor of three of the exact value.
pub fn assert_close(estimate: u32, exact: u32, key: u32, rank: f64) {
    let (estimate, exact) = (f64::from(estimate), f64::from(exact));
    assert!(
        estimate >= exact / 3.0 && estimate <= exact * 3.0,
        "flow {} at rank {}: estimate {} vs exact {}",
        key,
        rank,
        estimate,
        exact
    );
}
