use std::collections::HashMap;

use foldhash::quality::RandomState;
use snafu::{ensure, OptionExt as _};

use crate::{
    error::{AggregatorError, InvalidRank, UnknownKey},
    flow::{FlowQuantileEstimator, FlowType},
};

/// Exact per-flow distributions.
///
/// Every value of every flow is retained, so memory grows with the input. This is the reference that the bounded
/// estimators are measured against.
#[derive(Clone, Debug, Default)]
pub struct ExactDistribution {
    flows: HashMap<u32, Vec<u32>, RandomState>,
    sorted: bool,
}

impl ExactDistribution {
    /// Creates an empty `ExactDistribution`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for the flow `key`.
    pub fn append(&mut self, key: u32, value: u32) {
        self.flows.entry(key).or_default().push(value);
        self.sorted = false;
    }

    /// Sorts the values of every flow.
    ///
    /// Queries sort on demand when needed, but sorting once up front after all values are recorded avoids the cost of
    /// doing so on every query.
    pub fn seal(&mut self) {
        if !self.sorted {
            self.flows.values_mut().for_each(|values| values.sort_unstable());
            self.sorted = true;
        }
    }

    fn values(&self, key: u32) -> Result<&[u32], AggregatorError> {
        self.flows
            .get(&key)
            .map(Vec::as_slice)
            .context(UnknownKey { key })
    }

    /// Returns the number of values recorded for the flow `key`, or zero if it has never been observed.
    pub fn size(&self, key: u32) -> u64 {
        self.flows.get(&key).map_or(0, |values| values.len() as u64)
    }

    /// Returns the size class of the flow `key`.
    pub fn flow_type(&self, key: u32) -> FlowType {
        FlowType::from_count(self.size(key))
    }

    /// Returns the number of flows observed.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Returns `true` if no flows have been observed.
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Returns an iterator over the keys of every observed flow, in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = u32> + '_ {
        self.flows.keys().copied()
    }

    /// Returns the number of values of the flow `key` below `value`, or at or below it when `inclusive` is set.
    ///
    /// # Errors
    ///
    /// If the flow has never been observed, an error is returned.
    pub fn rank(&self, key: u32, value: u32, inclusive: bool) -> Result<u64, AggregatorError> {
        let values = self.values(key)?;
        let rank = values
            .iter()
            .filter(|v| if inclusive { **v <= value } else { **v < value })
            .count();
        Ok(rank as u64)
    }

    /// Returns the rank of `value` within the flow `key`, normalized to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// If the flow has never been observed, an error is returned.
    pub fn normalized_rank(&self, key: u32, value: u32, inclusive: bool) -> Result<f64, AggregatorError> {
        let rank = self.rank(key, value, inclusive)?;
        Ok(rank as f64 / self.size(key) as f64)
    }

    /// Returns the exact value at the given rank for the flow `key`.
    ///
    /// With `inclusive` set, this is the smallest value whose inclusive rank reaches `rank` of the flow's size.
    /// Otherwise, it is the value at position `floor(rank * size)` in sorted order. Both are clamped to the largest
    /// value.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, or the flow has never been observed, an error is returned.
    pub fn quantile_with(&self, key: u32, rank: f64, inclusive: bool) -> Result<u32, AggregatorError> {
        ensure!((0.0..=1.0).contains(&rank), InvalidRank { rank });
        let values = self.values(key)?;

        let n = values.len();
        let position = if inclusive {
            ((rank * n as f64).ceil() as usize).saturating_sub(1)
        } else {
            (rank * n as f64).floor() as usize
        }
        .min(n - 1);

        if self.sorted {
            return Ok(values[position]);
        }

        let mut scratch = values.to_vec();
        let (_, nth, _) = scratch.select_nth_unstable(position);
        Ok(*nth)
    }

    /// Returns the exact value at the given rank for the flow `key`, using the inclusive convention.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, or the flow has never been observed, an error is returned.
    pub fn quantile(&self, key: u32, rank: f64) -> Result<u32, AggregatorError> {
        self.quantile_with(key, rank, true)
    }

    /// Returns the memory held by the recorded values, in bytes.
    pub fn memory_bytes(&self) -> u64 {
        self.flows
            .values()
            .map(|values| (values.len() * std::mem::size_of::<u32>() + std::mem::size_of::<u32>()) as u64)
            .sum()
    }
}

impl FlowQuantileEstimator for ExactDistribution {
    fn append(&mut self, key: u32, value: u32) -> Result<(), AggregatorError> {
        ExactDistribution::append(self, key, value);
        Ok(())
    }

    fn quantile(&self, key: u32, rank: f64) -> Result<u32, AggregatorError> {
        ExactDistribution::quantile(self, key, rank)
    }

    fn memory_bytes(&self) -> u64 {
        ExactDistribution::memory_bytes(self)
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec as arb_vec, prelude::*};

    use super::*;

    #[test]
    fn quantile_conventions() {
        let mut exact = ExactDistribution::new();
        for value in [40, 10, 30, 20] {
            exact.append(7, value);
        }

        assert_eq!(exact.quantile_with(7, 0.0, true).unwrap(), 10);
        assert_eq!(exact.quantile_with(7, 0.5, true).unwrap(), 20);
        assert_eq!(exact.quantile_with(7, 1.0, true).unwrap(), 40);

        assert_eq!(exact.quantile_with(7, 0.0, false).unwrap(), 10);
        assert_eq!(exact.quantile_with(7, 0.5, false).unwrap(), 30);
        assert_eq!(exact.quantile_with(7, 1.0, false).unwrap(), 40);

        exact.seal();
        assert_eq!(exact.quantile(7, 0.5).unwrap(), 20);
    }

    #[test]
    fn ranks_and_sizes() {
        let mut exact = ExactDistribution::new();
        for value in [5, 5, 9] {
            exact.append(1, value);
        }
        exact.append(2, 100);

        assert_eq!(exact.len(), 2);
        assert_eq!(exact.size(1), 3);
        assert_eq!(exact.size(3), 0);
        assert_eq!(exact.flow_type(1), FlowType::Tiny);
        assert_eq!(exact.rank(1, 5, false).unwrap(), 0);
        assert_eq!(exact.rank(1, 5, true).unwrap(), 2);
        assert_eq!(exact.normalized_rank(1, 9, true).unwrap(), 1.0);
    }

    #[test]
    fn unknown_flow_and_bad_rank() {
        let mut exact = ExactDistribution::new();
        exact.append(1, 1);

        assert!(matches!(exact.quantile(2, 0.5), Err(AggregatorError::UnknownKey { key: 2 })));
        assert!(matches!(exact.rank(2, 0, true), Err(AggregatorError::UnknownKey { key: 2 })));
        assert!(matches!(exact.quantile(1, 1.5), Err(AggregatorError::InvalidRank { .. })));
    }

    proptest! {
        #[test]
        fn property_test_quantile_matches_sorted(values in arb_vec(any::<u32>(), 1..200), rank in 0.0f64..=1.0) {
            let mut exact = ExactDistribution::new();
            for value in &values {
                exact.append(0, *value);
            }

            let unsealed = exact.quantile(0, rank).unwrap();
            exact.seal();
            let sealed = exact.quantile(0, rank).unwrap();
            prop_assert_eq!(unsealed, sealed);

            // The inclusive rank of the answer reaches the requested rank.
            let covered = exact.rank(0, sealed, true).unwrap() as f64;
            prop_assert!(covered >= (rank * values.len() as f64).ceil().min(values.len() as f64));
        }
    }
}
