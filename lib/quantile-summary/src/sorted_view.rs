//! Weighted order statistics over raw samples.

use snafu::ensure;

use crate::{
    error::{EmptyState, InvalidRank, Result},
    histogram::Histogram,
};

/// A sorted collection of weighted values, under construction.
///
/// Values are kept in order on every insertion. Once all values have been inserted, the view is converted with
/// [`SortedView::into_cumulative`] into a [`CumulativeView`], which answers rank and quantile queries.
#[derive(Clone, Debug, Default)]
pub struct SortedView {
    entries: Vec<(u32, u64)>,
}

impl SortedView {
    /// Creates an empty `SortedView`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty `SortedView` with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a single value with the given weight.
    pub fn insert(&mut self, value: u32, weight: u64) {
        let pos = self.entries.partition_point(|(v, _)| *v <= value);
        self.entries.insert(pos, (value, weight));
    }

    /// Inserts every value in `values`, each with the same weight.
    pub fn insert_batch(&mut self, values: &[u32], weight: u64) {
        self.entries.reserve(values.len());
        for value in values {
            self.insert(*value, weight);
        }
    }

    /// Inserts every `(value, weight)` pair in `items`.
    pub fn insert_items(&mut self, items: &[(u32, u64)]) {
        self.entries.reserve(items.len());
        for (value, weight) in items {
            self.insert(*value, *weight);
        }
    }

    /// Returns the number of inserted entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts this view into its cumulative form.
    ///
    /// Entries with equal values are merged by summing their weights, and each weight is replaced by the running sum
    /// of all weights up to and including it.
    ///
    /// # Errors
    ///
    /// If the view is empty, an error is returned.
    pub fn into_cumulative(self) -> Result<CumulativeView> {
        ensure!(!self.entries.is_empty(), EmptyState { summary: "SortedView" });

        let mut values: Vec<u32> = Vec::with_capacity(self.entries.len());
        let mut cumulative: Vec<u64> = Vec::with_capacity(self.entries.len());
        let mut running = 0u64;
        for (value, weight) in self.entries {
            running += weight;
            match values.last() {
                Some(last) if *last == value => {
                    if let Some(c) = cumulative.last_mut() {
                        *c = running;
                    }
                }
                _ => {
                    values.push(value);
                    cumulative.push(running);
                }
            }
        }

        Ok(CumulativeView {
            values,
            cumulative,
            total_weight: running,
        })
    }
}

/// A sorted, deduplicated collection of values with cumulative weights.
#[derive(Clone, Debug)]
pub struct CumulativeView {
    values: Vec<u32>,
    cumulative: Vec<u64>,
    total_weight: u64,
}

impl CumulativeView {
    /// Returns the distinct values, in ascending order.
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Returns the cumulative weight at each distinct value.
    pub fn cumulative_weights(&self) -> &[u64] {
        &self.cumulative
    }

    /// Returns the total weight of all values.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Returns the total weight of all values that are less than (or, when `inclusive`, equal to) `item`.
    pub fn rank(&self, item: u32, inclusive: bool) -> u64 {
        let pos = if inclusive {
            self.values.partition_point(|v| *v <= item)
        } else {
            self.values.partition_point(|v| *v < item)
        };

        match pos {
            0 => 0,
            pos => self.cumulative[pos - 1],
        }
    }

    /// Returns the rank of `item` normalized by the total weight.
    pub fn normalized_rank(&self, item: u32, inclusive: bool) -> f64 {
        if self.total_weight == 0 {
            return 0.0;
        }
        self.rank(item, inclusive) as f64 / self.total_weight as f64
    }

    /// Returns the smallest value whose cumulative weight reaches the given rank.
    ///
    /// When `inclusive`, the target weight is `ceil(rank * total_weight)` and the first value whose cumulative weight
    /// is at least the target is returned. Otherwise the target is `floor(rank * total_weight)` and the first value
    /// whose cumulative weight exceeds it is returned. If no value qualifies, the largest value is returned.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, an error is returned.
    pub fn quantile(&self, rank: f64, inclusive: bool) -> Result<u32> {
        ensure!((0.0..=1.0).contains(&rank), InvalidRank { rank });

        let scaled = rank * self.total_weight as f64;
        let idx = if inclusive {
            let target = scaled.ceil() as u64;
            self.cumulative.partition_point(|c| *c < target)
        } else {
            let target = scaled as u64;
            self.cumulative.partition_point(|c| *c <= target)
        };

        let idx = idx.min(self.values.len() - 1);
        Ok(self.values[idx])
    }

    /// Builds a histogram whose boundaries are the distinct values.
    ///
    /// The weight of each interior value is shared between the intervals on either side of it, with the smaller half
    /// going left. The first and last values contribute their entire weight to the first and last interval, so the
    /// total height always equals the total weight. A single distinct value `v` becomes the interval `[v - 1, v + 1]`.
    pub fn to_histogram(&self) -> Histogram {
        let n = self.values.len();
        if n == 1 {
            let v = f64::from(self.values[0]);
            return Histogram::from_parts(vec![v - 1.0, v + 1.0], vec![clamp_height(self.total_weight)]);
        }

        let weight_at = |i: usize| match i {
            0 => self.cumulative[0],
            i => self.cumulative[i] - self.cumulative[i - 1],
        };

        let split_points = self.values.iter().map(|v| f64::from(*v)).collect();
        let heights = (0..n - 1)
            .map(|gap| {
                let (left, right) = (weight_at(gap), weight_at(gap + 1));
                let from_left = if gap == 0 { left } else { left.div_ceil(2) };
                let from_right = if gap + 1 == n - 1 { right } else { right / 2 };
                clamp_height(from_left + from_right)
            })
            .collect();

        Histogram::from_parts(split_points, heights)
    }
}

fn clamp_height(weight: u64) -> u32 {
    u32::try_from(weight).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::SummaryError;

    fn view_of(values: &[u32]) -> CumulativeView {
        let mut view = SortedView::new();
        view.insert_batch(values, 1);
        view.into_cumulative().unwrap()
    }

    #[test]
    fn cumulative_merges_duplicates() {
        let view = view_of(&[3, 2, 1, 2]);
        assert_eq!(view.values(), &[1, 2, 3]);
        assert_eq!(view.cumulative_weights(), &[1, 3, 4]);
        assert_eq!(view.total_weight(), 4);
    }

    #[test]
    fn rank_inclusive_and_exclusive() {
        let view = view_of(&[1, 2, 2, 3]);
        assert_eq!(view.rank(2, true), 3);
        assert_eq!(view.rank(2, false), 1);
        assert_eq!(view.rank(0, true), 0);
        assert_eq!(view.rank(10, false), 4);
        assert_eq!(view.normalized_rank(2, true), 0.75);
    }

    #[test]
    fn quantile_inclusive_and_exclusive() {
        let view = view_of(&[1, 2, 2, 3]);
        assert_eq!(view.quantile(0.0, true).unwrap(), 1);
        assert_eq!(view.quantile(0.5, true).unwrap(), 2);
        assert_eq!(view.quantile(0.5, false).unwrap(), 2);
        assert_eq!(view.quantile(0.75, false).unwrap(), 3);
        assert_eq!(view.quantile(1.0, true).unwrap(), 3);
        assert_eq!(view.quantile(1.0, false).unwrap(), 3);
    }

    #[test]
    fn quantile_rejects_invalid_rank() {
        let view = view_of(&[1]);
        assert_eq!(view.quantile(2.0, true), Err(SummaryError::InvalidRank { rank: 2.0 }));
    }

    #[test]
    fn empty_view_cannot_be_converted() {
        assert!(matches!(
            SortedView::new().into_cumulative(),
            Err(SummaryError::EmptyState { .. })
        ));
    }

    #[test]
    fn zero_weight_endpoints() {
        let mut view = SortedView::new();
        view.insert_items(&[(5, 0), (10, 4), (20, 0)]);
        let view = view.into_cumulative().unwrap();
        assert_eq!(view.quantile(0.0, true).unwrap(), 5);
        assert_eq!(view.quantile(0.5, true).unwrap(), 10);
        assert_eq!(view.to_histogram().total_height(), 4);
    }

    #[test]
    fn single_value_histogram() {
        let mut view = SortedView::new();
        view.insert(7, 3);
        let histogram = view.into_cumulative().unwrap().to_histogram();
        assert_eq!(histogram.split_points(), &[6.0, 8.0]);
        assert_eq!(histogram.heights(), &[3]);
    }

    #[test]
    fn histogram_shares_interior_weight() {
        let mut view = SortedView::new();
        view.insert_items(&[(1, 2), (2, 3), (3, 2)]);
        let histogram = view.into_cumulative().unwrap().to_histogram();
        assert_eq!(histogram.split_points(), &[1.0, 2.0, 3.0]);
        assert_eq!(histogram.heights(), &[3, 4]);
    }

    proptest! {
        #[test]
        fn property_test_histogram_preserves_weight(items in prop::collection::vec((0u32..1000, 0u64..100), 1..64)) {
            let mut view = SortedView::new();
            view.insert_items(&items);
            let view = view.into_cumulative().unwrap();
            let total: u64 = items.iter().map(|(_, w)| w).sum();
            prop_assert_eq!(view.total_weight(), total);
            prop_assert_eq!(view.to_histogram().total_height(), total);
        }

        #[test]
        fn property_test_values_sorted(values in prop::collection::vec(any::<u32>(), 1..64)) {
            let view = view_of(&values);
            prop_assert!(view.values().windows(2).all(|w| w[0] < w[1]));
        }
    }
}
