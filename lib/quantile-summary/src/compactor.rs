//! Cascading-compactor sketch.

use rand::{rngs::SmallRng, Rng, SeedableRng as _};
use smallvec::SmallVec;
use snafu::ensure;

use crate::{
    error::{CapacityExceeded, EmptyState, InvalidParameter, Logic, Result},
    histogram::Histogram,
    sorted_view::{CumulativeView, SortedView},
    summary::{QuantileSummary, SummaryKind, SummaryTuning},
};

/// Size, in bytes, of a single stored item.
const ITEM_BYTES: u32 = 4;

/// A bounded, sorted buffer of items that all carry the same weight.
///
/// When full, a compactor is compacted into the next compactor: half of its items, chosen by a fair coin flip between
/// the even and odd positions, are promoted at double the weight, and the buffer is cleared.
#[derive(Clone, Debug)]
pub struct Compactor {
    lg_weight: u32,
    capacity: usize,
    items: SmallVec<[u32; 4]>,
}

impl Compactor {
    /// Creates an empty `Compactor` holding items of weight `2^lg_weight`.
    pub fn new(lg_weight: u32, capacity: usize) -> Self {
        Self {
            lg_weight,
            capacity,
            items: SmallVec::new(),
        }
    }

    /// Returns the weight of each item in this compactor.
    pub fn weight(&self) -> u64 {
        1 << self.lg_weight
    }

    /// Returns the items held, in ascending order.
    pub fn items(&self) -> &[u32] {
        &self.items
    }

    /// Returns the number of items held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no items are held.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if the compactor must be compacted before accepting more items.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Inserts an item, keeping items sorted.
    ///
    /// # Errors
    ///
    /// If the compactor is full, an error is returned.
    pub fn append(&mut self, item: u32) -> Result<()> {
        ensure!(
            !self.is_full(),
            Logic {
                reason: "cannot append to a full compactor"
            }
        );
        self.insert(item);
        Ok(())
    }

    fn insert(&mut self, item: u32) {
        let pos = self.items.partition_point(|v| *v <= item);
        self.items.insert(pos, item);
    }

    /// Compacts this compactor into `next`.
    ///
    /// # Errors
    ///
    /// If the compactor is not full, an error is returned.
    pub fn compact<R: Rng>(&mut self, next: &mut Compactor, rng: &mut R) -> Result<()> {
        ensure!(
            self.is_full(),
            Logic {
                reason: "cannot compact a compactor that is not full"
            }
        );

        let offset = usize::from(rng.random::<bool>());
        for item in self.items.iter().skip(offset).step_by(2) {
            next.insert(*item);
        }
        self.items.clear();
        Ok(())
    }

    /// Returns the number of items less than (or, when `inclusive`, equal to) `item`.
    pub fn rank(&self, item: u32, inclusive: bool) -> u64 {
        let pos = if inclusive {
            self.items.partition_point(|v| *v <= item)
        } else {
            self.items.partition_point(|v| *v < item)
        };
        pos as u64
    }

    /// Returns the rank of `item`, scaled by the weight of this compactor.
    pub fn weighted_rank(&self, item: u32, inclusive: bool) -> u64 {
        self.rank(item, inclusive) << self.lg_weight
    }

    /// Returns the nominal memory footprint of this compactor, in bytes.
    pub fn memory_bytes(&self) -> u32 {
        ITEM_BYTES * self.capacity as u32
    }
}

/// A quantile sketch built from a cascade of compactors with doubling weights.
///
/// Values enter the lowest compactor at weight 1. Whenever a compactor fills up, it is compacted into the compactor
/// above it, so compactor `i` holds items of weight `2^i`. The number of compactors is fixed at construction such that
/// the top compactor can never fill up before the sketch reaches its capacity.
///
/// The compactor capacity must be even, which keeps the total weight held by the compactors equal to the number of
/// values appended.
#[derive(Clone, Debug)]
pub struct CompactorCascadeSketch {
    capacity: u32,
    compactors: Vec<Compactor>,
    count: u64,
    min: u32,
    max: u32,
    rng: SmallRng,
}

impl CompactorCascadeSketch {
    /// Creates a new `CompactorCascadeSketch`.
    ///
    /// `capacity` is the number of values the sketch accepts, and `compactor_capacity` the number of items each
    /// compactor holds. `seed` seeds the coin flips used during compaction.
    ///
    /// # Errors
    ///
    /// If `capacity` is zero, or `compactor_capacity` is not a nonzero even number, an error is returned.
    pub fn new(capacity: u32, compactor_capacity: u32, seed: u64) -> Result<Self> {
        ensure!(
            capacity > 0,
            InvalidParameter {
                name: "capacity",
                reason: "must be nonzero",
            }
        );
        ensure!(
            compactor_capacity >= 2 && compactor_capacity % 2 == 0,
            InvalidParameter {
                name: "compactor_capacity",
                reason: format!("{} is not a nonzero even number", compactor_capacity),
            }
        );

        let mut levels = (f64::from(capacity) / f64::from(compactor_capacity) + 1.0)
            .log2()
            .ceil()
            .max(1.0) as u32;
        while u64::from(compactor_capacity) << (levels - 1) <= u64::from(capacity) {
            levels += 1;
        }

        let compactors = (0..levels)
            .map(|lg_weight| Compactor::new(lg_weight, compactor_capacity as usize))
            .collect();

        Ok(Self {
            capacity,
            compactors,
            count: 0,
            min: u32::MAX,
            max: 0,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Returns the compactors, from lowest to highest weight.
    pub fn compactors(&self) -> &[Compactor] {
        &self.compactors
    }

    /// Returns the smallest value appended, or `None` if the sketch is empty.
    pub fn min(&self) -> Option<u32> {
        (self.count > 0).then_some(self.min)
    }

    /// Returns the largest value appended, or `None` if the sketch is empty.
    pub fn max(&self) -> Option<u32> {
        (self.count > 0).then_some(self.max)
    }

    /// Returns the estimated number of appended values less than (or, when `inclusive`, equal to) `item`.
    ///
    /// # Errors
    ///
    /// If the sketch is empty, an error is returned.
    pub fn rank(&self, item: u32, inclusive: bool) -> Result<u64> {
        ensure!(
            self.count > 0,
            EmptyState {
                summary: "CompactorCascadeSketch"
            }
        );
        Ok(self.compactors.iter().map(|c| c.weighted_rank(item, inclusive)).sum())
    }

    /// Returns the estimated rank of `item`, normalized by the number of appended values.
    ///
    /// # Errors
    ///
    /// If the sketch is empty, an error is returned.
    pub fn normalized_rank(&self, item: u32, inclusive: bool) -> Result<f64> {
        Ok(self.rank(item, inclusive)? as f64 / self.count as f64)
    }

    fn cumulative_view(&self) -> Result<CumulativeView> {
        ensure!(
            self.count > 0,
            EmptyState {
                summary: "CompactorCascadeSketch"
            }
        );

        let held = self.compactors.iter().map(Compactor::len).sum::<usize>();
        let mut view = SortedView::with_capacity(held + 2);
        for compactor in &self.compactors {
            view.insert_batch(compactor.items(), compactor.weight());
        }
        // The extremes anchor the view without contributing weight.
        view.insert(self.min, 0);
        view.insert(self.max, 0);
        view.into_cumulative()
    }
}

impl QuantileSummary for CompactorCascadeSketch {
    const KIND: SummaryKind = SummaryKind::CompactorCascade;

    fn with_tuning(tuning: &SummaryTuning, seed: u64) -> Result<Self> {
        Self::new(tuning.capacity, tuning.compactor_capacity, seed)
    }

    fn append(&mut self, value: u32) -> Result<()> {
        ensure!(
            !self.is_full(),
            CapacityExceeded {
                summary: "CompactorCascadeSketch"
            }
        );

        self.compactors[0].append(value)?;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let mut level = 0;
        while self.compactors[level].is_full() {
            ensure!(
                level + 1 < self.compactors.len(),
                Logic {
                    reason: "top compactor overflowed"
                }
            );

            let (lower, upper) = self.compactors.split_at_mut(level + 1);
            lower[level].compact(&mut upper[0], &mut self.rng)?;
            level += 1;
        }

        Ok(())
    }

    fn is_full(&self) -> bool {
        self.count >= u64::from(self.capacity)
    }

    fn size(&self) -> u64 {
        self.count
    }

    fn memory_bytes(&self) -> u32 {
        self.compactors.iter().map(Compactor::memory_bytes).sum()
    }

    fn quantile(&self, rank: f64) -> Result<u32> {
        self.cumulative_view()?.quantile(rank, true)
    }

    fn to_histogram(&self) -> Result<Histogram> {
        Ok(self.cumulative_view()?.to_histogram())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::SummaryError;

    #[test]
    fn compactor_preconditions() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut lower = Compactor::new(0, 2);
        let mut upper = Compactor::new(1, 2);

        assert!(lower.compact(&mut upper, &mut rng).is_err());
        lower.append(5).unwrap();
        lower.append(3).unwrap();
        assert_eq!(lower.items(), &[3, 5]);
        assert!(lower.append(4).is_err());

        lower.compact(&mut upper, &mut rng).unwrap();
        assert!(lower.is_empty());
        assert_eq!(upper.len(), 1);
        assert!(upper.items()[0] == 3 || upper.items()[0] == 5);
        assert_eq!(upper.weighted_rank(u32::MAX, true), 2);
    }

    #[test]
    fn level_count_bounds_top_compactor() {
        let sketch = CompactorCascadeSketch::new(255, 2, 0).unwrap();
        assert_eq!(sketch.compactors().len(), 8);
        assert_eq!(sketch.memory_bytes(), 64);

        let sketch = CompactorCascadeSketch::new(u32::MAX, 4, 0).unwrap();
        assert_eq!(sketch.compactors().len(), 31);
    }

    #[test]
    fn rejects_odd_compactor_capacity() {
        assert!(CompactorCascadeSketch::new(255, 3, 0).is_err());
        assert!(CompactorCascadeSketch::new(255, 0, 0).is_err());
        assert!(CompactorCascadeSketch::new(0, 2, 0).is_err());
    }

    #[test]
    fn accepts_exactly_capacity_values() {
        let mut sketch = CompactorCascadeSketch::new(255, 2, 7).unwrap();
        for i in 0..255 {
            sketch.append(i * 13 % 101 + 1).unwrap();
        }
        assert!(sketch.is_full());
        assert_eq!(
            sketch.append(1),
            Err(SummaryError::CapacityExceeded {
                summary: "CompactorCascadeSketch"
            })
        );
        assert_eq!(sketch.size(), 255);
        assert_eq!(sketch.to_histogram().unwrap().total_height(), 255);
    }

    #[test]
    fn exact_before_first_compaction() {
        let mut sketch = CompactorCascadeSketch::new(3, 4, 0).unwrap();
        for v in [30, 10, 20] {
            sketch.append(v).unwrap();
        }
        assert_eq!(sketch.rank(20, true).unwrap(), 2);
        assert_eq!(sketch.rank(20, false).unwrap(), 1);
        assert_eq!(sketch.quantile(0.0).unwrap(), 10);
        assert_eq!(sketch.quantile(0.5).unwrap(), 20);
        assert_eq!(sketch.quantile(1.0).unwrap(), 30);
        assert_eq!(sketch.min(), Some(10));
        assert_eq!(sketch.max(), Some(30));
    }

    #[test]
    fn same_seed_same_state() {
        let mut a = CompactorCascadeSketch::new(1000, 2, 42).unwrap();
        let mut b = CompactorCascadeSketch::new(1000, 2, 42).unwrap();
        for v in 1..=500 {
            a.append(v).unwrap();
            b.append(v).unwrap();
        }
        for (ca, cb) in a.compactors().iter().zip(b.compactors()) {
            assert_eq!(ca.items(), cb.items());
        }
    }

    #[test]
    fn empty_sketch_errors() {
        let sketch = CompactorCascadeSketch::new(10, 2, 0).unwrap();
        assert!(sketch.quantile(0.5).is_err());
        assert!(sketch.rank(1, true).is_err());
        assert!(sketch.to_histogram().is_err());
        assert_eq!(sketch.min(), None);
    }

    proptest! {
        #[test]
        fn property_test_weight_preserved(values in prop::collection::vec(1u32..10_000, 1..500), seed in any::<u64>()) {
            let mut sketch = CompactorCascadeSketch::new(65535, 2, seed).unwrap();
            for v in &values {
                sketch.append(*v).unwrap();
            }

            let held: u64 = sketch.compactors().iter().map(|c| c.len() as u64 * c.weight()).sum();
            prop_assert_eq!(held, values.len() as u64);
            prop_assert_eq!(sketch.to_histogram().unwrap().total_height(), values.len() as u64);
            prop_assert_eq!(sketch.rank(u32::MAX, true).unwrap(), values.len() as u64);
        }

        #[test]
        fn property_test_quantile_within_extremes(values in prop::collection::vec(1u32..10_000, 1..500), rank in 0.0f64..=1.0) {
            let mut sketch = CompactorCascadeSketch::new(65535, 4, 0xC0FFEE).unwrap();
            for v in &values {
                sketch.append(*v).unwrap();
            }

            let q = sketch.quantile(rank).unwrap();
            prop_assert!(q >= sketch.min().unwrap() && q <= sketch.max().unwrap());
        }
    }
}
