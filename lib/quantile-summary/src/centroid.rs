//! Adaptive-centroid sketch.

use std::f64::consts::PI;

use float_cmp::approx_eq;
use snafu::ensure;

use crate::{
    error::{CapacityExceeded, EmptyState, InvalidParameter, NotFound, Result},
    histogram::Histogram,
    summary::{counter_bits, QuantileSummary, SummaryKind, SummaryTuning},
};

/// Distance within which two centroids are considered equally near to a value.
const TIE_EPSILON: f64 = 1e-5;

/// Size, in bits, of a stored centroid mean.
const MEAN_BITS: u32 = 32;

/// A weighted mean of a group of values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Centroid {
    mean: f64,
    weight: u32,
}

impl Centroid {
    fn singleton(value: u32) -> Self {
        Self {
            mean: f64::from(value),
            weight: 1,
        }
    }

    /// Returns the mean of the values in this centroid.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the number of values in this centroid.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    fn absorb(&mut self, value: u32) {
        let weight = f64::from(self.weight);
        self.mean = (self.mean * weight + f64::from(value)) / (weight + 1.0);
        self.weight += 1;
    }

    fn merge(&mut self, other: &Centroid) {
        let (w1, w2) = (f64::from(self.weight), f64::from(other.weight));
        self.mean = (self.mean * w1 + other.mean * w2) / (w1 + w2);
        self.weight += other.weight;
    }
}

/// A quantile sketch holding at most `delta` centroids.
///
/// Centroids are kept sorted by mean. The size of a centroid is measured in "k-space" through the arcsine scale
/// function `k(q) = asin(2q - 1) / (2 * PI) * delta`, where `q` is the normalized rank: a centroid covering ranks
/// `[q_l, q_r]` has k-size `k(q_r) - k(q_l)`. A value is only absorbed into an existing centroid if that centroid's
/// k-size stays within 1 afterwards, which keeps centroids near the tails small and the tails accurate. Until the
/// sketch holds `delta` centroids every value becomes its own singleton, so singletons near the tails may exceed a
/// k-size of 1, while every centroid of weight 2 or more stays within it.
///
/// The sketch is full once any centroid's weight reaches the configured capacity.
#[derive(Clone, Debug)]
pub struct AdaptiveCentroidSketch {
    capacity: u32,
    delta: usize,
    centroids: Vec<Centroid>,
    total: u64,
    max_weight: u32,
    min: u32,
    max: u32,
}

impl AdaptiveCentroidSketch {
    /// Creates a new `AdaptiveCentroidSketch` with the given per-centroid capacity and maximum number of centroids.
    ///
    /// # Errors
    ///
    /// If `capacity` or `delta` is zero, an error is returned.
    pub fn new(capacity: u32, delta: usize) -> Result<Self> {
        ensure!(
            capacity > 0,
            InvalidParameter {
                name: "capacity",
                reason: "must be nonzero",
            }
        );
        ensure!(
            delta > 0,
            InvalidParameter {
                name: "delta",
                reason: "must be nonzero",
            }
        );

        Ok(Self {
            capacity,
            delta,
            centroids: Vec::with_capacity(delta + 1),
            total: 0,
            max_weight: 0,
            min: u32::MAX,
            max: 0,
        })
    }

    /// Returns the centroids, sorted by mean.
    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Returns the maximum number of centroids.
    pub fn delta(&self) -> usize {
        self.delta
    }

    /// Maps a normalized rank into k-space.
    pub fn scale(&self, q: f64) -> f64 {
        (2.0 * q.clamp(0.0, 1.0) - 1.0).asin() / (2.0 * PI) * self.delta as f64
    }

    /// Returns the normalized rank bounds `(q_left, q_right)` of the centroid at `index`.
    ///
    /// # Errors
    ///
    /// If `index` is out of bounds, an error is returned.
    pub fn q_bounds(&self, index: usize) -> Result<(f64, f64)> {
        ensure!(
            index < self.centroids.len(),
            NotFound {
                index,
                len: self.centroids.len()
            }
        );

        let left: u64 = self.centroids[..index].iter().map(|c| u64::from(c.weight)).sum();
        let right = left + u64::from(self.centroids[index].weight);
        let total = self.total as f64;
        Ok((left as f64 / total, right as f64 / total))
    }

    /// Returns the k-size of the centroid at `index`.
    ///
    /// # Errors
    ///
    /// If `index` is out of bounds, an error is returned.
    pub fn k_size(&self, index: usize) -> Result<f64> {
        let (left, right) = self.q_bounds(index)?;
        Ok(self.scale(right) - self.scale(left))
    }

    /// Returns `true` if a centroid starting at cumulative weight `lower` with the given weight stays within a k-size
    /// of 1 when the sketch holds `total` values.
    fn fits(&self, lower: u64, weight: u64, total: f64) -> bool {
        let (q_left, q_right) = (lower as f64 / total, (lower + weight) as f64 / total);
        self.scale(q_right) - self.scale(q_left) <= 1.0
    }

    /// Finds the centroid that should absorb `value`, if any.
    ///
    /// Among the centroids nearest to `value`, the heaviest one that can absorb another value without exceeding a
    /// k-size of 1 is chosen.
    fn find_append_pos(&self, value: u32) -> Option<usize> {
        let value = f64::from(value);
        let total = (self.total + 1) as f64;

        let mut best = None;
        let mut best_weight = 0;
        let mut min_dist = f64::MAX;
        let mut cumulative = 0u64;
        for (index, centroid) in self.centroids.iter().enumerate() {
            let lower = cumulative;
            cumulative += u64::from(centroid.weight);

            let dist = (centroid.mean - value).abs();
            if dist > min_dist + TIE_EPSILON {
                continue;
            }
            if dist < min_dist - TIE_EPSILON {
                min_dist = dist;
                best = None;
                best_weight = 0;
            }
            if centroid.weight > best_weight && self.fits(lower, u64::from(centroid.weight) + 1, total) {
                best = Some(index);
                best_weight = centroid.weight;
            }
        }

        best
    }

    /// Merges the adjacent pair of centroids with the smallest combined k-size.
    fn compress_nearest(&mut self) {
        if self.centroids.len() <= 1 {
            return;
        }

        let total = self.total as f64;
        let mut min_size = f64::MAX;
        let mut pos = 0;
        let mut left = 0u64;
        for (i, pair) in self.centroids.windows(2).enumerate() {
            let right = left + u64::from(pair[0].weight) + u64::from(pair[1].weight);
            let size = self.scale(right as f64 / total) - self.scale(left as f64 / total);
            if size < min_size {
                min_size = size;
                pos = i;
            }
            left += u64::from(pair[0].weight);
        }

        // With more than `delta` centroids, the k-sizes of all pairs sum to at most `delta`.
        debug_assert!(min_size <= 1.0 + 1e-9, "smallest pair has k-size {}", min_size);

        let next = self.centroids.remove(pos + 1);
        self.centroids[pos].merge(&next);
        self.max_weight = self.max_weight.max(self.centroids[pos].weight);
    }
}

impl QuantileSummary for AdaptiveCentroidSketch {
    const KIND: SummaryKind = SummaryKind::AdaptiveCentroid;

    fn with_tuning(tuning: &SummaryTuning, _seed: u64) -> Result<Self> {
        Self::new(tuning.capacity, tuning.delta)
    }

    fn append(&mut self, value: u32) -> Result<()> {
        ensure!(
            !self.is_full(),
            CapacityExceeded {
                summary: "AdaptiveCentroidSketch"
            }
        );

        let target = if self.centroids.len() < self.delta {
            None
        } else {
            self.find_append_pos(value)
        };

        match target {
            Some(index) => {
                let centroid = &mut self.centroids[index];
                centroid.absorb(value);
                self.max_weight = self.max_weight.max(centroid.weight);
            }
            None => {
                let pos = self.centroids.partition_point(|c| c.mean <= f64::from(value));
                self.centroids.insert(pos, Centroid::singleton(value));
                self.max_weight = self.max_weight.max(1);
            }
        }

        self.total += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        self.centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        if self.centroids.len() > self.delta {
            self.compress_nearest();
        }

        Ok(())
    }

    fn is_full(&self) -> bool {
        self.max_weight >= self.capacity
    }

    fn size(&self) -> u64 {
        self.total
    }

    fn memory_bytes(&self) -> u32 {
        ((counter_bits(self.capacity) + MEAN_BITS) * self.delta as u32).div_ceil(8)
    }

    fn quantile(&self, rank: f64) -> Result<u32> {
        self.to_histogram()?.quantile(rank)
    }

    fn to_histogram(&self) -> Result<Histogram> {
        let (first, last) = match (self.centroids.first(), self.centroids.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return EmptyState {
                    summary: "AdaptiveCentroidSketch",
                }
                .fail()
            }
        };

        let (min, max) = (f64::from(self.min), f64::from(self.max));
        let mut split_points = Vec::with_capacity(self.centroids.len() + 2);
        split_points.push(if approx_eq!(f64, min, first.mean, epsilon = TIE_EPSILON) {
            min - 1.0
        } else {
            min
        });
        split_points.extend(self.centroids.iter().map(Centroid::mean));
        split_points.push(if approx_eq!(f64, max, last.mean, epsilon = TIE_EPSILON) {
            max + 1.0
        } else {
            max
        });

        // Each centroid's weight is shared between the intervals on either side of its mean.
        let mut heights = Vec::with_capacity(self.centroids.len() + 1);
        heights.push(first.weight / 2);
        for pair in self.centroids.windows(2) {
            heights.push(pair[0].weight.div_ceil(2) + pair[1].weight / 2);
        }
        heights.push(last.weight.div_ceil(2));

        Ok(Histogram::from_parts(split_points, heights))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::SummaryError;

    fn check_structure(sketch: &AdaptiveCentroidSketch) {
        let centroids = sketch.centroids();
        assert!(centroids.len() <= sketch.delta());
        assert!(centroids.windows(2).all(|w| w[0].mean() <= w[1].mean()));

        let weight: u64 = centroids.iter().map(|c| u64::from(c.weight())).sum();
        assert_eq!(weight, sketch.size());
        assert_eq!(sketch.to_histogram().unwrap().total_height(), sketch.size());
    }

    #[test]
    fn fills_with_singletons_first() {
        let mut sketch = AdaptiveCentroidSketch::new(u32::MAX, 4).unwrap();
        for v in [4, 2, 3, 1] {
            sketch.append(v).unwrap();
        }
        let means: Vec<f64> = sketch.centroids().iter().map(Centroid::mean).collect();
        assert_eq!(means, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(sketch.centroids().iter().all(|c| c.weight() == 1));
    }

    #[test]
    fn tail_singletons_exceed_unit_k_size() {
        let mut sketch = AdaptiveCentroidSketch::new(u32::MAX, 16).unwrap();
        for v in 1..=16 {
            sketch.append(v).unwrap();
        }

        // Values are kept as singletons until there are `delta` of them, whatever their k-size.
        assert!(sketch.k_size(15).unwrap() > 1.0);
        assert!(sketch.k_size(0).unwrap() > 1.0);

        sketch.append(17).unwrap();
        for (i, centroid) in sketch.centroids().iter().enumerate() {
            if centroid.weight() >= 2 {
                assert!(sketch.k_size(i).unwrap() <= 1.0 + 1e-9);
            }
        }
    }

    #[test]
    fn absorbs_into_nearest_centroid() {
        let mut sketch = AdaptiveCentroidSketch::new(u32::MAX, 4).unwrap();
        for v in 1..=5 {
            sketch.append(v).unwrap();
        }

        let last = sketch.centroids()[3];
        assert_eq!(last.mean(), 4.5);
        assert_eq!(last.weight(), 2);

        let histogram = sketch.to_histogram().unwrap();
        assert_eq!(histogram.split_points(), &[0.0, 1.0, 2.0, 3.0, 4.5, 5.0]);
        assert_eq!(histogram.heights(), &[0, 1, 1, 2, 1]);
    }

    #[test]
    fn k_sizes_telescope() {
        let mut sketch = AdaptiveCentroidSketch::new(u32::MAX, 8).unwrap();
        for v in 1..=200u32 {
            sketch.append(v * 7 % 97 + 1).unwrap();
        }

        let total: f64 = (0..sketch.centroids().len()).map(|i| sketch.k_size(i).unwrap()).sum();
        assert!((total - sketch.delta() as f64 / 2.0).abs() < 1e-9);
        assert!(matches!(
            sketch.k_size(sketch.centroids().len()),
            Err(SummaryError::NotFound { .. })
        ));
    }

    #[test]
    fn full_once_a_centroid_reaches_capacity() {
        let mut sketch = AdaptiveCentroidSketch::new(4, 4).unwrap();
        let mut appended = 0;
        while !sketch.is_full() {
            sketch.append(100).unwrap();
            appended += 1;
            assert!(appended < 100);
        }
        assert_eq!(
            sketch.append(100),
            Err(SummaryError::CapacityExceeded {
                summary: "AdaptiveCentroidSketch"
            })
        );
        check_structure(&sketch);
    }

    #[test]
    fn single_value_histogram() {
        let mut sketch = AdaptiveCentroidSketch::new(16, 4).unwrap();
        sketch.append(10).unwrap();
        let histogram = sketch.to_histogram().unwrap();
        assert_eq!(histogram.split_points(), &[9.0, 10.0, 11.0]);
        assert_eq!(histogram.heights(), &[0, 1]);
        assert_eq!(sketch.quantile(0.5).unwrap(), 10);
    }

    #[test]
    fn memory_footprint() {
        let sketch = AdaptiveCentroidSketch::new(255, 4).unwrap();
        assert_eq!(sketch.memory_bytes(), 20);
        let sketch = AdaptiveCentroidSketch::new(u32::MAX, 16).unwrap();
        assert_eq!(sketch.memory_bytes(), 128);
    }

    #[test]
    fn empty_sketch_errors() {
        let sketch = AdaptiveCentroidSketch::new(16, 4).unwrap();
        assert!(sketch.to_histogram().is_err());
        assert!(sketch.quantile(0.5).is_err());
        assert!(sketch.q_bounds(0).is_err());
    }

    proptest! {
        #[test]
        fn property_test_structure(values in prop::collection::vec(1u32..100_000, 1..300), delta in 2usize..20) {
            let mut sketch = AdaptiveCentroidSketch::new(u32::MAX, delta).unwrap();
            for v in &values {
                sketch.append(*v).unwrap();
                check_structure(&sketch);

                for (i, centroid) in sketch.centroids().iter().enumerate() {
                    if centroid.weight() >= 2 {
                        let size = sketch.k_size(i).unwrap();
                        prop_assert!(
                            size <= 1.0 + 1e-9,
                            "centroid {} of weight {} has k-size {}",
                            i,
                            centroid.weight(),
                            size
                        );
                    }
                }
            }
        }

        #[test]
        fn property_test_monotone_input(len in 1u32..500, delta in 2usize..20) {
            let mut sketch = AdaptiveCentroidSketch::new(u32::MAX, delta).unwrap();
            for v in 1..=len {
                sketch.append(v).unwrap();
            }
            check_structure(&sketch);

            let median = sketch.quantile(0.5).unwrap();
            prop_assert!(median >= 1 && median <= len);
        }
    }
}
