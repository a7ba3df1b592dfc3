//! Interval histograms.

use snafu::ensure;

use crate::error::{InvalidParameter, InvalidRank, Result};

/// A histogram over contiguous value intervals.
///
/// `split_points` holds `n + 1` sorted boundaries and `heights` holds the item mass of each of the `n` intervals
/// between consecutive boundaries. Histograms are the common currency between summaries: every summary can be
/// exported as a histogram, and histograms from different summaries can be aligned onto the same boundaries and then
/// combined with [`Histogram::min`] or [`Histogram::sum`].
///
/// Once built, a histogram is never mutated. Combination operations always produce a new histogram.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Histogram {
    split_points: Vec<f64>,
    heights: Vec<u32>,
}

impl Histogram {
    /// Creates a new `Histogram` from the given boundaries and interval heights.
    ///
    /// # Errors
    ///
    /// If `split_points` does not hold exactly one more element than `heights`, if no interval is given, or if the
    /// boundaries are not finite and sorted in non-decreasing order, an error is returned.
    pub fn new(split_points: Vec<f64>, heights: Vec<u32>) -> Result<Self> {
        ensure!(
            !heights.is_empty() && split_points.len() == heights.len() + 1,
            InvalidParameter {
                name: "split_points",
                reason: format!(
                    "expected {} boundaries for {} intervals, got {}",
                    heights.len() + 1,
                    heights.len(),
                    split_points.len()
                ),
            }
        );
        ensure!(
            split_points.iter().all(|p| p.is_finite()) && split_points.windows(2).all(|w| w[0] <= w[1]),
            InvalidParameter {
                name: "split_points",
                reason: "boundaries must be finite and sorted",
            }
        );

        Ok(Self { split_points, heights })
    }

    /// Builds a histogram from parts that are already known to be well-formed.
    pub(crate) fn from_parts(split_points: Vec<f64>, heights: Vec<u32>) -> Self {
        debug_assert_eq!(split_points.len(), heights.len() + 1);
        Self { split_points, heights }
    }

    /// Returns the interval boundaries.
    pub fn split_points(&self) -> &[f64] {
        &self.split_points
    }

    /// Returns the interval heights.
    pub fn heights(&self) -> &[u32] {
        &self.heights
    }

    /// Returns the number of intervals.
    pub fn len(&self) -> usize {
        self.heights.len()
    }

    /// Returns `true` if the histogram has no intervals.
    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Returns the sum of all interval heights.
    pub fn total_height(&self) -> u64 {
        self.heights.iter().map(|h| u64::from(*h)).sum()
    }

    /// Returns the sorted union of the boundaries of `a` and `b`.
    ///
    /// Boundaries present in both histograms appear once.
    pub fn align(a: &Histogram, b: &Histogram) -> Vec<f64> {
        let (left, right) = (&a.split_points, &b.split_points);
        let mut merged = Vec::with_capacity(left.len() + right.len());
        let (mut i, mut j) = (0, 0);
        while i < left.len() || j < right.len() {
            let next = match (left.get(i), right.get(j)) {
                (Some(l), Some(r)) if l <= r => {
                    i += 1;
                    *l
                }
                (_, Some(r)) => {
                    j += 1;
                    *r
                }
                (Some(l), None) => {
                    i += 1;
                    *l
                }
                (None, None) => break,
            };
            if merged.last() != Some(&next) {
                merged.push(next);
            }
        }
        merged
    }

    /// Re-bins this histogram onto the given boundaries.
    ///
    /// The height of each source interval is spread linearly over the target intervals it overlaps, proportional to
    /// the width of the overlap. A source interval of zero width is a point mass and lands entirely in the target
    /// interval containing it. Each target height is rounded to the nearest integer (ties to even), and is raised to
    /// one if it would otherwise round to zero while some nonzero source interval contributed to it. Mass that falls
    /// outside of the target boundaries is dropped.
    ///
    /// `points` must be sorted. With fewer than two boundaries, an empty histogram is returned.
    pub fn split(&self, points: &[f64]) -> Histogram {
        if points.len() < 2 {
            return Histogram::default();
        }

        let targets = points.len() - 1;
        let mut mass = vec![0.0f64; targets];
        let mut touched = vec![false; targets];

        for (k, &height) in self.heights.iter().enumerate() {
            if height == 0 {
                continue;
            }

            let (lo, hi) = (self.split_points[k], self.split_points[k + 1]);
            let width = hi - lo;
            if width <= 0.0 {
                if lo < points[0] || lo > points[targets] {
                    continue;
                }
                let j = points.partition_point(|p| *p <= lo).saturating_sub(1).min(targets - 1);
                mass[j] += f64::from(height);
                touched[j] = true;
                continue;
            }

            let mut j = points.partition_point(|p| *p <= lo).saturating_sub(1);
            while j < targets && points[j] < hi {
                let overlap = hi.min(points[j + 1]) - lo.max(points[j]);
                if overlap > 0.0 {
                    mass[j] += f64::from(height) * overlap / width;
                    touched[j] = true;
                }
                j += 1;
            }
        }

        let heights = mass
            .iter()
            .zip(&touched)
            .map(|(m, touched)| {
                let rounded = m.round_ties_even() as u32;
                if rounded == 0 && *touched {
                    1
                } else {
                    rounded
                }
            })
            .collect();

        Histogram {
            split_points: points.to_vec(),
            heights,
        }
    }

    /// Returns the position-wise minimum of `a` and `b` after aligning both onto their common boundaries.
    ///
    /// If either histogram is empty, the result is empty.
    pub fn min(a: &Histogram, b: &Histogram) -> Histogram {
        if a.is_empty() || b.is_empty() {
            return Histogram::default();
        }
        Self::combine(a, b, u32::min)
    }

    /// Returns the position-wise sum of `a` and `b` after aligning both onto their common boundaries.
    ///
    /// If one histogram is empty, the other is returned unchanged.
    pub fn sum(a: &Histogram, b: &Histogram) -> Histogram {
        match (a.is_empty(), b.is_empty()) {
            (true, _) => b.clone(),
            (_, true) => a.clone(),
            _ => Self::combine(a, b, u32::saturating_add),
        }
    }

    fn combine<F>(a: &Histogram, b: &Histogram, op: F) -> Histogram
    where
        F: Fn(u32, u32) -> u32,
    {
        let points = Self::align(a, b);
        let left = a.split(&points);
        let right = b.split(&points);
        let heights = left.heights.iter().zip(&right.heights).map(|(l, r)| op(*l, *r)).collect();

        Histogram {
            split_points: points,
            heights,
        }
    }

    /// Returns the value at the given rank, interpolated linearly within the interval that holds it.
    ///
    /// The target item rank is `floor(rank * total_height)`. The interval selected is the first one at which the
    /// cumulative height is nonzero and reaches the target, and the result is truncated to an integer. An empty or
    /// all-zero histogram yields `0`.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, an error is returned.
    pub fn quantile(&self, rank: f64) -> Result<u32> {
        ensure!((0.0..=1.0).contains(&rank), InvalidRank { rank });

        let total = self.total_height();
        if total == 0 {
            return Ok(0);
        }

        let target = (rank * total as f64) as u64;
        let mut cumulative = 0u64;
        for (i, &height) in self.heights.iter().enumerate() {
            let lower = cumulative;
            cumulative += u64::from(height);
            if cumulative == 0 || cumulative < target {
                continue;
            }

            let fraction = (target - lower) as f64 / (cumulative - lower) as f64;
            let (lo, hi) = (self.split_points[i], self.split_points[i + 1]);
            return Ok((lo + fraction * (hi - lo)) as u32);
        }

        Ok(self.split_points.last().copied().unwrap_or_default() as u32)
    }
}
