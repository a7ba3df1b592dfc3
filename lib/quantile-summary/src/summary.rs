use std::fmt;

use serde::Deserialize;

use crate::{error::Result, histogram::Histogram};

/// Quantile summary algorithm.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// Logarithmically-spaced counting buckets, with a relative-error guarantee.
    #[serde(alias = "dd")]
    LogBucket,

    /// A cascade of randomized compactors with doubling weights.
    #[serde(alias = "mreq")]
    CompactorCascade,

    /// A bounded set of weighted centroids, sized by an arcsine scale function.
    #[serde(alias = "tdigest")]
    AdaptiveCentroid,
}

impl SummaryKind {
    /// Returns the human-readable name of the summary algorithm.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LogBucket => "log_bucket",
            Self::CompactorCascade => "compactor_cascade",
            Self::AdaptiveCentroid => "adaptive_centroid",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning parameters for constructing a summary.
///
/// Every summary reads `capacity`, and then only the parameters relevant to its own algorithm: `alpha` for
/// [`LogBucketSketch`][crate::LogBucketSketch], `compactor_capacity` for
/// [`CompactorCascadeSketch`][crate::CompactorCascadeSketch], and `delta` for
/// [`AdaptiveCentroidSketch`][crate::AdaptiveCentroidSketch].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryTuning {
    /// Maximum count the summary tracks before reporting itself as full.
    pub capacity: u32,

    /// Relative accuracy of logarithmic buckets.
    pub alpha: f64,

    /// Number of items each compactor holds.
    pub compactor_capacity: u32,

    /// Maximum number of centroids.
    pub delta: usize,
}

/// A bounded-memory quantile summary over positive integer values.
///
/// Summaries are interchangeable behind this trait: they accept values until full, answer quantile queries directly,
/// and can be exported as a [`Histogram`] so that estimates from different summaries can be combined.
pub trait QuantileSummary: Clone + fmt::Debug + Sized {
    /// The algorithm this summary implements.
    const KIND: SummaryKind;

    /// Creates an empty summary from the given tuning parameters.
    ///
    /// `seed` drives any randomized decisions the summary makes, so that two summaries created with the same seed and
    /// fed the same values end up identical.
    ///
    /// # Errors
    ///
    /// If the tuning parameters are invalid for this algorithm, an error is returned.
    fn with_tuning(tuning: &SummaryTuning, seed: u64) -> Result<Self>;

    /// Adds a value to the summary.
    ///
    /// # Errors
    ///
    /// If the summary cannot accept the value because it is full, an error is returned.
    fn append(&mut self, value: u32) -> Result<()>;

    /// Returns `true` if the summary has reached its capacity.
    fn is_full(&self) -> bool;

    /// Returns the number of values added to the summary.
    fn size(&self) -> u64;

    /// Returns `true` if no values have been added.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the nominal memory footprint of the summary, in bytes.
    ///
    /// This is the compact footprint of the summary's state, used for dividing a memory budget into slots, rather than
    /// the size of the in-process representation.
    fn memory_bytes(&self) -> u32;

    /// Returns the estimated value at the given rank.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, or the summary is empty, an error is returned.
    fn quantile(&self, rank: f64) -> Result<u32>;

    /// Exports the summary as a histogram whose total height equals [`size`][QuantileSummary::size].
    ///
    /// # Errors
    ///
    /// If the summary is empty, an error is returned.
    fn to_histogram(&self) -> Result<Histogram>;
}

/// Returns the number of bits needed to count up to `capacity`.
pub(crate) fn counter_bits(capacity: u32) -> u32 {
    u32::BITS - capacity.leading_zeros()
}
