//! Bounded-memory quantile summaries over positive integer values.
//!
//! This crate provides three interchangeable summary algorithms behind the [`QuantileSummary`] trait, plus the
//! building blocks they share:
//!
//! - [`LogBucketSketch`]: logarithmically-spaced counters with a relative-error guarantee.
//! - [`CompactorCascadeSketch`]: a cascade of randomized compactors with doubling weights.
//! - [`AdaptiveCentroidSketch`]: a bounded set of centroids sized by an arcsine scale function.
//! - [`SaturatingCounter`]: four packed 2-bit counters, for flows too small to need a summary.
//! - [`Histogram`]: an interval histogram that every summary can be exported to, with operations for combining
//!   histograms from several summaries.
//! - [`SortedView`] and [`CumulativeView`]: weighted order statistics over raw samples.
//!
//! # Example
//!
//! ```
//! use quantile_summary::{LogBucketSketch, QuantileSummary as _};
//!
//! let mut sketch = LogBucketSketch::new(0.5, 255).unwrap();
//! for _ in 0..10 {
//!     sketch.append(1000).unwrap();
//! }
//!
//! let median = sketch.quantile(0.5).unwrap();
//! assert!((500..=1500).contains(&median));
//! ```
#![deny(missing_docs)]

mod centroid;
pub use self::centroid::{AdaptiveCentroidSketch, Centroid};

mod compactor;
pub use self::compactor::{Compactor, CompactorCascadeSketch};

mod counter;
pub use self::counter::{SaturatingCounter, SubSlot};

mod error;
pub use self::error::{Result, SummaryError};

mod histogram;
pub use self::histogram::Histogram;

mod log_bucket;
pub use self::log_bucket::LogBucketSketch;

mod sorted_view;
pub use self::sorted_view::{CumulativeView, SortedView};

mod summary;
pub use self::summary::{QuantileSummary, SummaryKind, SummaryTuning};
