use quantile_summary::SummaryError;
use snafu::Snafu;

/// A per-flow aggregation error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum AggregatorError {
    /// Every addressed slot on every level is saturated for the flow.
    #[snafu(display("No level can accept or answer for flow {}: every addressed slot is saturated.", key))]
    FatalCapacity {
        /// Flow key.
        key: u32,
    },

    /// The flow is only tracked at a level that cannot produce a histogram.
    #[snafu(display("Flow {} is only tracked at level {}, which cannot produce a histogram.", key, level))]
    NotSupported {
        /// Flow key.
        key: u32,

        /// Level the flow was resolved to.
        level: usize,
    },

    /// The flow has never been observed.
    #[snafu(display("Flow {} has not been observed.", key))]
    UnknownKey {
        /// Flow key.
        key: u32,
    },

    /// Requested rank was outside of `[0, 1]`.
    #[snafu(display("Rank {} is outside of the valid range [0, 1].", rank))]
    InvalidRank {
        /// The rank that was requested.
        rank: f64,
    },

    /// The memory budget is too small to allocate a single slot at some level.
    #[snafu(display("Memory budget of {} bytes leaves no slots at level {}.", budget_bytes, level))]
    InsufficientMemory {
        /// Level that could not be allocated.
        level: usize,

        /// Total memory budget, in bytes.
        budget_bytes: u64,
    },

    /// The aggregator configuration is invalid.
    #[snafu(display("Invalid aggregator configuration: {}", reason))]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// An operation on an underlying summary failed.
    #[snafu(display("Summary operation failed: {}", source))]
    Summary {
        /// The underlying error.
        source: SummaryError,
    },
}
