use snafu::Snafu;

/// A quantile summary error.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum SummaryError {
    /// Requested rank was outside of `[0, 1]`.
    #[snafu(display("Rank {} is outside of the valid range [0, 1].", rank))]
    InvalidRank {
        /// The rank that was requested.
        rank: f64,
    },

    /// A construction parameter or argument was invalid.
    #[snafu(display("Invalid value for '{}': {}", name, reason))]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,

        /// Why the value was rejected.
        reason: String,
    },

    /// The summary cannot accept any more items.
    #[snafu(display("{} is at capacity and cannot accept more items.", summary))]
    CapacityExceeded {
        /// Name of the summary that rejected the item.
        summary: &'static str,
    },

    /// An internal operation was invoked while its precondition did not hold.
    #[snafu(display("Logic error: {}", reason))]
    Logic {
        /// Description of the violated precondition.
        reason: &'static str,
    },

    /// The operation requires at least one item to have been added.
    #[snafu(display("{} is empty.", summary))]
    EmptyState {
        /// Name of the empty summary or view.
        summary: &'static str,
    },

    /// An element index was out of bounds.
    #[snafu(display("Index {} is out of bounds (length {}).", index, len))]
    NotFound {
        /// The requested index.
        index: usize,

        /// Number of elements present.
        len: usize,
    },
}

/// Result type for quantile summary operations.
pub type Result<T, E = SummaryError> = std::result::Result<T, E>;
