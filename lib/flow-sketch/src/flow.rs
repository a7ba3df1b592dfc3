use std::fmt;

use crate::error::AggregatorError;

/// Size class of a flow.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FlowType {
    /// At most 3 values.
    Tiny,

    /// At most 255 values.
    Mid,

    /// More than 255 values.
    Huge,
}

impl FlowType {
    /// Classifies a flow by the number of values it holds.
    pub fn from_count(count: u64) -> Self {
        match count {
            0..=3 => Self::Tiny,
            4..=255 => Self::Mid,
            _ => Self::Huge,
        }
    }

    /// Returns the name of the size class.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Mid => "mid",
            Self::Huge => "huge",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded-memory estimator of per-flow quantiles.
pub trait FlowQuantileEstimator {
    /// Records `value` for the flow `key`.
    ///
    /// # Errors
    ///
    /// If the value cannot be recorded, an error is returned.
    fn append(&mut self, key: u32, value: u32) -> Result<(), AggregatorError>;

    /// Returns the estimated value at the given rank for the flow `key`.
    ///
    /// # Errors
    ///
    /// If `rank` is not in `[0, 1]`, or no estimate can be produced for the flow, an error is returned.
    fn quantile(&self, key: u32, rank: f64) -> Result<u32, AggregatorError>;

    /// Returns the nominal memory footprint of the estimator, in bytes.
    fn memory_bytes(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_count() {
        assert_eq!(FlowType::from_count(1), FlowType::Tiny);
        assert_eq!(FlowType::from_count(3), FlowType::Tiny);
        assert_eq!(FlowType::from_count(4), FlowType::Mid);
        assert_eq!(FlowType::from_count(255), FlowType::Mid);
        assert_eq!(FlowType::from_count(256), FlowType::Huge);
    }
}
