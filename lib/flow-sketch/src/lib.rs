//! Per-flow quantile estimation under a fixed memory budget.
//!
//! A stream of `(key, value)` pairs is split into flows by key, and each estimator answers quantile queries about the
//! values of a single flow. Two bounded-memory estimators are provided, generic over the summary algorithm from
//! [`quantile_summary`] that backs them:
//!
//! - [`MultiLevelAggregator`]: a hierarchy of hashed levels of increasing summary size, where flows are escalated to
//!   the next level as lower levels saturate.
//! - [`FlatHashedAggregator`]: a few hash tables of full-size summaries, with a shared fallback summary for flows that
//!   could not claim a slot.
//!
//! [`ExactDistribution`] keeps every value and serves as the reference the estimators are measured against.
#![deny(missing_docs)]

mod config;
pub use self::config::AggregatorConfig;

mod error;
pub use self::error::AggregatorError;

mod exact;
pub use self::exact::ExactDistribution;

mod flat;
pub use self::flat::FlatHashedAggregator;

mod flow;
pub use self::flow::{FlowQuantileEstimator, FlowType};

mod hash;
pub use self::hash::HashFn;

mod multi_level;
pub use self::multi_level::{MultiLevelAggregator, LEVELS};
