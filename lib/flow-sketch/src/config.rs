use bytesize::ByteSize;
use serde::Deserialize;
use snafu::ensure;

use crate::error::{AggregatorError, InvalidConfiguration};

const fn default_memory_limit() -> ByteSize {
    ByteSize::kib(512)
}

const fn default_hash_num() -> usize {
    2
}

const fn default_level_fractions() -> [f64; 4] {
    [0.03, 0.60, 0.35, 0.02]
}

/// Aggregator configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AggregatorConfig {
    /// Total memory budget shared by every slot of the aggregator.
    ///
    /// Supports either a pure integer value, which is interpreted as the number of bytes, and additionally supports
    /// human-friendly values using either binary or decimal SI prefixes, such as `512 KiB`, `1.5MB`, and so on.
    ///
    /// Defaults to 512 KiB.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: ByteSize,

    /// Number of hash replicas used per level.
    ///
    /// Each replica addresses its own slot for a flow, and per-flow estimates take the minimum across replicas to
    /// reduce the impact of other flows colliding into the same slots.
    ///
    /// Defaults to 2.
    #[serde(default = "default_hash_num")]
    pub hash_num: usize,

    /// Seed for the hash functions and any randomized summaries.
    ///
    /// Defaults to 0.
    #[serde(default)]
    pub seed: u64,

    /// Fraction of the memory budget given to each level, from the counter level upwards.
    ///
    /// Defaults to `[0.03, 0.60, 0.35, 0.02]`.
    #[serde(default = "default_level_fractions")]
    pub level_fractions: [f64; 4],
}

impl AggregatorConfig {
    /// Creates a configuration with the given memory budget and default settings otherwise.
    pub fn from_memory_limit(memory_limit: ByteSize) -> Self {
        Self {
            memory_limit,
            ..Self::default()
        }
    }

    /// Sets the number of hash replicas per level.
    pub fn with_hash_num(mut self, hash_num: usize) -> Self {
        self.hash_num = hash_num;
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// If the memory budget or replica count is zero, or the level fractions are not each in `(0, 1]` and summing to
    /// at most 1, an error is returned.
    pub fn validate(&self) -> Result<(), AggregatorError> {
        ensure!(
            self.memory_limit.as_u64() > 0,
            InvalidConfiguration {
                reason: "memory limit must be nonzero",
            }
        );
        ensure!(
            self.hash_num > 0,
            InvalidConfiguration {
                reason: "hash_num must be nonzero",
            }
        );
        ensure!(
            self.level_fractions.iter().all(|f| *f > 0.0 && *f <= 1.0),
            InvalidConfiguration {
                reason: format!("level fractions {:?} must each be in (0, 1]", self.level_fractions),
            }
        );

        let total: f64 = self.level_fractions.iter().sum();
        ensure!(
            total <= 1.0 + 1e-9,
            InvalidConfiguration {
                reason: format!("level fractions sum to {}, which exceeds 1", total),
            }
        );

        Ok(())
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            memory_limit: default_memory_limit(),
            hash_num: default_hash_num(),
            seed: 0,
            level_fractions: default_level_fractions(),
        }
    }
}
