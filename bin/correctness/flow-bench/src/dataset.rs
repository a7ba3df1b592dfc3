use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use foldhash::fast::RandomState;
use rand::{rngs::SmallRng, SeedableRng as _};
use rand_distr::{Distribution as _, LogNormal, Pareto};
use snafu::{ensure, ResultExt as _, Snafu};
use tracing::{debug, warn};

use crate::config::{DatasetConfig, SyntheticConfig, TraceFormat};

/// Largest value generated for synthetic workloads.
const MAX_SYNTHETIC_VALUE: f64 = 1e9;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum DatasetError {
    #[snafu(display("Failed to read trace file '{}': {}", path.display(), source))]
    Io { path: PathBuf, source: std::io::Error },

    #[snafu(display("Trace file '{}' holds no complete {}-byte records.", path.display(), record_len))]
    EmptyTrace { path: PathBuf, record_len: usize },

    #[snafu(display("Invalid synthetic workload: {}", reason))]
    InvalidWorkload { reason: String },
}

impl TraceFormat {
    /// Size of a single record, in bytes.
    const fn record_len(&self) -> usize {
        match self {
            Self::Caida | Self::Mawi => 21,
            Self::Imc => 26,
        }
    }

    /// Converts the timestamp of `record` into ticks since `origin`, the timestamp of the first record.
    fn ticks(&self, record: &[u8], origin: &[u8]) -> u32 {
        match self {
            Self::Caida => {
                let elapsed = read_f64(record, 13) - read_f64(origin, 13);
                (elapsed * 1e7) as u32
            }
            Self::Imc => clamp_ticks((read_i64(record, 18) - read_i64(origin, 18)) / 100),
            Self::Mawi => clamp_ticks((read_i64(record, 13) - read_i64(origin, 13)).saturating_mul(100_000)),
        }
    }
}

fn read_u32(record: &[u8], at: usize) -> u32 {
    let mut buf = [0; 4];
    buf.copy_from_slice(&record[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_i64(record: &[u8], at: usize) -> i64 {
    let mut buf = [0; 8];
    buf.copy_from_slice(&record[at..at + 8]);
    i64::from_le_bytes(buf)
}

fn read_f64(record: &[u8], at: usize) -> f64 {
    let mut buf = [0; 8];
    buf.copy_from_slice(&record[at..at + 8]);
    f64::from_le_bytes(buf)
}

fn clamp_ticks(ticks: i64) -> u32 {
    u32::try_from(ticks.max(0)).unwrap_or(u32::MAX)
}

/// Parses trace records into `(key, timestamp)` pairs, with timestamps relative to the first record and offset by one.
///
/// Trailing bytes that do not form a complete record are ignored.
fn parse_trace(format: TraceFormat, raw: &[u8]) -> Vec<(u32, u32)> {
    let mut records = raw.chunks_exact(format.record_len());
    let Some(origin) = records.next() else {
        return Vec::new();
    };

    std::iter::once(origin)
        .chain(records)
        .map(|record| (read_u32(record, 0), format.ticks(record, origin).saturating_add(1)))
        .collect()
}

/// Replaces each timestamp with the time elapsed since the previous item of the same flow, and at least one.
///
/// The first item of each flow is measured from zero.
fn to_inter_arrival(items: &mut [(u32, u32)]) {
    let mut previous = HashMap::with_hasher(RandomState::default());
    for (key, value) in items.iter_mut() {
        let timestamp = *value;
        let last = previous.insert(*key, timestamp).unwrap_or(0);
        *value = timestamp.saturating_sub(last).max(1);
    }
}

/// An ordered stream of `(key, value)` items.
pub struct Dataset {
    items: Vec<(u32, u32)>,
    flows: usize,
}

impl Dataset {
    fn from_items(items: Vec<(u32, u32)>) -> Self {
        let flows = items
            .iter()
            .map(|(key, _)| *key)
            .collect::<HashSet<_, RandomState>>()
            .len();
        Self { items, flows }
    }

    /// Loads the dataset described by `config`.
    ///
    /// `seed` is only used to generate synthetic workloads.
    pub fn load(config: &DatasetConfig, seed: u64) -> Result<Self, DatasetError> {
        match config {
            DatasetConfig::Trace { format, path } => Self::from_trace(*format, path),
            DatasetConfig::Synthetic(synthetic) => Self::synthetic(synthetic, seed),
        }
    }

    fn from_trace(format: TraceFormat, path: &Path) -> Result<Self, DatasetError> {
        let raw = std::fs::read(path).context(Io { path })?;

        let record_len = format.record_len();
        ensure!(raw.len() >= record_len, EmptyTrace { path, record_len });
        if raw.len() % record_len != 0 {
            warn!(
                path = %path.display(),
                trailing_bytes = raw.len() % record_len,
                "Trace ends with an incomplete record, which will be ignored."
            );
        }

        let mut items = parse_trace(format, &raw);
        to_inter_arrival(&mut items);
        debug!(records = items.len(), "Parsed {} trace.", format.as_str());

        Ok(Self::from_items(items))
    }

    fn synthetic(config: &SyntheticConfig, seed: u64) -> Result<Self, DatasetError> {
        ensure!(
            config.flows > 0,
            InvalidWorkload {
                reason: "flows must be nonzero"
            }
        );
        let keys = Pareto::new(1.0, config.skew).map_err(|e| {
            InvalidWorkload {
                reason: format!("skew {}: {}", config.skew, e),
            }
            .build()
        })?;
        let values = LogNormal::new(config.value_mu, config.value_sigma).map_err(|e| {
            InvalidWorkload {
                reason: format!("value distribution: {}", e),
            }
            .build()
        })?;

        let mut rng = SmallRng::seed_from_u64(seed);
        let flows = u64::from(config.flows);
        let items = (0..config.items)
            .map(|_| {
                let key = (keys.sample(&mut rng) as u64 - 1) % flows;
                let value = values.sample(&mut rng).clamp(1.0, MAX_SYNTHETIC_VALUE);
                (key as u32, value as u32)
            })
            .collect();

        Ok(Self::from_items(items))
    }

    pub fn items(&self) -> &[(u32, u32)] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns the number of distinct flows.
    pub fn flows(&self) -> usize {
        self.flows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caida_record(key: u32, seconds: f64) -> Vec<u8> {
        let mut record = vec![0; 21];
        record[0..4].copy_from_slice(&key.to_le_bytes());
        record[13..21].copy_from_slice(&seconds.to_le_bytes());
        record
    }

    fn imc_record(key: u32, ticks: i64) -> Vec<u8> {
        let mut record = vec![0; 26];
        record[0..4].copy_from_slice(&key.to_le_bytes());
        record[18..26].copy_from_slice(&ticks.to_le_bytes());
        record
    }

    fn mawi_record(key: u32, seconds: i64) -> Vec<u8> {
        let mut record = vec![0; 21];
        record[0..4].copy_from_slice(&key.to_le_bytes());
        record[13..21].copy_from_slice(&seconds.to_le_bytes());
        record
    }

    #[test]
    fn parse_caida() {
        let mut raw = caida_record(1, 100.0);
        raw.extend(caida_record(2, 100.5));
        raw.extend(caida_record(1, 101.0));
        raw.extend([0xFF; 7]);

        let items = parse_trace(TraceFormat::Caida, &raw);
        assert_eq!(items, vec![(1, 1), (2, 5_000_001), (1, 10_000_001)]);
    }

    #[test]
    fn parse_imc_and_mawi() {
        let mut raw = imc_record(9, 1_000);
        raw.extend(imc_record(9, 1_450));
        assert_eq!(parse_trace(TraceFormat::Imc, &raw), vec![(9, 1), (9, 5)]);

        let mut raw = mawi_record(3, 50);
        raw.extend(mawi_record(4, 52));
        assert_eq!(parse_trace(TraceFormat::Mawi, &raw), vec![(3, 1), (4, 200_001)]);
    }

    #[test]
    fn parse_empty_trace() {
        assert!(parse_trace(TraceFormat::Imc, &[0; 25]).is_empty());
    }

    #[test]
    fn inter_arrival_per_flow() {
        let mut items = vec![(1, 1), (2, 5), (1, 8), (1, 8), (2, 20)];
        to_inter_arrival(&mut items);
        assert_eq!(items, vec![(1, 1), (2, 5), (1, 7), (1, 1), (2, 15)]);
    }

    #[test]
    fn synthetic_is_deterministic() {
        let config = SyntheticConfig {
            flows: 50,
            items: 2_000,
            skew: 1.1,
            value_mu: 5.0,
            value_sigma: 1.0,
        };

        let a = Dataset::synthetic(&config, 3).unwrap();
        let b = Dataset::synthetic(&config, 3).unwrap();
        assert_eq!(a.items(), b.items());
        assert_eq!(a.len(), 2_000);
        assert!(a.flows() <= 50);
        assert!(a.items().iter().all(|(key, value)| *key < 50 && *value >= 1));
    }

    #[test]
    fn synthetic_rejects_bad_parameters() {
        let mut config = SyntheticConfig {
            flows: 0,
            items: 10,
            skew: 1.1,
            value_mu: 5.0,
            value_sigma: 1.0,
        };
        assert!(matches!(
            Dataset::synthetic(&config, 0),
            Err(DatasetError::InvalidWorkload { .. })
        ));

        config.flows = 10;
        config.skew = -1.0;
        assert!(matches!(
            Dataset::synthetic(&config, 0),
            Err(DatasetError::InvalidWorkload { .. })
        ));
    }
}
