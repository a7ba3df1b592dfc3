use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context as _, Error};
use bytesize::ByteSize;
use clap::{ArgAction, Parser};
use flow_sketch::AggregatorConfig;
use quantile_summary::SummaryKind;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Enable verbose output. (Specify twice for more verbosity.)
    #[arg(short = 'v', long, action = ArgAction::Count, default_value_t = 0)]
    verbose: u8,

    /// Path to the benchmark configuration file.
    pub config: PathBuf,

    /// Number of times to repeat the run, overriding the configuration file.
    #[arg(long)]
    pub repeat: Option<u32>,

    /// Seed for hash functions and workload generation, overriding the configuration file.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Cli {
    /// Gets the configured log level based on the user-supplied verbosity level.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

/// Binary layout of a packet trace.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// 21-byte records with a floating-point timestamp in seconds.
    Caida,

    /// 26-byte records with an integer timestamp.
    Imc,

    /// 21-byte records with an integer timestamp.
    #[serde(alias = "MAWI")]
    Mawi,
}

impl TraceFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Caida => "caida",
            Self::Imc => "imc",
            Self::Mawi => "mawi",
        }
    }
}

const fn default_flows() -> u32 {
    10_000
}

const fn default_items() -> usize {
    1_000_000
}

const fn default_skew() -> f64 {
    1.1
}

const fn default_value_mu() -> f64 {
    7.0
}

const fn default_value_sigma() -> f64 {
    2.0
}

/// Synthetic workload parameters.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SyntheticConfig {
    /// Number of distinct flows.
    #[serde(default = "default_flows")]
    pub flows: u32,

    /// Total number of items.
    #[serde(default = "default_items")]
    pub items: usize,

    /// Shape of the Pareto distribution flow keys are drawn from. Smaller is more skewed.
    #[serde(default = "default_skew")]
    pub skew: f64,

    /// Mean of the logarithm of values.
    #[serde(default = "default_value_mu")]
    pub value_mu: f64,

    /// Standard deviation of the logarithm of values.
    #[serde(default = "default_value_sigma")]
    pub value_sigma: f64,
}

/// Source of the items fed to the estimators.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetConfig {
    /// A packet trace on disk, converted to per-flow inter-arrival times.
    Trace {
        /// Binary layout of the trace.
        format: TraceFormat,

        /// Path to the trace file.
        path: PathBuf,
    },

    /// A generated workload.
    Synthetic(SyntheticConfig),
}

impl DatasetConfig {
    /// Returns a short name for the dataset, suitable for file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trace { format, .. } => format.as_str(),
            Self::Synthetic(_) => "synthetic",
        }
    }
}

impl fmt::Display for DatasetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace { format, path } => write!(f, "{} trace at {}", format.as_str(), path.display()),
            Self::Synthetic(config) => write!(
                f,
                "synthetic ({} flows, {} items, skew {})",
                config.flows, config.items, config.skew
            ),
        }
    }
}

const fn default_hash_num() -> usize {
    2
}

const fn default_repeat() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct BenchConfig {
    /// Total memory budget given to each estimator.
    pub memory_limit: ByteSize,

    /// Number of hash replicas per level of the multi-level aggregator.
    ///
    /// Defaults to 2.
    #[serde(default = "default_hash_num")]
    pub hash_num: usize,

    /// Number of times to repeat the run. Metrics are averaged over all runs.
    ///
    /// Defaults to 1.
    #[serde(default = "default_repeat")]
    pub repeat: u32,

    /// Seed for hash functions and workload generation.
    ///
    /// Defaults to 0.
    #[serde(default)]
    pub seed: u64,

    /// Summary algorithm backing both aggregators.
    pub summary: SummaryKind,

    /// Items to feed.
    pub dataset: DatasetConfig,

    /// File the report is appended to.
    ///
    /// Defaults to `res_<summary>_<dataset>.txt` in the current directory.
    #[serde(default)]
    report_path: Option<PathBuf>,
}

impl BenchConfig {
    pub fn try_from_file<P>(config_path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let config_path = config_path.as_ref();
        let config_file_raw = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read configuration file '{}'.", config_path.display()))?;
        let config: Self = serde_yaml::from_str(&config_file_raw).context("Failed to parse configuration file.")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        ensure!(self.repeat > 0, "repeat must be nonzero");
        self.aggregator_config()
            .validate()
            .context("Invalid aggregator settings.")?;
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig::from_memory_limit(self.memory_limit)
            .with_hash_num(self.hash_num)
            .with_seed(self.seed)
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("res_{}_{}.txt", self.summary.as_str(), self.dataset.name()))
        })
    }
}
