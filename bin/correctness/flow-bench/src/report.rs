use std::{fmt, fs::OpenOptions, io::Write as _, path::Path};

use anyhow::{Context as _, Error};
use bytesize::ByteSize;
use quantile_summary::SummaryKind;
use tracing::info;

use crate::{
    config::BenchConfig,
    runner::{Metrics, ModelMetrics},
};

/// The parameters and averaged metrics of a benchmark run.
pub struct Report {
    memory_limit: ByteSize,
    summary: SummaryKind,
    dataset: String,
    hash_num: usize,
    repeat: u32,
    seed: u64,
    metrics: Metrics,
}

impl Report {
    pub fn new(config: &BenchConfig, metrics: Metrics) -> Self {
        Self {
            memory_limit: config.memory_limit,
            summary: config.summary,
            dataset: config.dataset.to_string(),
            hash_num: config.hash_num,
            repeat: config.repeat,
            seed: config.seed,
            metrics,
        }
    }

    pub fn log(&self) {
        let models = [
            ("multi-level", &self.metrics.multi_level),
            ("flat", &self.metrics.flat),
        ];
        for (model, metrics) in models {
            info!(
                model,
                summary = %self.summary,
                ale = metrics.ale,
                ape = metrics.ape,
                append_mops = metrics.append_mops,
                query_mops = metrics.query_mops,
                "Averaged metrics over {} run(s).",
                self.repeat
            );
        }
    }

    /// Appends the report to the file at `path`, creating it if it does not exist.
    pub fn append_to(&self, path: &Path) -> Result<(), Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open report file '{}'.", path.display()))?;
        write!(file, "{}", self).with_context(|| format!("Failed to write report file '{}'.", path.display()))?;

        Ok(())
    }
}

fn write_model(f: &mut fmt::Formatter<'_>, name: &str, metrics: &ModelMetrics) -> fmt::Result {
    writeln!(f, "ALE of {}: {}", name, metrics.ale)?;
    writeln!(f, "APE of {}: {}", name, metrics.ape)?;
    writeln!(f, "AppendTp of {}: {} Mops", name, metrics.append_mops)?;
    writeln!(f, "QueryTp of {}: {} Mops", name, metrics.query_mops)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "memory: {}", self.memory_limit)?;
        writeln!(f, "summary: {}", self.summary)?;
        writeln!(f, "dataset: {}", self.dataset)?;
        writeln!(f, "hash_num: {}", self.hash_num)?;
        writeln!(f, "repeat: {}", self.repeat)?;
        writeln!(f, "seed: {}", self.seed)?;
        writeln!(f)?;

        write_model(f, "M4", &self.metrics.multi_level)?;
        write_model(f, "Strawman", &self.metrics.flat)?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::config::{DatasetConfig, TraceFormat};

    use super::*;

    #[test]
    fn report_lists_parameters_and_metrics() {
        let report = Report {
            memory_limit: ByteSize::kib(500),
            summary: SummaryKind::CompactorCascade,
            dataset: DatasetConfig::Trace {
                format: TraceFormat::Caida,
                path: PathBuf::from("caida.dat"),
            }
            .to_string(),
            hash_num: 2,
            repeat: 3,
            seed: 0,
            metrics: Metrics {
                multi_level: ModelMetrics {
                    ale: 0.25,
                    ape: 0.125,
                    append_mops: 12.5,
                    query_mops: 2.0,
                },
                flat: ModelMetrics::default(),
            },
        };

        let rendered = report.to_string();
        assert!(rendered.contains("summary: compactor_cascade\n"));
        assert!(rendered.contains("dataset: caida trace at caida.dat\n"));
        assert!(rendered.contains("repeat: 3\n"));
        assert!(rendered.contains("ALE of M4: 0.25\n"));
        assert!(rendered.contains("APE of M4: 0.125\n"));
        assert!(rendered.contains("AppendTp of M4: 12.5 Mops\n"));
        assert!(rendered.contains("QueryTp of Strawman: 0 Mops\n"));
        assert!(rendered.ends_with("\n\n"));
    }
}
