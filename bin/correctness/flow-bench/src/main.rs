//! A correctness and throughput harness for the per-flow quantile estimators.
//!
//! Loads a packet trace or generates a synthetic skewed workload, feeds it to both bounded-memory aggregators and to
//! an exact reference, and reports estimation error and throughput averaged over repeated runs.

#![deny(warnings)]
#![deny(missing_docs)]

use anyhow::Error;
use clap::Parser as _;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
use self::config::{BenchConfig, Cli};

mod dataset;
use self::dataset::Dataset;

mod report;
use self::report::Report;

mod runner;
use self::runner::Runner;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.log_level().into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .with_target(true)
        .init();

    match run(cli) {
        Ok(()) => info!("flow-bench stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    info!("flow-bench starting...");

    let mut config = BenchConfig::try_from_file(&cli.config)?;
    if let Some(repeat) = cli.repeat {
        config.repeat = repeat;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    config.validate()?;

    let dataset = Dataset::load(&config.dataset, config.seed)?;
    info!(
        items = dataset.len(),
        flows = dataset.flows(),
        source = %config.dataset,
        "Loaded dataset."
    );

    let metrics = Runner::new(&config).run(&dataset)?;
    let report = Report::new(&config, metrics);
    report.log();
    let report_path = config.report_path();
    report.append_to(&report_path)?;

    info!(path = %report_path.display(), "Report written.");
    Ok(())
}
