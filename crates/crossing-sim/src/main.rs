//! crossing-sim: drive crossers from both sides of a shared channel.

mod config;
mod driver;
mod logging;

use std::process;

use config::{ArgsError, RuntimeKind, SimConfig, USAGE};
use driver::SimReport;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let config = match SimConfig::from_args(&args) {
        Ok(config) => config,
        Err(ArgsError::Help) => {
            println!("{USAGE}");
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!();
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    logging::init_tracing();

    if let Err(e) = run(&config) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(config: &SimConfig) -> anyhow::Result<()> {
    tracing::info!(
        crossers = config.crossers,
        capacity = config.capacity,
        runtime = ?config.runtime,
        "Starting crossing simulation"
    );

    let report = match config.runtime {
        RuntimeKind::Threads => driver::run_threads(config)?,
        RuntimeKind::Tasks => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(driver::run_tasks(config))?,
    };

    summarize(&report);

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn summarize(report: &SimReport) {
    let stats = &report.arbiter.stats;
    tracing::info!(
        east = stats.admitted_east,
        west = stats.admitted_west,
        reversals = stats.reversals,
        gave_up = report.gave_up(),
        peak = stats.peak_occupancy,
        "Simulation finished"
    );
}
