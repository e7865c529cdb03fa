mod collector;
mod config;
mod database;
mod report;
mod runner;

use crate::{
    config::{Args, BenchmarkConfig},
    database::postgres::PostgresConnection,
    runner::BenchmarkRunner,
};
use clap::Parser;
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match BenchmarkConfig::load(Args::parse()) {
        Ok(config) => config,
        Err(error) => {
            error!(error = ?error, "Failed to load configuration: {error}");
            exit(1)
        }
    };

    if config.preflight_checks() {
        error!("Preflight checks failed, see above");
        exit(1)
    }

    // validated by the preflight checks
    let glob = config.compile_glob().unwrap_or_log();

    let connection = match PostgresConnection::load(&config.database) {
        Ok(connection) => connection,
        Err(error) => {
            error!(error = ?error, "Failed to connect to {}:{}: {error}", config.database.host, config.database.port);
            exit(2)
        }
    };

    let runner = match BenchmarkRunner::new(connection) {
        Ok(runner) => runner,
        Err(error) => {
            error!(error = ?error, "Failed to prepare metrics table: {error}");
            exit(2)
        }
    };

    info!(
        input = ?config.input,
        output = ?config.output,
        "Starting large object benchmark"
    );

    let report = runner::run(runner, &config, glob.as_ref());

    print!("{report}");
}
