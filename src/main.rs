//! # catalog_crawl
//!
//! Walks catalog-style car specification sites level by level (index → brand
//! → model → generation → variant → detail page), harvests one flat record per
//! detail page, and writes all of them as one normalized CSV table.
//!
//! ## Features
//!
//! - Ships profiles for auto-data.net, cars-directory.net and thecarspec.net
//! - Bounded worker pool with one HTTP client per worker
//! - Retries transient failures with capped exponential backoff and jitter
//! - Reuses the previous run's checkpoint snapshot instead of re-crawling
//! - Graceful Ctrl-C: in-flight requests finish, nothing half-written is left
//!
//! ## Usage
//!
//! ```sh
//! catalog_crawl --site cars-directory -o ./out/cars-directory.csv
//! ```
//!
//! ## Exit codes
//!
//! - `0`: the table was written
//! - `2`: a stage produced no output and the crawl was aborted
//! - `1`: any other failure (configuration, HTTP client, cancellation, output)

use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod checkpoint;
mod cli;
mod config;
mod error;
mod extract;
mod fetch;
mod models;
mod outputs;
mod pipeline;
mod pool;
mod runner;
mod scrapers;
#[cfg(test)]
mod testing;
mod utils;

use cli::Cli;
use config::CrawlConfig;
use error::RunError;

/// Process exit code for a finished run.
fn exit_code(result: &Result<runner::RunReport, RunError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) if e.is_abort() => 2,
        Err(_) => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("catalog_crawl starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = match CrawlConfig::resolve(&args) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(1);
        }
    };

    // --- Ctrl-C → cooperative cancellation ---
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight requests");
            on_signal.cancel();
        }
    });

    let result = runner::run(&config, config.connector(), cancel).await;
    match &result {
        Ok(report) => info!(
            source = ?report.source,
            records = report.records,
            columns = report.columns,
            output = %report.output.display(),
            elapsed_secs = start_time.elapsed().as_secs(),
            "catalog_crawl finished"
        ),
        Err(e) => error!(
            error = %e,
            elapsed_secs = start_time.elapsed().as_secs(),
            "catalog_crawl failed"
        ),
    }
    ExitCode::from(exit_code(&result))
}
