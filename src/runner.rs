//! The single run mode.
//!
//! A run either reuses a valid checkpoint snapshot or crawls the site, then
//! always ends by writing the normalized table:
//!
//! ```text
//! load snapshot ──ok──────────────────────────────┐
//!      │                                          ▼
//!      └─miss/invalid─▶ crawl ─▶ save snapshot ─▶ write table
//! ```
//!
//! A crawl that aborts or fails writes neither a snapshot nor a table.

use crate::checkpoint::CheckpointStore;
use crate::config::CrawlConfig;
use crate::error::{RunError, SnapshotError};
use crate::fetch::Connector;
use crate::outputs::table::normalize_and_write;
use crate::pipeline::Pipeline;
use crate::pool::WorkPool;
use crate::utils::ensure_writable_parent;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Where the records of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    Snapshot,
    Crawl,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub source: RecordSource,
    pub records: usize,
    pub columns: usize,
    pub output: PathBuf,
}

/// Execute one run with `config`, fetching through `connector`.
///
/// # Arguments
///
/// * `config` - Resolved settings
/// * `connector` - Builds one transport per crawl worker
/// * `cancel` - Stops the crawl between items when triggered
///
/// # Returns
///
/// A [`RunReport`] once the table is written, or the [`RunError`] that ended
/// the run.
#[instrument(level = "info", skip_all, fields(site = %config.site))]
pub async fn run<C: Connector>(
    config: &CrawlConfig,
    connector: C,
    cancel: CancellationToken,
) -> Result<RunReport, RunError> {
    let t0 = Instant::now();
    let profile = config.profile()?;
    let priority = profile.priority_fields;
    let output = config.output_path();

    if let Err(e) = ensure_writable_parent(&output).await {
        return Err(RunError::Config(format!(
            "output directory for {} is not writable: {e}",
            output.display()
        )));
    }

    let store = CheckpointStore::new(
        config.snapshot_path(),
        profile.name,
        config.min_snapshot_records,
    );

    let (source, records) = match store.load().await {
        Ok(records) => {
            info!(records = records.len(), "reusing snapshot; skipping crawl");
            (RecordSource::Snapshot, records)
        }
        Err(e) => {
            match &e {
                SnapshotError::Missing(_) => info!("no snapshot; crawling"),
                other => warn!(error = %other, "snapshot unusable; crawling"),
            }
            let pool = WorkPool::new(config.worker_count).with_cancellation(cancel);
            let mut pipeline = Pipeline::new(profile, connector, pool, config.retry_policy())
                .with_options(config.pipeline_options());
            let records = match pipeline.run().await {
                Ok(records) => records,
                Err(e) => {
                    error!(state = ?pipeline.state(), error = %e, "crawl did not complete");
                    return Err(e.into());
                }
            };

            if let Err(e) = store.save(&records).await {
                warn!(path = %store.path().display(), error = %e, "failed to save snapshot; continuing");
            }
            (RecordSource::Crawl, records)
        }
    };

    let table = normalize_and_write(&records, priority, &output).await?;
    info!(
        records = records.len(),
        columns = table.columns.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "run complete"
    );

    Ok(RunReport {
        source,
        records: records.len(),
        columns: table.columns.len(),
        output,
    })
}
