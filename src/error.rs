//! Error types for the crawl pipeline.
//!
//! Errors are split by the level they belong to. Per-item errors
//! ([`FetchError`]) are contained by the work pool and never end a run;
//! stage- and run-level errors ([`PipelineError`], [`OutputError`],
//! [`RunError`]) end it. [`SnapshotError`] only ever forces a full re-crawl.

use crate::models::Stage;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Whether a failed request is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection failures, timeouts, HTTP 429 and 5xx.
    Transient,
    /// Everything else: other 4xx, redirect loops, malformed URLs.
    Permanent,
}

/// Failure to download one page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("too many redirects for {url}")]
    TooManyRedirects { url: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: usize,
        last: Box<FetchError>,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout { .. }
            | FetchError::Connect { .. }
            | FetchError::Request { .. } => FetchErrorKind::Transient,
            FetchError::Status { status, .. } => classify_status(*status),
            FetchError::InvalidUrl { .. }
            | FetchError::TooManyRedirects { .. }
            | FetchError::Exhausted { .. }
            | FetchError::Client(_) => FetchErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FetchErrorKind::Transient
    }
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: u16) -> FetchErrorKind {
    match status {
        429 | 500..=599 => FetchErrorKind::Transient,
        _ => FetchErrorKind::Permanent,
    }
}

/// Stage-level failures that end a crawl.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `stage` ran over `inputs` pages and found nothing at the `output` level.
    #[error("{stage} stage produced no {output} output from {inputs} input(s)")]
    EmptyStage {
        stage: Stage,
        output: Stage,
        inputs: usize,
    },
    /// Items were left in the backlog without cancellation, e.g. because no
    /// worker could build its HTTP client.
    #[error("{stage} stage left {unprocessed} of {inputs} input(s) unfetched")]
    Stalled {
        stage: Stage,
        inputs: usize,
        unprocessed: usize,
    },
    #[error("crawl cancelled during {stage} stage")]
    Cancelled { stage: Stage },
    #[error("invalid site profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },
}

/// Reasons a checkpoint snapshot cannot be used.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no snapshot at {0}")]
    Missing(PathBuf),
    #[error("snapshot {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("snapshot {path} holds {found} record(s), below the minimum of {min}")]
    TooSmall {
        path: PathBuf,
        found: usize,
        min: usize,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure to write the output table.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode table: {0}")]
    Csv(#[from] csv::Error),
}

/// Run-level failure reported by the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl RunError {
    /// An empty stage is an abort; everything else is a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, RunError::Pipeline(PipelineError::EmptyStage { .. }))
    }
}
