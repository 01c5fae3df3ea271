//! Record normalization and CSV output.
//!
//! Records from different pages rarely share the same fields. [`normalize`]
//! builds one column set for all of them: priority columns first (only those
//! some record actually has), then every other field in the order it was first
//! seen. Cells for absent fields are empty strings.
//!
//! The CSV is rendered fully in memory, written to a sibling `.partial` file,
//! and renamed over the target. A failed run never leaves a half-written table.

use crate::error::OutputError;
use crate::models::Record;
use crate::utils::staging_path;
use csv::{QuoteStyle, WriterBuilder};
use indexmap::IndexSet;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// A rectangular view over a record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Render as CSV: header row, every field quoted, `,` delimited.
    pub fn to_csv(&self) -> Result<Vec<u8>, OutputError> {
        let mut writer = WriterBuilder::new()
            .delimiter(b',')
            .quote_style(QuoteStyle::Always)
            .from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| OutputError::Csv(e.into_error().into()))
    }
}

/// Build the unified table for `records`.
pub fn normalize(records: &[Record], priority: &[&str]) -> Table {
    let universe: IndexSet<&str> = records.iter().flat_map(Record::names).collect();

    let mut columns: Vec<String> = priority
        .iter()
        .filter(|name| universe.contains(*name))
        .map(|name| name.to_string())
        .collect();
    columns.extend(
        universe
            .iter()
            .filter(|name| !priority.contains(*name))
            .map(|name| name.to_string()),
    );

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| record.get(c).unwrap_or_default().to_string())
                .collect()
        })
        .collect();

    Table { columns, rows }
}

/// Normalize `records` and write them to `path` as CSV.
///
/// # Arguments
///
/// * `records` - The harvested records, in output row order
/// * `priority` - Columns to place first when present
/// * `path` - Destination file; replaced atomically
///
/// # Returns
///
/// The table that was written.
#[instrument(level = "info", skip(records, priority), fields(path = %path.display(), records = records.len()))]
pub async fn normalize_and_write(
    records: &[Record],
    priority: &[&str],
    path: &Path,
) -> Result<Table, OutputError> {
    let table = normalize(records, priority);
    let bytes = table.to_csv()?;

    let staging = staging_path(path);
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Err(e) = fs::write(&staging, &bytes).await {
        error!(path = %staging.display(), error = %e, "Failed to write table");
        return Err(io_err(e));
    }
    fs::rename(&staging, path).await.map_err(io_err)?;

    info!(
        columns = table.columns.len(),
        rows = table.rows.len(),
        bytes = bytes.len(),
        "Wrote table"
    );
    Ok(table)
}
