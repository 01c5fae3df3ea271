//! Checkpoint store for the final record set.
//!
//! A completed crawl saves its records as a versioned JSON envelope:
//!
//! ```json
//! {
//!   "format": "catalog-crawl-snapshot",
//!   "version": 1,
//!   "site": "auto-data",
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "record_count": 2,
//!   "checksum": "<blake3 hex of the serialized records>",
//!   "records": [ { "Brand": "Audi", ... }, ... ]
//! }
//! ```
//!
//! The next run loads it instead of crawling. A snapshot that fails to decode,
//! fails its checksum, or holds fewer than the configured minimum of records is
//! deleted on load, so the following run starts from a clean crawl.

use crate::error::SnapshotError;
use crate::models::Record;
use crate::utils::staging_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

const FORMAT_TAG: &str = "catalog-crawl-snapshot";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    format: &'a str,
    version: u32,
    site: &'a str,
    created_at: DateTime<Utc>,
    record_count: usize,
    checksum: String,
    records: &'a RawValue,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    format: String,
    version: u32,
    site: String,
    created_at: DateTime<Utc>,
    record_count: usize,
    checksum: String,
    records: Box<RawValue>,
}

/// Reads and writes the snapshot file of one site.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    site: String,
    min_records: usize,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>, site: impl Into<String>, min_records: usize) -> Self {
        Self {
            path: path.into(),
            site: site.into(),
            min_records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `records`, replacing any previous snapshot atomically.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), records = records.len()))]
    pub async fn save(&self, records: &[Record]) -> Result<(), SnapshotError> {
        let body = serde_json::to_string(records)?;
        let raw = RawValue::from_string(body)?;
        let envelope = EnvelopeOut {
            format: FORMAT_TAG,
            version: FORMAT_VERSION,
            site: &self.site,
            created_at: Utc::now(),
            record_count: records.len(),
            checksum: blake3::hash(raw.get().as_bytes()).to_hex().to_string(),
            records: &raw,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let staging = staging_path(&self.path);
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &self.path).await?;
        info!(bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    /// Load the saved records.
    ///
    /// # Returns
    ///
    /// The records of a valid snapshot. An unusable snapshot is removed and
    /// reported as [`SnapshotError::Corrupt`] or [`SnapshotError::TooSmall`];
    /// an absent one as [`SnapshotError::Missing`].
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<Record>, SnapshotError> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SnapshotError::Missing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = self.decode(&bytes).and_then(|records| {
            if records.len() < self.min_records {
                Err(SnapshotError::TooSmall {
                    path: self.path.clone(),
                    found: records.len(),
                    min: self.min_records,
                })
            } else {
                Ok(records)
            }
        });

        match outcome {
            Ok(records) => {
                info!(records = records.len(), "snapshot loaded");
                Ok(records)
            }
            Err(e) => {
                warn!(error = %e, "discarding unusable snapshot");
                if let Err(rm) = fs::remove_file(&self.path).await {
                    warn!(error = %rm, "failed to remove snapshot");
                }
                Err(e)
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>, SnapshotError> {
        let corrupt = |reason: String| SnapshotError::Corrupt {
            path: self.path.clone(),
            reason,
        };

        let envelope: EnvelopeIn =
            serde_json::from_slice(bytes).map_err(|e| corrupt(format!("undecodable: {e}")))?;
        if envelope.format != FORMAT_TAG {
            return Err(corrupt(format!("unknown format tag '{}'", envelope.format)));
        }
        if envelope.version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported version {}", envelope.version)));
        }
        if envelope.site != self.site {
            warn!(saved = %envelope.site, expected = %self.site, "snapshot was written for another site");
        }

        let actual = blake3::hash(envelope.records.get().as_bytes()).to_hex();
        if actual.as_str() != envelope.checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let records: Vec<Record> = serde_json::from_str(envelope.records.get())
            .map_err(|e| corrupt(format!("bad record list: {e}")))?;
        if records.len() != envelope.record_count {
            return Err(corrupt(format!(
                "record count {} does not match header {}",
                records.len(),
                envelope.record_count
            )));
        }
        info!(created_at = %envelope.created_at, "snapshot header verified");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                [("Brand", "Audi".to_string()), ("Id", i.to_string())]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_trip_preserves_records_and_field_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("snap.json"), "auto-data", 3);
        let saved = records(3);

        store.save(&saved).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, saved);
        assert_eq!(loaded[0].names().collect::<Vec<_>>(), vec!["Brand", "Id"]);
        assert!(!staging_path(store.path()).exists());
    }

    #[tokio::test]
    async fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("none.json"), "auto-data", 1);
        assert!(matches!(store.load().await, Err(SnapshotError::Missing(_))));
    }

    #[tokio::test]
    async fn test_too_small_snapshot_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        CheckpointStore::new(&path, "auto-data", 0)
            .save(&records(5))
            .await
            .unwrap();

        let store = CheckpointStore::new(&path, "auto-data", 100);
        let err = store.load().await.unwrap_err();

        assert!(matches!(err, SnapshotError::TooSmall { found: 5, min: 100, .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_garbage_snapshot_is_corrupt_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, b"\x80\x04not json at all").unwrap();

        let err = CheckpointStore::new(&path, "auto-data", 1).load().await.unwrap_err();

        assert!(matches!(err, SnapshotError::Corrupt { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_tampered_records_fail_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let store = CheckpointStore::new(&path, "auto-data", 1);
        store.save(&records(2)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("Audi", "Fiat")).unwrap();

        match store.load().await {
            Err(SnapshotError::Corrupt { reason, .. }) => assert!(reason.contains("checksum")),
            other => panic!("expected corrupt snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let store = CheckpointStore::new(&path, "auto-data", 1);
        store.save(&records(1)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("\"version\":1", "\"version\":9")).unwrap();

        assert!(matches!(store.load().await, Err(SnapshotError::Corrupt { .. })));
    }
}
