//! Processed-file ledger.
//!
//! One CSV object per fact task listing every raw input that was transformed
//! and written successfully:
//!
//! ```text
//! processed_file_path,processing_timestamp_utc
//! s3://warehouse/raw/fact_sales/date=2024-06-01/export.csv,2024-06-01T03:00:00.000000Z
//! ```
//!
//! The object store cannot append, so every append reads the whole ledger,
//! adds one row and rewrites it. A ledger that no longer parses is set aside
//! and restarted, so its inputs are reprocessed instead of blocking the run.
//! The ledger assumes a single writer per run; two concurrent appenders race
//! and the last rewrite wins.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use posfact_bucket::{BucketError, BucketStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PATH_COLUMN: &str = "processed_file_path";
pub const TIMESTAMP_COLUMN: &str = "processing_timestamp_utc";

const CSV_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("bucket error: {0}")]
    Bucket(#[from] BucketError),
    #[error("ledger CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger '{0}' has no 'processed_file_path' column")]
    MissingPathColumn(String),
    #[error("failed to encode ledger: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub processed_file_path: String,
    pub processing_timestamp_utc: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ProcessedLedger {
    store: Arc<dyn BucketStore>,
    key: String,
}

impl std::fmt::Debug for ProcessedLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedLedger")
            .field("bucket", &self.store.bucket())
            .field("key", &self.key)
            .finish()
    }
}

impl ProcessedLedger {
    pub fn new(store: Arc<dyn BucketStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Every recorded `processed_file_path`.
    ///
    /// A missing ledger is the normal first-run state. An unreadable or
    /// malformed one is logged and also treated as empty, which means its
    /// inputs get processed again rather than blocking the run.
    pub async fn load(&self) -> HashSet<String> {
        let bytes = match self.store.get_object(&self.key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                debug!(ledger = %self.key, "no ledger yet, starting from an empty snapshot");
                return HashSet::new();
            }
            Err(err) => {
                warn!(ledger = %self.key, error = %err, "failed to read ledger, treating it as empty");
                return HashSet::new();
            }
        };

        match recorded_paths(&self.key, &bytes) {
            Ok(paths) => {
                debug!(ledger = %self.key, entries = paths.len(), "loaded ledger snapshot");
                paths
            }
            Err(err) => {
                warn!(ledger = %self.key, error = %err, "ledger is malformed, treating it as empty");
                HashSet::new()
            }
        }
    }

    /// Records `input_ref` as processed now.
    pub async fn append(&self, input_ref: &str) -> Result<(), LedgerError> {
        self.append_at(input_ref, Utc::now()).await
    }

    /// Records `input_ref` as processed at `processed_at`. Fails if the
    /// existing ledger cannot be read.
    ///
    /// A ledger that cannot be parsed is copied to a `<key>.corrupt-<ts>`
    /// sibling and started over, matching `load`, which already treats it as
    /// empty.
    pub async fn append_at(
        &self,
        input_ref: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let existing = match self.store.get_object(&self.key).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        let merged = merge_entry(&self.key, existing.as_deref(), input_ref, processed_at);
        let rewritten = match merged {
            Ok(rewritten) => rewritten,
            Err(err @ (LedgerError::MissingPathColumn(_) | LedgerError::Csv(_))) => {
                if let Some(contents) = existing {
                    let backup = corrupt_key(&self.key, processed_at);
                    self.store
                        .put_object(&backup, contents, CSV_CONTENT_TYPE)
                        .await?;
                    warn!(
                        ledger = %self.key,
                        backup = %backup,
                        error = %err,
                        "ledger is malformed, starting a new one"
                    );
                }
                merge_entry(&self.key, None, input_ref, processed_at)?
            }
            Err(err) => return Err(err),
        };
        self.store
            .put_object_atomic(&self.key, Bytes::from(rewritten), CSV_CONTENT_TYPE)
            .await?;

        info!(ledger = %self.key, input = input_ref, "recorded processed file");
        Ok(())
    }

    /// Strictly parsed ledger rows, in file order. Empty when the ledger does
    /// not exist.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let bytes = match self.store.get_object(&self.key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::Reader::from_reader(bytes.as_ref());
        let mut entries = Vec::new();
        for row in reader.deserialize() {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn path_column(key: &str, headers: &csv::StringRecord) -> Result<usize, LedgerError> {
    headers
        .iter()
        .position(|header| header.trim() == PATH_COLUMN)
        .ok_or_else(|| LedgerError::MissingPathColumn(key.to_string()))
}

fn recorded_paths(key: &str, contents: &[u8]) -> Result<HashSet<String>, LedgerError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(contents);
    let column = path_column(key, reader.headers()?)?;

    let mut paths = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(path) = record.get(column).filter(|path| !path.is_empty()) {
            paths.insert(path.to_string());
        }
    }
    Ok(paths)
}

fn corrupt_key(key: &str, at: DateTime<Utc>) -> String {
    format!("{key}.corrupt-{}", at.format("%Y%m%dT%H%M%S%6fZ"))
}

/// Existing ledger contents plus one row for `input_ref`. Rows and any extra
/// columns already present are carried over untouched.
fn merge_entry(
    key: &str,
    existing: Option<&[u8]>,
    input_ref: &str,
    processed_at: DateTime<Utc>,
) -> Result<Vec<u8>, LedgerError> {
    let timestamp = processed_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut writer = csv::Writer::from_writer(Vec::new());

    let existing = existing.filter(|contents| !contents.iter().all(u8::is_ascii_whitespace));
    match existing {
        Some(contents) => {
            let mut reader = csv::ReaderBuilder::new()
                .flexible(true)
                .from_reader(contents);
            let headers = reader.headers()?.clone();
            path_column(key, &headers)?;

            writer.write_record(&headers)?;
            for record in reader.records() {
                writer.write_record(&record?)?;
            }

            let row: Vec<&str> = headers
                .iter()
                .map(|header| match header.trim() {
                    PATH_COLUMN => input_ref,
                    TIMESTAMP_COLUMN => timestamp.as_str(),
                    _ => "",
                })
                .collect();
            writer.write_record(&row)?;
        }
        None => {
            writer.write_record([PATH_COLUMN, TIMESTAMP_COLUMN])?;
            writer.write_record([input_ref, timestamp.as_str()])?;
        }
    }

    writer
        .into_inner()
        .map_err(|err| LedgerError::Encode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn first_entry_creates_header() {
        let merged = merge_entry("logs/l.csv", None, "s3://b/raw/a.csv", at(3)).unwrap();
        assert_eq!(
            String::from_utf8(merged).unwrap(),
            "processed_file_path,processing_timestamp_utc\n\
             s3://b/raw/a.csv,2024-06-01T03:00:00.000000Z\n"
        );
    }

    #[test]
    fn merge_keeps_existing_rows_and_duplicates() {
        let existing: &[u8] = b"processed_file_path,processing_timestamp_utc\n\
                         s3://b/raw/a.csv,2024-05-01T00:00:00+00:00\n";
        let merged = merge_entry("logs/l.csv", Some(existing), "s3://b/raw/a.csv", at(4)).unwrap();

        let text = String::from_utf8(merged).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "s3://b/raw/a.csv,2024-05-01T00:00:00+00:00");
        assert_eq!(lines[2], "s3://b/raw/a.csv,2024-06-01T04:00:00.000000Z");
    }

    #[test]
    fn merge_follows_existing_column_order() {
        let existing: &[u8] = b"processing_timestamp_utc,processed_file_path,note\n\
                         2024-05-01T00:00:00Z,s3://b/raw/a.csv,manual\n";
        let merged = merge_entry("logs/l.csv", Some(existing), "s3://b/raw/b.csv", at(5)).unwrap();

        let text = String::from_utf8(merged).unwrap();
        assert!(text.ends_with("2024-06-01T05:00:00.000000Z,s3://b/raw/b.csv,\n"));
    }

    #[test]
    fn merge_refuses_ledger_without_path_column() {
        let existing: &[u8] = b"file,when\nx,y\n";
        let err = merge_entry("logs/l.csv", Some(existing), "s3://b/raw/a.csv", at(5)).unwrap_err();
        assert!(matches!(err, LedgerError::MissingPathColumn(_)));
    }

    #[test]
    fn whitespace_only_ledger_is_rewritten_from_scratch() {
        let merged = merge_entry("logs/l.csv", Some(&b"\n"[..]), "s3://b/raw/a.csv", at(3)).unwrap();
        assert!(String::from_utf8(merged)
            .unwrap()
            .starts_with("processed_file_path,processing_timestamp_utc\n"));
    }

    #[tokio::test]
    async fn malformed_ledger_is_set_aside_and_restarted() {
        let store = Arc::new(posfact_bucket::MemoryBucketStore::new("b"));
        store
            .put_object("logs/l.csv", Bytes::from_static(b"file,when\nx,y\n"), CSV_CONTENT_TYPE)
            .await
            .unwrap();

        let ledger = ProcessedLedger::new(store.clone(), "logs/l.csv");
        assert!(ledger.load().await.is_empty());
        ledger.append_at("s3://b/raw/a.csv", at(6)).await.unwrap();

        assert_eq!(
            store.keys(),
            vec![
                "logs/l.csv".to_string(),
                "logs/l.csv.corrupt-20240601T060000000000Z".to_string(),
            ]
        );
        let backup = store
            .get_object("logs/l.csv.corrupt-20240601T060000000000Z")
            .await
            .unwrap();
        assert_eq!(backup.as_ref(), b"file,when\nx,y\n");

        let loaded = ledger.load().await;
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("s3://b/raw/a.csv"));
    }

    #[test]
    fn recorded_paths_skip_blank_cells() {
        let contents: &[u8] = b"processed_file_path,processing_timestamp_utc\n\
                         s3://b/raw/a.csv,2024-05-01T00:00:00Z\n\
                         ,2024-05-01T00:00:00Z\n";
        let paths = recorded_paths("logs/l.csv", contents).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths.contains("s3://b/raw/a.csv"));
    }
}
