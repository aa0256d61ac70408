//! Object key conventions for raw exports and clean fact tables.
//!
//! Raw exports land under `raw/fact_<name>/date=YYYY-MM-DD/<file>.csv`; the clean
//! output for each keeps the same date partition and base filename under
//! `clean/fact_<name>/`.

use chrono::NaiveDate;
use thiserror::Error;

pub const RAW_EXTENSION: &str = ".csv";
pub const CLEAN_EXTENSION: &str = ".parquet";
pub const DATE_PARTITION_PREFIX: &str = "date=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("no 'date=' partition segment in '{0}'")]
    MissingDatePartition(String),
    #[error("no file name in '{0}'")]
    MissingFileName(String),
}

pub fn raw_prefix(fact_name: &str) -> String {
    format!("raw/fact_{fact_name}/")
}

pub fn clean_prefix(fact_name: &str) -> String {
    format!("clean/fact_{fact_name}/")
}

/// First `date=...` segment of a slash-separated path, verbatim.
pub fn date_partition(path: &str) -> Option<&str> {
    path.split('/')
        .find(|segment| segment.starts_with(DATE_PARTITION_PREFIX))
}

pub fn partition_date(segment: &str) -> Option<NaiveDate> {
    let value = segment.strip_prefix(DATE_PARTITION_PREFIX)?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Clean output key for a raw input key.
pub fn output_key(fact_name: &str, input_key: &str) -> Result<String, PartitionError> {
    let partition = date_partition(input_key)
        .ok_or_else(|| PartitionError::MissingDatePartition(input_key.to_string()))?;

    let file_name = input_key
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PartitionError::MissingFileName(input_key.to_string()))?;
    let stem = file_name.strip_suffix(RAW_EXTENSION).unwrap_or(file_name);

    Ok(format!(
        "{}{partition}/{stem}{CLEAN_EXTENSION}",
        clean_prefix(fact_name)
    ))
}

/// The key with the most recent parseable date partition. Ties on date go to
/// the lexicographically greatest key.
pub fn latest_partitioned<'a, I>(keys: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    keys.into_iter()
        .filter_map(|key| {
            let date = date_partition(key).and_then(partition_date)?;
            Some((date, key.as_str()))
        })
        .max()
        .map(|(_, key)| key)
}
