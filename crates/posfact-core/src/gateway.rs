//! Tables over objects: CSV in, Parquet out, addressed by fully-qualified URI.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use posfact_bucket::{is_staging_key, BucketError, BucketStore};
use thiserror::Error;
use tracing::{debug, info};

use crate::partition::latest_partitioned;

const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bucket error: {0}")]
    Bucket(#[from] BucketError),
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("'{uri}' is not inside '{root}'")]
    ForeignUri { uri: String, root: String },
    #[error("no date-partitioned objects under '{0}'")]
    NoPartition(String),
}

#[derive(Clone)]
pub struct ObjectGateway {
    store: Arc<dyn BucketStore>,
}

impl std::fmt::Debug for ObjectGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectGateway")
            .field("root", &self.root_uri())
            .finish()
    }
}

impl ObjectGateway {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    /// `scheme://bucket/`
    pub fn root_uri(&self) -> String {
        format!("{}://{}/", self.store.uri_scheme(), self.store.bucket())
    }

    pub fn qualify(&self, key: &str) -> String {
        format!("{}{key}", self.root_uri())
    }

    pub fn key_of<'a>(&self, uri: &'a str) -> Result<&'a str, GatewayError> {
        let root = self.root_uri();
        uri.strip_prefix(root.as_str())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GatewayError::ForeignUri {
                uri: uri.to_string(),
                root,
            })
    }

    /// Keys under `prefix`, in listing order. Objects still being staged by an
    /// atomic write are never returned.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        let keys = self.store.list_objects(prefix).await?;
        Ok(keys.into_iter().filter(|key| !is_staging_key(key)).collect())
    }

    pub async fn exists(&self, uri: &str) -> Result<bool, GatewayError> {
        let key = self.key_of(uri)?;
        Ok(self.store.object_exists(key).await?)
    }

    /// Reads a headerful CSV object. Every column is read as text and empty
    /// fields become nulls; typing is left to the fact transforms. An empty
    /// object is an empty table.
    pub async fn read_table(&self, uri: &str) -> Result<DataFrame, GatewayError> {
        let key = self.key_of(uri)?;
        let bytes = self.store.get_object(key).await?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            info!(uri, "raw object is empty, reading it as an empty table");
            return Ok(DataFrame::empty());
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()?;

        info!(uri, rows = df.height(), columns = df.width(), "read raw table");
        Ok(df)
    }

    pub async fn read_parquet(&self, uri: &str) -> Result<DataFrame, GatewayError> {
        let key = self.key_of(uri)?;
        let bytes = self.store.get_object(key).await?;
        let df = ParquetReader::new(Cursor::new(bytes.to_vec())).finish()?;
        debug!(uri, rows = df.height(), "read parquet table");
        Ok(df)
    }

    /// Writes `df` as Parquet through the store's atomic put. Rewriting the
    /// same URI replaces the previous object.
    pub async fn write_table(&self, df: &DataFrame, uri: &str) -> Result<(), GatewayError> {
        let key = self.key_of(uri)?;
        let bytes = parquet_bytes(df)?;
        let size = bytes.len();

        self.store
            .put_object_atomic(key, Bytes::from(bytes), PARQUET_CONTENT_TYPE)
            .await?;

        info!(uri, rows = df.height(), bytes = size, "wrote parquet table");
        Ok(())
    }

    /// URI of the most recent `date=YYYY-MM-DD` object of a dataset, e.g.
    /// `latest_partition("clean", "dim_customer")`.
    pub async fn latest_partition(
        &self,
        layer: &str,
        dataset: &str,
    ) -> Result<String, GatewayError> {
        let prefix = format!("{layer}/{dataset}/");
        let keys = self.list(&prefix).await?;

        latest_partitioned(&keys)
            .map(|key| self.qualify(key))
            .ok_or(GatewayError::NoPartition(prefix))
    }
}

fn parquet_bytes(df: &DataFrame) -> Result<Vec<u8>, PolarsError> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut clone = df.clone();
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)?;
    }
    Ok(buffer)
}
