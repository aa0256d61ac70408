//! Abstractions over the object storage backends that hold raw exports, clean
//! fact tables and processed-file ledgers.

mod local;
mod memory;
mod s3;

pub use local::LocalBucketStore;
pub use memory::MemoryBucketStore;
pub use s3::{S3BucketStore, S3Config};

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Suffix marker for objects that are still being written.
pub const STAGING_MARKER: &str = ".tmp-";

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sdk error: {0}")]
    Sdk(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl BucketError {
    pub(crate) fn from_sdk(err: impl fmt::Display) -> Self {
        Self::Sdk(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Name of the bucket (or container) every key is relative to.
    fn bucket(&self) -> &str;

    /// URI scheme used when a key is rendered as a fully-qualified location.
    fn uri_scheme(&self) -> &'static str;

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError>;
    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError>;
    async fn delete_object(&self, key: &str) -> Result<(), BucketError>;

    /// Keys under `prefix`, in the backend's listing order.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BucketError>;
    async fn object_exists(&self, key: &str) -> Result<bool, BucketError>;

    /// Moves `from` onto `to`, replacing whatever `to` held before.
    async fn promote_object(&self, from: &str, to: &str) -> Result<(), BucketError>;

    /// Writes to a staging key first and promotes it, so readers never see a
    /// partially written object at `key`.
    async fn put_object_atomic(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError> {
        let staging = staging_key(key);
        self.put_object(&staging, bytes, content_type).await?;

        if let Err(err) = self.promote_object(&staging, key).await {
            if let Err(cleanup_err) = self.delete_object(&staging).await {
                warn!(
                    staging_key = %staging,
                    error = %cleanup_err,
                    "failed to remove staging object after aborted promote"
                );
            }
            return Err(err);
        }

        Ok(())
    }
}

pub fn staging_key(key: &str) -> String {
    format!("{key}{STAGING_MARKER}{}", Uuid::new_v4().simple())
}

/// True only for keys shaped exactly like [`staging_key`] output: the marker
/// followed by a 32-digit hex uuid at the end of the key.
pub fn is_staging_key(key: &str) -> bool {
    key.rsplit_once(STAGING_MARKER).is_some_and(|(base, suffix)| {
        !base.is_empty() && suffix.len() == 32 && suffix.bytes().all(|b| b.is_ascii_hexdigit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_keys_are_unique_siblings() {
        let a = staging_key("clean/fact_sales/date=2024-06-01/export.parquet");
        let b = staging_key("clean/fact_sales/date=2024-06-01/export.parquet");

        assert_ne!(a, b);
        assert!(a.starts_with("clean/fact_sales/date=2024-06-01/export.parquet.tmp-"));
        assert!(is_staging_key(&a));
        assert!(!is_staging_key("clean/fact_sales/date=2024-06-01/export.parquet"));
    }

    #[test]
    fn exports_that_merely_mention_the_marker_are_not_staging() {
        assert!(!is_staging_key("raw/fact_sales_orders/date=2024-06-01/orders.tmp-final.csv"));
        assert!(!is_staging_key("raw/fact_sales/date=2024-06-01/a.csv.tmp-1234"));
        assert!(is_staging_key(
            "raw/fact_sales/date=2024-06-01/a.csv.tmp-0123456789abcdef0123456789abcdef"
        ));
    }

    #[tokio::test]
    async fn atomic_put_leaves_no_staging_object() {
        let store = MemoryBucketStore::new("warehouse");
        store
            .put_object_atomic("logs/ledger.csv", Bytes::from_static(b"a,b\n"), "text/csv")
            .await
            .expect("atomic put");

        let keys = store.list_objects("logs/").await.expect("list");
        assert_eq!(keys, vec!["logs/ledger.csv".to_string()]);
    }
}
