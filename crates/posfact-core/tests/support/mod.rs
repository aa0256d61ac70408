#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use posfact_bucket::{BucketError, BucketStore, MemoryBucketStore};
use posfact_core::{FactTaskRunner, ObjectGateway};

pub const BUCKET: &str = "warehouse";
pub const SALES_LEDGER: &str = "logs/processed_sales_log.csv";

pub const SALES_CSV: &str = "\
id,attributes.comment,attributes.people,attributes.total,attributes.saleType,attributes.saleState,relationships.waiter.data.id,attributes.createdAt,attributes.closedAt
101,,4,15800.5,TABLE,CLOSED,3,2024-06-01T23:10:00Z,2024-06-02T00:40:00Z
102,birthday,2.0,9200,TABLE,CLOSED,5,2024-06-01T21:00:00Z,2024-06-01T22:30:00Z
";

/// Parses as CSV but has a non-numeric identifier, so the transform rejects it.
pub const BAD_SALES_CSV: &str = "\
id,attributes.total
not-a-number,10
";

pub fn sales_uri(key: &str) -> String {
    format!("memory://{BUCKET}/{key}")
}

pub async fn seed(store: &dyn BucketStore, key: &str, contents: &str) {
    store
        .put_object(key, Bytes::from(contents.to_string()), "text/csv")
        .await
        .expect("seed object");
}

pub async fn read_text(store: &dyn BucketStore, key: &str) -> String {
    let bytes = store.get_object(key).await.expect("read object");
    String::from_utf8(bytes.to_vec()).expect("utf-8 object")
}

/// Rows in the ledger at `key`, excluding the header.
pub async fn ledger_rows(store: &dyn BucketStore, key: &str) -> Vec<String> {
    read_text(store, key)
        .await
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

pub fn runner(store: Arc<dyn BucketStore>, batch_size: usize) -> FactTaskRunner {
    FactTaskRunner::new(ObjectGateway::new(store), batch_size)
}

/// In-memory store that fails writes or listings on demand.
pub struct FlakyStore {
    inner: MemoryBucketStore,
    failing_put_prefixes: Mutex<Vec<String>>,
    fail_listing: Mutex<bool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryBucketStore::new(BUCKET),
            failing_put_prefixes: Mutex::new(Vec::new()),
            fail_listing: Mutex::new(false),
        }
    }

    pub fn fail_puts_under(&self, prefix: &str) {
        self.failing_put_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    pub fn heal(&self) {
        self.failing_put_prefixes.lock().unwrap().clear();
        *self.fail_listing.lock().unwrap() = false;
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }
}

#[async_trait]
impl BucketStore for FlakyStore {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    fn uri_scheme(&self) -> &'static str {
        self.inner.uri_scheme()
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError> {
        let failing = self
            .failing_put_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()));
        if failing {
            return Err(BucketError::Sdk(format!("injected put failure for {key}")));
        }
        self.inner.put_object(key, bytes, content_type).await
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        self.inner.get_object(key).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        self.inner.delete_object(key).await
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(BucketError::Sdk("injected listing failure".into()));
        }
        self.inner.list_objects(prefix).await
    }

    async fn object_exists(&self, key: &str) -> Result<bool, BucketError> {
        self.inner.object_exists(key).await
    }

    async fn promote_object(&self, from: &str, to: &str) -> Result<(), BucketError> {
        self.inner.promote_object(from, to).await
    }
}
