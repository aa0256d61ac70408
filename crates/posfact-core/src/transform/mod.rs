//! Per-fact transforms from raw point-of-sale exports to typed fact tables.

mod local_time;
mod sales;
mod sales_orders;
mod schema;

pub use local_time::{local_keys, parse_instant, REPORTING_TIMEZONE};
pub use sales::SALES_SCHEMA;
pub use sales_orders::SALES_ORDERS_SCHEMA;
pub use schema::{apply_schema, ColumnKind, ColumnMapping, DerivedColumn, FactSchema};

use polars::prelude::{DataFrame, PolarsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("required column '{0}' is missing")]
    MissingColumn(String),
    #[error("column '{column}' row {row}: identifier is null")]
    NullIdentifier { column: String, row: usize },
    #[error("column '{column}' row {row}: '{value}' is not a valid {expected}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
        expected: &'static str,
    },
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("{0}")]
    Rejected(String),
}

/// Maps a raw table to a clean one. Implementations must not depend on
/// anything but their input.
pub trait FactTransform: Send + Sync {
    fn code_identifier(&self) -> &str {
        "custom"
    }

    fn apply(&self, raw: &DataFrame) -> Result<DataFrame, TransformError>;
}

impl<F> FactTransform for F
where
    F: Fn(&DataFrame) -> Result<DataFrame, TransformError> + Send + Sync,
{
    fn apply(&self, raw: &DataFrame) -> Result<DataFrame, TransformError> {
        self(raw)
    }
}

/// A transform driven entirely by a [`FactSchema`].
#[derive(Debug, Clone, Copy)]
pub struct MappedTransform {
    schema: &'static FactSchema,
}

impl MappedTransform {
    pub const fn new(schema: &'static FactSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'static FactSchema {
        self.schema
    }
}

impl FactTransform for MappedTransform {
    fn code_identifier(&self) -> &str {
        self.schema.code
    }

    fn apply(&self, raw: &DataFrame) -> Result<DataFrame, TransformError> {
        apply_schema(raw, self.schema)
    }
}

static MAPPED_TRANSFORMS: [MappedTransform; 2] = [
    MappedTransform::new(&SALES_SCHEMA),
    MappedTransform::new(&SALES_ORDERS_SCHEMA),
];

pub fn all_transforms() -> &'static [MappedTransform] {
    &MAPPED_TRANSFORMS
}

pub fn transform_for(fact_name: &str) -> Option<&'static MappedTransform> {
    MAPPED_TRANSFORMS
        .iter()
        .find(|transform| transform.schema.fact_name == fact_name)
}
