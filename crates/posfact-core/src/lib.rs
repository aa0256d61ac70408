//! Incremental raw-CSV to Parquet pipeline for point-of-sale fact tables.

pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod partition;
pub mod runner;
pub mod transform;

pub use config::{build_store, ConfigError, PipelineSettings, StoreSettings};
pub use gateway::{GatewayError, ObjectGateway};
pub use ledger::{LedgerEntry, LedgerError, ProcessedLedger};
pub use orchestrator::{default_fact_tasks, select_tasks, FactTask, Orchestrator, RunSummary};
pub use runner::{FactTaskRunner, TaskResult};
pub use transform::{FactTransform, TransformError};
