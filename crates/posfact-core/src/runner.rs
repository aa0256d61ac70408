//! One bounded, incremental batch for a single fact table.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{error_chain, FileError, TaskError};
use crate::gateway::ObjectGateway;
use crate::ledger::ProcessedLedger;
use crate::partition::{output_key, raw_prefix, RAW_EXTENSION};
use crate::transform::FactTransform;

/// Outcome of one fact task. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub fact_name: String,
    pub succeeded: bool,
    /// Files written and recorded in the ledger during this run.
    pub files_processed: usize,
    pub files_failed: usize,
    /// Files picked for this run after the batch cap.
    pub files_selected: usize,
    /// Eligible files left for later runs.
    pub files_pending: usize,
}

impl TaskResult {
    fn failed(fact_name: &str) -> Self {
        Self {
            fact_name: fact_name.to_string(),
            succeeded: false,
            files_processed: 0,
            files_failed: 0,
            files_selected: 0,
            files_pending: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FactTaskRunner {
    gateway: ObjectGateway,
    batch_size: usize,
}

impl FactTaskRunner {
    pub fn new(gateway: ObjectGateway, batch_size: usize) -> Self {
        Self {
            gateway,
            batch_size: batch_size.max(1),
        }
    }

    pub fn gateway(&self) -> &ObjectGateway {
        &self.gateway
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Processes up to `batch_size` raw files of `fact_name` not yet in the
    /// ledger at `ledger_key`. Per-file failures are logged and counted; only
    /// a failure to enumerate inputs marks the task as failed.
    pub async fn run(
        &self,
        fact_name: &str,
        transform: &dyn FactTransform,
        ledger_key: &str,
    ) -> TaskResult {
        info!(
            fact = fact_name,
            transform = transform.code_identifier(),
            ledger = ledger_key,
            batch_size = self.batch_size,
            "starting fact task"
        );

        match self.run_batch(fact_name, transform, ledger_key).await {
            Ok(result) => {
                info!(
                    fact = fact_name,
                    processed = result.files_processed,
                    failed = result.files_failed,
                    pending = result.files_pending,
                    "fact task finished"
                );
                result
            }
            Err(err) => {
                error!(fact = fact_name, error = %error_chain(&err), "fact task failed");
                TaskResult::failed(fact_name)
            }
        }
    }

    async fn run_batch(
        &self,
        fact_name: &str,
        transform: &dyn FactTransform,
        ledger_key: &str,
    ) -> Result<TaskResult, TaskError> {
        let prefix = raw_prefix(fact_name);
        let candidates: Vec<String> = self
            .gateway
            .list(&prefix)
            .await?
            .into_iter()
            .filter(|key| key.ends_with(RAW_EXTENSION))
            .map(|key| self.gateway.qualify(&key))
            .collect();

        let ledger = ProcessedLedger::new(self.gateway.store().clone(), ledger_key);
        let processed = ledger.load().await;

        let mut seen = HashSet::new();
        let eligible: Vec<String> = candidates
            .into_iter()
            .filter(|uri| !processed.contains(uri))
            .filter(|uri| seen.insert(uri.clone()))
            .collect();

        let mut result = TaskResult {
            fact_name: fact_name.to_string(),
            succeeded: true,
            files_processed: 0,
            files_failed: 0,
            files_selected: 0,
            files_pending: 0,
        };

        if eligible.is_empty() {
            info!(fact = fact_name, prefix = %prefix, "no new files to process");
            return Ok(result);
        }

        let selected = &eligible[..eligible.len().min(self.batch_size)];
        result.files_selected = selected.len();
        result.files_pending = eligible.len() - selected.len();
        info!(
            fact = fact_name,
            eligible = eligible.len(),
            selected = selected.len(),
            "selected batch"
        );

        for input in selected {
            match self.process_file(fact_name, transform, &ledger, input).await {
                Ok(output) => {
                    result.files_processed += 1;
                    debug!(fact = fact_name, input = %input, output = %output, "file done");
                }
                Err(err) => {
                    result.files_failed += 1;
                    warn!(
                        fact = fact_name,
                        input = %input,
                        stage = err.stage(),
                        error = %error_chain(&err),
                        "skipping file"
                    );
                }
            }
        }

        Ok(result)
    }

    /// Read, transform, write, then record. The ledger is touched only after
    /// the output object is committed.
    async fn process_file(
        &self,
        fact_name: &str,
        transform: &dyn FactTransform,
        ledger: &ProcessedLedger,
        input: &str,
    ) -> Result<String, FileError> {
        let input_key = self.gateway.key_of(input).map_err(FileError::Uri)?;
        let output = self.gateway.qualify(&output_key(fact_name, input_key)?);

        let raw = self.gateway.read_table(input).await.map_err(FileError::Read)?;
        let clean = transform.apply(&raw)?;
        self.gateway
            .write_table(&clean, &output)
            .await
            .map_err(FileError::Write)?;

        ledger.append(input).await?;
        Ok(output)
    }
}
