use std::error::Error as StdError;

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ledger::LedgerError;
use crate::partition::PartitionError;
use crate::transform::TransformError;

/// Failure of a single input file. The file is skipped and stays eligible
/// for the next run.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("cannot derive output location: {0}")]
    Partition(#[from] PartitionError),
    #[error("failed to read raw table: {0}")]
    Read(#[source] GatewayError),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("failed to write clean table: {0}")]
    Write(#[source] GatewayError),
    #[error("failed to record processed file: {0}")]
    Ledger(#[from] LedgerError),
    #[error("input reference is outside the bucket: {0}")]
    Uri(#[source] GatewayError),
}

impl FileError {
    /// Stage of the per-file pipeline that failed, for structured logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Partition(_) | Self::Uri(_) => "locate",
            Self::Read(_) => "read",
            Self::Transform(_) => "transform",
            Self::Write(_) => "write",
            Self::Ledger(_) => "ledger",
        }
    }
}

/// Failure that prevents a fact task from selecting any work.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to list raw inputs: {0}")]
    Listing(#[from] GatewayError),
}

/// Renders an error and all of its sources on one line.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use posfact_bucket::BucketError;

    #[test]
    fn chain_skips_causes_already_in_the_message() {
        let err = FileError::Write(GatewayError::Bucket(BucketError::Sdk("throttled".into())));
        assert_eq!(
            error_chain(&err),
            "failed to write clean table: bucket error: sdk error: throttled"
        );
        assert_eq!(err.stage(), "write");
    }
}
