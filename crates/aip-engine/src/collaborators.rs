//! Seams between the engine and the outside world
//!
//! Metadata loading, data extraction, validation rules, failure policy and
//! progress reporting are supplied by the caller. The engine only relies on
//! the contracts below.

use aip_common::types::{DataBlock, DataSource, Table};
use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, RecoverableError, Result};

/// Supplies the description of the system being archived
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn data_source(&self) -> Result<DataSource>;
}

/// Ordered, pull-based sequence of blocks for one table
///
/// The engine never asks for the next block before the current one has been
/// validated and archived.
#[async_trait]
pub trait BlockStream: Send {
    /// Next block, or `None` once the table is exhausted
    async fn next_block(&mut self) -> Result<Option<DataBlock>>;

    /// Row conversion failures met while producing the last block
    ///
    /// The affected rows are not part of the block.
    fn drain_errors(&mut self) -> Vec<RecoverableError> {
        Vec::new()
    }
}

/// Factory for independent block streams
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn open_table(&self, table: &Table, source: &DataSource) -> Result<Box<dyn BlockStream>>;
}

/// What a validator may ask about the run it takes part in
#[derive(Debug, Clone)]
pub struct ValidationContext {
    token: CancellationToken,
    validation_only: bool,
}

impl ValidationContext {
    pub fn new(token: CancellationToken, validation_only: bool) -> Self {
        Self { token, validation_only }
    }

    /// False once the run is being cancelled; long validators should stop
    pub fn is_alive(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn validation_only(&self) -> bool {
        self.validation_only
    }
}

/// A rule checked against every block of every table
///
/// Validators run on the blocking pool, all at once over the same block.
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, table: &Table, block: &DataBlock, is_last_block: bool, ctx: &ValidationContext) -> Result<()>;

    /// Called once validation of a block is over, with its final rows
    fn commit(&self, _table: &Table, _block: &DataBlock) {}
}

/// Failure policy
pub trait ExceptionHandler: Send + Sync {
    /// Report `error`; returns whether the run may continue
    fn handle(&self, error: &EngineError) -> bool;
}

/// Run step about to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    GetDataSource,
    ArchiveMetadata,
    GetDataForTable { table: String },
    ValidateDataForTable { table: String },
    ArchiveDataForTable { table: String },
    FetchNextBlock { table: String },
}

impl Phase {
    pub fn table(&self) -> Option<&str> {
        match self {
            Phase::GetDataSource | Phase::ArchiveMetadata => None,
            Phase::GetDataForTable { table }
            | Phase::ValidateDataForTable { table }
            | Phase::ArchiveDataForTable { table }
            | Phase::FetchNextBlock { table } => Some(table),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::GetDataSource => f.write_str("get data source"),
            Phase::ArchiveMetadata => f.write_str("archive metadata"),
            Phase::GetDataForTable { table } => write!(f, "get data for {table}"),
            Phase::ValidateDataForTable { table } => write!(f, "validate data for {table}"),
            Phase::ArchiveDataForTable { table } => write!(f, "archive data for {table}"),
            Phase::FetchNextBlock { table } => write!(f, "fetch next block of {table}"),
        }
    }
}

/// Progress notifications; informational only
pub trait PhaseListener: Send + Sync {
    fn before(&self, phase: &Phase);
}

/// Continues past row-level errors, stops on everything else
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle(&self, error: &EngineError) -> bool {
        match error {
            EngineError::Recoverable(e) => {
                tracing::warn!(
                    kind = %e.kind,
                    table = %e.table,
                    rows = e.rows.len(),
                    message = %e.message,
                    "Recoverable error"
                );
                true
            }
            other => {
                tracing::error!(error = %other, "Run failed");
                false
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPhaseListener;

impl PhaseListener for TracingPhaseListener {
    fn before(&self, phase: &Phase) {
        match phase {
            Phase::GetDataSource | Phase::ArchiveMetadata | Phase::GetDataForTable { .. } => {
                tracing::info!(%phase, "Starting")
            }
            _ => tracing::debug!(%phase, "Starting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecoverableKind;

    #[test]
    fn test_logging_handler_policy() {
        let handler = LoggingExceptionHandler;
        let recoverable = RecoverableError::new(RecoverableKind::Convert, "PERSON", vec![0], "bad");
        assert!(handler.handle(&EngineError::Recoverable(recoverable)));
        assert!(!handler.handle(&EngineError::invariant("broken")));
    }

    #[test]
    fn test_phase_table() {
        assert_eq!(Phase::GetDataSource.table(), None);
        let phase = Phase::FetchNextBlock { table: "PERSON".into() };
        assert_eq!(phase.table(), Some("PERSON"));
        assert_eq!(phase.to_string(), "fetch next block of PERSON");
    }
}
