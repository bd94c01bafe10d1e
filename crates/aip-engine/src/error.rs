//! Error types for the archiving engine
//!
//! Only the first genuine failure of a run reaches the caller. Recoverable
//! row errors go through the exception handler first; when the handler stops
//! the run they come back wrapped in [`EngineError::AlreadyHandled`] so nobody
//! reports them a second time.

use aip_archive::ArchiveError;
use aip_common::AipError;
use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Kind of a row-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverableKind {
    /// Source text could not be converted to the field type
    Convert,
    /// A transform rule could not map the value
    Mapping,
    /// A validator rejected the rows
    Validate,
}

impl fmt::Display for RecoverableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoverableKind::Convert => f.write_str("Convert"),
            RecoverableKind::Mapping => f.write_str("Mapping"),
            RecoverableKind::Validate => f.write_str("Validate"),
        }
    }
}

/// Error naming the offending rows of one block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error in {table} ({} rows): {message}", .rows.len())]
pub struct RecoverableError {
    pub kind: RecoverableKind,
    pub table: String,
    /// Positions within the block; record numbers of the source for
    /// conversion errors raised while reading
    pub rows: Vec<usize>,
    pub message: String,
}

impl RecoverableError {
    pub fn new(kind: RecoverableKind, table: impl Into<String>, rows: Vec<usize>, message: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            rows,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Archive write failed; always fatal
    #[error("Repository error: {0}")]
    Repository(ArchiveError),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Data source error for table {table}: {message}")]
    Source { table: String, message: String },

    #[error(transparent)]
    Recoverable(#[from] RecoverableError),

    #[error("Engine invariant violated: {0}")]
    Invariant(String),

    /// Already reported through the exception handler
    #[error("{0}")]
    AlreadyHandled(Box<EngineError>),

    /// Cooperative unwinding after another unit failed
    #[error("Run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EngineError {
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn data_source(table: impl Into<String>, msg: impl fmt::Display) -> Self {
        Self::Source {
            table: table.into(),
            message: msg.to_string(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Strip the "already handled" marker, returning the error and whether it was set
    pub fn into_handled(self) -> (Self, bool) {
        match self {
            Self::AlreadyHandled(inner) => (inner.into_handled().0, true),
            other => (other, false),
        }
    }
}

impl From<ArchiveError> for EngineError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Common(AipError::Metadata(msg)) => Self::Metadata(msg),
            other => Self::Repository(other),
        }
    }
}

impl From<AipError> for EngineError {
    fn from(err: AipError) -> Self {
        match err {
            AipError::Metadata(msg) => Self::Metadata(msg),
            AipError::Config(msg) => Self::Config(msg),
            other => Self::Repository(ArchiveError::Common(other)),
        }
    }
}
