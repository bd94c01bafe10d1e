//! Archive writer errors
//!
//! Every variant is fatal for a run: the engine never retries a failed
//! archive write.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML error in {}: {message}", path.display())]
    Xml { path: PathBuf, message: String },

    #[error("Row {row} of table {table} violates column {column}: {reason}")]
    SchemaViolation {
        table: String,
        row: usize,
        column: String,
        reason: String,
    },

    #[error("Archive metadata must be written before table data")]
    MetadataNotArchived,

    #[error("Archive metadata has already been written for {0}")]
    MetadataAlreadyArchived(String),

    #[error("Table {0} is not part of the data source")]
    UnknownTable(String),

    #[error("Invalid file index: {0}")]
    FileIndex(String),

    #[error("Archive invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Common(#[from] aip_common::AipError),
}

impl ArchiveError {
    pub fn xml(path: impl AsRef<Path>, err: impl std::fmt::Display) -> Self {
        Self::Xml {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}

/// Attach the offending path to an I/O error
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| ArchiveError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}
