//! AIP archive writer
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Persists a data source as an archival information package: a fixed folder
//! layout, standard schemas, per-table XSD and XML files fed block by block,
//! and the four package indices including the MD5 file index.
//!
//! # Example
//!
//! ```no_run
//! use aip_archive::ArchiveRepository;
//! use aip_common::types::{DataBlock, DataSource};
//! use std::collections::BTreeMap;
//!
//! fn archive(source: &DataSource, block: DataBlock) -> aip_archive::Result<()> {
//!     let mut repository = ArchiveRepository::new("/var/aip");
//!     repository.archive_metadata(source)?;
//!
//!     let mut blocks = BTreeMap::new();
//!     blocks.insert(block.table.clone(), block);
//!     repository.archive_table_data(&blocks)?;
//!
//!     repository.finish()?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod index;
pub mod layout;
pub mod ledger;
pub mod repository;
pub mod rows;
pub mod schema;
pub mod standard;
pub mod writer;
pub mod xml;

pub use error::{ArchiveError, Result};
pub use layout::{ArchiveLayout, IndexFile};
pub use ledger::{ChecksumEntry, FileChecksumLedger, Verification};
pub use repository::{verify_package, ArchiveReport, ArchiveRepository, PackageSummary, TableWrite};
pub use rows::TableRowLedger;
pub use schema::TableSchema;
pub use writer::{TableArchiveState, TableWriter};
