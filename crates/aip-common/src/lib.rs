//! AIP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared domain model, utilities, and error handling for the AIP workspace.
//!
//! # Overview
//!
//! - **Types**: the data source description (tables, fields, keys, creators,
//!   context documents), data blocks and the closed [`types::Value`] type
//! - **Checksums**: MD5 content checksums used by the package file index
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Error Handling**: [`AipError`] and the [`Result`] alias
//!
//! # Example
//!
//! ```no_run
//! use aip_common::checksum::compute_file_md5;
//!
//! fn main() -> aip_common::Result<()> {
//!     let md5 = compute_file_md5("AVID.SA.18000.1/Indices/tableIndex.xml")?;
//!     tracing::info!(%md5, "table index checksum");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{AipError, Result};
