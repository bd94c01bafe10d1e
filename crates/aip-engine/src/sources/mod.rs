//! Collaborators used by the `aip` binary
//!
//! - [`json::JsonMetadataProvider`]: data source description from a JSON file
//! - [`csv::CsvDataProvider`]: one CSV export per table, streamed in blocks

pub mod csv;
pub mod json;

pub use self::csv::CsvDataProvider;
pub use self::json::JsonMetadataProvider;
