//! AIP Engine Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Drives the conversion of a data source into an archival information
//! package: tables are extracted in parallel up to a limit, every block is
//! validated and then appended to the package by [`aip_archive`].
//!
//! # Example
//!
//! ```no_run
//! use aip_archive::ArchiveRepository;
//! use aip_engine::sources::{CsvDataProvider, JsonMetadataProvider};
//! use aip_engine::{ArchiveCommand, Engine};
//! use std::sync::{Arc, Mutex};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(
//!         Arc::new(JsonMetadataProvider::new("./export/source.json")),
//!         Arc::new(CsvDataProvider::new("./export/tables")),
//!         Arc::new(Mutex::new(ArchiveRepository::new("./aip"))),
//!     );
//!     let summary = engine.execute(&ArchiveCommand::new().concurrency(4)).await?;
//!     println!("{} rows archived", summary.rows_archived());
//!     Ok(())
//! }
//! ```

pub mod collaborators;
pub mod command;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod sink;
pub mod sources;
pub mod validation;
pub mod validators;

pub use collaborators::{
    BlockStream, DataProvider, ExceptionHandler, LoggingExceptionHandler, MetadataProvider, Phase, PhaseListener,
    TracingPhaseListener, ValidationContext, Validator,
};
pub use command::ArchiveCommand;
pub use config::EngineConfig;
pub use error::{EngineError, RecoverableError, RecoverableKind, Result};
pub use scheduler::{Engine, RunSummary, TableRunStats};
pub use validators::{NotNullValidator, PrimaryKeyValidator, ValidatorKind};
