//! Engine configuration
//!
//! Loaded from `AIP_*` environment variables (a `.env` file is honoured by the
//! binary through `dotenvy`). Command line flags override individual values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::command::{ArchiveCommand, DEFAULT_MAX_VALIDATION_PASSES};
use crate::error::{EngineError, Result};
use crate::sources::csv::DEFAULT_BLOCK_SIZE;
use crate::validators::ValidatorKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Folder receiving the `<archive id>.1` package
    pub output_dir: PathBuf,
    /// JSON description of the data source
    pub metadata_file: Option<PathBuf>,
    /// Folder holding one CSV file per table
    pub data_dir: Option<PathBuf>,
    pub concurrency: i64,
    pub block_size: usize,
    pub max_validation_passes: usize,
    pub validation_only: bool,
    pub table_filter: Option<String>,
    pub archive_id: Option<String>,
    /// Validator names, see [`ValidatorKind`]
    pub validators: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./aip"),
            metadata_file: None,
            data_dir: None,
            concurrency: 4,
            block_size: DEFAULT_BLOCK_SIZE,
            max_validation_passes: DEFAULT_MAX_VALIDATION_PASSES,
            validation_only: false,
            table_filter: None,
            archive_id: None,
            validators: vec!["not-null".to_string(), "primary-key".to_string()],
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| EngineError::config(format!("{name}={value:?}: {e}"))),
        None => Ok(default),
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            output_dir: env_var("AIP_OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            metadata_file: env_var("AIP_METADATA_FILE").map(PathBuf::from),
            data_dir: env_var("AIP_DATA_DIR").map(PathBuf::from),
            concurrency: parse_env("AIP_CONCURRENCY", defaults.concurrency)?,
            block_size: parse_env("AIP_BLOCK_SIZE", defaults.block_size)?,
            max_validation_passes: parse_env("AIP_MAX_VALIDATION_PASSES", defaults.max_validation_passes)?,
            validation_only: parse_env("AIP_VALIDATION_ONLY", defaults.validation_only)?,
            table_filter: env_var("AIP_TABLE_FILTER"),
            archive_id: env_var("AIP_ARCHIVE_ID"),
            validators: env_var("AIP_VALIDATORS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.validators),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(EngineError::config("AIP_BLOCK_SIZE must be greater than 0"));
        }
        if self.max_validation_passes == 0 {
            return Err(EngineError::config("AIP_MAX_VALIDATION_PASSES must be greater than 0"));
        }
        if self.archive_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(EngineError::config("Archive id override is empty"));
        }
        self.validator_kinds()?;
        self.command()?;
        Ok(())
    }

    pub fn validator_kinds(&self) -> Result<Vec<ValidatorKind>> {
        self.validators.iter().map(|v| v.parse()).collect()
    }

    /// The run parameters described by this configuration
    pub fn command(&self) -> Result<ArchiveCommand> {
        let mut command = ArchiveCommand::new()
            .validation_only(self.validation_only)
            .concurrency(self.concurrency)
            .max_validation_passes(self.max_validation_passes);
        if let Some(filter) = &self.table_filter {
            command = command.with_table_filter(filter)?;
        }
        if let Some(id) = &self.archive_id {
            command = command.archive_id(id.clone());
        }
        Ok(command)
    }
}
