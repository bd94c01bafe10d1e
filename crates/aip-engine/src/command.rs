//! Parameters of one archiving run

use aip_common::types::Table;
use regex::Regex;

use crate::error::{EngineError, Result};

pub const DEFAULT_MAX_VALIDATION_PASSES: usize = 16;

#[derive(Debug, Clone)]
pub struct ArchiveCommand {
    /// Only tables whose target name matches are processed
    pub table_filter: Option<Regex>,
    /// Validate without writing anything to the archive
    pub validation_only: bool,
    /// Tables processed at once; zero or less means one
    pub concurrency_limit: i64,
    /// Replaces the data source identifier before archiving starts
    pub archive_id: Option<String>,
    /// Upper bound on validation passes over a single block
    pub max_validation_passes: usize,
}

impl Default for ArchiveCommand {
    fn default() -> Self {
        Self {
            table_filter: None,
            validation_only: false,
            concurrency_limit: 1,
            archive_id: None,
            max_validation_passes: DEFAULT_MAX_VALIDATION_PASSES,
        }
    }
}

impl ArchiveCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_filter(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| EngineError::config(format!("Invalid table filter {pattern:?}: {e}")))?;
        self.table_filter = Some(regex);
        Ok(self)
    }

    pub fn validation_only(mut self, validation_only: bool) -> Self {
        self.validation_only = validation_only;
        self
    }

    pub fn concurrency(mut self, limit: i64) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn archive_id(mut self, archive_id: impl Into<String>) -> Self {
        self.archive_id = Some(archive_id.into());
        self
    }

    pub fn max_validation_passes(mut self, passes: usize) -> Self {
        self.max_validation_passes = passes;
        self
    }

    /// Number of table units allowed in flight
    pub fn effective_concurrency(&self) -> usize {
        usize::try_from(self.concurrency_limit.max(1)).unwrap_or(1)
    }

    /// Whether `table` takes part in the run
    pub fn selects(&self, table: &Table) -> bool {
        if table.target_name.trim().is_empty() {
            return false;
        }
        self.table_filter
            .as_ref()
            .is_none_or(|filter| filter.is_match(&table.target_name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn table(name: &str) -> Table {
        Table {
            source_name: name.to_lowercase(),
            target_name: name.to_string(),
            description: String::new(),
            fields: vec![],
            primary_key: None,
            foreign_keys: vec![],
            field_filters: vec![],
            record_filter: None,
        }
    }

    #[test]
    fn test_effective_concurrency() {
        assert_eq!(ArchiveCommand::new().concurrency(0).effective_concurrency(), 1);
        assert_eq!(ArchiveCommand::new().concurrency(-3).effective_concurrency(), 1);
        assert_eq!(ArchiveCommand::new().concurrency(4).effective_concurrency(), 4);
    }

    #[test]
    fn test_selects() {
        let command = ArchiveCommand::new().with_table_filter("^PERS").unwrap();
        assert!(command.selects(&table("PERSON")));
        assert!(!command.selects(&table("ADDRESS")));
        assert!(!ArchiveCommand::new().selects(&table("  ")));
        assert!(ArchiveCommand::new().with_table_filter("(").is_err());
    }
}
