//! Built-in validators

use aip_common::types::{DataBlock, Table, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Mutex;

use crate::collaborators::{ValidationContext, Validator};
use crate::error::{EngineError, RecoverableError, RecoverableKind, Result};

/// Rows between cancellation checks
const CHECK_INTERVAL: usize = 1024;

fn check_alive(ctx: &ValidationContext, position: usize) -> Result<()> {
    if position % CHECK_INTERVAL == 0 && !ctx.is_alive() {
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

/// Rejects nulls in archived non-nullable columns
#[derive(Debug, Default, Clone, Copy)]
pub struct NotNullValidator;

impl Validator for NotNullValidator {
    fn name(&self) -> &str {
        "not-null"
    }

    fn validate(&self, table: &Table, block: &DataBlock, _is_last_block: bool, ctx: &ValidationContext) -> Result<()> {
        let required: Vec<(usize, &str)> = table
            .archived_fields()
            .filter(|(_, f)| !f.nullable)
            .map(|(i, f)| (i, f.name.as_str()))
            .collect();
        if required.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::new();
        let mut columns = HashSet::new();
        for (position, row) in block.rows.iter().enumerate() {
            check_alive(ctx, position)?;
            for (index, name) in &required {
                if row.get(*index).is_none_or(Value::is_null) {
                    rows.push(position);
                    columns.insert(*name);
                    break;
                }
            }
        }

        if rows.is_empty() {
            return Ok(());
        }
        let mut columns: Vec<_> = columns.into_iter().collect();
        columns.sort_unstable();
        Err(RecoverableError::new(
            RecoverableKind::Validate,
            &table.target_name,
            rows,
            format!("null in non-nullable column(s) {}", columns.join(", ")),
        )
        .into())
    }
}

/// Key parts in key column order; `None` for a null part
type Key = Vec<Option<String>>;

/// Rejects rows repeating a primary key, within a block or across blocks
///
/// Keys become visible to later blocks only once their block is committed,
/// so revalidating a block never trips over its own keys.
#[derive(Debug, Default)]
pub struct PrimaryKeyValidator {
    committed: Mutex<HashMap<String, HashSet<Key>>>,
}

impl PrimaryKeyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_columns(table: &Table) -> Option<Vec<usize>> {
        let pk = table.primary_key.as_ref()?;
        pk.columns.iter().map(|c| table.field_index(c)).collect()
    }

    fn key(row: &[Value], columns: &[usize]) -> Key {
        columns
            .iter()
            .map(|&i| row.get(i).and_then(Value::to_xml_text))
            .collect()
    }
}

impl Validator for PrimaryKeyValidator {
    fn name(&self) -> &str {
        "primary-key"
    }

    fn validate(&self, table: &Table, block: &DataBlock, _is_last_block: bool, ctx: &ValidationContext) -> Result<()> {
        let Some(columns) = Self::key_columns(table) else {
            return Ok(());
        };

        let committed = self.committed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = committed.get(&table.target_name);

        let mut in_block = HashSet::new();
        let mut rows = Vec::new();
        for (position, row) in block.rows.iter().enumerate() {
            check_alive(ctx, position)?;
            let key = Self::key(row, &columns);
            let seen_before = previous.is_some_and(|keys| keys.contains(&key));
            if seen_before || !in_block.insert(key) {
                rows.push(position);
            }
        }

        if rows.is_empty() {
            return Ok(());
        }
        Err(RecoverableError::new(
            RecoverableKind::Validate,
            &table.target_name,
            rows,
            "duplicate primary key",
        )
        .into())
    }

    fn commit(&self, table: &Table, block: &DataBlock) {
        let Some(columns) = Self::key_columns(table) else {
            return;
        };
        let mut committed = self.committed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let keys = committed.entry(table.target_name.clone()).or_default();
        keys.extend(block.rows.iter().map(|row| Self::key(row, &columns)));
    }
}

/// Names accepted by [`ValidatorKind::from_str`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorKind {
    NotNull,
    PrimaryKey,
}

impl ValidatorKind {
    pub fn build(self) -> std::sync::Arc<dyn Validator> {
        match self {
            ValidatorKind::NotNull => std::sync::Arc::new(NotNullValidator),
            ValidatorKind::PrimaryKey => std::sync::Arc::new(PrimaryKeyValidator::new()),
        }
    }
}

impl FromStr for ValidatorKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "not-null" | "notnull" => Ok(ValidatorKind::NotNull),
            "primary-key" | "pk" => Ok(ValidatorKind::PrimaryKey),
            other => Err(EngineError::config(format!("Unknown validator: {other}"))),
        }
    }
}
