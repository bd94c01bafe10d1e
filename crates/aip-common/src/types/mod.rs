//! Domain model of an archival extraction
//!
//! A [`DataSource`] describes everything that goes into one package: the
//! archive identifier and period, the creators, the context documents and
//! the target tables. It is produced by a metadata provider and is read-only
//! to the engine, apart from the identifier override applied before archiving.
//!
//! Table data travels as [`DataBlock`]s, ordered chunks of rows for exactly one
//! table, the last of which carries `is_last_block`.

mod value;

pub use value::{format_duration, parse_duration, SqlType, Value};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{AipError, Result};

/// Full description of what is being archived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Archive identifier, e.g. `AVID.SA.18000`
    pub id: String,
    #[serde(default)]
    pub system_name: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub context_documents: Vec<ContextDocument>,
}

impl DataSource {
    /// Look a table up by its target name
    pub fn table(&self, target_name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.target_name == target_name)
    }

    /// Check the description for internal consistency
    ///
    /// Every key column must name a field of its table and every foreign key
    /// must reference a known target table.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AipError::metadata("Archive identifier is empty"));
        }
        if self.period_end < self.period_start {
            return Err(AipError::metadata(format!(
                "Archive period ends ({}) before it starts ({})",
                self.period_end, self.period_start
            )));
        }

        let targets: HashSet<&str> = self.tables.iter().map(|t| t.target_name.as_str()).collect();
        for table in &self.tables {
            table.validate()?;
            for fk in &table.foreign_keys {
                if !targets.contains(fk.referenced_table.as_str()) {
                    return Err(AipError::metadata(format!(
                        "Foreign key {} on {} references unknown table {}",
                        fk.name, table.target_name, fk.referenced_table
                    )));
                }
            }
        }

        let mut doc_ids = HashSet::new();
        for doc in &self.context_documents {
            if !doc_ids.insert(doc.id) {
                return Err(AipError::metadata(format!("Duplicate context document id {}", doc.id)));
            }
        }

        Ok(())
    }
}

/// Archive creator and the period it was responsible for the data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub name: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// Context document, copied into the package as one or more files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

/// A target table and how its source is read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub source_name: String,
    /// Name in the archive; the table's stable identity
    pub target_name: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Fields read from the source but left out of the archive
    #[serde(default)]
    pub field_filters: Vec<String>,
    /// Opaque row selection handed to the data provider
    #[serde(default)]
    pub record_filter: Option<String>,
}

impl Table {
    pub fn is_filtered(&self, field_name: &str) -> bool {
        self.field_filters.iter().any(|f| f == field_name)
    }

    /// Fields that become archive columns, with their position in a row
    pub fn archived_fields(&self) -> impl Iterator<Item = (usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !self.is_filtered(&f.name))
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(AipError::metadata(format!(
                    "Duplicate field {} in table {}",
                    field.name, self.target_name
                )));
            }
        }

        let archived = |column: &str| self.field_index(column).is_some() && !self.is_filtered(column);

        if let Some(pk) = &self.primary_key {
            if let Some(missing) = pk.columns.iter().find(|c| !archived(c.as_str())) {
                return Err(AipError::metadata(format!(
                    "Primary key {} of {} names unknown or filtered column {}",
                    pk.name, self.target_name, missing
                )));
            }
        }
        for fk in &self.foreign_keys {
            if let Some(missing) = fk.references.iter().find(|r| !archived(r.column.as_str())) {
                return Err(AipError::metadata(format!(
                    "Foreign key {} of {} names unknown or filtered column {}",
                    fk.name, self.target_name, missing.column
                )));
            }
        }
        Ok(())
    }
}

/// Source field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub sql_type: SqlType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub description: String,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub referenced_table: String,
    pub references: Vec<ColumnReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnReference {
    pub column: String,
    pub referenced: String,
}

/// One source row, aligned with [`Table::fields`]
pub type Row = Vec<Value>;

/// An ordered chunk of rows for one table
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    /// Target name of the table the rows belong to
    pub table: String,
    pub rows: Vec<Row>,
    pub is_last_block: bool,
}

impl DataBlock {
    pub fn new(table: impl Into<String>, rows: Vec<Row>, is_last_block: bool) -> Self {
        Self {
            table: table.into(),
            rows,
            is_last_block,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop rows by position; out of range and repeated positions are ignored
    ///
    /// Returns the number of rows actually removed.
    pub fn remove_rows(&mut self, positions: &[usize]) -> usize {
        let doomed: HashSet<usize> = positions.iter().copied().filter(|p| *p < self.rows.len()).collect();
        if doomed.is_empty() {
            return 0;
        }
        let mut index = 0;
        self.rows.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });
        doomed.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn person() -> Table {
        Table {
            source_name: "dbo.person".into(),
            target_name: "PERSON".into(),
            description: "People".into(),
            fields: vec![
                Field {
                    name: "id".into(),
                    sql_type: SqlType::Integer,
                    nullable: false,
                    description: String::new(),
                },
                Field {
                    name: "name".into(),
                    sql_type: SqlType::NationalCharacterVarying { length: 40 },
                    nullable: true,
                    description: String::new(),
                },
                Field {
                    name: "secret".into(),
                    sql_type: SqlType::NationalCharacterVarying { length: 40 },
                    nullable: true,
                    description: String::new(),
                },
            ],
            primary_key: Some(PrimaryKey {
                name: "pk_person".into(),
                columns: vec!["id".into()],
            }),
            foreign_keys: vec![],
            field_filters: vec!["secret".into()],
            record_filter: None,
        }
    }

    fn source(tables: Vec<Table>) -> DataSource {
        DataSource {
            id: "AVID.SA.18000".into(),
            system_name: "HR".into(),
            period_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
            creators: vec![],
            tables,
            context_documents: vec![],
        }
    }

    #[test]
    fn test_archived_fields_skip_filters() {
        let table = person();
        let names: Vec<_> = table.archived_fields().map(|(i, f)| (i, f.name.as_str())).collect();
        assert_eq!(names, vec![(0, "id"), (1, "name")]);
    }

    #[test]
    fn test_validate_rejects_filtered_key_column() {
        let mut table = person();
        table.primary_key = Some(PrimaryKey {
            name: "pk".into(),
            columns: vec!["secret".into()],
        });
        assert!(source(vec![table]).validate().is_err());
        assert!(source(vec![person()]).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_fk_target() {
        let mut table = person();
        table.foreign_keys.push(ForeignKey {
            name: "fk_dept".into(),
            referenced_table: "DEPARTMENT".into(),
            references: vec![ColumnReference {
                column: "id".into(),
                referenced: "person_id".into(),
            }],
        });
        let err = source(vec![table]).validate().unwrap_err();
        assert!(err.to_string().contains("DEPARTMENT"));
    }

    #[test]
    fn test_remove_rows() {
        let rows = (0..5).map(|i| vec![Value::Integer(i)]).collect();
        let mut block = DataBlock::new("PERSON", rows, false);
        assert_eq!(block.remove_rows(&[1, 3, 3, 99]), 2);
        let left: Vec<_> = block.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(left, vec![Value::Integer(0), Value::Integer(2), Value::Integer(4)]);
    }

    #[test]
    fn test_data_source_from_json() {
        let json = r#"{
            "id": "AVID.SA.18001",
            "period_start": "2019-01-01",
            "period_end": "2019-12-31",
            "tables": [{
                "source_name": "t",
                "target_name": "T",
                "fields": [{ "name": "amount", "sql_type": "DECIMAL(8,2)" }]
            }]
        }"#;
        let ds: DataSource = serde_json::from_str(json).unwrap();
        let field = &ds.tables[0].fields[0];
        assert!(field.nullable);
        assert_eq!(field.sql_type, SqlType::Decimal { precision: 8, scale: 2 });
    }
}
