//! Table schemas
//!
//! A [`TableSchema`] is derived once from a table description: one column per
//! archived field, in field order, with the deterministic ids `c1..cn`. It
//! renders the per-table XSD and checks rows before they reach the data file.

use aip_common::types::{Row, SqlType, Table};
use std::path::Path;

use crate::error::{ArchiveError, Result};
use crate::xml::{XmlWriter, XS_NAMESPACE};

const TABLE_NAMESPACE_BASE: &str = "http://www.sa.dk/xmlns/siard/1.0/schema0";

/// Target namespace of `table<k>.xsd`
pub fn table_namespace(ordinal: u32) -> String {
    format!("{TABLE_NAMESPACE_BASE}/table{ordinal}.xsd")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// `c<n>`
    pub id: String,
    pub name: String,
    /// Position of the source field within a row
    pub field_index: usize,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<Column>,
    /// Number of values every source row must carry
    pub row_width: usize,
}

impl TableSchema {
    pub fn for_table(table: &Table) -> Self {
        let columns = table
            .archived_fields()
            .enumerate()
            .map(|(n, (field_index, field))| Column {
                id: format!("c{}", n + 1),
                name: field.name.clone(),
                field_index,
                sql_type: field.sql_type.clone(),
                nullable: field.nullable,
                description: field.description.clone(),
            })
            .collect();

        Self {
            table: table.target_name.clone(),
            columns,
            row_width: table.fields.len(),
        }
    }

    /// Check every row of a block; nothing is written if any row fails
    pub fn check_rows(&self, rows: &[Row]) -> Result<()> {
        for (position, row) in rows.iter().enumerate() {
            if row.len() != self.row_width {
                return Err(self.violation(
                    position,
                    "*",
                    format!("row has {} values, expected {}", row.len(), self.row_width),
                ));
            }
            for column in &self.columns {
                let value = &row[column.field_index];
                if value.is_null() && !column.nullable {
                    return Err(self.violation(position, &column.name, "null in non-nullable column".into()));
                }
                value
                    .conforms_to(&column.sql_type)
                    .map_err(|reason| self.violation(position, &column.name, reason))?;
            }
        }
        Ok(())
    }

    fn violation(&self, row: usize, column: &str, reason: String) -> ArchiveError {
        ArchiveError::SchemaViolation {
            table: self.table.clone(),
            row,
            column: column.to_string(),
            reason,
        }
    }

    /// Write `table<k>.xsd`
    pub fn write_xsd(&self, path: &Path, ordinal: u32) -> Result<()> {
        let namespace = table_namespace(ordinal);
        let mut xml = XmlWriter::create(path)?;

        xml.start(
            "xs:schema",
            &[
                ("xmlns:xs", XS_NAMESPACE),
                ("xmlns", namespace.as_str()),
                ("targetNamespace", namespace.as_str()),
                ("elementFormDefault", "qualified"),
                ("attributeFormDefault", "unqualified"),
            ],
        )?;

        xml.start("xs:element", &[("name", "table")])?;
        xml.start("xs:complexType", &[])?;
        xml.start("xs:sequence", &[])?;
        xml.empty(
            "xs:element",
            &[
                ("name", "row"),
                ("type", "rowType"),
                ("minOccurs", "0"),
                ("maxOccurs", "unbounded"),
            ],
        )?;
        xml.end("xs:sequence")?;
        xml.end("xs:complexType")?;
        xml.end("xs:element")?;

        xml.start("xs:complexType", &[("name", "rowType")])?;
        xml.start("xs:sequence", &[])?;
        for column in &self.columns {
            let mut attributes = vec![("name", column.id.as_str()), ("type", column.sql_type.xsd_type())];
            if column.nullable {
                attributes.push(("nillable", "true"));
            }
            xml.empty("xs:element", &attributes)?;
        }
        xml.end("xs:sequence")?;
        xml.end("xs:complexType")?;

        xml.end("xs:schema")?;
        xml.finish()
    }
}
