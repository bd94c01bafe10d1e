//! Package index documents
//!
//! All four indices live in `Indices/` and are rewritten whole on every
//! persist. They are plain functions over the repository state so the
//! repository decides when each one is refreshed.

use aip_common::types::{ContextDocument, DataSource, Table};
use std::path::Path;

use crate::error::Result;
use crate::ledger::ChecksumEntry;
use crate::writer::TableArchiveState;
use crate::xml::{XmlWriter, XSI_NAMESPACE};

pub const INDEX_NAMESPACE: &str = "http://www.sa.dk/xmlns/diark/1.0";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn open_root(path: &Path, root: &str, schema_file: &str) -> Result<XmlWriter<std::io::BufWriter<std::fs::File>>> {
    let location = format!("{INDEX_NAMESPACE} ../Schemas/standard/{schema_file}");
    let mut xml = XmlWriter::create(path)?;
    xml.start(
        root,
        &[
            ("xmlns", INDEX_NAMESPACE),
            ("xmlns:xsi", XSI_NAMESPACE),
            ("xsi:schemaLocation", location.as_str()),
        ],
    )?;
    Ok(xml)
}

/// `archiveIndex.xml`
pub fn write_archive_index(path: &Path, source: &DataSource) -> Result<()> {
    let mut xml = open_root(path, "archiveIndex", "archiveIndex.xsd")?;

    xml.leaf("archiveInformationPackageID", &source.id)?;
    xml.leaf("archivePeriodStart", &source.period_start.format(DATE_FORMAT).to_string())?;
    xml.leaf("archivePeriodEnd", &source.period_end.format(DATE_FORMAT).to_string())?;
    xml.leaf("systemName", &source.system_name)?;

    xml.start("archiveCreatorList", &[])?;
    for creator in &source.creators {
        xml.leaf("creatorName", &creator.name)?;
        xml.leaf("creationPeriodStart", &creator.period_start.format(DATE_FORMAT).to_string())?;
        xml.leaf("creationPeriodEnd", &creator.period_end.format(DATE_FORMAT).to_string())?;
    }
    xml.end("archiveCreatorList")?;

    xml.leaf("containsDigitalDocuments", "false")?;

    xml.end("archiveIndex")?;
    xml.finish()
}

/// One archived table with its cumulative row count
#[derive(Debug, Clone, Copy)]
pub struct TableIndexEntry<'a> {
    pub table: &'a Table,
    pub state: &'a TableArchiveState,
    pub rows: u64,
}

/// `tableIndex.xml`; only tables that received data are listed
pub fn write_table_index(path: &Path, source: &DataSource, tables: &[TableIndexEntry<'_>]) -> Result<()> {
    let mut xml = open_root(path, "siardDiark", "tableIndex.xsd")?;

    xml.leaf("version", "1.0")?;
    xml.leaf("dbName", &source.system_name)?;

    xml.start("tables", &[])?;
    for entry in tables {
        write_table(&mut xml, entry)?;
    }
    xml.end("tables")?;

    xml.end("siardDiark")?;
    xml.finish()
}

fn write_table<W: std::io::Write>(xml: &mut XmlWriter<W>, entry: &TableIndexEntry<'_>) -> Result<()> {
    let table = entry.table;
    xml.start("table", &[])?;
    xml.leaf("name", &table.target_name)?;
    xml.leaf("folder", &crate::layout::ArchiveLayout::table_folder_name(entry.state.ordinal))?;
    xml.leaf("description", &table.description)?;

    xml.start("columns", &[])?;
    for column in &entry.state.schema.columns {
        xml.start("column", &[])?;
        xml.leaf("name", &column.name)?;
        xml.leaf("columnID", &column.id)?;
        xml.leaf("type", &column.sql_type.to_string())?;
        xml.leaf("nullable", if column.nullable { "true" } else { "false" })?;
        xml.leaf("description", &column.description)?;
        xml.end("column")?;
    }
    xml.end("columns")?;

    if let Some(pk) = &table.primary_key {
        xml.start("primaryKey", &[])?;
        xml.leaf("name", &pk.name)?;
        for column in &pk.columns {
            xml.leaf("column", column)?;
        }
        xml.end("primaryKey")?;
    }

    if !table.foreign_keys.is_empty() {
        xml.start("foreignKeys", &[])?;
        for fk in &table.foreign_keys {
            xml.start("foreignKey", &[])?;
            xml.leaf("name", &fk.name)?;
            xml.leaf("referencedTable", &fk.referenced_table)?;
            for reference in &fk.references {
                xml.start("reference", &[])?;
                xml.leaf("column", &reference.column)?;
                xml.leaf("referenced", &reference.referenced)?;
                xml.end("reference")?;
            }
            xml.end("foreignKey")?;
        }
        xml.end("foreignKeys")?;
    }

    xml.leaf("rows", &entry.rows.to_string())?;
    xml.end("table")
}

/// `fileIndex.xml`; lists every registered file except itself
pub fn write_file_index(path: &Path, entries: &[ChecksumEntry]) -> Result<()> {
    let mut xml = open_root(path, "fileIndex", "fileIndex.xsd")?;
    for entry in entries {
        xml.start("f", &[])?;
        xml.leaf("foN", &entry.folder)?;
        xml.leaf("fiN", &entry.file_name)?;
        xml.leaf("md5", &entry.md5)?;
        xml.end("f")?;
    }
    xml.end("fileIndex")?;
    xml.finish()
}

/// `contextDocumentationIndex.xml`
pub fn write_context_documentation_index(path: &Path, documents: &[ContextDocument]) -> Result<()> {
    let mut xml = open_root(path, "contextDocumentationIndex", "contextDocumentationIndex.xsd")?;
    for doc in documents {
        xml.start("document", &[])?;
        xml.leaf("documentID", &doc.id.to_string())?;
        xml.leaf("documentTitle", &doc.title)?;
        if let Some(date) = doc.date {
            xml.leaf("documentDate", &date.format(DATE_FORMAT).to_string())?;
        }
        xml.leaf("documentFiles", &doc.files.len().to_string())?;
        xml.end("document")?;
    }
    xml.end("contextDocumentationIndex")?;
    xml.finish()
}
