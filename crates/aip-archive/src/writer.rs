//! Table schema and data files
//!
//! The first non-empty block of a table allocates its ordinal, creates the
//! `table<k>` folder and writes `table<k>.xsd`. Every non-empty block is then
//! appended to `table<k>.xml`.
//!
//! The data file is kept well-formed between blocks: the writer remembers the
//! byte offset where the row body ends, and each append overwrites the closing
//! `</table>` tag from that offset, writes the new rows and closes the document
//! again. Rows are checked against the schema before the file is touched.

use aip_common::types::{DataBlock, Row, Table};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, IoContext, Result};
use crate::layout::ArchiveLayout;
use crate::schema::{table_namespace, TableSchema};
use crate::xml::{XmlWriter, XSI_NAMESPACE};

const TABLE_CLOSE: &[u8] = b"</table>\n";

/// Append handle on `table<k>.xml`
#[derive(Debug)]
pub struct TableDataFile {
    path: PathBuf,
    body_end: u64,
}

impl TableDataFile {
    /// Create an empty, well-formed data file
    pub fn create(path: &Path, ordinal: u32) -> Result<Self> {
        let namespace = table_namespace(ordinal);
        let location = format!("{namespace} table{ordinal}.xsd");

        let file = File::create(path).at(path)?;
        let mut xml = XmlWriter::wrap(BufWriter::new(file), path, false);
        xml.declaration()?;
        xml.newline()?;
        xml.start(
            "table",
            &[
                ("xmlns", namespace.as_str()),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", location.as_str()),
            ],
        )?;
        xml.newline()?;

        let mut data = Self {
            path: path.to_path_buf(),
            body_end: 0,
        };
        let file = into_file(xml.into_inner(), path)?;
        data.close(file)?;
        Ok(data)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows, one `<row>` per line
    pub fn append(&mut self, schema: &TableSchema, rows: &[Row]) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path).at(&self.path)?;
        file.seek(SeekFrom::Start(self.body_end)).at(&self.path)?;

        let mut xml = XmlWriter::wrap(BufWriter::new(file), &self.path, false);
        for row in rows {
            xml.start("row", &[])?;
            for column in &schema.columns {
                match row[column.field_index].to_xml_text() {
                    Some(text) => xml.leaf(&column.id, &text)?,
                    None => xml.empty(&column.id, &[("xsi:nil", "true")])?,
                }
            }
            xml.end("row")?;
            xml.newline()?;
        }

        let file = into_file(xml.into_inner(), &self.path)?;
        self.close(file)
    }

    /// Record the end of the row body and write the closing tag after it
    fn close(&mut self, mut file: File) -> Result<()> {
        self.body_end = file.stream_position().at(&self.path)?;
        file.write_all(TABLE_CLOSE).at(&self.path)?;
        file.set_len(self.body_end + TABLE_CLOSE.len() as u64).at(&self.path)?;
        file.sync_data().at(&self.path)?;
        Ok(())
    }
}

fn into_file(writer: BufWriter<File>, path: &Path) -> Result<File> {
    writer.into_inner().map_err(|e| e.into_error()).at(path)
}

/// Everything the writer keeps about one archived table
#[derive(Debug)]
pub struct TableArchiveState {
    pub table: String,
    pub ordinal: u32,
    pub schema: TableSchema,
    pub schema_path: PathBuf,
    pub data: TableDataFile,
    /// Rows appended to the data file so far
    pub rows: u64,
}

/// Files touched by one [`TableWriter::write_block`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWrite {
    pub ordinal: u32,
    /// The block created the table's folder and schema
    pub first_sight: bool,
    pub schema_path: PathBuf,
    pub data_path: PathBuf,
    pub rows: u64,
}

impl BlockWrite {
    /// Files whose content changed
    pub fn written_files(&self) -> Vec<&Path> {
        if self.first_sight {
            vec![self.schema_path.as_path(), self.data_path.as_path()]
        } else {
            vec![self.data_path.as_path()]
        }
    }
}

#[derive(Debug, Default)]
pub struct TableWriter {
    states: BTreeMap<String, TableArchiveState>,
    last_ordinal: u32,
}

impl TableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist one block; `Ok(None)` for an empty block
    pub fn write_block(&mut self, layout: &ArchiveLayout, table: &Table, block: &DataBlock) -> Result<Option<BlockWrite>> {
        if block.is_empty() {
            return Ok(None);
        }
        if block.table != table.target_name {
            return Err(ArchiveError::invariant(format!(
                "block for {} handed to writer of {}",
                block.table, table.target_name
            )));
        }

        let first_sight = !self.states.contains_key(&table.target_name);
        if first_sight {
            let schema = TableSchema::for_table(table);
            schema.check_rows(&block.rows)?;
            let state = self.create_table(layout, table, schema)?;
            self.states.insert(table.target_name.clone(), state);
        }

        let state = self
            .states
            .get_mut(&table.target_name)
            .ok_or_else(|| ArchiveError::invariant(format!("no state for {}", table.target_name)))?;
        if !first_sight {
            state.schema.check_rows(&block.rows)?;
        }

        state.data.append(&state.schema, &block.rows)?;
        state.rows += block.len() as u64;

        tracing::debug!(
            table = %state.table,
            ordinal = state.ordinal,
            rows = block.len(),
            total = state.rows,
            "Appended block"
        );

        Ok(Some(BlockWrite {
            ordinal: state.ordinal,
            first_sight,
            schema_path: state.schema_path.clone(),
            data_path: state.data.path().to_path_buf(),
            rows: block.len() as u64,
        }))
    }

    fn create_table(&mut self, layout: &ArchiveLayout, table: &Table, schema: TableSchema) -> Result<TableArchiveState> {
        let ordinal = self.last_ordinal + 1;
        let dir = layout.table_dir(ordinal);
        std::fs::create_dir_all(&dir).at(&dir)?;

        let schema_path = layout.table_schema_path(ordinal);
        schema.write_xsd(&schema_path, ordinal)?;
        let data = TableDataFile::create(&layout.table_data_path(ordinal), ordinal)?;
        self.last_ordinal = ordinal;

        tracing::info!(table = %table.target_name, ordinal, "Created table folder");
        Ok(TableArchiveState {
            table: table.target_name.clone(),
            ordinal,
            schema,
            schema_path,
            data,
            rows: 0,
        })
    }

    pub fn state(&self, table: &str) -> Option<&TableArchiveState> {
        self.states.get(table)
    }

    /// States ordered by ordinal
    pub fn states_in_order(&self) -> Vec<&TableArchiveState> {
        let mut states: Vec<_> = self.states.values().collect();
        states.sort_by_key(|s| s.ordinal);
        states
    }
}
