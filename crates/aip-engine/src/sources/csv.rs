//! Table data read from CSV exports
//!
//! Each table is read from `<data dir>/<source name>.csv`. The header row
//! names the columns; every field of the table must be present, in any
//! order. Values are parsed by field type, empty cells become null.

use aip_common::types::{DataBlock, DataSource, Row, SqlType, Table, Value};
use async_trait::async_trait;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use std::path::PathBuf;
use tokio::fs::File;

use crate::collaborators::{BlockStream, DataProvider};
use crate::error::{EngineError, RecoverableError, RecoverableKind, Result};

pub const DEFAULT_BLOCK_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    data_dir: PathBuf,
    block_size: usize,
    delimiter: u8,
}

impl CsvDataProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            delimiter: b',',
        }
    }

    /// Source records per block (at least one)
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn table_path(&self, table: &Table) -> PathBuf {
        self.data_dir.join(format!("{}.csv", table.source_name))
    }
}

#[async_trait]
impl DataProvider for CsvDataProvider {
    async fn open_table(&self, table: &Table, _source: &DataSource) -> Result<Box<dyn BlockStream>> {
        let path = self.table_path(table);
        let file = File::open(&path)
            .await
            .map_err(|e| EngineError::data_source(&table.target_name, format!("{}: {e}", path.display())))?;

        let mut reader = AsyncReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .create_reader(file);
        let headers = reader
            .headers()
            .await
            .map_err(|e| EngineError::data_source(&table.target_name, e))?
            .clone();

        let mut columns = Vec::with_capacity(table.fields.len());
        for field in &table.fields {
            let index = headers.iter().position(|h| h.trim() == field.name).ok_or_else(|| {
                EngineError::data_source(
                    &table.target_name,
                    format!("{} has no column {}", path.display(), field.name),
                )
            })?;
            columns.push((index, field.sql_type.clone()));
        }

        if let Some(filter) = &table.record_filter {
            tracing::warn!(table = %table.target_name, %filter, "Record filters are not applied to CSV sources");
        }
        tracing::debug!(table = %table.target_name, path = %path.display(), "Opened CSV source");

        Ok(Box::new(CsvBlockStream {
            reader,
            table: table.target_name.clone(),
            columns,
            block_size: self.block_size,
            record_number: 0,
            pending: None,
            finished: false,
            errors: Vec::new(),
        }))
    }
}

struct CsvBlockStream {
    reader: AsyncReader<File>,
    table: String,
    /// CSV column index and type of each table field, in field order
    columns: Vec<(usize, SqlType)>,
    block_size: usize,
    /// Data records read so far
    record_number: usize,
    /// One record of lookahead to detect the last block
    pending: Option<StringRecord>,
    finished: bool,
    errors: Vec<RecoverableError>,
}

impl CsvBlockStream {
    async fn read(&mut self) -> Result<Option<StringRecord>> {
        let mut record = StringRecord::new();
        let more = self
            .reader
            .read_record(&mut record)
            .await
            .map_err(|e| EngineError::data_source(&self.table, e))?;
        Ok(more.then_some(record))
    }

    fn convert(&self, record: &StringRecord) -> std::result::Result<Row, String> {
        self.columns
            .iter()
            .map(|(index, sql_type)| {
                let text = record.get(*index).unwrap_or_default();
                Value::parse(text, sql_type).map_err(|e| format!("column {}: {e}", index + 1))
            })
            .collect()
    }
}

#[async_trait]
impl BlockStream for CsvBlockStream {
    async fn next_block(&mut self) -> Result<Option<DataBlock>> {
        if self.finished {
            return Ok(None);
        }

        let mut rows = Vec::new();
        let mut consumed = 0;
        let mut at_end = false;
        while consumed < self.block_size {
            let record = match self.pending.take() {
                Some(record) => record,
                None => match self.read().await? {
                    Some(record) => record,
                    None => {
                        at_end = true;
                        break;
                    }
                },
            };
            consumed += 1;
            let number = self.record_number;
            self.record_number += 1;

            match self.convert(&record) {
                Ok(row) => rows.push(row),
                Err(reason) => self.errors.push(RecoverableError::new(
                    RecoverableKind::Convert,
                    &self.table,
                    vec![number],
                    format!("record {}: {reason}", number + 1),
                )),
            }
        }

        if !at_end {
            match self.read().await? {
                Some(record) => self.pending = Some(record),
                None => at_end = true,
            }
        }
        self.finished = at_end;

        Ok(Some(DataBlock::new(self.table.clone(), rows, at_end)))
    }

    fn drain_errors(&mut self) -> Vec<RecoverableError> {
        std::mem::take(&mut self.errors)
    }
}
