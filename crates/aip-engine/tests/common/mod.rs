//! In-memory collaborators shared by the engine tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use aip_archive::ArchiveRepository;
use aip_common::types::{DataBlock, DataSource, Field, PrimaryKey, Row, SqlType, Table, Value};
use aip_engine::{
    BlockStream, DataProvider, EngineError, ExceptionHandler, MetadataProvider, Phase, PhaseListener, Result,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn table(name: &str) -> Table {
    Table {
        source_name: name.to_lowercase(),
        target_name: name.to_string(),
        description: format!("{name} table"),
        fields: vec![
            Field {
                name: "id".into(),
                sql_type: SqlType::Integer,
                nullable: false,
                description: String::new(),
            },
            Field {
                name: "name".into(),
                sql_type: SqlType::NationalCharacterVarying { length: 50 },
                nullable: true,
                description: String::new(),
            },
        ],
        primary_key: Some(PrimaryKey {
            name: format!("PK_{name}"),
            columns: vec!["id".into()],
        }),
        foreign_keys: vec![],
        field_filters: vec![],
        record_filter: None,
    }
}

pub fn data_source(tables: &[&str]) -> DataSource {
    DataSource {
        id: "AVID.SA.18000".into(),
        system_name: "Test system".into(),
        period_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        period_end: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
        creators: vec![],
        tables: tables.iter().map(|t| table(t)).collect(),
        context_documents: vec![],
    }
}

pub fn rows(ids: std::ops::Range<i64>) -> Vec<Row> {
    ids.map(|i| vec![Value::Integer(i), Value::String(format!("row {i}"))])
        .collect()
}

pub fn repository(root: &std::path::Path) -> Arc<Mutex<ArchiveRepository>> {
    Arc::new(Mutex::new(ArchiveRepository::new(root)))
}

pub struct StaticMetadata(pub DataSource);

#[async_trait]
impl MetadataProvider for StaticMetadata {
    async fn data_source(&self) -> Result<DataSource> {
        Ok(self.0.clone())
    }
}

pub struct FailingMetadata;

#[async_trait]
impl MetadataProvider for FailingMetadata {
    async fn data_source(&self) -> Result<DataSource> {
        Err(EngineError::metadata("metadata store unreachable"))
    }
}

/// Blocks a table stream hands out, in order
#[derive(Debug, Clone, Default)]
pub struct TableScript {
    pub blocks: Vec<Vec<Row>>,
    /// Pull number (0-based) that fails instead of returning a block
    pub fail_at: Option<usize>,
    pub delay: Duration,
}

impl TableScript {
    pub fn blocks(blocks: Vec<Vec<Row>>) -> Self {
        Self {
            blocks,
            ..Default::default()
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_at(mut self, pull: usize) -> Self {
        self.fail_at = Some(pull);
        self
    }
}

#[derive(Default)]
pub struct ScriptedProvider {
    scripts: HashMap<String, TableScript>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    pulls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: &str, script: TableScript) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn open_table(&self, table: &Table, _source: &DataSource) -> Result<Box<dyn BlockStream>> {
        let script = self.scripts.get(&table.target_name).cloned().unwrap_or_default();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(ScriptedStream {
            table: table.target_name.clone(),
            blocks: script.blocks.into_iter().collect(),
            pull: 0,
            fail_at: script.fail_at,
            delay: script.delay,
            in_flight: Arc::clone(&self.in_flight),
            pulls: Arc::clone(&self.pulls),
            exhausted: false,
        }))
    }
}

struct ScriptedStream {
    table: String,
    blocks: VecDeque<Vec<Row>>,
    pull: usize,
    fail_at: Option<usize>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    pulls: Arc<AtomicUsize>,
    exhausted: bool,
}

#[async_trait]
impl BlockStream for ScriptedStream {
    async fn next_block(&mut self) -> Result<Option<DataBlock>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let pull = self.pull;
        self.pull += 1;
        self.pulls.fetch_add(1, Ordering::SeqCst);

        if self.fail_at == Some(pull) {
            return Err(EngineError::data_source(&self.table, "scripted failure"));
        }
        if self.exhausted {
            return Ok(None);
        }
        let rows = self.blocks.pop_front().unwrap_or_default();
        self.exhausted = self.blocks.is_empty();
        Ok(Some(DataBlock::new(self.table.clone(), rows, self.exhausted)))
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Records every phase in order
#[derive(Default)]
pub struct RecordingListener {
    pub phases: Mutex<Vec<Phase>>,
}

impl RecordingListener {
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.lock().unwrap().clone()
    }
}

impl PhaseListener for RecordingListener {
    fn before(&self, phase: &Phase) {
        self.phases.lock().unwrap().push(phase.clone());
    }
}

/// Counts reports; optionally snapshots a table's archived rows when called
pub struct RecordingHandler {
    pub allow_recoverable: bool,
    pub reports: Mutex<Vec<String>>,
    watch: Option<(Arc<Mutex<ArchiveRepository>>, String)>,
    pub snapshots: Mutex<Vec<u64>>,
}

impl RecordingHandler {
    pub fn new(allow_recoverable: bool) -> Self {
        Self {
            allow_recoverable,
            reports: Mutex::new(Vec::new()),
            watch: None,
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub fn watching(mut self, repository: Arc<Mutex<ArchiveRepository>>, table: &str) -> Self {
        self.watch = Some((repository, table.to_string()));
        self
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

impl ExceptionHandler for RecordingHandler {
    fn handle(&self, error: &EngineError) -> bool {
        self.reports.lock().unwrap().push(error.to_string());
        if let Some((repository, table)) = &self.watch {
            let rows = repository.lock().unwrap().row_count(table);
            self.snapshots.lock().unwrap().push(rows);
        }
        matches!(error, EngineError::Recoverable(_)) && self.allow_recoverable
    }
}
