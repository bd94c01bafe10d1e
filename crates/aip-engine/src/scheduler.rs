//! Table scheduler
//!
//! Runs one unit of work per selected table, at most `max(1, limit)` at a
//! time. A unit pulls blocks from its stream one by one, validates each block
//! and hands it to the archive repository before asking for the next one.
//!
//! Archive writes run on the blocking pool under the repository mutex. The
//! run token is checked under that same lock, so once a failure has been
//! recorded no further archive write starts.

use aip_archive::{ArchiveRepository, PackageSummary};
use aip_common::types::{DataBlock, DataSource, Table};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::collaborators::{
    BlockStream, DataProvider, ExceptionHandler, LoggingExceptionHandler, MetadataProvider, Phase, PhaseListener,
    TracingPhaseListener, Validator,
};
use crate::command::ArchiveCommand;
use crate::error::{EngineError, Result};
use crate::sink::ErrorSink;
use crate::validation::ValidationStage;

/// Per-table counters of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRunStats {
    pub table: String,
    pub blocks: usize,
    /// Rows delivered by the data provider
    pub rows_read: usize,
    pub rows_archived: usize,
    /// Rows removed by validation (validation-only runs)
    pub rows_removed: usize,
    /// Source records that could not be converted
    pub conversion_errors: usize,
    /// Errors the exception handler allowed the run to continue past
    pub accepted_errors: usize,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub archive_id: String,
    pub validation_only: bool,
    /// In source order
    pub tables: Vec<TableRunStats>,
    /// Final package state; `None` for validation-only runs
    pub package: Option<PackageSummary>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn table(&self, name: &str) -> Option<&TableRunStats> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn rows_archived(&self) -> usize {
        self.tables.iter().map(|t| t.rows_archived).sum()
    }

    pub fn rows_removed(&self) -> usize {
        self.tables.iter().map(|t| t.rows_removed).sum()
    }
}

pub struct Engine {
    metadata: Arc<dyn MetadataProvider>,
    data: Arc<dyn DataProvider>,
    repository: Arc<Mutex<ArchiveRepository>>,
    validators: Vec<Arc<dyn Validator>>,
    handler: Arc<dyn ExceptionHandler>,
    listener: Arc<dyn PhaseListener>,
}

impl Engine {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        data: Arc<dyn DataProvider>,
        repository: Arc<Mutex<ArchiveRepository>>,
    ) -> Self {
        Self {
            metadata,
            data,
            repository,
            validators: Vec::new(),
            handler: Arc::new(LoggingExceptionHandler),
            listener: Arc::new(TracingPhaseListener),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_phase_listener(mut self, listener: Arc<dyn PhaseListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn repository(&self) -> &Arc<Mutex<ArchiveRepository>> {
        &self.repository
    }

    /// Run `command` to completion or first failure
    pub async fn execute(&self, command: &ArchiveCommand) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("archive_run", %run_id);
        self.run(run_id, command.clone()).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, command: ArchiveCommand) -> Result<RunSummary> {
        let started = Instant::now();
        let sink = Arc::new(ErrorSink::new(Arc::clone(&self.handler)));
        let command = Arc::new(command);

        let source = match self.prepare(&command, sink.token()).await {
            Ok(source) => Arc::new(source),
            Err(e) => return Err(surface(&sink, e)),
        };

        let tables = select_tables(&source, &command);
        let limit = command.effective_concurrency();
        tracing::info!(
            archive_id = %source.id,
            tables = tables.len(),
            limit,
            validation_only = command.validation_only,
            "Processing tables"
        );

        let unit = Arc::new(UnitContext {
            data: Arc::clone(&self.data),
            repository: Arc::clone(&self.repository),
            stage: ValidationStage::new(self.validators.clone(), Arc::clone(&self.handler)),
            handler: Arc::clone(&self.handler),
            listener: Arc::clone(&self.listener),
            sink: Arc::clone(&sink),
            command: Arc::clone(&command),
            source: Arc::clone(&source),
        });

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut units = JoinSet::new();
        for (position, table) in tables.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = sink.token().cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        sink.record(EngineError::invariant("table slot semaphore closed"));
                        break;
                    }
                },
            };

            let unit = Arc::clone(&unit);
            let span = tracing::info_span!("table", table = %table.target_name);
            units.spawn(
                async move {
                    let _permit = permit;
                    match unit.run_table(table).await {
                        Ok(stats) => Some((position, stats)),
                        Err(e) => {
                            unit.sink.record(e);
                            None
                        }
                    }
                }
                .instrument(span),
            );
        }

        let mut finished = Vec::new();
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Some(stats)) => finished.push(stats),
                Ok(None) => {}
                Err(e) => sink.record(EngineError::Task(e)),
            }
        }

        if let Some(error) = sink.take_first() {
            tracing::error!(error = %error, failures = sink.failure_count() + 1, "Run failed");
            return Err(error);
        }

        let package = if command.validation_only {
            None
        } else {
            let summary = with_repository(&self.repository, sink.token(), |repository| repository.finish())
                .await
                .map_err(|e| surface(&sink, e))?;
            Some(summary)
        };

        finished.sort_by_key(|(position, _)| *position);
        let summary = RunSummary {
            run_id,
            archive_id: source.id.clone(),
            validation_only: command.validation_only,
            tables: finished.into_iter().map(|(_, stats)| stats).collect(),
            package,
            duration: started.elapsed(),
        };

        tracing::info!(
            archive_id = %summary.archive_id,
            tables = summary.tables.len(),
            rows_archived = summary.rows_archived(),
            rows_removed = summary.rows_removed(),
            duration_ms = summary.duration.as_millis() as u64,
            "Run complete"
        );
        Ok(summary)
    }

    /// Fetch the data source, apply the id override and archive its metadata
    async fn prepare(&self, command: &ArchiveCommand, token: &CancellationToken) -> Result<DataSource> {
        self.listener.before(&Phase::GetDataSource);
        let mut source = self.metadata.data_source().await?;
        if let Some(id) = &command.archive_id {
            tracing::info!(from = %source.id, to = %id, "Overriding archive id");
            source.id = id.clone();
        }

        if !command.validation_only {
            self.listener.before(&Phase::ArchiveMetadata);
            let metadata = source.clone();
            with_repository(&self.repository, token, move |repository| {
                repository.archive_metadata(&metadata)
            })
            .await?;
        }
        Ok(source)
    }
}

/// Record `error` and return the failure the run reports
fn surface(sink: &ErrorSink, error: EngineError) -> EngineError {
    sink.record(error);
    sink.take_first().unwrap_or(EngineError::Cancelled)
}

/// Tables with a target name that pass the filter, first occurrence wins
fn select_tables(source: &DataSource, command: &ArchiveCommand) -> Vec<Arc<Table>> {
    let mut seen = HashSet::new();
    source
        .tables
        .iter()
        .filter(|t| command.selects(t))
        .filter(|t| seen.insert(t.target_name.clone()))
        .map(|t| Arc::new(t.clone()))
        .collect()
}

/// Run `f` on the blocking pool with exclusive access to the repository
///
/// Nothing is written once `token` is cancelled. A failed write cancels the
/// token before the lock is released.
async fn with_repository<T, F>(repository: &Arc<Mutex<ArchiveRepository>>, token: &CancellationToken, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut ArchiveRepository) -> aip_archive::Result<T> + Send + 'static,
{
    let repository = Arc::clone(repository);
    let token = token.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = repository
            .lock()
            .map_err(|_| EngineError::invariant("archive repository lock poisoned"))?;
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        f(&mut guard).map_err(|e| {
            token.cancel();
            EngineError::from(e)
        })
    })
    .await?
}

/// Everything a table unit shares with the other units
struct UnitContext {
    data: Arc<dyn DataProvider>,
    repository: Arc<Mutex<ArchiveRepository>>,
    stage: ValidationStage,
    handler: Arc<dyn ExceptionHandler>,
    listener: Arc<dyn PhaseListener>,
    sink: Arc<ErrorSink>,
    command: Arc<ArchiveCommand>,
    source: Arc<DataSource>,
}

impl UnitContext {
    async fn run_table(&self, table: Arc<Table>) -> Result<TableRunStats> {
        let name = table.target_name.clone();
        let token = self.sink.token();
        let mut stats = TableRunStats {
            table: name.clone(),
            ..Default::default()
        };

        self.listener.before(&Phase::GetDataForTable { table: name.clone() });
        let mut stream = self.data.open_table(&table, &self.source).await?;
        let mut next = self.fetch(stream.as_mut(), &mut stats).await?;

        while let Some(block) = next {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if block.table != name {
                return Err(EngineError::invariant(format!(
                    "stream for {name} produced a block for {}",
                    block.table
                )));
            }
            let is_last_block = block.is_last_block;
            stats.blocks += 1;
            stats.rows_read += block.len();

            let block = if self.stage.is_empty() {
                block
            } else {
                self.listener.before(&Phase::ValidateDataForTable { table: name.clone() });
                let outcome = self
                    .stage
                    .validate(&table, block, is_last_block, &self.command, token)
                    .await?;
                stats.rows_removed += outcome.rows_removed;
                stats.accepted_errors += outcome.accepted_errors;
                outcome.block
            };

            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if !self.command.validation_only {
                self.archive(&name, block, &mut stats).await?;
            }

            if is_last_block {
                break;
            }
            self.listener.before(&Phase::FetchNextBlock { table: name.clone() });
            next = self.fetch(stream.as_mut(), &mut stats).await?;
        }

        tracing::info!(
            blocks = stats.blocks,
            rows_read = stats.rows_read,
            rows_archived = stats.rows_archived,
            rows_removed = stats.rows_removed,
            "Table done"
        );
        Ok(stats)
    }

    /// Pull the next block, putting conversion failures to the handler
    async fn fetch(&self, stream: &mut dyn BlockStream, stats: &mut TableRunStats) -> Result<Option<DataBlock>> {
        let token = self.sink.token();
        let block = tokio::select! {
            _ = token.cancelled() => return Err(EngineError::Cancelled),
            block = stream.next_block() => block?,
        };

        for error in stream.drain_errors() {
            stats.conversion_errors += error.rows.len();
            let error = EngineError::Recoverable(error);
            if !self.handler.handle(&error) {
                return Err(EngineError::AlreadyHandled(Box::new(error)));
            }
            stats.accepted_errors += 1;
        }
        Ok(block)
    }

    async fn archive(&self, name: &str, block: DataBlock, stats: &mut TableRunStats) -> Result<()> {
        self.listener.before(&Phase::ArchiveDataForTable { table: name.to_string() });
        let rows = block.len();
        let blocks = BTreeMap::from([(name.to_string(), block)]);
        with_repository(&self.repository, self.sink.token(), move |repository| {
            repository.archive_table_data(&blocks)
        })
        .await?;
        stats.rows_archived += rows;
        Ok(())
    }
}
