//! Archive repository facade
//!
//! Composes layout, table writer, row ledger and checksum ledger behind two
//! operations: [`ArchiveRepository::archive_metadata`] once per run, then
//! [`ArchiveRepository::archive_table_data`] once per round of blocks.
//!
//! The repository is single-writer: it takes `&mut self` everywhere and the
//! engine wraps it in one mutex, so callers never interleave two writes.

use aip_common::types::{DataBlock, DataSource};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, IoContext, Result};
use crate::index::{
    write_archive_index, write_context_documentation_index, write_file_index, write_table_index, TableIndexEntry,
};
use crate::layout::{ArchiveLayout, IndexFile};
use crate::ledger::{FileChecksumLedger, Verification};
use crate::rows::TableRowLedger;
use crate::standard::write_standard_schemas;
use crate::writer::TableWriter;

/// What one `archive_table_data` call wrote
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub tables: Vec<TableWrite>,
}

impl ArchiveReport {
    pub fn rows_written(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWrite {
    pub table: String,
    pub ordinal: u32,
    /// Rows of this block
    pub rows: u64,
    /// Rows archived for the table so far
    pub total_rows: u64,
    pub first_sight: bool,
}

/// Final state of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    pub archive_id: String,
    pub media_dir: PathBuf,
    /// `(table, ordinal, rows)` in ordinal order
    pub tables: Vec<(String, u32, u64)>,
    pub files: usize,
}

struct Session {
    layout: ArchiveLayout,
    source: DataSource,
    writer: TableWriter,
    rows: TableRowLedger,
    checksums: FileChecksumLedger,
}

pub struct ArchiveRepository {
    root: PathBuf,
    session: Option<Session>,
}

impl ArchiveRepository {
    /// Repository writing packages below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            session: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_metadata_archived(&self) -> bool {
        self.session.is_some()
    }

    /// Create the package skeleton for `source`
    ///
    /// Any package with the same archive id under the root is removed first.
    #[tracing::instrument(skip(self, source), fields(archive_id = %source.id))]
    pub fn archive_metadata(&mut self, source: &DataSource) -> Result<()> {
        if let Some(session) = &self.session {
            return Err(ArchiveError::MetadataAlreadyArchived(session.source.id.clone()));
        }
        source.validate()?;

        let layout = ArchiveLayout::new(&self.root, &source.id);
        for removed in layout.wipe_existing()? {
            tracing::warn!(path = %removed.display(), "Removed existing package");
        }
        layout.create()?;

        let mut session = Session {
            layout,
            source: source.clone(),
            writer: TableWriter::new(),
            rows: TableRowLedger::new(),
            checksums: FileChecksumLedger::new(),
        };

        for path in write_standard_schemas(&session.layout.standard_schemas_dir())? {
            session.checksums.register(&session.layout, &path)?;
        }
        session.copy_context_documents()?;

        let archive_index = session.layout.index_path(IndexFile::Archive);
        write_archive_index(&archive_index, &session.source)?;
        session.checksums.register(&session.layout, &archive_index)?;

        let context_index = session.layout.index_path(IndexFile::ContextDocumentation);
        write_context_documentation_index(&context_index, &session.source.context_documents)?;
        session.checksums.register(&session.layout, &context_index)?;

        session.persist_indices()?;

        tracing::info!(
            media = %session.layout.media_dir().display(),
            tables = session.source.tables.len(),
            context_documents = session.source.context_documents.len(),
            "Archived metadata"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Append one block per table, keyed by target name
    ///
    /// Empty blocks are skipped. Indices are persisted once after all blocks
    /// of the call have been written.
    #[tracing::instrument(skip(self, blocks), fields(tables = blocks.len()))]
    pub fn archive_table_data(&mut self, blocks: &BTreeMap<String, DataBlock>) -> Result<ArchiveReport> {
        let session = self.session.as_mut().ok_or(ArchiveError::MetadataNotArchived)?;
        let mut report = ArchiveReport::default();

        for (name, block) in blocks {
            if &block.table != name {
                return Err(ArchiveError::invariant(format!(
                    "block for {} keyed as {name}",
                    block.table
                )));
            }
            let table = session
                .source
                .table(name)
                .ok_or_else(|| ArchiveError::UnknownTable(name.clone()))?;

            let Some(write) = session.writer.write_block(&session.layout, table, block)? else {
                tracing::debug!(table = %name, "Skipped empty block");
                continue;
            };
            for path in write.written_files() {
                session.checksums.register(&session.layout, path)?;
            }

            let total_rows = session.rows.add(name, write.rows);
            let appended = session.writer.state(name).map(|s| s.rows);
            if appended != Some(total_rows) {
                return Err(ArchiveError::invariant(format!(
                    "row ledger for {name} holds {total_rows} rows but the data file has {appended:?}"
                )));
            }

            report.tables.push(TableWrite {
                table: name.clone(),
                ordinal: write.ordinal,
                rows: write.rows,
                total_rows,
                first_sight: write.first_sight,
            });
        }

        if !report.tables.is_empty() {
            session.persist_indices()?;
        }
        Ok(report)
    }

    /// Persist the final table and file indices
    #[tracing::instrument(skip(self))]
    pub fn finish(&mut self) -> Result<PackageSummary> {
        let session = self.session.as_mut().ok_or(ArchiveError::MetadataNotArchived)?;
        session.persist_indices()?;

        let summary = PackageSummary {
            archive_id: session.source.id.clone(),
            media_dir: session.layout.media_dir(),
            tables: session
                .writer
                .states_in_order()
                .into_iter()
                .map(|s| (s.table.clone(), s.ordinal, session.rows.get(&s.table)))
                .collect(),
            files: session.checksums.len() + 1,
        };
        tracing::info!(
            archive_id = %summary.archive_id,
            tables = summary.tables.len(),
            files = summary.files,
            "Package complete"
        );
        Ok(summary)
    }

    /// Re-read every file written in this session against its checksum
    pub fn verify(&self) -> Result<Verification> {
        let session = self.session.as_ref().ok_or(ArchiveError::MetadataNotArchived)?;
        Ok(session.checksums.verify(&session.layout))
    }

    pub fn row_count(&self, table: &str) -> u64 {
        self.session.as_ref().map_or(0, |s| s.rows.get(table))
    }

    pub fn ordinal(&self, table: &str) -> Option<u32> {
        self.session.as_ref()?.writer.state(table).map(|s| s.ordinal)
    }

    pub fn layout(&self) -> Option<&ArchiveLayout> {
        self.session.as_ref().map(|s| &s.layout)
    }

    pub fn checksum_ledger(&self) -> Option<&FileChecksumLedger> {
        self.session.as_ref().map(|s| &s.checksums)
    }
}

impl Session {
    fn copy_context_documents(&mut self) -> Result<()> {
        for (position, doc) in self.source.context_documents.iter().enumerate() {
            let dir = self.layout.context_document_dir(position, doc.id);
            std::fs::create_dir_all(&dir).at(&dir)?;

            for (n, file) in doc.files.iter().enumerate() {
                let name = match file.extension() {
                    Some(ext) => format!("{}.{}", n + 1, ext.to_string_lossy()),
                    None => (n + 1).to_string(),
                };
                let target = dir.join(name);
                std::fs::copy(file, &target).at(file)?;
                self.checksums.register(&self.layout, &target)?;
            }
            tracing::debug!(document = doc.id, files = doc.files.len(), "Copied context document");
        }
        Ok(())
    }

    /// Rewrite the table index, register it, then rewrite the file index
    fn persist_indices(&mut self) -> Result<()> {
        let mut entries = Vec::new();
        for state in self.writer.states_in_order() {
            let table = self
                .source
                .table(&state.table)
                .ok_or_else(|| ArchiveError::UnknownTable(state.table.clone()))?;
            entries.push(TableIndexEntry {
                table,
                state,
                rows: self.rows.get(&state.table),
            });
        }

        let table_index = self.layout.index_path(IndexFile::Table);
        write_table_index(&table_index, &self.source, &entries)?;
        self.checksums.register(&self.layout, &table_index)?;

        write_file_index(&self.layout.index_path(IndexFile::File), self.checksums.entries())
    }
}

/// Verify an existing package against its `fileIndex.xml`
pub fn verify_package(root: impl Into<PathBuf>, archive_id: &str) -> Result<Verification> {
    let layout = ArchiveLayout::new(root, archive_id);
    let ledger = FileChecksumLedger::load(&layout)?;
    let verification = ledger.verify(&layout);
    tracing::info!(
        archive_id,
        checked = verification.checked,
        failures = verification.failures.len(),
        "Verified package"
    );
    Ok(verification)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_table_data_before_metadata_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut repository = ArchiveRepository::new(dir.path());
        let err = repository.archive_table_data(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ArchiveError::MetadataNotArchived));
        assert!(matches!(repository.finish(), Err(ArchiveError::MetadataNotArchived)));
    }
}
