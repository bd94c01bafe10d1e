//! Package-wide file checksum ledger
//!
//! Every physical file written below the package is registered here after
//! the write completes. Entries are keyed by exact path: registering the same
//! file again overwrites its checksum in place, so the file index keeps one
//! `<f>` per file in first-registration order.

use aip_common::checksum::{compute_file_md5, verify_file_md5};
use aip_common::AipError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, IoContext, Result};
use crate::layout::{ArchiveLayout, IndexFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// Folder relative to the package root, `\`-separated
    pub folder: String,
    pub file_name: String,
    /// 32 upper-case hex digits
    pub md5: String,
}

#[derive(Debug, Default)]
pub struct FileChecksumLedger {
    entries: Vec<ChecksumEntry>,
    by_path: HashMap<PathBuf, usize>,
}

impl FileChecksumLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the checksum of `path` and insert or overwrite its entry
    pub fn register(&mut self, layout: &ArchiveLayout, path: &Path) -> Result<&ChecksumEntry> {
        let md5 = compute_file_md5(path).map_err(|e| match e {
            AipError::Io(source) => ArchiveError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other.into(),
        })?;

        let index = match self.by_path.get(path) {
            Some(&index) => {
                self.entries[index].md5 = md5;
                index
            }
            None => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| ArchiveError::invariant(format!("{} has no file name", path.display())))?;
                self.entries.push(ChecksumEntry {
                    folder: layout.index_folder(path)?,
                    file_name,
                    md5,
                });
                self.by_path.insert(path.to_path_buf(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        tracing::trace!(path = %path.display(), md5 = %self.entries[index].md5, "Registered checksum");
        Ok(&self.entries[index])
    }

    pub fn entries(&self) -> &[ChecksumEntry] {
        &self.entries
    }

    pub fn get(&self, path: &Path) -> Option<&ChecksumEntry> {
        self.by_path.get(path).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rebuild a ledger from the `fileIndex.xml` of an existing package
    pub fn load(layout: &ArchiveLayout) -> Result<Self> {
        let path = layout.index_path(IndexFile::File);
        let content = std::fs::read_to_string(&path).at(&path)?;
        let index: FileIndexDocument =
            quick_xml::de::from_str(&content).map_err(|e| ArchiveError::xml(&path, e))?;

        let mut ledger = Self::new();
        for f in index.files {
            if f.md5.len() != 32 || !f.md5.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ArchiveError::FileIndex(format!(
                    "{}\\{} has malformed checksum {:?}",
                    f.folder, f.file_name, f.md5
                )));
            }
            let file_path = layout.resolve_index_entry(&f.folder, &f.file_name);
            if ledger.by_path.contains_key(&file_path) {
                return Err(ArchiveError::FileIndex(format!(
                    "{}\\{} is listed twice",
                    f.folder, f.file_name
                )));
            }
            ledger.by_path.insert(file_path, ledger.entries.len());
            ledger.entries.push(ChecksumEntry {
                folder: f.folder,
                file_name: f.file_name,
                md5: f.md5,
            });
        }
        Ok(ledger)
    }

    /// Re-read every registered file and compare against its checksum
    pub fn verify(&self, layout: &ArchiveLayout) -> Verification {
        let mut verification = Verification::default();
        for entry in &self.entries {
            let path = layout.resolve_index_entry(&entry.folder, &entry.file_name);
            verification.checked += 1;
            if let Err(e) = verify_file_md5(&path, &entry.md5) {
                tracing::warn!(path = %path.display(), error = %e, "Checksum verification failed");
                verification.failures.push(e);
            }
        }
        verification
    }
}

/// Outcome of [`FileChecksumLedger::verify`]
#[derive(Debug, Default)]
pub struct Verification {
    pub checked: usize,
    /// Mismatches and unreadable files
    pub failures: Vec<AipError>,
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct FileIndexDocument {
    #[serde(rename = "f", default)]
    files: Vec<FileIndexEntry>,
}

#[derive(Debug, Deserialize)]
struct FileIndexEntry {
    #[serde(rename = "foN")]
    folder: String,
    #[serde(rename = "fiN")]
    file_name: String,
    md5: String,
}
