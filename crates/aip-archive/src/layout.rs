//! On-disk package structure
//!
//! ```text
//! <root>/<ArchiveId>.1/
//!   Indices/{archiveIndex.xml, fileIndex.xml, tableIndex.xml, contextDocumentationIndex.xml}
//!   Schemas/standard/{archiveIndex.xsd, fileIndex.xsd, tableIndex.xsd, contextDocumentationIndex.xsd, XMLSchema.xsd}
//!   Tables/table<k>/table<k>.xml, table<k>.xsd
//!   ContextDocumentation/docCollection<c>/<docId>/<n><ext>
//! ```
//!
//! Only single-media packages are produced; media 1 hosts everything.

use std::path::{Component, Path, PathBuf};

use crate::error::{ArchiveError, IoContext, Result};

pub const INDICES_FOLDER: &str = "Indices";
pub const SCHEMAS_FOLDER: &str = "Schemas";
pub const STANDARD_FOLDER: &str = "standard";
pub const TABLES_FOLDER: &str = "Tables";
pub const CONTEXT_FOLDER: &str = "ContextDocumentation";

/// Context documents per `docCollection<c>` folder
pub const DOCUMENTS_PER_COLLECTION: usize = 10_000;

/// Separator used for folder names inside the file index
pub const INDEX_PATH_SEPARATOR: char = '\\';

/// The package indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFile {
    Archive,
    File,
    Table,
    ContextDocumentation,
}

impl IndexFile {
    pub fn file_name(self) -> &'static str {
        match self {
            IndexFile::Archive => "archiveIndex.xml",
            IndexFile::File => "fileIndex.xml",
            IndexFile::Table => "tableIndex.xml",
            IndexFile::ContextDocumentation => "contextDocumentationIndex.xml",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    archive_id: String,
    media: u32,
}

impl ArchiveLayout {
    /// Layout of media 1 of `archive_id` below `root`
    pub fn new(root: impl Into<PathBuf>, archive_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            archive_id: archive_id.into(),
            media: 1,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_id(&self) -> &str {
        &self.archive_id
    }

    pub fn media(&self) -> u32 {
        self.media
    }

    /// e.g. `AVID.SA.18000.1`
    pub fn media_name(&self) -> String {
        format!("{}.{}", self.archive_id, self.media)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join(self.media_name())
    }

    pub fn indices_dir(&self) -> PathBuf {
        self.media_dir().join(INDICES_FOLDER)
    }

    pub fn standard_schemas_dir(&self) -> PathBuf {
        self.media_dir().join(SCHEMAS_FOLDER).join(STANDARD_FOLDER)
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.media_dir().join(TABLES_FOLDER)
    }

    pub fn context_dir(&self) -> PathBuf {
        self.media_dir().join(CONTEXT_FOLDER)
    }

    pub fn index_path(&self, index: IndexFile) -> PathBuf {
        self.indices_dir().join(index.file_name())
    }

    /// `table<k>`
    pub fn table_folder_name(ordinal: u32) -> String {
        format!("table{ordinal}")
    }

    pub fn table_dir(&self, ordinal: u32) -> PathBuf {
        self.tables_dir().join(Self::table_folder_name(ordinal))
    }

    pub fn table_data_path(&self, ordinal: u32) -> PathBuf {
        self.table_dir(ordinal).join(format!("table{ordinal}.xml"))
    }

    pub fn table_schema_path(&self, ordinal: u32) -> PathBuf {
        self.table_dir(ordinal).join(format!("table{ordinal}.xsd"))
    }

    /// Collection number (1-based) of the document at `position` in the source list
    pub fn doc_collection(position: usize) -> usize {
        position / DOCUMENTS_PER_COLLECTION + 1
    }

    pub fn context_document_dir(&self, position: usize, doc_id: u32) -> PathBuf {
        self.context_dir()
            .join(format!("docCollection{}", Self::doc_collection(position)))
            .join(doc_id.to_string())
    }

    /// Create the fixed folders of the package
    pub fn create(&self) -> Result<()> {
        for dir in [
            self.indices_dir(),
            self.standard_schemas_dir(),
            self.tables_dir(),
            self.context_dir(),
        ] {
            std::fs::create_dir_all(&dir).at(&dir)?;
        }
        Ok(())
    }

    /// Remove every media folder of this archive id found below the root
    ///
    /// Returns the removed folders.
    pub fn wipe_existing(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        if !self.root.exists() {
            return Ok(removed);
        }

        let prefix = format!("{}.", self.archive_id);
        for entry in std::fs::read_dir(&self.root).at(&self.root)? {
            let entry = entry.at(&self.root)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_media = name
                .strip_prefix(&prefix)
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
            if is_media && entry.path().is_dir() {
                std::fs::remove_dir_all(entry.path()).at(entry.path())?;
                removed.push(entry.path());
            }
        }
        Ok(removed)
    }

    /// Folder of `path` relative to the root, in file index notation
    ///
    /// `<root>/AVID.SA.18000.1/Tables/table1/table1.xml` gives
    /// `AVID.SA.18000.1\Tables\table1`.
    pub fn index_folder(&self, path: &Path) -> Result<String> {
        let parent = path
            .parent()
            .ok_or_else(|| ArchiveError::invariant(format!("{} has no parent", path.display())))?;
        let relative = parent.strip_prefix(&self.root).map_err(|_| {
            ArchiveError::invariant(format!(
                "{} is outside the archive root {}",
                path.display(),
                self.root.display()
            ))
        })?;

        let parts: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Ok(parts.join(&INDEX_PATH_SEPARATOR.to_string()))
    }

    /// Inverse of [`Self::index_folder`] joined with a file name
    pub fn resolve_index_entry(&self, folder: &str, file_name: &str) -> PathBuf {
        folder
            .split(INDEX_PATH_SEPARATOR)
            .filter(|p| !p.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
            .join(file_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = ArchiveLayout::new("/out", "AVID.SA.18000");
        assert_eq!(layout.media_name(), "AVID.SA.18000.1");
        assert_eq!(
            layout.table_data_path(3),
            PathBuf::from("/out/AVID.SA.18000.1/Tables/table3/table3.xml")
        );
        assert_eq!(
            layout.index_path(IndexFile::File),
            PathBuf::from("/out/AVID.SA.18000.1/Indices/fileIndex.xml")
        );
        assert_eq!(
            layout.context_document_dir(10_000, 7),
            PathBuf::from("/out/AVID.SA.18000.1/ContextDocumentation/docCollection2/7")
        );
    }

    #[test]
    fn test_index_folder_round_trip() {
        let layout = ArchiveLayout::new("/out", "AVID.SA.18000");
        let data = layout.table_data_path(1);
        let folder = layout.index_folder(&data).unwrap();
        assert_eq!(folder, "AVID.SA.18000.1\\Tables\\table1");
        assert_eq!(layout.resolve_index_entry(&folder, "table1.xml"), data);
        assert!(layout.index_folder(Path::new("/elsewhere/file.xml")).is_err());
    }

    #[test]
    fn test_wipe_existing_only_touches_media_of_this_archive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["AVID.SA.1.1", "AVID.SA.1.2", "AVID.SA.1.backup", "AVID.SA.10.1"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }

        let layout = ArchiveLayout::new(dir.path(), "AVID.SA.1");
        let removed = layout.wipe_existing().unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!dir.path().join("AVID.SA.1.1").exists());
        assert!(!dir.path().join("AVID.SA.1.2").exists());
        assert!(dir.path().join("AVID.SA.1.backup").exists());
        assert!(dir.path().join("AVID.SA.10.1").exists());
    }
}
