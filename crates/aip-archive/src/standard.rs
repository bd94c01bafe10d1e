//! Standard schemas shipped in every package under `Schemas/standard`

use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};

/// File name and content of each standard schema
pub const STANDARD_SCHEMAS: &[(&str, &str)] = &[
    ("archiveIndex.xsd", include_str!("../schemas/archiveIndex.xsd")),
    ("fileIndex.xsd", include_str!("../schemas/fileIndex.xsd")),
    ("tableIndex.xsd", include_str!("../schemas/tableIndex.xsd")),
    (
        "contextDocumentationIndex.xsd",
        include_str!("../schemas/contextDocumentationIndex.xsd"),
    ),
    ("XMLSchema.xsd", include_str!("../schemas/XMLSchema.xsd")),
];

/// Write all standard schemas into `dir`, returning the written paths
pub fn write_standard_schemas(dir: &Path) -> Result<Vec<PathBuf>> {
    STANDARD_SCHEMAS
        .iter()
        .map(|(name, content)| {
            let path = dir.join(name);
            std::fs::write(&path, content).at(&path)?;
            Ok(path)
        })
        .collect()
}
