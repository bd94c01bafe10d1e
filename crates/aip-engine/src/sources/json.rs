//! Data source description read from a JSON file

use aip_common::types::DataSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::collaborators::MetadataProvider;
use crate::error::{EngineError, Result};

/// Loads the [`DataSource`] from JSON
///
/// Relative context document paths are resolved against the folder holding
/// the JSON file.
#[derive(Debug, Clone)]
pub struct JsonMetadataProvider {
    path: PathBuf,
}

impl JsonMetadataProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetadataProvider for JsonMetadataProvider {
    async fn data_source(&self) -> Result<DataSource> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EngineError::metadata(format!("Failed to read {}: {e}", self.path.display())))?;
        let mut source: DataSource = serde_json::from_str(&content)
            .map_err(|e| EngineError::metadata(format!("Invalid data source in {}: {e}", self.path.display())))?;

        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        for doc in &mut source.context_documents {
            for file in &mut doc.files {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }

        source.validate()?;
        tracing::info!(
            archive_id = %source.id,
            tables = source.tables.len(),
            path = %self.path.display(),
            "Loaded data source"
        );
        Ok(source)
    }
}
