//! JSON export of the current result or input

use crate::lifecycle::LifecycleSnapshot;
use crate::ClientConfig;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

/// A file ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub contents: String,
}

impl ExportArtifact {
    /// Save into `dir`, returning the written path
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        tokio::fs::write(&path, self.contents.as_bytes()).await?;
        info!(path = %path.display(), bytes = self.contents.len(), "Export written");
        Ok(path)
    }
}

/// Serializes lifecycle state for download
#[derive(Debug, Clone)]
pub struct ResultExporter {
    file_name: String,
}

impl ResultExporter {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.export_file_name.clone())
    }

    /// Pretty JSON of the result if there is one, else `{model, text}`.
    /// `None` when there is neither a result nor any input text.
    pub fn export(
        &self,
        snapshot: &LifecycleSnapshot,
    ) -> Result<Option<ExportArtifact>, serde_json::Error> {
        let contents = match snapshot.state.result() {
            Some(result) => serde_json::to_string_pretty(result)?,
            None if snapshot.text.is_empty() => return Ok(None),
            None => serde_json::to_string_pretty(&json!({
                "model": snapshot.model_id,
                "text": snapshot.text,
            }))?,
        };

        Ok(Some(ExportArtifact {
            file_name: self.file_name.clone(),
            contents,
        }))
    }

    /// Export and save into `dir`. `Ok(None)` when there is nothing to export.
    pub async fn download(
        &self,
        snapshot: &LifecycleSnapshot,
        dir: impl AsRef<Path>,
    ) -> anyhow::Result<Option<PathBuf>> {
        match self.export(snapshot)? {
            Some(artifact) => Ok(Some(artifact.write_to(dir).await?)),
            None => Ok(None),
        }
    }
}
