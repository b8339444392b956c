//! Pipelines manifest source
//!
//! Reads the desired pipelines from a YAML manifest:
//!
//! ```yaml
//! - pipeline.id: main
//!   config.string: "return pipeline.define { ... }"
//!   pipeline.batch.size: 250
//! - pipeline.id: audit
//!   path.config: audit.lua
//! ```
//!
//! The manifest is re-read on every fetch, so edits are picked up by the next
//! cycle.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use weir_core::{PipelineConfig, PipelineId};

use super::{LoadError, PipelineSource};

const PIPELINE_ID: &str = "pipeline.id";
const CONFIG_STRING: &str = "config.string";
const PATH_CONFIG: &str = "path.config";

type ManifestEntry = BTreeMap<String, serde_json::Value>;

/// Source backed by a YAML pipelines manifest on disk
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    /// Creates a new manifest source
    ///
    /// # Arguments
    /// * `path` - Manifest file; `path.config` entries are resolved relative to its directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(path: &Path) -> Result<String, LoadError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn load_entry(
        &self,
        position: usize,
        mut entry: ManifestEntry,
    ) -> Result<PipelineConfig, LoadError> {
        let id = match entry.remove(PIPELINE_ID) {
            Some(serde_json::Value::String(id)) if !id.trim().is_empty() => PipelineId::from(id),
            _ => return Err(LoadError::InvalidId(position)),
        };

        let inline = entry.remove(CONFIG_STRING);
        let file = entry.remove(PATH_CONFIG);

        let source_text = match (inline, file) {
            (Some(serde_json::Value::String(text)), None) => text,
            (None, Some(serde_json::Value::String(file))) => {
                let resolved = self.resolve(Path::new(&file));
                debug!(pipeline_id = %id, path = %resolved.display(), "Reading pipeline config");
                Self::read(&resolved).await?
            }
            _ => return Err(LoadError::MissingSource { id }),
        };

        Ok(PipelineConfig {
            id,
            source_text,
            settings: entry,
        })
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        match self.path.parent() {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.to_path_buf(),
        }
    }
}

#[async_trait]
impl PipelineSource for ManifestSource {
    async fn fetch(&self) -> Result<Vec<PipelineConfig>, LoadError> {
        let text = Self::read(&self.path).await?;

        // An empty manifest declares no pipelines
        let entries: Vec<ManifestEntry> = if text.trim().is_empty() {
            Vec::new()
        } else {
            serde_yaml::from_str(&text).map_err(|source| LoadError::Parse {
                path: self.path.clone(),
                source,
            })?
        };

        let mut configs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            configs.push(self.load_entry(index + 1, entry).await?);
        }
        configs.sort_by(|a, b| a.id.cmp(&b.id));

        debug!(
            manifest = %self.path.display(),
            pipelines = configs.len(),
            "Loaded pipelines manifest"
        );
        Ok(configs)
    }
}
