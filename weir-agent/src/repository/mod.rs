//! Repository layer
//!
//! Sources produce the desired pipeline configurations, one list per
//! reconciliation cycle. They hold no reconciliation logic; validating the
//! list into a `DesiredSet` is the only step between a source and the diff.
//!
//! All sources are trait-based to enable testing and embedding.

mod manifest;
mod memory;

pub use manifest::ManifestSource;
pub use memory::StaticSource;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use weir_core::{PipelineConfig, PipelineId};

/// The desired configuration could not be produced
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Pipeline id '{0}' is defined more than once")]
    DuplicateId(PipelineId),

    #[error("Pipeline '{id}' must set exactly one of 'config.string' or 'path.config'")]
    MissingSource { id: PipelineId },

    #[error("Pipeline entry {0} has an empty or missing 'pipeline.id'")]
    InvalidId(usize),

    #[error("Pipeline source unavailable: {0}")]
    Unavailable(String),
}

/// Source of desired pipeline configurations
#[async_trait]
pub trait PipelineSource: Send + Sync {
    /// Fetches the full desired configuration
    ///
    /// Called once at the start of every cycle. A failure aborts the cycle
    /// before anything is diffed.
    async fn fetch(&self) -> Result<Vec<PipelineConfig>, LoadError>;
}

/// Validated desired state: at most one configuration per id, in id order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredSet(BTreeMap<PipelineId, PipelineConfig>);

impl DesiredSet {
    /// Builds the set, rejecting duplicate ids
    pub fn from_configs(configs: Vec<PipelineConfig>) -> Result<Self, LoadError> {
        let mut map = BTreeMap::new();
        for config in configs {
            if map.contains_key(&config.id) {
                return Err(LoadError::DuplicateId(config.id));
            }
            map.insert(config.id.clone(), config);
        }
        Ok(Self(map))
    }

    pub fn get(&self, id: &PipelineId) -> Option<&PipelineConfig> {
        self.0.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &PipelineId> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PipelineId, &PipelineConfig)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
