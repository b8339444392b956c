//! In-memory pipeline source

use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};
use weir_core::PipelineConfig;

use super::{LoadError, PipelineSource};

/// Source holding a fixed list of configurations
///
/// The list can be replaced between cycles with `set`.
#[derive(Debug, Default)]
pub struct StaticSource {
    configs: RwLock<Vec<PipelineConfig>>,
}

impl StaticSource {
    pub fn new(configs: Vec<PipelineConfig>) -> Self {
        Self {
            configs: RwLock::new(configs),
        }
    }

    /// Replaces the desired configurations returned by the next fetch
    pub fn set(&self, configs: Vec<PipelineConfig>) {
        *self.configs.write().unwrap_or_else(PoisonError::into_inner) = configs;
    }
}

#[async_trait]
impl PipelineSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<PipelineConfig>, LoadError> {
        Ok(self
            .configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
