//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier of a pipeline within one agent
///
/// Ids are plain names (`main`, `audit`, ...) and are also used verbatim as
/// the pipeline's segment in the metrics tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PipelineId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PipelineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for PipelineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Desired configuration of one pipeline
///
/// Produced by a source, consumed by the diff engine and the execution engine.
/// `settings` is ordered so that serializing it is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub id: PipelineId,
    pub source_text: String,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl PipelineConfig {
    /// Creates a config with no settings
    pub fn new(id: impl Into<PipelineId>, source_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_text: source_text.into(),
            settings: BTreeMap::new(),
        }
    }

    /// Adds a setting
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Reads an unsigned integer setting
    ///
    /// Returns `None` when the key is absent or not a non-negative integer.
    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        self.settings.get(key).and_then(|v| v.as_u64())
    }
}
