//! Immutable copies of the metric tree

use chrono::{DateTime, Utc};

use super::error::Result;
use super::node::{MetricNode, MetricValue};

/// Point-in-time copy of the whole metric tree
///
/// Readers use a snapshot when several values must come from the same
/// instant, e.g. the message and backtrace of one recorded error.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    root: MetricNode,
    taken_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub(crate) fn new(root: MetricNode) -> Self {
        Self {
            root,
            taken_at: Utc::now(),
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Result<&MetricNode> {
        self.root.lookup(path)
    }

    pub fn value<S: AsRef<str>>(&self, path: &[S]) -> Result<&MetricValue> {
        self.root.lookup_value(path)
    }

    pub fn root(&self) -> &MetricNode {
        &self.root
    }

    /// Renders the tree as nested JSON objects
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.root).unwrap_or(serde_json::Value::Null)
    }
}
