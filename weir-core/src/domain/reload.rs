//! Reload metrics domain types
//!
//! Canonical metric paths used by the agent, plus a typed view over the
//! `reloads` namespace of the global stats and of each pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ErrorRecord;
use super::pipeline::PipelineId;
use crate::metrics::{MetricsError, MetricsSnapshot};

pub const STATS: &str = "stats";
pub const PIPELINES: &str = "pipelines";
pub const RELOADS: &str = "reloads";

pub const SUCCESSES: &str = "successes";
pub const FAILURES: &str = "failures";
pub const LAST_ERROR: &str = "last_error";
pub const LAST_SUCCESS_TIMESTAMP: &str = "last_success_timestamp";
pub const LAST_FAILURE_TIMESTAMP: &str = "last_failure_timestamp";

/// `stats.reloads`
pub fn global_reloads_path() -> Vec<String> {
    vec![STATS.to_string(), RELOADS.to_string()]
}

/// `stats.pipelines.<id>`, the whole metrics subtree of one pipeline
pub fn pipeline_path(id: &PipelineId) -> Vec<String> {
    vec![
        STATS.to_string(),
        PIPELINES.to_string(),
        id.as_str().to_string(),
    ]
}

/// `stats.pipelines.<id>.reloads`
pub fn pipeline_reloads_path(id: &PipelineId) -> Vec<String> {
    let mut path = pipeline_path(id);
    path.push(RELOADS.to_string());
    path
}

/// Typed copy of one `reloads` namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReloadMetrics {
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<ErrorRecord>,
    pub last_success_timestamp: Option<DateTime<Utc>>,
    pub last_failure_timestamp: Option<DateTime<Utc>>,
}

impl ReloadMetrics {
    /// Reads the `reloads` namespace at `path` from a snapshot
    ///
    /// Counters must exist; the optional fields read as `None` when unset or
    /// absent.
    pub fn read<S: AsRef<str>>(snapshot: &MetricsSnapshot, path: &[S]) -> Result<Self, MetricsError> {
        let field = |name: &str| -> Vec<String> {
            path.iter()
                .map(|s| s.as_ref().to_string())
                .chain(std::iter::once(name.to_string()))
                .collect()
        };
        let counter = |name: &str| -> Result<u64, MetricsError> {
            let full = field(name);
            snapshot
                .value(&full)?
                .as_counter()
                .ok_or_else(|| MetricsError::TypeMismatch {
                    path: full.join("."),
                    expected: "counter",
                })
        };

        Ok(Self {
            successes: counter(SUCCESSES)?,
            failures: counter(FAILURES)?,
            last_error: snapshot
                .value(&field(LAST_ERROR))
                .ok()
                .and_then(|v| v.as_error().cloned()),
            last_success_timestamp: snapshot
                .value(&field(LAST_SUCCESS_TIMESTAMP))
                .ok()
                .and_then(|v| v.as_timestamp()),
            last_failure_timestamp: snapshot
                .value(&field(LAST_FAILURE_TIMESTAMP))
                .ok()
                .and_then(|v| v.as_timestamp()),
        })
    }

    /// Reads the global `stats.reloads` namespace
    pub fn global(snapshot: &MetricsSnapshot) -> Result<Self, MetricsError> {
        Self::read(snapshot, &global_reloads_path())
    }

    /// Reads `stats.pipelines.<id>.reloads`
    pub fn for_pipeline(snapshot: &MetricsSnapshot, id: &PipelineId) -> Result<Self, MetricsError> {
        Self::read(snapshot, &pipeline_reloads_path(id))
    }
}
