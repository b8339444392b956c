//! Error types for the metrics store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Errors raised by metric reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// The path, or one of its ancestors, does not exist
    #[error("Metric not found: {0}")]
    NotFound(String),

    /// A write tried to descend through a value
    #[error("Metric path crosses a value, not a namespace: {0}")]
    NotANamespace(String),

    /// The node at the path holds a different kind of metric
    #[error("Metric at {path} is not a {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
    },

    /// Writes need at least one path segment
    #[error("Metric path cannot be empty")]
    EmptyPath,
}

impl MetricsError {
    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub(crate) fn display_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}
