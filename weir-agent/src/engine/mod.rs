//! Execution engine layer
//!
//! The engine turns a desired `PipelineConfig` into a running pipeline and
//! tears it down again. The agent only sees the two traits below; what a
//! pipeline does while it runs is entirely up to the engine.
//!
//! All engines are trait-based to enable testing and dependency injection.

mod lua;

pub use lua::LuaEngine;

use async_trait::async_trait;
use std::error::Error as StdError;
use thiserror::Error;
use weir_core::metrics::MetricNamespace;
use weir_core::{ErrorRecord, PipelineConfig};

/// A pipeline definition could not be turned into a running pipeline
///
/// Covers both invalid definitions and resource failures inside the engine;
/// the agent records them the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BuildError {
    pub message: String,
    pub backtrace: Vec<String>,
}

impl BuildError {
    pub fn new(message: impl Into<String>, backtrace: Vec<String>) -> Self {
        Self {
            message: message.into(),
            backtrace,
        }
    }

    /// Captures an error together with its cause chain
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        ErrorRecord::from_error(error).into()
    }
}

impl From<ErrorRecord> for BuildError {
    fn from(record: ErrorRecord) -> Self {
        Self {
            message: record.message,
            backtrace: record.backtrace,
        }
    }
}

impl From<BuildError> for ErrorRecord {
    fn from(err: BuildError) -> Self {
        ErrorRecord::new(err.message, err.backtrace)
    }
}

/// Engine trait for building pipelines
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Builds and starts a pipeline
    ///
    /// # Arguments
    /// * `config` - The desired pipeline configuration
    /// * `metrics` - The pipeline's metrics namespace (`stats.pipelines.<id>`),
    ///   where the engine may publish runtime metrics such as `events` and `plugins`
    ///
    /// # Returns
    /// A handle to the running pipeline, or the reason it could not be built
    async fn build(
        &self,
        config: &PipelineConfig,
        metrics: MetricNamespace,
    ) -> Result<Box<dyn PipelineHandle>, BuildError>;
}

/// Handle to one running pipeline
#[async_trait]
pub trait PipelineHandle: Send + Sync {
    /// Stops the pipeline gracefully
    ///
    /// Blocks until in-flight work is drained and resources are released.
    /// Calling it again after it returned is a no-op.
    async fn stop(&mut self);
}
