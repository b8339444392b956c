//! Lifecycle manager
//!
//! Applies one action: builds, swaps or stops pipelines through the
//! execution engine, updates the registry, and queues the matching reload
//! metrics into the cycle's batch.
//!
//! Per pipeline id:
//! - Absent  --create ok-->    Running
//! - Absent  --create failed--> Absent (retried next cycle)
//! - Running --reload ok-->    Running on the new config, old handle stopped
//! - Running --reload failed--> Running on the old config, untouched
//! - Running --delete-->       Absent, metrics subtree removed
//!
//! Engine calls run on their own task: a panicking build counts as a failed
//! action and a panicking stop is logged, and the cycle carries on.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use weir_core::domain::reload::{
    FAILURES, LAST_ERROR, LAST_FAILURE_TIMESTAMP, LAST_SUCCESS_TIMESTAMP, SUCCESSES,
    global_reloads_path, pipeline_path, pipeline_reloads_path,
};
use weir_core::metrics::{MetricNamespace, MetricStore, MetricValue, MetricsBatch};
use weir_core::{ErrorRecord, PipelineConfig, PipelineId};

use super::diff::Action;
use super::registry::{Registry, RunningPipelineEntry};
use crate::engine::{BuildError, ExecutionEngine, PipelineHandle};

/// Result of applying one action
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    Failed(ErrorRecord),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Outcome::Applied => None,
            Outcome::Failed(record) => Some(record),
        }
    }
}

pub struct LifecycleManager {
    engine: Arc<dyn ExecutionEngine>,
    metrics: MetricStore,
}

impl LifecycleManager {
    pub fn new(engine: Arc<dyn ExecutionEngine>, metrics: MetricStore) -> Self {
        Self { engine, metrics }
    }

    /// Applies `action` to `registry`
    ///
    /// Reload metrics are not written directly; they are queued in `batch`
    /// and committed by the caller once the whole cycle has run.
    pub async fn apply(
        &self,
        action: Action,
        registry: &mut Registry,
        batch: &mut MetricsBatch,
    ) -> Outcome {
        match action {
            Action::Create { config } => self.create(config, registry, batch).await,
            Action::Reload { config, .. } => self.reload(config, registry, batch).await,
            Action::Delete { old } => {
                self.delete(&old.id, registry, batch).await;
                Outcome::Applied
            }
            Action::NoOp { id } => {
                debug!(pipeline_id = %id, "Pipeline unchanged");
                Outcome::Applied
            }
        }
    }

    async fn create(
        &self,
        config: PipelineConfig,
        registry: &mut Registry,
        batch: &mut MetricsBatch,
    ) -> Outcome {
        let id = config.id.clone();
        let namespace = self.metrics.namespace(&pipeline_path(&id));

        match self.build(&config, namespace).await {
            Ok(handle) => {
                let entry = RunningPipelineEntry::new(config, handle);
                info!(
                    pipeline_id = %id,
                    fingerprint = entry.fingerprint.short(),
                    "Pipeline created"
                );
                registry.insert(entry);
                init_pipeline_reloads(batch, &id);
                Outcome::Applied
            }
            Err(err) => {
                warn!(pipeline_id = %id, error = %err, "Failed to create pipeline");
                Outcome::Failed(record_failure(batch, &id, err))
            }
        }
    }

    async fn reload(
        &self,
        config: PipelineConfig,
        registry: &mut Registry,
        batch: &mut MetricsBatch,
    ) -> Outcome {
        let id = config.id.clone();
        let namespace = self.metrics.namespace(&pipeline_path(&id));

        let handle = match self.build(&config, namespace).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(
                    pipeline_id = %id,
                    error = %err,
                    "Failed to reload pipeline, keeping previous configuration"
                );
                return Outcome::Failed(record_failure(batch, &id, err));
            }
        };

        let entry = match registry.get(&id) {
            Some(previous) => RunningPipelineEntry::reloaded(previous, config, handle),
            None => RunningPipelineEntry::new(config, handle),
        };
        let fingerprint = entry.fingerprint.short().to_string();

        // The new entry is in place before the old pipeline starts draining
        if let Some(previous) = registry.insert(entry) {
            stop_pipeline(&id, previous.handle).await;
        }

        let now = MetricValue::Timestamp(Some(Utc::now()));
        let per_id = pipeline_reloads_path(&id);
        let global = global_reloads_path();
        init_pipeline_reloads(batch, &id);
        batch
            .increment(&field(&per_id, SUCCESSES), 1)
            .increment(&field(&global, SUCCESSES), 1)
            .set(&field(&per_id, LAST_SUCCESS_TIMESTAMP), now.clone())
            .set(&field(&global, LAST_SUCCESS_TIMESTAMP), now);

        info!(pipeline_id = %id, fingerprint = %fingerprint, "Pipeline reloaded");
        Outcome::Applied
    }

    async fn delete(&self, id: &PipelineId, registry: &mut Registry, batch: &mut MetricsBatch) {
        match registry.remove(id) {
            Some(entry) => stop_pipeline(id, entry.handle).await,
            None => warn!(pipeline_id = %id, "Deleting pipeline with no running entry"),
        }

        batch.delete_subtree(&pipeline_path(id));
        info!(pipeline_id = %id, "Pipeline deleted");
    }

    async fn build(
        &self,
        config: &PipelineConfig,
        namespace: MetricNamespace,
    ) -> Result<Box<dyn PipelineHandle>, BuildError> {
        let engine = Arc::clone(&self.engine);
        let config = config.clone();

        match tokio::spawn(async move { engine.build(&config, namespace).await }).await {
            Ok(result) => result,
            Err(e) => Err(BuildError::new(
                "Pipeline build aborted",
                vec!["Pipeline build aborted".to_string(), e.to_string()],
            )),
        }
    }
}

/// Stops `handle` on its own task and waits for it
pub(crate) async fn stop_pipeline(id: &PipelineId, mut handle: Box<dyn PipelineHandle>) {
    if let Err(e) = tokio::spawn(async move { handle.stop().await }).await {
        error!(pipeline_id = %id, "Pipeline stop aborted: {}", e);
    }
}

/// Initializes the global `stats.reloads` namespace in `store`
///
/// Existing values are kept.
pub fn init_global_reloads(store: &MetricStore) -> weir_core::metrics::Result<()> {
    let mut batch = MetricsBatch::new();
    init_reloads(&mut batch, &global_reloads_path());
    store.apply(&batch)
}

fn init_pipeline_reloads(batch: &mut MetricsBatch, id: &PipelineId) {
    init_reloads(batch, &pipeline_reloads_path(id));
}

/// Zero counters and nil fields, without touching anything already present
fn init_reloads(batch: &mut MetricsBatch, base: &[String]) {
    batch
        .increment(&field(base, SUCCESSES), 0)
        .increment(&field(base, FAILURES), 0)
        .set_if_absent(&field(base, LAST_ERROR), MetricValue::Error(None))
        .set_if_absent(
            &field(base, LAST_SUCCESS_TIMESTAMP),
            MetricValue::Timestamp(None),
        )
        .set_if_absent(
            &field(base, LAST_FAILURE_TIMESTAMP),
            MetricValue::Timestamp(None),
        );
}

/// Queues the failure metrics of one failed build, per id and global
fn record_failure(batch: &mut MetricsBatch, id: &PipelineId, err: BuildError) -> ErrorRecord {
    let record = ErrorRecord::from(err);
    let now = MetricValue::Timestamp(Some(Utc::now()));

    for base in [pipeline_reloads_path(id), global_reloads_path()] {
        init_reloads(batch, &base);
        batch
            .increment(&field(&base, FAILURES), 1)
            .set(&field(&base, LAST_ERROR), MetricValue::Error(Some(record.clone())))
            .set(&field(&base, LAST_FAILURE_TIMESTAMP), now.clone());
    }

    record
}

fn field(base: &[String], name: &str) -> Vec<String> {
    let mut path = base.to_vec();
    path.push(name.to_string());
    path
}
