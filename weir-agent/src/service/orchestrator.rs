//! Orchestrator
//!
//! Entry point of the reconciliation core. One `converge()` call is one cycle:
//! fetch the desired set, diff it against the registry, apply every action in
//! id order, then commit the queued metrics and publish the new registry
//! view. Cycles are serialized by an async mutex; registry and metrics reads
//! never take it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use weir_core::PipelineId;
use weir_core::metrics::{MetricStore, MetricsBatch};

use super::diff::{ActionKind, diff};
use super::lifecycle::{LifecycleManager, Outcome, init_global_reloads, stop_pipeline};
use super::registry::{Registry, RegistryView, RunningPipeline};
use crate::engine::ExecutionEngine;
use crate::repository::{DesiredSet, PipelineSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvergeError {
    #[error("A reconciliation cycle is already in progress")]
    Busy,
}

/// Outcome of one action within a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub id: PipelineId,
    pub kind: ActionKind,
    pub outcome: Outcome,
}

/// Aggregate result of one cycle
#[derive(Debug, Clone)]
pub struct ConvergeResult {
    /// One entry per action, in id order
    pub outcomes: Vec<ActionOutcome>,
    /// True iff the desired set was fetched and every action applied
    pub success: bool,
    /// Set when the cycle failed as a whole
    ///
    /// A failed fetch runs no action. An aborted cycle keeps the actions it
    /// completed, with their metrics committed, but reports no outcomes.
    pub cycle_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ConvergeResult {
    fn aborted(started_at: DateTime<Utc>, message: String) -> Self {
        Self {
            outcomes: Vec::new(),
            success: false,
            cycle_error: Some(message),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Ids whose action failed this cycle
    pub fn failed_ids(&self) -> Vec<&PipelineId> {
        self.outcomes
            .iter()
            .filter(|o| !o.outcome.is_applied())
            .map(|o| &o.id)
            .collect()
    }

    /// Number of actions of `kind` this cycle
    pub fn count(&self, kind: ActionKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    /// Kinds of the actions in id order
    pub fn kinds(&self) -> Vec<ActionKind> {
        self.outcomes.iter().map(|o| o.kind).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct CycleSummary {
    created: usize,
    reloaded: usize,
    deleted: usize,
    unchanged: usize,
    failed: usize,
}

struct Inner {
    source: Arc<dyn PipelineSource>,
    lifecycle: LifecycleManager,
    metrics: MetricStore,
    registry: Arc<Mutex<Registry>>,
    view: RegistryView,
}

/// Reconciles the running pipelines with a desired source
///
/// Cheap to clone; clones share the same registry and metrics.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    /// * `source` - Where the desired pipelines come from
    /// * `engine` - Builds and stops pipelines
    /// * `metrics` - Store receiving reload metrics; `stats.reloads` is initialized here
    pub fn new(
        source: Arc<dyn PipelineSource>,
        engine: Arc<dyn ExecutionEngine>,
        metrics: MetricStore,
    ) -> Self {
        if let Err(e) = init_global_reloads(&metrics) {
            warn!("Failed to initialize global reload metrics: {}", e);
        }

        Self {
            inner: Arc::new(Inner {
                source,
                lifecycle: LifecycleManager::new(engine, metrics.clone()),
                metrics,
                registry: Arc::new(Mutex::new(Registry::new())),
                view: RegistryView::new(),
            }),
        }
    }

    /// Runs one reconciliation cycle, waiting for any cycle in flight
    ///
    /// The cycle runs on its own task: dropping the returned future does not
    /// cancel actions that already started.
    pub async fn converge(&self) -> ConvergeResult {
        let registry = Arc::clone(&self.inner.registry).lock_owned().await;
        self.run_cycle(registry).await
    }

    /// Runs one reconciliation cycle, or rejects if one is in flight
    pub async fn try_converge(&self) -> Result<ConvergeResult, ConvergeError> {
        let registry = Arc::clone(&self.inner.registry)
            .try_lock_owned()
            .map_err(|_| ConvergeError::Busy)?;
        Ok(self.run_cycle(registry).await)
    }

    /// Running pipelines as of the last completed cycle, in id order
    pub fn running_pipelines(&self) -> Arc<Vec<RunningPipeline>> {
        self.inner.view.list()
    }

    pub fn running_pipeline(&self, id: &PipelineId) -> Option<RunningPipeline> {
        self.inner.view.get(id)
    }

    pub fn metrics(&self) -> &MetricStore {
        &self.inner.metrics
    }

    /// Stops every running pipeline in id order and empties the registry
    ///
    /// Waits for any cycle in flight. Metrics are left as they are.
    pub async fn shutdown(&self) {
        let mut registry = self.inner.registry.lock().await;
        let entries = registry.drain();
        info!(pipelines = entries.len(), "Stopping all pipelines");

        for entry in entries {
            stop_pipeline(&entry.id, entry.handle).await;
        }

        self.inner.view.publish(Vec::new());
    }

    async fn run_cycle(&self, registry: OwnedMutexGuard<Registry>) -> ConvergeResult {
        let started_at = Utc::now();
        let inner = Arc::clone(&self.inner);
        let pending = Arc::new(Mutex::new(MetricsBatch::new()));
        let cycle_pending = Arc::clone(&pending);

        match tokio::spawn(async move { inner.cycle(registry, cycle_pending, started_at).await })
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Reconciliation cycle aborted: {}", e);
                self.inner.salvage(&pending).await;
                ConvergeResult::aborted(started_at, format!("Reconciliation cycle aborted: {}", e))
            }
        }
    }
}

impl Inner {
    async fn cycle(
        &self,
        mut registry: OwnedMutexGuard<Registry>,
        pending: Arc<Mutex<MetricsBatch>>,
        started_at: DateTime<Utc>,
    ) -> ConvergeResult {
        let desired = match self.fetch_desired().await {
            Ok(desired) => desired,
            Err(e) => {
                error!("Failed to load desired pipelines: {:#}", e);
                return ConvergeResult::aborted(started_at, format!("{:#}", e));
            }
        };

        let actions = diff(&registry.snapshot(), &desired);
        let mut batch = pending.lock_owned().await;
        let mut outcomes = Vec::with_capacity(actions.len());

        for action in actions {
            let id = action.id().clone();
            let kind = action.kind();
            let outcome = self.lifecycle.apply(action, &mut registry, &mut batch).await;
            outcomes.push(ActionOutcome { id, kind, outcome });
        }

        self.commit(std::mem::take(&mut *batch), &registry);

        let result = ConvergeResult {
            success: outcomes.iter().all(|o| o.outcome.is_applied()),
            outcomes,
            cycle_error: None,
            started_at,
            finished_at: Utc::now(),
        };
        log_summary(&result);
        result
    }

    /// Commits what an aborted cycle queued and republishes the registry
    ///
    /// The aborted task released both locks when it unwound, so every action
    /// it completed is in the registry and in `pending`.
    async fn salvage(&self, pending: &Mutex<MetricsBatch>) {
        let batch = std::mem::take(&mut *pending.lock().await);
        let registry = self.registry.lock().await;
        self.commit(batch, &registry);
    }

    fn commit(&self, batch: MetricsBatch, registry: &Registry) {
        if let Err(e) = self.metrics.apply(&batch) {
            warn!("Failed to commit reload metrics: {}", e);
        }
        self.view.publish(registry.views());
    }

    async fn fetch_desired(&self) -> anyhow::Result<DesiredSet> {
        let configs = self.source.fetch().await?;
        Ok(DesiredSet::from_configs(configs)?)
    }
}

fn log_summary(result: &ConvergeResult) {
    let summary = CycleSummary {
        created: result.count(ActionKind::Create),
        reloaded: result.count(ActionKind::Reload),
        deleted: result.count(ActionKind::Delete),
        unchanged: result.count(ActionKind::NoOp),
        failed: result.failed_ids().len(),
    };

    if summary.created + summary.reloaded + summary.deleted + summary.failed == 0 {
        debug!(unchanged = summary.unchanged, "Pipelines already converged");
        return;
    }

    if result.success {
        info!(
            created = summary.created,
            reloaded = summary.reloaded,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            "Converge cycle completed"
        );
    } else {
        warn!(
            created = summary.created,
            reloaded = summary.reloaded,
            deleted = summary.deleted,
            failed = summary.failed,
            "Converge cycle completed with failures"
        );
    }
}
