//! Running pipeline registry
//!
//! `Registry` owns one entry per running pipeline, including the engine
//! handle, and is only touched inside a reconciliation cycle.
//! `RegistryView` is the read side: an immutable list of `RunningPipeline`
//! re-published once per completed cycle, so readers never need the
//! reconciliation lock and never see a half-applied cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use weir_core::{Fingerprint, PipelineConfig, PipelineId, fingerprint};

use crate::engine::PipelineHandle;

/// Bookkeeping for one running pipeline
pub struct RunningPipelineEntry {
    pub id: PipelineId,
    pub config: PipelineConfig,
    pub fingerprint: Fingerprint,
    pub handle: Box<dyn PipelineHandle>,
    pub started_at: DateTime<Utc>,
    pub reloaded_at: Option<DateTime<Utc>>,
}

impl RunningPipelineEntry {
    /// Entry for a freshly built pipeline
    pub fn new(config: PipelineConfig, handle: Box<dyn PipelineHandle>) -> Self {
        Self {
            id: config.id.clone(),
            fingerprint: fingerprint(&config),
            config,
            handle,
            started_at: Utc::now(),
            reloaded_at: None,
        }
    }

    /// Entry replacing `previous` after a successful reload
    pub fn reloaded(
        previous: &RunningPipelineEntry,
        config: PipelineConfig,
        handle: Box<dyn PipelineHandle>,
    ) -> Self {
        Self {
            reloaded_at: Some(Utc::now()),
            started_at: previous.started_at,
            ..Self::new(config, handle)
        }
    }

    pub fn view(&self) -> RunningPipeline {
        RunningPipeline {
            id: self.id.clone(),
            config: self.config.clone(),
            fingerprint: self.fingerprint.clone(),
            started_at: self.started_at,
            reloaded_at: self.reloaded_at,
        }
    }
}

impl std::fmt::Debug for RunningPipelineEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningPipelineEntry")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint)
            .field("started_at", &self.started_at)
            .field("reloaded_at", &self.reloaded_at)
            .finish_non_exhaustive()
    }
}

/// Read-only copy of a registry entry, without the handle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningPipeline {
    pub id: PipelineId,
    pub config: PipelineConfig,
    pub fingerprint: Fingerprint,
    pub started_at: DateTime<Utc>,
    pub reloaded_at: Option<DateTime<Utc>>,
}

/// At most one entry per id
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<PipelineId, RunningPipelineEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the one it replaced
    pub fn insert(&mut self, entry: RunningPipelineEntry) -> Option<RunningPipelineEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    pub fn remove(&mut self, id: &PipelineId) -> Option<RunningPipelineEntry> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &PipelineId) -> Option<&RunningPipelineEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Views of every entry, keyed by id, as consumed by the diff engine
    pub fn snapshot(&self) -> BTreeMap<PipelineId, RunningPipeline> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.view()))
            .collect()
    }

    /// Views of every entry in id order
    pub fn views(&self) -> Vec<RunningPipeline> {
        self.entries.values().map(RunningPipelineEntry::view).collect()
    }

    /// Removes every entry, in id order
    pub fn drain(&mut self) -> Vec<RunningPipelineEntry> {
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

/// Published list of running pipelines
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    current: Arc<RwLock<Arc<Vec<RunningPipeline>>>>,
}

impl RegistryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published list
    pub fn publish(&self, pipelines: Vec<RunningPipeline>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(pipelines);
    }

    /// The list as of the last completed cycle, in id order
    pub fn list(&self) -> Arc<Vec<RunningPipeline>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &PipelineId) -> Option<RunningPipeline> {
        self.list().iter().find(|p| &p.id == id).cloned()
    }
}
