//! Test doubles for the engine and source seams

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use weir_core::metrics::{MetricNamespace, MetricValue};
use weir_core::{ErrorRecord, PipelineConfig};

use crate::engine::{BuildError, ExecutionEngine, PipelineHandle};
use crate::repository::{LoadError, PipelineSource, StaticSource};

/// Sources containing this marker fail to build
pub const INVALID_MARKER: &str = "hooo }";

/// Sources containing this marker make the engine panic while building
pub const PANIC_MARKER: &str = "explode()";

/// Handle that does nothing when stopped
pub struct NoopHandle;

#[async_trait]
impl PipelineHandle for NoopHandle {
    async fn stop(&mut self) {}
}

/// Holds builds open until released
#[derive(Clone, Default)]
pub struct BuildGate {
    entered: Arc<Notify>,
    released: Arc<Notify>,
}

impl BuildGate {
    /// Waits until a build reached the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the waiting build continue
    pub fn release(&self) {
        self.released.notify_one();
    }
}

/// Engine that builds any source without the invalid marker
///
/// Successful builds publish `events.{in,out}` and one `plugins` gauge under
/// the pipeline namespace. Clones share the recorded builds and stops.
#[derive(Clone, Default)]
pub struct StubEngine {
    built: Arc<Mutex<Vec<String>>>,
    stopped: Arc<Mutex<Vec<String>>>,
    gate: Option<BuildGate>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a gate every build waits on, and returns it
    pub fn gate(&mut self) -> BuildGate {
        self.gate.get_or_insert_with(BuildGate::default).clone()
    }

    /// Ids of every build attempt, in order
    pub fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }

    /// Sources of every stopped pipeline, in order
    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEngine for StubEngine {
    async fn build(
        &self,
        config: &PipelineConfig,
        metrics: MetricNamespace,
    ) -> Result<Box<dyn PipelineHandle>, BuildError> {
        self.built.lock().unwrap().push(config.id.to_string());

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.released.notified().await;
        }

        if config.source_text.contains(PANIC_MARKER) {
            panic!("engine crashed while building {}", config.id);
        }

        if config.source_text.contains(INVALID_MARKER) {
            return Err(ErrorRecord::new(
                "Failed to evaluate pipeline definition",
                vec![
                    "Failed to evaluate pipeline definition".to_string(),
                    "syntax error near '}'".to_string(),
                ],
            )
            .into());
        }

        metrics.increment(&["events", "in"], 0).unwrap();
        metrics.increment(&["events", "out"], 0).unwrap();
        metrics
            .set(
                &["plugins", "inputs", "generator", "name"],
                MetricValue::Gauge(serde_json::json!("generator")),
            )
            .unwrap();

        Ok(Box::new(StubHandle {
            source: config.source_text.clone(),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct StubHandle {
    source: String,
    stopped: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PipelineHandle for StubHandle {
    async fn stop(&mut self) {
        self.stopped.lock().unwrap().push(self.source.clone());
    }
}

/// Static source that can be switched into an outage, or into panicking
pub struct OutageSource {
    inner: StaticSource,
    down: AtomicBool,
    panicking: AtomicBool,
}

impl OutageSource {
    pub fn new(inner: StaticSource) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            panicking: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &StaticSource {
        &self.inner
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }
}

#[async_trait]
impl PipelineSource for OutageSource {
    async fn fetch(&self) -> Result<Vec<PipelineConfig>, LoadError> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("source crashed while fetching");
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(LoadError::Unavailable("source is down".to_string()));
        }
        self.inner.fetch().await
    }
}
