//! Lua execution engine
//!
//! Reference engine for pipelines defined in Lua:
//! - Parses the definition in a restricted sandbox (see `weir-lua`) on the
//!   blocking pool
//! - Publishes the plugin graph and event counters under the pipeline's namespace
//! - Runs a worker task that processes one batch of events per tick
//!
//! Stopping a pipeline signals the worker and waits for it to finish its
//! current batch.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{self, JoinHandle};
use tokio::time;
use tracing::{debug, info, warn};
use weir_core::metrics::{MetricNamespace, MetricValue};
use weir_core::{PipelineConfig, PipelineId};
use weir_lua::{PipelineDefinition, Section, parse_pipeline_definition};

use super::{BuildError, ExecutionEngine, PipelineHandle};

/// Setting overriding the number of events processed per tick
pub const BATCH_SIZE_SETTING: &str = "pipeline.batch.size";

/// Setting overriding the tick period, in milliseconds
pub const TICK_MS_SETTING: &str = "pipeline.tick_ms";

const DEFAULT_TICK: Duration = Duration::from_millis(1000);

/// Engine running Lua-defined pipelines
#[derive(Debug, Clone)]
pub struct LuaEngine {
    default_batch_size: u64,
    default_tick: Duration,
}

impl LuaEngine {
    /// Creates a new engine
    ///
    /// # Arguments
    /// * `default_batch_size` - Events per tick when a pipeline does not set `pipeline.batch.size`
    pub fn new(default_batch_size: u64) -> Self {
        Self {
            default_batch_size,
            default_tick: DEFAULT_TICK,
        }
    }

    /// Overrides the default tick period
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.default_tick = tick;
        self
    }

    fn batch_size(&self, config: &PipelineConfig) -> Result<u64, BuildError> {
        let size = match config.settings.get(BATCH_SIZE_SETTING) {
            None => self.default_batch_size,
            Some(value) => value.as_u64().ok_or_else(|| {
                BuildError::new(
                    format!("{} must be a non-negative integer", BATCH_SIZE_SETTING),
                    vec![format!("{} = {}", BATCH_SIZE_SETTING, value)],
                )
            })?,
        };

        if size == 0 {
            return Err(BuildError::new(
                format!("{} must be greater than 0", BATCH_SIZE_SETTING),
                vec![format!("{} = 0", BATCH_SIZE_SETTING)],
            ));
        }
        Ok(size)
    }

    fn tick(&self, config: &PipelineConfig) -> Result<Duration, BuildError> {
        match config.settings.get(TICK_MS_SETTING) {
            None => Ok(self.default_tick),
            Some(value) => match value.as_u64() {
                Some(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
                _ => Err(BuildError::new(
                    format!("{} must be a positive integer", TICK_MS_SETTING),
                    vec![format!("{} = {}", TICK_MS_SETTING, value)],
                )),
            },
        }
    }
}

#[async_trait]
impl ExecutionEngine for LuaEngine {
    async fn build(
        &self,
        config: &PipelineConfig,
        metrics: MetricNamespace,
    ) -> Result<Box<dyn PipelineHandle>, BuildError> {
        debug!(pipeline_id = %config.id, "Parsing pipeline definition");

        let source = config.source_text.clone();
        let definition = task::spawn_blocking(move || parse_pipeline_definition(&source))
            .await
            .map_err(|e| BuildError::from_error(&e))?
            .map_err(|e| BuildError::from_error(e.as_ref()))?;
        let batch_size = self.batch_size(config)?;
        let tick = self.tick(config)?;

        publish_graph(&definition, &metrics).map_err(|e| BuildError::from_error(&e))?;

        let plugins = definition
            .plugins()
            .map(|plugin| (plugin.section.key(), plugin.id.clone()))
            .collect();
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = spawn_worker(
            config.id.clone(),
            metrics,
            plugins,
            batch_size,
            tick,
            stop_rx,
        );

        info!(
            pipeline_id = %config.id,
            inputs = definition.inputs.len(),
            filters = definition.filters.len(),
            outputs = definition.outputs.len(),
            batch_size,
            "Pipeline started"
        );

        Ok(Box::new(LuaPipelineHandle {
            id: config.id.clone(),
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        }))
    }
}

/// Publishes the plugin graph and zeroed event counters
///
/// Counters are created with an increment of 0, so counts carried over from
/// a previous build of the same pipeline are kept. Plugins of a previous
/// graph that this definition no longer has are removed.
fn publish_graph(
    definition: &PipelineDefinition,
    metrics: &MetricNamespace,
) -> weir_core::metrics::Result<()> {
    for counter in ["in", "filtered", "out"] {
        metrics.increment(&["events", counter], 0)?;
    }

    if let Ok(published) = metrics.get(&["plugins"]) {
        for section in Section::ALL {
            let Ok(section_node) = published.lookup(&[section.key()]) else {
                continue;
            };
            let kept: HashSet<&str> = definition
                .section(section)
                .iter()
                .map(|plugin| plugin.id.as_str())
                .collect();
            for stale in section_node.keys().into_iter().filter(|id| !kept.contains(id)) {
                debug!(plugin_id = stale, section = section.key(), "Removing dropped plugin");
                metrics.delete_subtree(&["plugins", section.key(), stale]);
            }
        }
    }

    for section in Section::ALL {
        for plugin in definition.section(section) {
            let plugin_ns = metrics.namespace(&["plugins", section.key(), plugin.id.as_str()]);
            plugin_ns.set(
                &["name"],
                MetricValue::Gauge(serde_json::Value::String(plugin.plugin.clone())),
            )?;
            plugin_ns.increment(&["events"], 0)?;
        }
    }

    Ok(())
}

/// Spawns the task that processes one batch per tick until told to stop
fn spawn_worker(
    id: PipelineId,
    metrics: MetricNamespace,
    plugins: Vec<(&'static str, String)>,
    batch_size: u64,
    tick: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => process_batch(&id, &metrics, &plugins, batch_size),
                _ = &mut stop_rx => break,
            }
        }

        debug!(pipeline_id = %id, "Worker drained");
    })
}

/// Counts one batch on the pipeline and on each of its own plugins
///
/// Plugins whose subtree is gone were dropped by a newer build of the same
/// pipeline and are skipped, so a draining worker does not recreate them.
fn process_batch(
    id: &PipelineId,
    metrics: &MetricNamespace,
    plugins: &[(&'static str, String)],
    batch_size: u64,
) {
    let record = || -> weir_core::metrics::Result<()> {
        metrics.increment(&["events", "in"], batch_size)?;
        metrics.increment(&["events", "filtered"], batch_size)?;
        metrics.increment(&["events", "out"], batch_size)?;

        for (section, plugin_id) in plugins {
            let plugin = ["plugins", *section, plugin_id.as_str()];
            if metrics.get(&plugin).is_err() {
                continue;
            }
            metrics.namespace(&plugin).increment(&["events"], batch_size)?;
        }
        Ok(())
    };

    if let Err(e) = record() {
        warn!(pipeline_id = %id, "Failed to record batch metrics: {}", e);
    }
}

/// Handle to a pipeline running on the Lua engine
struct LuaPipelineHandle {
    id: PipelineId,
    stop_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

#[async_trait]
impl PipelineHandle for LuaPipelineHandle {
    async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The worker may already be gone; nothing left to signal then
            let _ = stop_tx.send(());
        }

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(pipeline_id = %self.id, "Pipeline worker panicked: {}", e);
            }
            info!(pipeline_id = %self.id, "Pipeline stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_core::domain::reload::pipeline_path;
    use weir_core::metrics::MetricStore;

    const VALID: &str = r#"
        return pipeline.define {
            inputs = { pipeline.plugin("generator", { id = "gen" }) },
            filters = { { plugin = "mutate" } },
            outputs = { { plugin = "null" } },
        }
    "#;

    fn namespace(store: &MetricStore, id: &str) -> MetricNamespace {
        store.namespace(&pipeline_path(&PipelineId::from(id)))
    }

    #[tokio::test]
    async fn test_build_publishes_graph() {
        let store = MetricStore::new();
        let engine = LuaEngine::new(125).with_tick(Duration::from_secs(3600));
        let config = PipelineConfig::new("main", VALID);

        let mut handle = engine.build(&config, namespace(&store, "main")).await.unwrap();

        assert_eq!(
            store.counter(&["stats", "pipelines", "main", "events", "in"]),
            Ok(0)
        );
        let name = store
            .value(&["stats", "pipelines", "main", "plugins", "inputs", "gen", "name"])
            .unwrap();
        assert_eq!(name.as_gauge(), Some(&serde_json::json!("generator")));
        assert!(
            store
                .get(&["stats", "pipelines", "main", "plugins", "filters", "filter-mutate-1"])
                .is_ok()
        );

        handle.stop().await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_build_invalid_source_fails_with_backtrace() {
        let store = MetricStore::new();
        let engine = LuaEngine::new(125);
        let config = PipelineConfig::new("bad", "hooo }");

        let err = match engine.build(&config, namespace(&store, "bad")).await {
            Err(e) => e,
            Ok(_) => panic!("invalid definition must not build"),
        };

        assert!(err.message.contains("Failed to evaluate pipeline definition"));
        assert!(err.backtrace.len() >= 2);
        assert!(store.get(&["stats", "pipelines", "bad"]).is_err());
    }

    #[tokio::test]
    async fn test_build_rejects_zero_batch_size() {
        let store = MetricStore::new();
        let engine = LuaEngine::new(125);
        let config = PipelineConfig::new("main", VALID)
            .with_setting(BATCH_SIZE_SETTING, serde_json::json!(0));

        let result = engine.build(&config, namespace(&store, "main")).await;
        assert!(matches!(result, Err(e) if e.message.contains("greater than 0")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_processes_batches_until_stopped() {
        let store = MetricStore::new();
        let engine = LuaEngine::new(125);
        let config = PipelineConfig::new("main", VALID)
            .with_setting(BATCH_SIZE_SETTING, serde_json::json!(10))
            .with_setting(TICK_MS_SETTING, serde_json::json!(100));

        let mut handle = engine.build(&config, namespace(&store, "main")).await.unwrap();

        time::sleep(Duration::from_millis(350)).await;
        handle.stop().await;

        let processed = store
            .counter(&["stats", "pipelines", "main", "events", "out"])
            .unwrap();
        assert_eq!(processed, 30);
        assert_eq!(
            store.counter(&["stats", "pipelines", "main", "plugins", "inputs", "gen", "events"]),
            Ok(30)
        );

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(
            store.counter(&["stats", "pipelines", "main", "events", "out"]),
            Ok(processed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_drops_removed_plugins() {
        let store = MetricStore::new();
        let engine = LuaEngine::new(10).with_tick(Duration::from_millis(100));
        let first = PipelineConfig::new(
            "main",
            r#"return pipeline.define {
                inputs = { pipeline.plugin("generator", { id = "old_in" }) },
                outputs = { { plugin = "null" } },
            }"#,
        );
        let second = PipelineConfig::new(
            "main",
            r#"return pipeline.define {
                inputs = { pipeline.plugin("stdin", { id = "new_in" }) },
                outputs = { { plugin = "null" } },
            }"#,
        );
        let inputs = ["stats", "pipelines", "main", "plugins", "inputs"];
        let events_out = ["stats", "pipelines", "main", "events", "out"];

        let mut old = engine.build(&first, namespace(&store, "main")).await.unwrap();
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(store.counter([&inputs[..], &["old_in", "events"][..]].concat().as_slice()), Ok(20));
        let before_reload = store.counter(&events_out).unwrap();

        let mut new = engine.build(&second, namespace(&store, "main")).await.unwrap();
        old.stop().await;
        time::sleep(Duration::from_millis(350)).await;
        new.stop().await;

        let published = store.get(&inputs).unwrap();
        assert_eq!(published.keys(), vec!["new_in"]);
        assert_eq!(store.counter([&inputs[..], &["new_in", "events"][..]].concat().as_slice()), Ok(30));
        assert!(store.counter(&events_out).unwrap() >= before_reload + 30);
    }

    #[tokio::test]
    async fn test_runaway_definition_fails_to_build() {
        let store = MetricStore::new();
        let engine = LuaEngine::new(125);
        let config = PipelineConfig::new("spin", "while true do end");

        let result = engine.build(&config, namespace(&store, "spin")).await;

        assert!(matches!(result, Err(e) if e.message.contains("Failed to evaluate")));
        assert!(store.get(&["stats", "pipelines", "spin"]).is_err());
    }
}
