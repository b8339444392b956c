//! Shared metric store
//!
//! Thread-safe handle around one metric tree. Clones share the same tree, so
//! the agent, its execution engines and any number of readers can each hold
//! one. Reads take a shared lock only.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::batch::MetricsBatch;
use super::error::{MetricsError, Result, display_path};
use super::namespace::MetricNamespace;
use super::node::{MetricNode, MetricValue};
use super::snapshot::MetricsSnapshot;

#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    root: Arc<RwLock<MetricNode>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the node at `path`
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Result<MetricNode> {
        self.read().lookup(path).cloned()
    }

    /// Returns a copy of the value at `path`
    pub fn value<S: AsRef<str>>(&self, path: &[S]) -> Result<MetricValue> {
        self.read().lookup_value(path).cloned()
    }

    /// Reads the counter at `path`
    pub fn counter<S: AsRef<str>>(&self, path: &[S]) -> Result<u64> {
        let guard = self.read();
        let value = guard.lookup_value(path)?;
        value
            .as_counter()
            .ok_or_else(|| MetricsError::TypeMismatch {
                path: display_path(path),
                expected: "counter",
            })
    }

    pub fn increment<S: AsRef<str>>(&self, path: &[S], by: u64) -> Result<u64> {
        self.write().increment(path, by)
    }

    pub fn set<S: AsRef<str>>(&self, path: &[S], value: MetricValue) -> Result<()> {
        self.write().set(path, value)
    }

    pub fn set_if_absent<S: AsRef<str>>(&self, path: &[S], value: MetricValue) -> Result<()> {
        self.write().set_if_absent(path, value)
    }

    pub fn delete_subtree<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.write().delete_subtree(path)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::new(self.read().clone())
    }

    /// Applies every write of `batch` under one write lock
    ///
    /// A failing write does not stop the rest of the batch; the first error
    /// is returned once all writes have been attempted.
    pub fn apply(&self, batch: &MetricsBatch) -> Result<()> {
        let mut root = self.write();
        let mut first_error = None;
        for op in batch.ops() {
            if let Err(e) = root.apply(op) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Handle scoped to the subtree under `prefix`
    pub fn namespace<S: AsRef<str>>(&self, prefix: &[S]) -> MetricNamespace {
        MetricNamespace::new(
            self.clone(),
            prefix.iter().map(|s| s.as_ref().to_string()).collect(),
        )
    }

    fn read(&self) -> RwLockReadGuard<'_, MetricNode> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MetricNode> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_tree() {
        let store = MetricStore::new();
        let reader = store.clone();

        store.increment(&["stats", "reloads", "successes"], 1).unwrap();
        assert_eq!(reader.counter(&["stats", "reloads", "successes"]), Ok(1));
    }

    #[test]
    fn test_get_deleted_path_fails() {
        let store = MetricStore::new();
        store
            .increment(&["stats", "pipelines", "main", "events", "in"], 3)
            .unwrap();
        assert!(store.get(&["stats", "pipelines", "main", "events"]).is_ok());

        assert!(store.delete_subtree(&["stats", "pipelines", "main"]));
        assert!(
            store
                .get(&["stats", "pipelines", "main", "events"])
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_counter_on_namespace_is_type_mismatch() {
        let store = MetricStore::new();
        store.increment(&["a", "b"], 1).unwrap();
        assert!(matches!(
            store.counter(&["a"]),
            Err(MetricsError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = MetricStore::new();
        store.increment(&["count"], 1).unwrap();

        let snapshot = store.snapshot();
        store.increment(&["count"], 1).unwrap();

        assert_eq!(snapshot.value(&["count"]).unwrap().as_counter(), Some(1));
        assert_eq!(store.counter(&["count"]), Ok(2));
    }

    #[test]
    fn test_apply_batch_continues_after_error() {
        let store = MetricStore::new();
        store.set(&["ts"], MetricValue::Timestamp(None)).unwrap();

        let mut batch = MetricsBatch::new();
        batch.increment(&["ts"], 1).increment(&["count"], 5);

        assert!(store.apply(&batch).is_err());
        assert_eq!(store.counter(&["count"]), Ok(5));
    }

    #[test]
    fn test_snapshot_to_json() {
        let store = MetricStore::new();
        store.increment(&["stats", "reloads", "failures"], 2).unwrap();
        store
            .set(&["stats", "reloads", "last_error"], MetricValue::Error(None))
            .unwrap();

        let json = store.snapshot().to_json();
        assert_eq!(
            json,
            serde_json::json!({
                "stats": { "reloads": { "failures": 2, "last_error": null } }
            })
        );
    }
}
