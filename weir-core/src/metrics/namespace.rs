//! Scoped metric handles
//!
//! Execution engines receive a `MetricNamespace` rooted at their pipeline's
//! subtree and publish runtime metrics (events, plugins) through it.

use super::error::Result;
use super::node::{MetricNode, MetricValue};
use super::store::MetricStore;

#[derive(Debug, Clone)]
pub struct MetricNamespace {
    store: MetricStore,
    prefix: Vec<String>,
}

impl MetricNamespace {
    pub(crate) fn new(store: MetricStore, prefix: Vec<String>) -> Self {
        Self { store, prefix }
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Handle for a child namespace
    pub fn namespace<S: AsRef<str>>(&self, child: &[S]) -> MetricNamespace {
        Self::new(self.store.clone(), self.full_path(child))
    }

    pub fn increment<S: AsRef<str>>(&self, path: &[S], by: u64) -> Result<u64> {
        self.store.increment(self.full_path(path).as_slice(), by)
    }

    pub fn set<S: AsRef<str>>(&self, path: &[S], value: MetricValue) -> Result<()> {
        self.store.set(self.full_path(path).as_slice(), value)
    }

    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Result<MetricNode> {
        self.store.get(self.full_path(path).as_slice())
    }

    pub fn delete_subtree<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.store.delete_subtree(self.full_path(path).as_slice())
    }

    fn full_path<S: AsRef<str>>(&self, path: &[S]) -> Vec<String> {
        self.prefix
            .iter()
            .cloned()
            .chain(path.iter().map(|s| s.as_ref().to_string()))
            .collect()
    }
}
