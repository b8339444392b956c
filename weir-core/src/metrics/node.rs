//! Metric tree nodes
//!
//! A metric tree is made of namespaces (inner nodes keyed by segment name)
//! and values (leaves). All path-based operations live here; the store only
//! adds locking around them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use super::batch::MetricOp;
use super::error::{MetricsError, Result, display_path};
use crate::domain::error::ErrorRecord;

/// A leaf value in the metric tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Monotonic counter
    Counter(u64),
    /// Free-form value published as-is
    Gauge(serde_json::Value),
    /// Point in time, `None` until first recorded
    Timestamp(Option<DateTime<Utc>>),
    /// Last recorded failure, `None` until first recorded
    Error(Option<ErrorRecord>),
}

impl MetricValue {
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            Self::Counter(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => *ts,
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Error(err) => err.as_ref(),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Gauge(v) => Some(v),
            _ => None,
        }
    }

    /// True for an unset timestamp, an unset error, or a null gauge
    pub fn is_nil(&self) -> bool {
        matches!(
            self,
            Self::Timestamp(None) | Self::Error(None) | Self::Gauge(serde_json::Value::Null)
        )
    }
}

/// A node of the metric tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricNode {
    Value(MetricValue),
    Namespace(BTreeMap<String, MetricNode>),
}

impl Default for MetricNode {
    fn default() -> Self {
        Self::Namespace(BTreeMap::new())
    }
}

impl MetricNode {
    pub fn as_value(&self) -> Option<&MetricValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Namespace(_) => None,
        }
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self, Self::Namespace(_))
    }

    /// Child segment names of a namespace, empty for a value
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Namespace(children) => children.keys().map(String::as_str).collect(),
            Self::Value(_) => Vec::new(),
        }
    }

    /// Finds the node at `path`, relative to this node
    ///
    /// Fails with `NotFound` if any segment is missing or if the path runs
    /// past a value.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Result<&MetricNode> {
        let mut node = self;
        for segment in path {
            node = match node {
                Self::Namespace(children) => children
                    .get(segment.as_ref())
                    .ok_or_else(|| MetricsError::NotFound(display_path(path)))?,
                Self::Value(_) => return Err(MetricsError::NotFound(display_path(path))),
            };
        }
        Ok(node)
    }

    /// Finds the value at `path`
    pub fn lookup_value<S: AsRef<str>>(&self, path: &[S]) -> Result<&MetricValue> {
        match self.lookup(path)? {
            Self::Value(v) => Ok(v),
            Self::Namespace(_) => Err(MetricsError::TypeMismatch {
                path: display_path(path),
                expected: "value",
            }),
        }
    }

    /// Adds `by` to the counter at `path`, creating it (and any missing
    /// namespaces) at `by` if absent
    pub fn increment<S: AsRef<str>>(&mut self, path: &[S], by: u64) -> Result<u64> {
        let (parent, key) = self.parent_mut(path)?;
        match parent.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Self::Value(MetricValue::Counter(by)));
                Ok(by)
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Self::Value(MetricValue::Counter(n)) => {
                    *n = n.saturating_add(by);
                    Ok(*n)
                }
                _ => Err(MetricsError::TypeMismatch {
                    path: display_path(path),
                    expected: "counter",
                }),
            },
        }
    }

    /// Stores `value` at `path`, replacing any previous value
    pub fn set<S: AsRef<str>>(&mut self, path: &[S], value: MetricValue) -> Result<()> {
        let (parent, key) = self.parent_mut(path)?;
        if let Some(Self::Namespace(_)) = parent.get(key) {
            return Err(MetricsError::TypeMismatch {
                path: display_path(path),
                expected: "value",
            });
        }
        parent.insert(key.to_string(), Self::Value(value));
        Ok(())
    }

    /// Stores `value` at `path` only if nothing is there yet
    pub fn set_if_absent<S: AsRef<str>>(&mut self, path: &[S], value: MetricValue) -> Result<()> {
        let (parent, key) = self.parent_mut(path)?;
        parent
            .entry(key.to_string())
            .or_insert(Self::Value(value));
        Ok(())
    }

    /// Removes the node at `path` and everything beneath it
    ///
    /// An empty path clears the whole tree. Returns whether anything was removed.
    pub fn delete_subtree<S: AsRef<str>>(&mut self, path: &[S]) -> bool {
        let Some((last, ancestors)) = path.split_last() else {
            let had_children = !self.keys().is_empty();
            *self = Self::default();
            return had_children;
        };

        let mut node = self;
        for segment in ancestors {
            node = match node {
                Self::Namespace(children) => match children.get_mut(segment.as_ref()) {
                    Some(child) => child,
                    None => return false,
                },
                Self::Value(_) => return false,
            };
        }

        match node {
            Self::Namespace(children) => children.remove(last.as_ref()).is_some(),
            Self::Value(_) => false,
        }
    }

    /// Applies one batched operation
    pub fn apply(&mut self, op: &MetricOp) -> Result<()> {
        match op {
            MetricOp::Increment { path, by } => self.increment(path, *by).map(|_| ()),
            MetricOp::Set { path, value } => self.set(path, value.clone()),
            MetricOp::SetIfAbsent { path, value } => self.set_if_absent(path, value.clone()),
            MetricOp::DeleteSubtree { path } => {
                self.delete_subtree(path);
                Ok(())
            }
        }
    }

    /// Walks to the namespace that should hold the last segment of `path`,
    /// creating intermediate namespaces on the way
    fn parent_mut<'a, S: AsRef<str>>(
        &mut self,
        path: &'a [S],
    ) -> Result<(&mut BTreeMap<String, MetricNode>, &'a str)> {
        let (last, ancestors) = path.split_last().ok_or(MetricsError::EmptyPath)?;

        let mut node = self;
        for segment in ancestors {
            node = match node {
                Self::Namespace(children) => children
                    .entry(segment.as_ref().to_string())
                    .or_default(),
                Self::Value(_) => return Err(MetricsError::NotANamespace(display_path(path))),
            };
        }

        match node {
            Self::Namespace(children) => Ok((children, last.as_ref())),
            Self::Value(_) => Err(MetricsError::NotANamespace(display_path(path))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_creates_intermediate_namespaces() {
        let mut root = MetricNode::default();
        assert_eq!(root.increment(&["stats", "reloads", "failures"], 1), Ok(1));
        assert_eq!(root.increment(&["stats", "reloads", "failures"], 2), Ok(3));

        assert!(root.lookup(&["stats"]).unwrap().is_namespace());
        assert_eq!(
            root.lookup_value(&["stats", "reloads", "failures"])
                .unwrap()
                .as_counter(),
            Some(3)
        );
    }

    #[test]
    fn test_increment_by_zero_initializes_without_reset() {
        let mut root = MetricNode::default();
        root.increment(&["a", "count"], 4).unwrap();
        root.increment(&["a", "count"], 0).unwrap();
        assert_eq!(root.lookup_value(&["a", "count"]).unwrap().as_counter(), Some(4));
    }

    #[test]
    fn test_lookup_missing_path_is_not_found() {
        let root = MetricNode::default();
        let err = root.lookup(&["stats", "pipelines", "main"]).unwrap_err();
        assert_eq!(err, MetricsError::NotFound("stats.pipelines.main".to_string()));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_lookup_through_value_is_not_found() {
        let mut root = MetricNode::default();
        root.increment(&["a"], 1).unwrap();
        assert!(root.lookup(&["a", "b"]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_increment_on_non_counter_fails() {
        let mut root = MetricNode::default();
        root.set(&["a"], MetricValue::Timestamp(None)).unwrap();
        assert!(matches!(
            root.increment(&["a"], 1),
            Err(MetricsError::TypeMismatch { expected: "counter", .. })
        ));
    }

    #[test]
    fn test_write_through_value_fails() {
        let mut root = MetricNode::default();
        root.increment(&["a"], 1).unwrap();
        assert_eq!(
            root.increment(&["a", "b"], 1),
            Err(MetricsError::NotANamespace("a.b".to_string()))
        );
    }

    #[test]
    fn test_set_does_not_replace_namespace() {
        let mut root = MetricNode::default();
        root.increment(&["a", "b"], 1).unwrap();
        assert!(root.set(&["a"], MetricValue::Counter(0)).is_err());
    }

    #[test]
    fn test_set_if_absent_keeps_existing() {
        let mut root = MetricNode::default();
        let ts = Utc::now();
        root.set(&["ts"], MetricValue::Timestamp(Some(ts))).unwrap();
        root.set_if_absent(&["ts"], MetricValue::Timestamp(None)).unwrap();
        assert_eq!(root.lookup_value(&["ts"]).unwrap().as_timestamp(), Some(ts));
    }

    #[test]
    fn test_delete_subtree_removes_descendants() {
        let mut root = MetricNode::default();
        root.increment(&["stats", "pipelines", "main", "events", "in"], 10)
            .unwrap();
        root.increment(&["stats", "pipelines", "other", "events", "in"], 1)
            .unwrap();

        assert!(root.delete_subtree(&["stats", "pipelines", "main"]));
        assert!(
            root.lookup(&["stats", "pipelines", "main", "events"])
                .unwrap_err()
                .is_not_found()
        );
        assert!(root.lookup(&["stats", "pipelines", "other", "events"]).is_ok());
        assert!(!root.delete_subtree(&["stats", "pipelines", "main"]));
    }

    #[test]
    fn test_empty_path() {
        let mut root = MetricNode::default();
        assert_eq!(root.increment::<&str>(&[], 1), Err(MetricsError::EmptyPath));
        root.increment(&["a"], 1).unwrap();
        assert!(root.lookup::<&str>(&[]).unwrap().is_namespace());
        assert!(root.delete_subtree::<&str>(&[]));
        assert!(root.keys().is_empty());
    }

    #[test]
    fn test_nil_values() {
        assert!(MetricValue::Timestamp(None).is_nil());
        assert!(MetricValue::Error(None).is_nil());
        assert!(!MetricValue::Counter(0).is_nil());
    }
}
