//! Batched metric writes
//!
//! A batch collects writes while a reconciliation cycle runs and is applied
//! to the store under a single write lock once the cycle completes.

use super::node::MetricValue;

/// One deferred write
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOp {
    Increment { path: Vec<String>, by: u64 },
    Set { path: Vec<String>, value: MetricValue },
    SetIfAbsent { path: Vec<String>, value: MetricValue },
    DeleteSubtree { path: Vec<String> },
}

/// Ordered list of deferred writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsBatch {
    ops: Vec<MetricOp>,
}

impl MetricsBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment<S: AsRef<str>>(&mut self, path: &[S], by: u64) -> &mut Self {
        self.ops.push(MetricOp::Increment {
            path: owned(path),
            by,
        });
        self
    }

    pub fn set<S: AsRef<str>>(&mut self, path: &[S], value: MetricValue) -> &mut Self {
        self.ops.push(MetricOp::Set {
            path: owned(path),
            value,
        });
        self
    }

    pub fn set_if_absent<S: AsRef<str>>(&mut self, path: &[S], value: MetricValue) -> &mut Self {
        self.ops.push(MetricOp::SetIfAbsent {
            path: owned(path),
            value,
        });
        self
    }

    pub fn delete_subtree<S: AsRef<str>>(&mut self, path: &[S]) -> &mut Self {
        self.ops.push(MetricOp::DeleteSubtree { path: owned(path) });
        self
    }

    /// Appends all of `other`'s writes after this batch's writes
    pub fn extend(&mut self, other: MetricsBatch) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[MetricOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn owned<S: AsRef<str>>(path: &[S]) -> Vec<String> {
    path.iter().map(|s| s.as_ref().to_string()).collect()
}
