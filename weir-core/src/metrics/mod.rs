//! Hierarchical metrics store
//!
//! Metrics are addressed by an ordered path of segment names, e.g.
//! `stats.pipelines.main.reloads.failures`. Inner nodes are namespaces and
//! are created lazily on first write; leaves hold counters, gauges,
//! timestamps or error records. Deleting a namespace removes everything
//! beneath it, and later reads of any descendant fail with `NotFound`.

mod batch;
mod error;
mod namespace;
mod node;
mod snapshot;
mod store;

pub use batch::{MetricOp, MetricsBatch};
pub use error::{MetricsError, Result};
pub use namespace::MetricNamespace;
pub use node::{MetricNode, MetricValue};
pub use snapshot::MetricsSnapshot;
pub use store::MetricStore;
