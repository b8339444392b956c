//! Weir Core
//!
//! Core types and abstractions for the Weir pipeline agent.
//!
//! This crate contains:
//! - Domain types: pipeline identity, desired configuration, reload metrics
//! - Fingerprinting: deterministic identity for a pipeline configuration
//! - Metrics: the hierarchical metrics store shared by the agent and its engines

pub mod domain;
pub mod fingerprint;
pub mod metrics;

pub use domain::error::ErrorRecord;
pub use domain::pipeline::{PipelineConfig, PipelineId};
pub use fingerprint::{Fingerprint, fingerprint};
