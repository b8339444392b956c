//! Weir Agent
//!
//! Keeps a set of named pipelines in sync with a desired configuration.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: Sources of the desired pipeline set (manifest file, in-memory)
//! - Engine: Builds and stops running pipelines
//! - Services: Diffing, pipeline lifecycle and the converge cycle
//! - Scheduler: Drives converge cycles at startup and on a reload interval
//!
//! Every cycle fetches the desired set, diffs it against the running
//! pipelines by configuration fingerprint, and creates, reloads or deletes
//! pipelines accordingly while keeping reload metrics up to date.

pub mod config;
pub mod engine;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
