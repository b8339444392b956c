//! Weir Lua Infrastructure
//!
//! Pipeline definitions for the reference execution engine are written in Lua.
//! This crate provides:
//! - A restricted sandbox that evaluates definitions without I/O access
//! - A parser that turns a definition into a validated plugin graph

pub mod parser;
pub mod sandbox;

pub use parser::{PipelineDefinition, PluginDefinition, Section, parse_pipeline_definition};
pub use sandbox::create_sandbox;
