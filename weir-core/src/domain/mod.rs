//! Core domain types
//!
//! This module contains the domain structures shared between the agent
//! (which reconciles pipelines) and the execution engines (which run them).

pub mod error;
pub mod pipeline;
pub mod reload;
