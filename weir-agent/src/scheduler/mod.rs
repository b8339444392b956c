//! Scheduler layer for the agent
//!
//! Decides when converge cycles run: once at startup, then on the reload
//! interval when automatic reload is enabled.

pub mod driver;

pub use driver::ReloadDriver;
