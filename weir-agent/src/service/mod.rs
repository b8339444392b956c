//! Service layer
//!
//! The reconciliation core: the diff engine, the lifecycle manager that
//! applies one action at a time, the running pipeline registry, and the
//! orchestrator that serializes whole cycles.

mod diff;
mod lifecycle;
mod orchestrator;
mod registry;

pub use diff::{Action, ActionKind, diff};
pub use lifecycle::{LifecycleManager, Outcome, init_global_reloads};
pub use orchestrator::{ActionOutcome, ConvergeError, ConvergeResult, Orchestrator};
pub use registry::{Registry, RegistryView, RunningPipeline, RunningPipelineEntry};
