//! Analysis workflow: the state machine behind the staged reveal.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{Orchestrator, WorkflowConfig, DEFAULT_PACING_MS};
pub use state::{Stage, WorkflowState};
