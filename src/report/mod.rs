//! Rendering of workflow state for the operator.
//!
//! Nothing here makes decisions about the workflow; it only presents
//! snapshots produced by the orchestrator.

pub mod generator;
pub mod progress;

pub use generator::{generate_json_report, generate_markdown_report, render_sample_ids, AnalysisReport};
pub use progress::ProgressView;
