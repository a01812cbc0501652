//! Live per-agent progress while the reveal is paced.

use crate::models::Section;
use crate::workflow::{Stage, WorkflowState};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Duration;

/// Status of one agent step in the workflow view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "Pending"),
            StepStatus::Active => write!(f, "Processing..."),
            StepStatus::Completed => write!(f, "Completed"),
        }
    }
}

impl StepStatus {
    fn marker(&self) -> &'static str {
        match self {
            StepStatus::Pending => "·",
            StepStatus::Active => "…",
            StepStatus::Completed => "✓",
        }
    }
}

/// Status of a staged section given the current state.
///
/// Revealed sections are completed. While a run is loading, the first
/// section not yet revealed is the active one.
pub fn step_status(state: &WorkflowState, section: Section) -> StepStatus {
    if state.revealed.contains(section) {
        return StepStatus::Completed;
    }

    if state.loading && state.stage != Stage::Failed {
        let next = Section::STAGED
            .into_iter()
            .find(|s| !state.revealed.contains(*s));
        if next == Some(section) {
            return StepStatus::Active;
        }
    }

    StepStatus::Pending
}

/// One-line description of the staged steps.
pub fn describe(state: &WorkflowState) -> String {
    if state.loading && state.revealed.is_empty() {
        return "Waiting for the analysis service...".to_string();
    }

    Section::STAGED
        .iter()
        .map(|s| format!("{} {} {}", s.emoji(), s.title(), step_status(state, *s).marker()))
        .collect::<Vec<_>>()
        .join("  ")
}

/// Spinner and step bar drawn on stderr during a run.
pub struct ProgressView {
    bar: ProgressBar,
}

impl ProgressView {
    pub fn new() -> Self {
        let bar = ProgressBar::new(Section::STAGED.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:20.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }

    pub fn update(&self, state: &WorkflowState) {
        let revealed = Section::STAGED
            .iter()
            .filter(|s| state.revealed.contains(**s))
            .count();
        self.bar.set_position(revealed as u64);
        self.bar.set_message(describe(state));
    }

    pub fn finish(&self, state: &WorkflowState) {
        self.update(state);
        let message = match state.stage {
            Stage::Complete => "Analysis complete".to_string(),
            Stage::Failed => "Analysis failed".to_string(),
            _ => describe(state),
        };
        self.bar.finish_with_message(message);
    }
}
