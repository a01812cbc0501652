//! Workflow state value objects.

use crate::models::Section;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Stage of the staged reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    RevealingIdentity,
    RevealingBilling,
    RevealingDischarge,
    Complete,
    Failed,
}

impl Stage {
    /// `Complete` and `Failed` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }

    /// Stage that reveals the given staged section.
    pub fn revealing(section: Section) -> Option<Stage> {
        match section {
            Section::Identity => Some(Stage::RevealingIdentity),
            Section::Billing => Some(Stage::RevealingBilling),
            Section::Discharge => Some(Stage::RevealingDischarge),
            Section::Final => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "Idle"),
            Stage::RevealingIdentity => write!(f, "Revealing identity"),
            Stage::RevealingBilling => write!(f, "Revealing billing"),
            Stage::RevealingDischarge => write!(f, "Revealing discharge"),
            Stage::Complete => write!(f, "Complete"),
            Stage::Failed => write!(f, "Failed"),
        }
    }
}

/// Sections revealed so far, in reveal order.
///
/// Append-only within a run: a section already present is never replaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevealedSections {
    entries: Vec<(Section, Value)>,
}

impl RevealedSections {
    /// Record a section. Returns false if it was already revealed.
    pub fn insert(&mut self, section: Section, value: Value) -> bool {
        if self.contains(section) {
            return false;
        }
        self.entries.push((section, value));
        true
    }

    pub fn get(&self, section: Section) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(s, _)| *s == section)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, section: Section) -> bool {
        self.entries.iter().any(|(s, _)| *s == section)
    }

    /// Revealed section names in reveal order.
    pub fn keys(&self) -> Vec<Section> {
        self.entries.iter().map(|(s, _)| *s).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Section, &Value)> {
        self.entries.iter().map(|(s, v)| (*s, v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RevealedSections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (section, value) in &self.entries {
            map.serialize_entry(section.key(), value)?;
        }
        map.end()
    }
}

/// Externally observable state of the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowState {
    pub stage: Stage,
    pub revealed: RevealedSections,
    /// Set only when `stage` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub run_id: u64,
    /// Identifier submitted for this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// True while the run's continuation is still going.
    pub loading: bool,
}

impl WorkflowState {
    /// Fresh state for a newly started run.
    pub fn begin(run_id: u64, patient_id: &str) -> Self {
        Self {
            stage: Stage::RevealingIdentity,
            revealed: RevealedSections::default(),
            error: None,
            run_id,
            patient_id: Some(patient_id.to_string()),
            loading: true,
        }
    }

    /// The run ended without failing but did not reach `Complete`.
    pub fn is_incomplete(&self) -> bool {
        !self.loading && self.run_id > 0 && !self.stage.is_terminal()
    }
}
