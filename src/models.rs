//! Data models exchanged with the analysis service.
//!
//! Section payloads are kept as opaque JSON values: their schema belongs
//! to the remote service and is only forwarded, never interpreted here.

use crate::error::{GatewayError, GatewayResult, MISSING_PATIENT_MESSAGE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One named section of an aggregated analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Identity & claims fraud agent
    Identity,
    /// Billing fraud agent
    Billing,
    /// Discharge blockers agent
    Discharge,
    /// Combined summary of all agents
    Final,
}

impl Section {
    /// Sections revealed one after another, in presentation order.
    pub const STAGED: [Section; 3] = [Section::Identity, Section::Billing, Section::Discharge];

    /// Every section, in reveal order.
    pub const ALL: [Section; 4] = [
        Section::Identity,
        Section::Billing,
        Section::Discharge,
        Section::Final,
    ];

    /// Key used for this section in JSON payloads.
    pub fn key(&self) -> &'static str {
        match self {
            Section::Identity => "identity",
            Section::Billing => "billing",
            Section::Discharge => "discharge",
            Section::Final => "final",
        }
    }

    /// Name of the agent responsible for this section.
    pub fn title(&self) -> &'static str {
        match self {
            Section::Identity => "Identity & Claims Fraud",
            Section::Billing => "Billing Fraud",
            Section::Discharge => "Discharge Blockers",
            Section::Final => "Final Summary",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Section::Identity => "🔍",
            Section::Billing => "💰",
            Section::Discharge => "🚪",
            Section::Final => "📋",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Request body for `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub patient_id: String,
}

impl AnalysisRequest {
    /// Build a request, rejecting a missing or blank identifier.
    ///
    /// Surrounding whitespace is trimmed before submission.
    pub fn new(patient_id: &str) -> GatewayResult<Self> {
        let trimmed = patient_id.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::validation(MISSING_PATIENT_MESSAGE));
        }

        Ok(Self {
            patient_id: trimmed.to_string(),
        })
    }
}

/// Aggregated payload returned by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge: Option<Value>,
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub final_summary: Option<Value>,
}

impl AnalysisResult {
    /// Payload of the given section, if the service returned one.
    pub fn section(&self, section: Section) -> Option<&Value> {
        match section {
            Section::Identity => self.identity.as_ref(),
            Section::Billing => self.billing.as_ref(),
            Section::Discharge => self.discharge.as_ref(),
            Section::Final => self.final_summary.as_ref(),
        }
    }

    /// Sections present in the payload, in reveal order.
    pub fn present_sections(&self) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|s| self.section(*s).is_some())
            .collect()
    }
}

/// Response body of `GET /api/sample-ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleIds {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Error body sent by the service on non-success statuses.
///
/// `error` is the documented field; `detail` is what FastAPI emits for
/// `HTTPException`, so it is accepted as a fallback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<Value>,
}

impl RemoteErrorBody {
    /// The most specific message carried by the body, if any.
    pub fn message(&self) -> Option<String> {
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            return Some(error.to_string());
        }

        match &self.detail {
            Some(Value::String(detail)) if !detail.is_empty() => Some(detail.clone()),
            _ => None,
        }
    }
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}
