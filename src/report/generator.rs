//! Markdown and JSON report generation.
//!
//! Section payloads are rendered generically: object fields become
//! bullet points, lists become nested bullets.

use crate::models::Section;
use crate::report::progress::step_status;
use crate::workflow::{Stage, WorkflowState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Risk band of a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Elevated,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Elevated
        } else {
            RiskLevel::Low
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Low => "🟢",
            RiskLevel::Elevated => "🟡",
            RiskLevel::High => "🔴",
        }
    }
}

/// Metadata about one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub patient_id: String,
    pub api_url: String,
    pub analysis_date: DateTime<Utc>,
    pub run_id: u64,
    pub duration_seconds: f64,
    pub stage: Stage,
}

/// A finished run, ready to be rendered.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    pub state: WorkflowState,
}

impl AnalysisReport {
    pub fn new(state: WorkflowState, api_url: &str, duration_seconds: f64) -> Self {
        Self {
            metadata: ReportMetadata {
                patient_id: state.patient_id.clone().unwrap_or_default(),
                api_url: api_url.to_string(),
                analysis_date: Utc::now(),
                run_id: state.run_id,
                duration_seconds,
                stage: state.stage,
            },
            state,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &AnalysisReport, include_raw: bool) -> String {
    let mut output = String::new();

    output.push_str("# MediGuard Analysis Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_workflow_section(&report.state));

    if let Some(ref error) = report.state.error {
        output.push_str("## Error\n\n");
        output.push_str(&format!("> ❌ {}\n\n", error));
    } else if report.state.revealed.is_empty() {
        output.push_str("## Results\n\n");
        output.push_str("No results were returned for this patient.\n\n");
    }

    output.push_str(&generate_findings_section(&report.state, include_raw));

    if let Some(summary) = report.state.revealed.get(Section::Final) {
        output.push_str(&generate_final_section(summary, include_raw));
    }

    output.push_str("---\n\n");
    output.push_str("*Report generated by MediGuard*\n");

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Patient ID:** `{}`\n", metadata.patient_id));
    section.push_str(&format!("- **Analysis Service:** {}\n", metadata.api_url));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Run:** {}\n", metadata.run_id));
    section.push_str(&format!("- **Outcome:** {}\n", metadata.stage));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_workflow_section(state: &WorkflowState) -> String {
    let mut section = String::new();

    section.push_str("## Analysis Workflow\n\n");
    section.push_str("| Agent | Status |\n");
    section.push_str("|:---|:---:|\n");
    for agent in Section::STAGED {
        section.push_str(&format!(
            "| {} {} | {} |\n",
            agent.emoji(),
            agent.title(),
            step_status(state, agent)
        ));
    }
    section.push('\n');

    section
}

fn generate_findings_section(state: &WorkflowState, include_raw: bool) -> String {
    let staged: Vec<_> = state
        .revealed
        .iter()
        .filter(|(section, _)| *section != Section::Final)
        .collect();

    if staged.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Agent Findings\n\n");

    for (agent, value) in staged {
        section.push_str(&format!("### {} {}\n\n", agent.emoji(), agent.title()));
        section.push_str(&render_value(value));
        if include_raw {
            section.push_str(&render_raw(value));
        }
        section.push('\n');
    }

    section
}

fn generate_final_section(summary: &Value, include_raw: bool) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "## {} {}\n\n",
        Section::Final.emoji(),
        Section::Final.title()
    ));

    if let Some(score) = summary.get("fraud_risk_score").and_then(Value::as_f64) {
        let level = RiskLevel::from_score(score);
        section.push_str(&format!(
            "- **Overall Fraud Risk:** {} {}/100\n",
            level.emoji(),
            format_number(score)
        ));
    }
    if let Some(flag) = summary.get("identity_misuse_flag").and_then(Value::as_bool) {
        let text = if flag { "Detected" } else { "Not Detected" };
        section.push_str(&format!("- **Identity Misuse:** {}\n", text));
    }
    if let Some(ready) = summary.get("discharge_ready").and_then(Value::as_bool) {
        let text = if ready { "Ready" } else { "Not Ready" };
        section.push_str(&format!("- **Discharge Status:** {}\n", text));
    }
    section.push('\n');

    if include_raw {
        section.push_str(&render_raw(summary));
        section.push('\n');
    }

    section
}

/// Render an opaque section payload as Markdown bullets.
fn render_value(value: &Value) -> String {
    let Value::Object(fields) = value else {
        return format!("{}\n", render_scalar("", value));
    };

    if fields.is_empty() {
        return "*No findings reported.*\n".to_string();
    }

    let mut out = String::new();
    for (key, field) in fields {
        let label = humanize(key);
        match field {
            Value::Array(items) if items.is_empty() => {
                out.push_str(&format!("- **{}:** none\n", label));
            }
            Value::Array(items) => {
                out.push_str(&format!("- **{}:**\n", label));
                for item in items {
                    out.push_str(&format!("  - {}\n", render_scalar("", item)));
                }
            }
            _ => {
                out.push_str(&format!("- **{}:** {}\n", label, render_scalar(key, field)));
            }
        }
    }

    out
}

fn render_scalar(key: &str, value: &Value) -> String {
    match value {
        Value::Null => "n/a".to_string(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(n) => {
            let number = n.as_f64().unwrap_or_default();
            if key.ends_with("score") {
                let level = RiskLevel::from_score(number);
                format!("{} {}/100", level.emoji(), format_number(number))
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        other => format!("`{}`", other),
    }
}

fn render_raw(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!(
        "\n<details>\n<summary>Raw JSON</summary>\n\n```json\n{}\n```\n</details>\n",
        pretty
    )
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

/// `fraud_risk_score` -> `Fraud risk score`
fn humanize(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render up to `max` sample IDs as a numbered list.
pub fn render_sample_ids(ids: &[String], max: usize) -> String {
    if ids.is_empty() {
        return "No sample patient IDs available.\n".to_string();
    }

    let mut out = String::from("Sample patient IDs:\n");
    for (i, id) in ids.iter().take(max).enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, id));
    }
    if ids.len() > max {
        out.push_str(&format!("  ... and {} more\n", ids.len() - max));
    }

    out
}
