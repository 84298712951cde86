//! Typed activity results.
//!
//! Collaborators return loosely shaped JSON; these types pin down the fields
//! the orchestrator relies on and keep everything else in `extra`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::ActivityKind;

/// A typed activity output.
pub trait ActivityOutput: Serialize + DeserializeOwned {
    const KIND: ActivityKind;

    /// Structural checks serde cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Parse and validate a raw activity response.
pub fn parse_output<T: ActivityOutput>(value: Value) -> DomainResult<T> {
    let malformed = |message: String| DomainError::MalformedResponse {
        activity: T::KIND,
        message,
    };
    if !value.is_object() {
        return Err(malformed(format!("expected a JSON object, got {value}")));
    }
    let parsed: T = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
    parsed.validate().map_err(malformed)?;
    Ok(parsed)
}

fn check_score(name: &str, score: f64) -> Result<(), String> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(format!("{name} must be a finite number"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub confidence_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActivityOutput for DetectionResult {
    const KIND: ActivityKind = ActivityKind::Detect;

    fn validate(&self) -> Result<(), String> {
        check_score("confidence_score", self.confidence_score)
    }
}

/// One problem identified during analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default, alias = "order_id", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub issues: Vec<Issue>,

    pub confidence_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActivityOutput for AnalysisResult {
    const KIND: ActivityKind = ActivityKind::Analyze;

    fn validate(&self) -> Result<(), String> {
        check_score("confidence_score", self.confidence_score)
    }
}

/// A repair tool proposed for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedTool {
    #[serde(default)]
    pub tool_name: String,

    #[serde(default)]
    pub tool_arguments: Value,

    #[serde(default)]
    pub confidence_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

impl ProposedTool {
    /// Arguments as an object; validated plans always have one.
    pub fn arguments(&self) -> Map<String, Value> {
        self.tool_arguments.as_object().cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    /// Record id to the tools proposed for it.
    pub proposed_tools: BTreeMap<String, Vec<ProposedTool>>,

    pub overall_confidence_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

impl PlanningResult {
    pub fn tool_count(&self) -> usize {
        self.proposed_tools.values().map(Vec::len).sum()
    }
}

impl ActivityOutput for PlanningResult {
    const KIND: ActivityKind = ActivityKind::Plan;

    fn validate(&self) -> Result<(), String> {
        check_score("overall_confidence_score", self.overall_confidence_score)?;
        for (record_id, tools) in &self.proposed_tools {
            for tool in tools {
                if tool.tool_name.trim().is_empty() || tool.tool_arguments.is_null() {
                    return Err(format!(
                        "tool name or arguments missing for tool '{}' for record {record_id}",
                        tool.tool_name
                    ));
                }
                if !tool.tool_arguments.is_object() {
                    return Err(format!(
                        "expected an object for arguments of tool '{}' for record {record_id}",
                        tool.tool_name
                    ));
                }
                check_score("confidence_score", tool.confidence_score)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub notification_status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_details: Option<String>,
}

impl ActivityOutput for NotificationResult {
    const KIND: ActivityKind = ActivityKind::Notify;
}

/// Outcome of one executed tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairToolDetail {
    #[serde(alias = "order_id")]
    pub record_id: String,
    pub tool_name: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub additional_notes: String,
    #[serde(default)]
    pub tool_arguments: Map<String, Value>,
    #[serde(default)]
    pub tool_result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairResult {
    #[serde(default)]
    pub repair_tool_details: Vec<RepairToolDetail>,

    #[serde(default)]
    pub problems_repaired: u32,

    #[serde(default)]
    pub problems_skipped: u32,

    pub repair_summary: String,
}

impl ActivityOutput for RepairResult {
    const KIND: ActivityKind = ActivityKind::ExecuteRepairs;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub report_summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_summary: Option<Value>,

    #[serde(default)]
    pub repairs_sufficient_confidence_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActivityOutput for ReportResult {
    const KIND: ActivityKind = ActivityKind::Report;
}
