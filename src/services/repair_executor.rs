//! Local repair-tool execution.
//!
//! Walks the planned tools record by record, skips low-confidence proposals,
//! and runs the rest through a [`ToolRegistry`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::models::{keys, PlanningResult, ProcessContext, RepairResult, RepairToolDetail};
use crate::domain::ports::{ActivityError, Heartbeat};

/// Failure reported by a repair tool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// Execution failed; running the tool again may succeed.
    #[error("tool execution failed: {0}")]
    Failed(String),

    /// The arguments can never work for this tool.
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl From<ToolError> for ActivityError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Failed(_) => ActivityError::transient(err.to_string()),
            ToolError::InvalidArguments(_) => ActivityError::non_retryable(err.to_string()),
        }
    }
}

/// A named remediation that mutates the record store.
#[async_trait]
pub trait RepairTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError>;
}

type ToolFn = dyn Fn(&Map<String, Value>) -> Result<Value, ToolError> + Send + Sync;

/// A tool backed by a closure.
pub struct FnTool {
    name: String,
    description: String,
    run: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            run: Box::new(run),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl RepairTool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        (self.run)(arguments)
    }
}

/// Repair tools by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn RepairTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl RepairTool + 'static) {
        let name = tool.name().to_string();
        debug!(tool = %name, "Registering repair tool");
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn with_tool(mut self, tool: impl RepairTool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RepairTool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Execute every proposed tool whose confidence meets `threshold`.
///
/// An unknown tool name is non-retryable. A failing tool aborts the run as a
/// transient failure, so the whole activity is retried.
pub async fn execute_planned_repairs(
    plan: &PlanningResult,
    registry: &ToolRegistry,
    threshold: f64,
    heartbeat: &Heartbeat,
) -> Result<RepairResult, ActivityError> {
    if plan.tool_count() == 0 {
        info!("No proposed tools found for repair");
        return Ok(RepairResult {
            repair_tool_details: Vec::new(),
            problems_repaired: 0,
            problems_skipped: 0,
            repair_summary: "No proposed tools found for repair.".to_string(),
        });
    }

    let mut details = Vec::new();
    let mut skipped = 0u32;

    for (record_id, tools) in &plan.proposed_tools {
        for proposed in tools {
            heartbeat.beat(format!("Repair for record {record_id} in progress..."));

            if proposed.confidence_score < threshold {
                warn!(
                    record_id = %record_id,
                    tool = %proposed.tool_name,
                    confidence = proposed.confidence_score,
                    "Low confidence, skipping repair"
                );
                skipped += 1;
                continue;
            }

            let tool = registry.get(&proposed.tool_name).ok_or_else(|| {
                ActivityError::non_retryable(format!(
                    "tool '{}' is not registered",
                    proposed.tool_name
                ))
            })?;
            let arguments = proposed.arguments();

            let result = tool.execute(&arguments).await.map_err(|err| {
                warn!(tool = %proposed.tool_name, record_id = %record_id, error = %err, "Repair tool failed");
                ActivityError::from(err)
            })?;
            debug!(tool = %proposed.tool_name, record_id = %record_id, "Repair tool executed");

            details.push(RepairToolDetail {
                record_id: record_id.clone(),
                tool_name: proposed.tool_name.clone(),
                confidence_score: proposed.confidence_score,
                additional_notes: proposed
                    .additional_notes
                    .as_deref()
                    .filter(|notes| !notes.is_empty())
                    .map(|notes| format!("({notes})"))
                    .unwrap_or_default(),
                tool_arguments: arguments,
                tool_result: result,
            });
        }
    }

    let repaired = u32::try_from(details.len()).unwrap_or(u32::MAX);
    let summary = format!(
        "Repair completed successfully: {repaired} problems repaired (with {skipped} skipped)."
    );
    info!(repaired, skipped, "{summary}");

    Ok(RepairResult {
        repair_tool_details: details,
        problems_repaired: repaired,
        problems_skipped: skipped,
        repair_summary: summary,
    })
}

/// Read the plan out of an activity context and execute it.
pub async fn execute_from_context(
    context: &ProcessContext,
    registry: &ToolRegistry,
    threshold: f64,
    heartbeat: &Heartbeat,
) -> Result<Value, ActivityError> {
    let plan = context
        .get_typed::<PlanningResult>(keys::PLANNING_RESULT)
        .map_err(|err| ActivityError::non_retryable(err.to_string()))?
        .unwrap_or_default();
    let result = execute_planned_repairs(&plan, registry, threshold, heartbeat).await?;
    serde_json::to_value(result).map_err(|err| ActivityError::non_retryable(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ProposedTool;
    use serde_json::json;

    fn proposed(name: &str, confidence: f64) -> ProposedTool {
        ProposedTool {
            tool_name: name.to_string(),
            tool_arguments: json!({"order_id": "ORD-1"}),
            confidence_score: confidence,
            additional_notes: Some("restock".to_string()),
        }
    }

    fn plan(tools: Vec<(&str, Vec<ProposedTool>)>) -> PlanningResult {
        PlanningResult {
            proposed_tools: tools
                .into_iter()
                .map(|(record, tools)| (record.to_string(), tools))
                .collect(),
            overall_confidence_score: 0.9,
            additional_notes: None,
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with_tool(FnTool::new("order_inventory_tool", |args| {
                Ok(json!({"status": "success", "order_id": args.get("order_id")}))
            }))
            .with_tool(FnTool::new("flaky_tool", |_| {
                Err(ToolError::Failed("inventory service unavailable".to_string()))
            }))
    }

    #[tokio::test]
    async fn test_executes_confident_tools_and_skips_the_rest() {
        let (heartbeat, mut beats) = Heartbeat::channel();
        let plan = plan(vec![
            ("ORD-1", vec![proposed("order_inventory_tool", 0.9)]),
            ("ORD-2", vec![proposed("order_inventory_tool", 0.2)]),
        ]);

        let result = execute_planned_repairs(&plan, &registry(), 0.5, &heartbeat)
            .await
            .unwrap();

        assert_eq!(result.problems_repaired, 1);
        assert_eq!(result.problems_skipped, 1);
        assert_eq!(
            result.repair_summary,
            "Repair completed successfully: 1 problems repaired (with 1 skipped)."
        );
        let detail = &result.repair_tool_details[0];
        assert_eq!(detail.record_id, "ORD-1");
        assert_eq!(detail.additional_notes, "(restock)");
        assert_eq!(detail.tool_result["status"], "success");

        assert!(beats.recv().await.unwrap().contains("ORD-1"));
        assert!(beats.recv().await.unwrap().contains("ORD-2"));
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let (heartbeat, _beats) = Heartbeat::channel();
        let plan = plan(vec![("ORD-1", vec![proposed("order_inventory_tool", 0.5)])]);

        let result = execute_planned_repairs(&plan, &registry(), 0.5, &heartbeat)
            .await
            .unwrap();
        assert_eq!(result.problems_repaired, 1);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let (heartbeat, _beats) = Heartbeat::channel();
        let result = execute_planned_repairs(&plan(vec![]), &registry(), 0.5, &heartbeat)
            .await
            .unwrap();
        assert_eq!(result.repair_summary, "No proposed tools found for repair.");
        assert_eq!(result.problems_repaired, 0);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_retryable() {
        let (heartbeat, _beats) = Heartbeat::channel();
        let plan = plan(vec![("ORD-1", vec![proposed("summon_owl", 0.9)])]);

        let err = execute_planned_repairs(&plan, &registry(), 0.5, &heartbeat)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_tool_failure_is_retryable() {
        let (heartbeat, _beats) = Heartbeat::channel();
        let plan = plan(vec![("ORD-1", vec![proposed("flaky_tool", 0.9)])]);

        let err = execute_planned_repairs(&plan, &registry(), 0.5, &heartbeat)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_execute_from_context_without_plan() {
        let (heartbeat, _beats) = Heartbeat::channel();
        let value = execute_from_context(&ProcessContext::new(), &registry(), 0.5, &heartbeat)
            .await
            .unwrap();
        assert_eq!(value["repair_summary"], "No proposed tools found for repair.");
    }
}
