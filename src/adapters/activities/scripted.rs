//! Scripted in-memory activities for tests and dry runs.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::domain::models::ProcessContext;
use crate::domain::ports::{ActivityError, ActivityKind, ActivityResult, Heartbeat, RepairActivities};
use crate::services::repair_executor::{execute_from_context, FnTool, ToolRegistry};

/// One scripted outcome for an activity attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    Ok(Value),
    Transient(String),
    NonRetryable(String),
    /// Never completes and never heartbeats.
    Stall,
}

impl ScriptedResponse {
    pub fn ok(value: Value) -> Self {
        Self::Ok(value)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable(message.into())
    }
}

/// A recorded activity attempt.
#[derive(Debug, Clone)]
pub struct ActivityCall {
    pub kind: ActivityKind,
    pub context: ProcessContext,
}

/// Activities answered from per-kind queues.
///
/// Each attempt pops the next queued response for its kind, falling back to
/// the kind's default. `execute_repairs` without a scripted response runs the
/// planned tools through the local tool registry; any other unscripted
/// attempt fails as non-retryable.
pub struct ScriptedActivities {
    queues: Mutex<HashMap<ActivityKind, VecDeque<ScriptedResponse>>>,
    defaults: Mutex<HashMap<ActivityKind, ScriptedResponse>>,
    calls: Mutex<Vec<ActivityCall>>,
    tools: ToolRegistry,
    tool_threshold: f64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedActivities {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            tools: ToolRegistry::new(),
            tool_threshold: 0.5,
        }
    }

    /// A complete, successful cycle: one payment problem on `ORD-1` repaired
    /// with a plan confident enough to need human approval.
    pub fn demo() -> Self {
        let tools = ToolRegistry::new().with_tool(
            FnTool::new("request_payment_update_tool", |args| {
                let order_id = args
                    .get("order_id")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown_order_id");
                Ok(json!({
                    "status": "success",
                    "message": format!("Payment update request sent for order {order_id}."),
                }))
            })
            .with_description("Requests a payment update so an order can be paid."),
        );

        Self::new()
            .with_tools(tools)
            .with_default(
                ActivityKind::Detect,
                ScriptedResponse::ok(json!({
                    "confidence_score": 0.8,
                    "additional_notes": "One order is stuck waiting for payment.",
                })),
            )
            .with_default(
                ActivityKind::Analyze,
                ScriptedResponse::ok(json!({
                    "issues": [{"order_id": "ORD-1", "issue": "payment declined", "confidence_score": 0.8}],
                    "confidence_score": 0.8,
                })),
            )
            .with_default(
                ActivityKind::Plan,
                ScriptedResponse::ok(json!({
                    "proposed_tools": {
                        "ORD-1": [{
                            "tool_name": "request_payment_update_tool",
                            "tool_arguments": {"order_id": "ORD-1"},
                            "confidence_score": 0.9,
                            "additional_notes": "customer card expired",
                        }],
                    },
                    "overall_confidence_score": 0.9,
                })),
            )
            .with_default(
                ActivityKind::Notify,
                ScriptedResponse::ok(json!({"notification_status": "sent"})),
            )
            .with_default(
                ActivityKind::Report,
                ScriptedResponse::ok(json!({
                    "report_summary": "Payment update requested for ORD-1.",
                    "repairs_sufficient_confidence_score": 0.9,
                })),
            )
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_threshold(mut self, threshold: f64) -> Self {
        self.tool_threshold = threshold;
        self
    }

    pub fn with_default(self, kind: ActivityKind, response: ScriptedResponse) -> Self {
        self.set_default(kind, response);
        self
    }

    pub fn set_default(&self, kind: ActivityKind, response: ScriptedResponse) {
        lock(&self.defaults).insert(kind, response);
    }

    /// Queue a response for the next attempt of `kind`.
    pub fn push(&self, kind: ActivityKind, response: ScriptedResponse) {
        lock(&self.queues).entry(kind).or_default().push_back(response);
    }

    pub fn calls(&self) -> Vec<ActivityCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, kind: ActivityKind) -> usize {
        lock(&self.calls).iter().filter(|call| call.kind == kind).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    fn next_response(&self, kind: ActivityKind) -> Option<ScriptedResponse> {
        let queued = lock(&self.queues).get_mut(&kind).and_then(VecDeque::pop_front);
        queued.or_else(|| lock(&self.defaults).get(&kind).cloned())
    }

    async fn respond(
        &self,
        kind: ActivityKind,
        context: ProcessContext,
        heartbeat: Heartbeat,
    ) -> ActivityResult {
        lock(&self.calls).push(ActivityCall {
            kind,
            context: context.clone(),
        });
        let response = self.next_response(kind);
        debug!(activity = %kind, response = ?response, "Scripted activity attempt");

        match response {
            Some(ScriptedResponse::Ok(value)) => {
                heartbeat.beat(format!("{kind} completed"));
                Ok(value)
            }
            Some(ScriptedResponse::Transient(message)) => Err(ActivityError::Transient(message)),
            Some(ScriptedResponse::NonRetryable(message)) => {
                Err(ActivityError::NonRetryable(message))
            }
            Some(ScriptedResponse::Stall) => std::future::pending().await,
            None if kind == ActivityKind::ExecuteRepairs => {
                execute_from_context(&context, &self.tools, self.tool_threshold, &heartbeat).await
            }
            None => Err(ActivityError::non_retryable(format!(
                "no scripted response for {kind}"
            ))),
        }
    }
}

impl Default for ScriptedActivities {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepairActivities for ScriptedActivities {
    async fn detect(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.respond(ActivityKind::Detect, context, heartbeat).await
    }

    async fn analyze(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.respond(ActivityKind::Analyze, context, heartbeat).await
    }

    async fn plan(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.respond(ActivityKind::Plan, context, heartbeat).await
    }

    async fn notify(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.respond(ActivityKind::Notify, context, heartbeat).await
    }

    async fn execute_repairs(
        &self,
        context: ProcessContext,
        heartbeat: Heartbeat,
    ) -> ActivityResult {
        self.respond(ActivityKind::ExecuteRepairs, context, heartbeat).await
    }

    async fn report(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult {
        self.respond(ActivityKind::Report, context, heartbeat).await
    }
}
