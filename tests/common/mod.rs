//! Common test utilities for integration tests
//!
//! Collaborator responses and scripted activity fixtures shared by the
//! workflow test files.

#![allow(dead_code)]

use repair_agent::adapters::activities::{ScriptedActivities, ScriptedResponse};
use repair_agent::domain::models::{Config, RepairStatus, StatusSnapshot};
use repair_agent::domain::ports::ActivityKind;
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Setup test logging
///
/// Initializes a tracing subscriber for test output. Safe to call repeatedly.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn detection(score: f64, notes: &str) -> Value {
    json!({"confidence_score": score, "additional_notes": notes})
}

pub fn analysis() -> Value {
    json!({
        "issues": [{"order_id": "ORD-1", "issue": "payment declined", "confidence_score": 0.8}],
        "confidence_score": 0.8,
    })
}

pub fn plan(score: f64) -> Value {
    json!({
        "proposed_tools": {
            "ORD-1": [{
                "tool_name": "request_payment_update_tool",
                "tool_arguments": {"order_id": "ORD-1"},
                "confidence_score": score,
                "additional_notes": "customer card expired",
            }],
        },
        "overall_confidence_score": score,
    })
}

pub fn report(summary: &str) -> Value {
    json!({"report_summary": summary, "repairs_sufficient_confidence_score": 0.9})
}

/// The demo collaborator with its detection and planning scores replaced.
///
/// Repairs run through the demo's local `request_payment_update_tool`.
pub fn scripted(detect_score: f64, plan_score: f64) -> ScriptedActivities {
    ScriptedActivities::demo()
        .with_default(
            ActivityKind::Detect,
            ScriptedResponse::ok(detection(detect_score, "stuck orders found")),
        )
        .with_default(ActivityKind::Analyze, ScriptedResponse::ok(analysis()))
        .with_default(ActivityKind::Plan, ScriptedResponse::ok(plan(plan_score)))
        .with_default(
            ActivityKind::Report,
            ScriptedResponse::ok(report("Payment update requested for ORD-1.")),
        )
}

pub fn config_with_iterations(max_iterations: u32) -> Config {
    let mut config = Config::default();
    config.proactive.max_iterations = max_iterations;
    config
}

/// Every snapshot already published on `updates`.
pub fn drain_phases(updates: &mut broadcast::Receiver<StatusSnapshot>) -> Vec<RepairStatus> {
    let mut phases = Vec::new();
    while let Ok(snapshot) = updates.try_recv() {
        phases.push(snapshot.phase);
    }
    phases
}
