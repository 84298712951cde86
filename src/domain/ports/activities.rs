//! Activity port - the collaborator steps the orchestrator sequences.
//!
//! Each activity receives an owned copy of the process context and returns a
//! JSON fragment that the orchestrator merges back under a well-known key.
//! Implementations must call [`Heartbeat::beat`] periodically while working;
//! an attempt that stays silent longer than its heartbeat timeout is treated
//! as stalled and retried.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::models::ProcessContext;

/// The named activities of a repair cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Detect,
    Analyze,
    Plan,
    Notify,
    ExecuteRepairs,
    Report,
}

impl ActivityKind {
    pub const ALL: [Self; 6] = [
        Self::Detect,
        Self::Analyze,
        Self::Plan,
        Self::Notify,
        Self::ExecuteRepairs,
        Self::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Notify => "notify",
            Self::ExecuteRepairs => "execute_repairs",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an activity implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivityError {
    /// Network, LLM or tool hiccup; the runner retries with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help (bad input, unknown tool, invalid response).
    #[error("non-retryable failure: {0}")]
    NonRetryable(String),
}

impl ActivityError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::NonRetryable(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type ActivityResult = Result<Value, ActivityError>;

/// Liveness handle passed to every activity attempt.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    tx: mpsc::UnboundedSender<String>,
}

impl Heartbeat {
    /// Create a heartbeat handle and the receiver the runner monitors.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Record progress. Never fails; a beat after the attempt ended is dropped.
    pub fn beat(&self, details: impl Into<String>) {
        let _ = self.tx.send(details.into());
    }
}

/// Collaborator-side implementation of the six repair activities.
#[async_trait]
pub trait RepairActivities: Send + Sync {
    /// Detect anomalies. Result must carry `confidence_score`.
    async fn detect(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult;

    /// Analyze detected anomalies into `issues`.
    async fn analyze(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult;

    /// Propose repair tools per record (`proposed_tools`).
    async fn plan(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult;

    /// Inform an external party that a plan awaits a decision.
    async fn notify(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult;

    /// Execute the approved plan.
    async fn execute_repairs(
        &self,
        context: ProcessContext,
        heartbeat: Heartbeat,
    ) -> ActivityResult;

    /// Summarize the run.
    async fn report(&self, context: ProcessContext, heartbeat: Heartbeat) -> ActivityResult;
}

/// Dispatch an activity by kind.
pub fn invoke<'a>(
    activities: &'a dyn RepairActivities,
    kind: ActivityKind,
    context: ProcessContext,
    heartbeat: Heartbeat,
) -> BoxFuture<'a, ActivityResult> {
    match kind {
        ActivityKind::Detect => activities.detect(context, heartbeat),
        ActivityKind::Analyze => activities.analyze(context, heartbeat),
        ActivityKind::Plan => activities.plan(context, heartbeat),
        ActivityKind::Notify => activities.notify(context, heartbeat),
        ActivityKind::ExecuteRepairs => activities.execute_repairs(context, heartbeat),
        ActivityKind::Report => activities.report(context, heartbeat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_kind_names() {
        assert_eq!(ActivityKind::ExecuteRepairs.to_string(), "execute_repairs");
        let json = serde_json::to_string(&ActivityKind::Plan).unwrap();
        assert_eq!(json, "\"plan\"");
    }

    #[test]
    fn test_activity_error_retryability() {
        assert!(ActivityError::transient("timeout").is_retryable());
        assert!(!ActivityError::non_retryable("bad plan").is_retryable());
    }

    #[tokio::test]
    async fn test_heartbeat_delivers_details() {
        let (heartbeat, mut rx) = Heartbeat::channel();
        heartbeat.beat("orders loaded");
        assert_eq!(rx.recv().await.as_deref(), Some("orders loaded"));

        drop(rx);
        heartbeat.beat("ignored");
    }
}
