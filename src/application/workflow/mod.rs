//! Repair workflows and their signal/query surface.
//!
//! A workflow instance owns one [`ProcessState`]. The state machine advances
//! it from a single task; [`RepairHandle`] lets other tasks deliver signals
//! and run queries against it. Every access goes through the instance lock,
//! and every mutation bumps a change counter that wakes condition waits.

mod base;
mod cycle;
mod proactive;

pub use base::RepairWorkflow;
pub use proactive::{LoopOutcome, ProactiveRepairWorkflow};

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AnalysisResult, DetectionResult, PlanningResult, ProcessContext, ProcessState, RepairResult,
    RepairStatus, ReportResult, Signal, SignalOutcome, StatusSnapshot, WorkflowVariant,
};

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Terminal result of one run: the final status and a one-line summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RepairStatus,
    pub summary: String,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.summary)
    }
}

/// The current run of a logical workflow. Replaced on continuation.
struct Instance {
    run_id: Uuid,
    continuations: u32,
    state: ProcessState,
}

pub(crate) struct Shared {
    workflow_id: String,
    instance: RwLock<Instance>,
    changes: watch::Sender<u64>,
    status_tx: broadcast::Sender<StatusSnapshot>,
}

impl Shared {
    fn new(workflow_id: String, state: ProcessState) -> Arc<Self> {
        let (changes, _) = watch::channel(0);
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Arc::new(Self {
            workflow_id,
            instance: RwLock::new(Instance {
                run_id: Uuid::new_v4(),
                continuations: 0,
                state,
            }),
            changes,
            status_tx,
        })
    }

    pub(crate) fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub(crate) async fn run_id(&self) -> Uuid {
        self.instance.read().await.run_id
    }

    pub(crate) async fn read<R>(&self, f: impl FnOnce(&ProcessState) -> R) -> R {
        f(&self.instance.read().await.state)
    }

    pub(crate) async fn update<R>(&self, f: impl FnOnce(&mut ProcessState) -> R) -> R {
        let result = {
            let mut instance = self.instance.write().await;
            f(&mut instance.state)
        };
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
        result
    }

    /// Swap in a fresh state under a new run id, keeping the workflow id.
    ///
    /// An exit request that arrived after the old run last looked at its
    /// flags is carried into the fresh state.
    pub(crate) async fn restart(&self, mut state: ProcessState) -> Uuid {
        let run_id = {
            let mut instance = self.instance.write().await;
            state.exit_requested |= instance.state.exit_requested;
            instance.run_id = Uuid::new_v4();
            instance.continuations += 1;
            instance.state = state;
            instance.run_id
        };
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
        run_id
    }

    pub(crate) fn publish(&self, snapshot: StatusSnapshot) {
        // No subscribers is fine.
        let _ = self.status_tx.send(snapshot);
    }

    /// Suspend until `predicate` holds or `limit` elapses.
    ///
    /// Returns whether the predicate held when the wait ended. Updates made
    /// before the wait started are observed because the predicate is checked
    /// after subscribing. A limit too large to express as a deadline waits
    /// without one.
    pub(crate) async fn wait_condition<P>(&self, predicate: P, limit: Option<Duration>) -> bool
    where
        P: Fn(&ProcessState) -> bool + Send + Sync,
    {
        let mut changes = self.changes.subscribe();
        let deadline = limit.and_then(|limit| Instant::now().checked_add(limit));

        loop {
            if self.read(&predicate).await {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        changed = changes.changed() => {
                            if changed.is_err() {
                                return self.read(&predicate).await;
                            }
                        }
                        () = sleep_until(deadline) => return self.read(&predicate).await,
                    }
                }
                None => {
                    if changes.changed().await.is_err() {
                        return self.read(&predicate).await;
                    }
                }
            }
        }
    }
}

/// Cloneable handle for signalling and querying a running workflow.
#[derive(Clone)]
pub struct RepairHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for RepairHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepairHandle")
            .field("workflow_id", &self.shared.workflow_id)
            .finish_non_exhaustive()
    }
}

impl RepairHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn workflow_id(&self) -> &str {
        self.shared.workflow_id()
    }

    /// Changes on every continuation.
    pub async fn run_id(&self) -> String {
        self.shared.run_id().await.to_string()
    }

    pub async fn continuation_count(&self) -> u32 {
        self.shared.instance.read().await.continuations
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    pub async fn signal(&self, signal: Signal) -> SignalOutcome {
        let outcome = self.shared.update(|state| state.apply(&signal)).await;
        match outcome {
            SignalOutcome::Applied => {
                info!(workflow_id = %self.workflow_id(), signal = %signal, "Signal applied");
            }
            SignalOutcome::Ignored(reason) => {
                info!(workflow_id = %self.workflow_id(), signal = %signal, reason, "Signal ignored");
            }
        }
        outcome
    }

    pub async fn approve_repair(&self, approver: impl Into<String>) -> SignalOutcome {
        self.signal(Signal::ApproveRepair(approver.into())).await
    }

    pub async fn reject_repair(&self, rejecter: impl Into<String>) -> SignalOutcome {
        self.signal(Signal::RejectRepair(rejecter.into())).await
    }

    pub async fn request_exit(&self) -> SignalOutcome {
        self.signal(Signal::RequestExit).await
    }

    pub async fn stop_waiting(&self) -> SignalOutcome {
        self.signal(Signal::StopWaiting).await
    }

    pub async fn request_continue_as_new(&self) -> SignalOutcome {
        self.signal(Signal::RequestContinueAsNew).await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn status(&self) -> RepairStatus {
        self.shared.read(|state| state.status).await
    }

    pub async fn state(&self) -> ProcessState {
        self.shared.read(ProcessState::clone).await
    }

    pub async fn context(&self) -> ProcessContext {
        self.shared.read(|state| state.context.clone()).await
    }

    pub async fn context_value(&self, key: &str) -> DomainResult<Value> {
        self.shared.read(|state| state.context_value(key)).await
    }

    pub async fn context_keys(&self) -> Vec<String> {
        self.shared.read(ProcessState::context_keys).await
    }

    /// Whether the current cycle has a plan. Cleared at the start of every
    /// proactive iteration.
    pub async fn is_planned(&self) -> bool {
        self.shared.read(|state| state.planned).await
    }

    pub async fn is_approved(&self) -> bool {
        self.shared.read(|state| state.approved).await
    }

    // Phase results live in the context, which only grows within a run. In a
    // proactive run they hold the latest cycle that reached the phase, which
    // can be an earlier iteration: check `is_planned` and `iteration_count`
    // before treating them as the current cycle's. They reset on continuation.

    pub async fn detection_result(&self) -> DomainResult<DetectionResult> {
        self.shared.read(ProcessState::detection_result).await
    }

    pub async fn analysis_result(&self) -> DomainResult<AnalysisResult> {
        self.shared.read(ProcessState::analysis_result).await
    }

    /// The most recent plan in this run, possibly from an earlier iteration
    /// while `is_planned` is false.
    pub async fn planning_result(&self) -> DomainResult<PlanningResult> {
        self.shared.read(ProcessState::planning_result).await
    }

    /// The most recent repair outcome in this run. A later cycle that was
    /// rejected or failed leaves it in place.
    pub async fn tool_results(&self) -> DomainResult<RepairResult> {
        self.shared.read(ProcessState::tool_results).await
    }

    pub async fn report(&self) -> DomainResult<ReportResult> {
        self.shared.read(ProcessState::report).await
    }

    pub async fn iteration_count(&self) -> u32 {
        self.shared.read(|state| state.iteration_count).await
    }

    /// 0.0 until detection has completed.
    pub async fn problems_confidence_score(&self) -> f64 {
        self.shared
            .read(|state| state.problems_confidence_score.unwrap_or_default())
            .await
    }

    /// 0.0 until planning has completed.
    pub async fn planned_repair_confidence_score(&self) -> f64 {
        self.shared
            .read(|state| state.planning_confidence_score.unwrap_or_default())
            .await
    }

    pub async fn status_details(&self) -> Option<StatusSnapshot> {
        self.shared.read(|state| state.details.clone()).await
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.shared.status_tx.subscribe()
    }

    /// Wait, without a bound, until `predicate` holds for the current state.
    pub async fn wait_for<P>(&self, predicate: P)
    where
        P: Fn(&ProcessState) -> bool + Send + Sync,
    {
        self.shared.wait_condition(predicate, None).await;
        debug!(workflow_id = %self.workflow_id(), "Wait condition satisfied");
    }

    pub async fn wait_for_status(&self, status: RepairStatus) {
        self.wait_for(move |state| state.status == status).await;
    }
}

pub(crate) fn new_instance(
    workflow_id: String,
    variant: WorkflowVariant,
    context: ProcessContext,
) -> Arc<Shared> {
    Shared::new(workflow_id, ProcessState::new(variant, context))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Arc<Shared> {
        new_instance(
            "repair-test".to_string(),
            WorkflowVariant::Base,
            ProcessContext::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_condition_sees_earlier_update() {
        let shared = shared();
        shared.update(|state| state.approved = true).await;
        assert!(
            shared
                .wait_condition(|state| state.approved, Some(Duration::from_secs(1)))
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_condition_times_out() {
        let shared = shared();
        let started = Instant::now();
        let satisfied = shared
            .wait_condition(|state| state.rejected, Some(Duration::from_secs(60)))
            .await;
        assert!(!satisfied);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_condition_with_unrepresentable_limit() {
        let shared = shared();
        let handle = RepairHandle::new(shared.clone());

        let waiter = tokio::spawn({
            let shared = shared.clone();
            async move {
                shared
                    .wait_condition(|state| state.approved, Some(Duration::from_secs(u64::MAX)))
                    .await
            }
        });
        tokio::task::yield_now().await;
        handle.approve_repair("bob").await;

        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_condition_wakes_on_signal() {
        let shared = shared();
        let handle = RepairHandle::new(shared.clone());

        let waiter = tokio::spawn({
            let shared = shared.clone();
            async move {
                shared
                    .wait_condition(|state| state.has_decision(), Some(Duration::from_secs(3600)))
                    .await
            }
        });
        tokio::task::yield_now().await;
        handle.reject_repair("bob").await;

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_keeps_workflow_id() {
        let shared = shared();
        let handle = RepairHandle::new(shared.clone());
        let first = handle.run_id().await;

        shared
            .restart(ProcessState::new(WorkflowVariant::Proactive, ProcessContext::new()))
            .await;

        assert_eq!(handle.workflow_id(), "repair-test");
        assert_ne!(handle.run_id().await, first);
        assert_eq!(handle.continuation_count().await, 1);
    }

    #[tokio::test]
    async fn test_restart_keeps_pending_exit_request() {
        let shared = new_instance(
            "repair-loop".to_string(),
            WorkflowVariant::Proactive,
            ProcessContext::new(),
        );
        let handle = RepairHandle::new(shared.clone());
        handle.request_continue_as_new().await;
        handle.request_exit().await;

        shared
            .restart(ProcessState::new(WorkflowVariant::Proactive, ProcessContext::new()))
            .await;

        let (exit_requested, continue_requested) = shared
            .read(|state| (state.exit_requested, state.continue_as_new_requested))
            .await;
        assert!(exit_requested);
        assert!(!continue_requested);
    }

    #[test]
    fn test_run_summary_display() {
        let summary = RunSummary {
            status: RepairStatus::Rejected,
            summary: "Repair REJECTED by user bob".to_string(),
        };
        assert_eq!(summary.to_string(), "REJECTED: Repair REJECTED by user bob");
    }
}
