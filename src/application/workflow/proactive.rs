//! Always-on repair loop.
//!
//! Each iteration runs one repair cycle and then waits for the next one. Plans
//! with very high confidence are approved without a human. After a bounded
//! number of iterations the loop continues as new: the accumulated state is
//! dropped and the loop restarts from the original start payload under the
//! same workflow id.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::cycle::{CycleExecutor, Triage};
use super::{new_instance, RepairHandle, RunSummary};
use crate::application::activity_runner::{ActivityRunner, ActivitySettings};
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ApprovalTimeoutPolicy, Config, ProactiveConfig, ProcessState, RepairStatus, StartPayload,
    WorkflowVariant,
};
use crate::domain::ports::RepairActivities;

/// How one run of the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// `RequestExit` was received; the workflow is done.
    Exited(RunSummary),
    /// The iteration cap was reached or continuation was requested.
    ContinueAsNew { iterations: u32 },
}

pub struct ProactiveRepairWorkflow {
    executor: CycleExecutor,
    payload: StartPayload,
    proactive: ProactiveConfig,
    on_approval_timeout: ApprovalTimeoutPolicy,
}

impl ProactiveRepairWorkflow {
    pub fn new(
        workflow_id: impl Into<String>,
        payload: StartPayload,
        activities: Arc<dyn RepairActivities>,
        config: &Config,
    ) -> Self {
        let shared = new_instance(
            workflow_id.into(),
            WorkflowVariant::Proactive,
            payload.seed_proactive_context(),
        );
        let runner = ActivityRunner::new(activities, ActivitySettings::from_config(config));
        Self {
            executor: CycleExecutor::new(
                shared,
                runner,
                config.thresholds.clone(),
                config.snapshot.clone(),
            ),
            payload,
            proactive: config.proactive.clone(),
            on_approval_timeout: config.approval.on_timeout,
        }
    }

    pub fn handle(&self) -> RepairHandle {
        RepairHandle::new(self.executor.shared().clone())
    }

    /// Loop until `RequestExit`, continuing as new whenever a run ends.
    #[instrument(skip(self), fields(workflow_id = %self.executor.shared().workflow_id()))]
    pub async fn run(self) -> DomainResult<RunSummary> {
        loop {
            match self.run_until_continuation().await? {
                LoopOutcome::Exited(summary) => return Ok(summary),
                LoopOutcome::ContinueAsNew { iterations } => {
                    let run_id = self.continue_as_new().await;
                    info!(iterations, run_id = %run_id, "Continuing as new");
                }
            }
        }
    }

    /// Run cycles until exit, a continuation request, or the iteration cap.
    ///
    /// Phase failures end only the current cycle. Any other error ends the
    /// workflow.
    pub async fn run_until_continuation(&self) -> DomainResult<LoopOutcome> {
        let shared = self.executor.shared();
        self.executor.set_status(RepairStatus::Initializing).await;

        loop {
            let (exit_requested, continue_requested, iterations, status) = shared
                .read(|state| {
                    (
                        state.exit_requested,
                        state.continue_as_new_requested,
                        state.iteration_count,
                        state.status,
                    )
                })
                .await;

            if exit_requested {
                info!(iterations, "Exit requested, ending workflow");
                return Ok(LoopOutcome::Exited(RunSummary {
                    status,
                    summary: "Repair workflow exited as requested.".to_string(),
                }));
            }
            if continue_requested || iterations >= self.proactive.max_iterations {
                return Ok(LoopOutcome::ContinueAsNew { iterations });
            }

            let iteration = shared
                .update(|state| {
                    state.iteration_count += 1;
                    state.reset_cycle_gates();
                    state.iteration_count
                })
                .await;
            info!(iteration, "Starting repair cycle");

            match self.run_cycle().await {
                Ok(summary) => {
                    info!(iteration, status = %summary.status, summary = %summary.summary, "Repair cycle finished");
                }
                Err(err) if err.is_cycle_scoped() => self.executor.fail(&err).await,
                Err(err) => {
                    self.executor.fail(&err).await;
                    return Err(err);
                }
            }

            self.executor.set_status(RepairStatus::WaitingForNextCycle).await;
            shared
                .wait_condition(
                    ProcessState::cycle_wait_over,
                    Some(Duration::from_secs(self.proactive.cycle_wait_secs)),
                )
                .await;
        }
    }

    async fn run_cycle(&self) -> DomainResult<RunSummary> {
        let plan = match self.executor.triage().await? {
            Triage::NoRepairNeeded(summary) => return Ok(summary),
            Triage::Planned(plan) => plan,
        };

        let score = plan.overall_confidence_score;
        let decision = if score > self.executor.thresholds().auto_approve {
            self.executor.auto_approve(score).await
        } else {
            self.executor.notify().await?;
            self.executor
                .await_decision(
                    Duration::from_secs(self.proactive.approval_timeout_secs),
                    self.on_approval_timeout,
                )
                .await?
        };
        self.executor.finish(decision).await
    }

    /// Drop all state and start over from the original payload.
    async fn continue_as_new(&self) -> Uuid {
        let fresh = ProcessState::new(
            WorkflowVariant::Proactive,
            self.payload.seed_proactive_context(),
        );
        self.executor.shared().restart(fresh).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::activities::ScriptedActivities;
    use crate::domain::models::SignalOutcome;

    #[tokio::test(start_paused = true)]
    async fn test_exit_before_first_cycle_runs_nothing() {
        let activities = Arc::new(ScriptedActivities::new());
        let workflow = ProactiveRepairWorkflow::new(
            "repair-proactive",
            StartPayload::new("watch orders"),
            activities.clone(),
            &Config::default(),
        );
        workflow.handle().request_exit().await;

        let outcome = workflow.run_until_continuation().await.unwrap();

        match outcome {
            LoopOutcome::Exited(summary) => {
                assert_eq!(summary.summary, "Repair workflow exited as requested.");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(activities.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_request_ends_run() {
        let activities = Arc::new(ScriptedActivities::new());
        let workflow = ProactiveRepairWorkflow::new(
            "repair-proactive",
            StartPayload::new("watch orders"),
            activities,
            &Config::default(),
        );
        workflow.handle().request_continue_as_new().await;

        let outcome = workflow.run_until_continuation().await.unwrap();
        assert_eq!(outcome, LoopOutcome::ContinueAsNew { iterations: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_during_continuation_is_not_lost() {
        let activities = Arc::new(ScriptedActivities::new());
        let workflow = ProactiveRepairWorkflow::new(
            "repair-proactive",
            StartPayload::new("watch orders"),
            activities.clone(),
            &Config::default(),
        );
        let handle = workflow.handle();
        handle.request_continue_as_new().await;

        let outcome = workflow.run_until_continuation().await.unwrap();
        assert_eq!(outcome, LoopOutcome::ContinueAsNew { iterations: 0 });

        assert_eq!(handle.request_exit().await, SignalOutcome::Applied);
        workflow.continue_as_new().await;

        let outcome = workflow.run_until_continuation().await.unwrap();
        assert!(matches!(outcome, LoopOutcome::Exited(_)));
        assert_eq!(handle.continuation_count().await, 1);
        assert_eq!(activities.total_calls(), 0);
    }
}
