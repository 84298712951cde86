//! Single-cycle repair workflow gated on human approval.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use super::cycle::{CycleExecutor, Triage};
use super::{new_instance, RepairHandle, RunSummary};
use crate::application::activity_runner::{ActivityRunner, ActivitySettings};
use crate::domain::errors::DomainResult;
use crate::domain::models::{ApprovalConfig, Config, RepairStatus, StartPayload, WorkflowVariant};
use crate::domain::ports::RepairActivities;

/// Runs detect → analyze → plan → approval → repair → report once.
pub struct RepairWorkflow {
    executor: CycleExecutor,
    approval: ApprovalConfig,
}

impl RepairWorkflow {
    pub fn new(
        workflow_id: impl Into<String>,
        payload: &StartPayload,
        activities: Arc<dyn RepairActivities>,
        config: &Config,
    ) -> Self {
        let shared = new_instance(
            workflow_id.into(),
            WorkflowVariant::Base,
            payload.seed_context(),
        );
        let runner = ActivityRunner::new(activities, ActivitySettings::from_config(config));
        Self {
            executor: CycleExecutor::new(
                shared,
                runner,
                config.thresholds.clone(),
                config.snapshot.clone(),
            ),
            approval: config.approval.clone(),
        }
    }

    pub fn handle(&self) -> RepairHandle {
        RepairHandle::new(self.executor.shared().clone())
    }

    /// Run to a terminal status.
    ///
    /// Fails with `ActivityExecution` or `MalformedResponse` when a phase
    /// fails, and with `ApprovalTimeout` when no decision arrives in time
    /// under the `fail` policy. The status is FAILED in every error case.
    #[instrument(skip(self), fields(workflow_id = %self.executor.shared().workflow_id()))]
    pub async fn run(self) -> DomainResult<RunSummary> {
        info!("Starting repair workflow");
        self.executor.set_status(RepairStatus::Initializing).await;

        match self.run_cycle().await {
            Ok(summary) => {
                info!(status = %summary.status, summary = %summary.summary, "Repair workflow finished");
                Ok(summary)
            }
            Err(err) => {
                self.executor.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn run_cycle(&self) -> DomainResult<RunSummary> {
        if let Triage::NoRepairNeeded(summary) = self.executor.triage().await? {
            return Ok(summary);
        }

        let decision = self
            .executor
            .await_decision(
                Duration::from_secs(self.approval.timeout_secs),
                self.approval.on_timeout,
            )
            .await?;
        self.executor.finish(decision).await
    }
}
