//! Cycle executor shared by the base and proactive workflows.
//!
//! One cycle is detect → analyze → plan → decision → repair → report. The
//! runners differ only in how the decision is reached, so they call
//! [`CycleExecutor::triage`] and [`CycleExecutor::finish`] around their own
//! approval logic.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{RunSummary, Shared};
use crate::application::activity_runner::ActivityRunner;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    keys, AnalysisResult, ApprovalDecision, ApprovalTimeoutPolicy, DetectionResult,
    NotificationResult, PlanningResult, ProcessState, RepairResult, RepairStatus, ReportResult,
    Signal, SnapshotConfig, StatusSnapshot, ThresholdConfig, WorkflowVariant,
};

/// Result of the detect/analyze/plan half of a cycle.
#[derive(Debug)]
pub(crate) enum Triage {
    /// Detection confidence was below the threshold.
    NoRepairNeeded(RunSummary),
    Planned(PlanningResult),
}

pub(crate) struct CycleExecutor {
    shared: Arc<Shared>,
    runner: ActivityRunner,
    thresholds: ThresholdConfig,
    snapshot: SnapshotConfig,
}

impl CycleExecutor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        runner: ActivityRunner,
        thresholds: ThresholdConfig,
        snapshot: SnapshotConfig,
    ) -> Self {
        Self {
            shared,
            runner,
            thresholds,
            snapshot,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Set the status label and publish a fresh snapshot.
    pub(crate) async fn set_status(&self, status: RepairStatus) {
        let links = &self.snapshot;
        let snapshot = self
            .shared
            .update(|state| {
                state.status = status;
                let snapshot = build_snapshot(state, links);
                state.details = Some(snapshot.clone());
                snapshot
            })
            .await;

        info!(
            workflow_id = %self.shared.workflow_id(),
            status = %status,
            iteration = snapshot.iteration,
            "Workflow status set"
        );
        debug!(details = %snapshot, "Status details");
        self.shared.publish(snapshot);
    }

    /// Detect, then analyze and plan unless detection confidence is too low.
    pub(crate) async fn triage(&self) -> DomainResult<Triage> {
        let detection = self.detect().await?;
        let score = detection.confidence_score;

        if score < self.thresholds.detection {
            let notes = detection.additional_notes.unwrap_or_default();
            info!(
                workflow_id = %self.shared.workflow_id(),
                confidence = score,
                notes = %notes,
                "Low detection confidence, no repair needed"
            );
            self.set_status(RepairStatus::NoRepairNeeded).await;
            return Ok(Triage::NoRepairNeeded(RunSummary {
                status: RepairStatus::NoRepairNeeded,
                summary: format!(
                    "No repair needed based on detection result: confidence score for repair: {score} ({notes})"
                ),
            }));
        }

        self.analyze().await?;
        let plan = self.plan().await?;
        Ok(Triage::Planned(plan))
    }

    async fn detect(&self) -> DomainResult<DetectionResult> {
        self.set_status(RepairStatus::DetectingProblems).await;
        let context = self.shared.read(|state| state.context.clone()).await;
        let (detection, raw) = self.runner.run_typed::<DetectionResult>(context).await?;

        self.shared
            .update(|state| {
                state.context.insert(keys::DETECTION_RESULT, raw);
                state.problems_confidence_score = Some(detection.confidence_score);
            })
            .await;
        debug!(confidence = detection.confidence_score, "Detection complete");
        Ok(detection)
    }

    async fn analyze(&self) -> DomainResult<AnalysisResult> {
        self.set_status(RepairStatus::AnalyzingProblems).await;
        let context = self.shared.read(|state| state.context.clone()).await;
        let (analysis, raw) = self.runner.run_typed::<AnalysisResult>(context).await?;

        self.shared
            .update(|state| {
                state.context.insert(keys::ANALYSIS_RESULT, raw.clone());
                state.context.insert(keys::PROBLEMS_TO_REPAIR, raw);
            })
            .await;
        debug!(issues = analysis.issues.len(), "Analysis complete");
        Ok(analysis)
    }

    async fn plan(&self) -> DomainResult<PlanningResult> {
        self.set_status(RepairStatus::PlanningRepair).await;
        let context = self.shared.read(|state| state.context.clone()).await;
        let (plan, raw) = self.runner.run_typed::<PlanningResult>(context).await?;

        self.shared
            .update(|state| {
                state.context.insert(keys::PLANNING_RESULT, raw);
                state.planned = true;
                state.planning_confidence_score = Some(plan.overall_confidence_score);
            })
            .await;
        info!(
            workflow_id = %self.shared.workflow_id(),
            tools = plan.tool_count(),
            confidence = plan.overall_confidence_score,
            "Repair planned"
        );
        Ok(plan)
    }

    /// Tell an external party that a decision is pending.
    pub(crate) async fn notify(&self) -> DomainResult<NotificationResult> {
        let context = self.shared.read(|state| state.context.clone()).await;
        let (notification, raw) = self.runner.run_typed::<NotificationResult>(context).await?;

        self.shared
            .update(|state| state.context.insert(keys::NOTIFICATION_RESULT, raw))
            .await;
        info!(
            workflow_id = %self.shared.workflow_id(),
            notification_status = %notification.notification_status,
            "Approval notification sent"
        );
        Ok(notification)
    }

    /// Grant approval without a human signal.
    ///
    /// A rejection that already landed in this cycle still wins.
    pub(crate) async fn auto_approve(&self, score: f64) -> ApprovalDecision {
        let decision = self
            .shared
            .update(|state| {
                if !state.has_decision() {
                    state.approved = true;
                    state.context.insert(
                        keys::APPROVED_BY,
                        json!(format!("Agentically approved with confidence score {score}")),
                    );
                }
                state.decision().unwrap_or(ApprovalDecision::Approved)
            })
            .await;
        info!(
            workflow_id = %self.shared.workflow_id(),
            confidence = score,
            "Planning confidence high enough, approving without human review"
        );
        decision
    }

    /// Suspend in PENDING-APPROVAL until a gate is set or `limit` elapses.
    pub(crate) async fn await_decision(
        &self,
        limit: Duration,
        on_timeout: ApprovalTimeoutPolicy,
    ) -> DomainResult<ApprovalDecision> {
        self.set_status(RepairStatus::PendingApproval).await;
        info!(workflow_id = %self.shared.workflow_id(), "Waiting for approval");

        self.shared
            .wait_condition(ProcessState::has_decision, Some(limit))
            .await;

        if let Some(decision) = self.shared.read(ProcessState::decision).await {
            return Ok(decision);
        }

        warn!(
            workflow_id = %self.shared.workflow_id(),
            waited_secs = limit.as_secs(),
            policy = ?on_timeout,
            "Approval window elapsed without a decision"
        );
        match on_timeout {
            ApprovalTimeoutPolicy::Fail => Err(DomainError::ApprovalTimeout {
                waited_secs: limit.as_secs(),
            }),
            ApprovalTimeoutPolicy::Reject => {
                let signal = Signal::RejectRepair("approval timeout".to_string());
                self.shared.update(|state| state.apply(&signal)).await;
                Ok(ApprovalDecision::Rejected)
            }
        }
    }

    /// Act on the decision: stop on rejection, otherwise repair and report.
    pub(crate) async fn finish(&self, decision: ApprovalDecision) -> DomainResult<RunSummary> {
        match decision {
            ApprovalDecision::Rejected => {
                let rejecter = self
                    .shared
                    .read(|state| state.context.identity(keys::REJECTED_BY))
                    .await;
                info!(workflow_id = %self.shared.workflow_id(), rejected_by = %rejecter, "Repair rejected");
                self.set_status(RepairStatus::Rejected).await;
                Ok(RunSummary {
                    status: RepairStatus::Rejected,
                    summary: format!("Repair REJECTED by user {rejecter}"),
                })
            }
            ApprovalDecision::Approved => {
                let approver = self
                    .shared
                    .read(|state| state.context.identity(keys::APPROVED_BY))
                    .await;
                info!(workflow_id = %self.shared.workflow_id(), approved_by = %approver, "Repair approved");
                self.set_status(RepairStatus::Approved).await;

                self.repair().await?;
                let report = self.report().await?;
                Ok(RunSummary {
                    status: RepairStatus::ReportCompleted,
                    summary: format!(
                        "Repair workflow completed with status: {}. Report Summary: {}",
                        RepairStatus::ReportCompleted,
                        report.report_summary
                    ),
                })
            }
        }
    }

    async fn repair(&self) -> DomainResult<RepairResult> {
        self.set_status(RepairStatus::PendingRepair).await;
        let context = self.shared.read(|state| state.context.clone()).await;
        let (repair, raw) = self.runner.run_typed::<RepairResult>(context).await?;

        self.shared
            .update(|state| state.context.insert(keys::REPAIR_RESULT, raw))
            .await;
        info!(
            workflow_id = %self.shared.workflow_id(),
            repaired = repair.problems_repaired,
            skipped = repair.problems_skipped,
            "Repair tools executed"
        );
        Ok(repair)
    }

    async fn report(&self) -> DomainResult<ReportResult> {
        self.set_status(RepairStatus::PendingReport).await;
        let context = self.shared.read(|state| state.context.clone()).await;
        let (report, raw) = self.runner.run_typed::<ReportResult>(context).await?;

        self.shared
            .update(|state| state.context.insert(keys::REPORT_RESULT, raw))
            .await;
        self.set_status(RepairStatus::ReportCompleted).await;
        Ok(report)
    }

    /// Record a phase failure as FAILED.
    pub(crate) async fn fail(&self, err: &DomainError) {
        warn!(workflow_id = %self.shared.workflow_id(), error = %err, "Repair cycle failed");
        self.set_status(RepairStatus::Failed).await;
    }
}

fn build_snapshot(state: &ProcessState, links: &SnapshotConfig) -> StatusSnapshot {
    let completed = state.status == RepairStatus::ReportCompleted;
    let report_summary = if completed {
        state.report().ok().map(|report| report.report_summary)
    } else {
        None
    };
    let report_link = if completed {
        Some(links.repair_report_link.clone())
    } else if state.planned {
        Some(links.planning_report_link.clone())
    } else {
        None
    };

    StatusSnapshot {
        phase: state.status,
        iteration: (state.variant == WorkflowVariant::Proactive).then_some(state.iteration_count),
        updated_at: Utc::now(),
        planned: state.planned,
        report_summary,
        report_link,
    }
}
