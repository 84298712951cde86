//! Process state owned by one orchestrator instance.
//!
//! Signals mutate the gates through [`ProcessState::apply`]; queries are
//! plain reads. Both run under the instance lock, so neither interleaves with
//! the state machine's own updates.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use super::context::{keys, ProcessContext};
use super::results::{AnalysisResult, DetectionResult, PlanningResult, RepairResult, ReportResult};
use super::status::{RepairStatus, StatusSnapshot};
use crate::domain::errors::{DomainError, DomainResult};

/// Which runner owns the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowVariant {
    /// One detect → report cycle.
    Base,
    /// Repeating cycles with auto-approval and continuation.
    Proactive,
}

/// Fire-and-forget messages that mutate the gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Approve the planned repair. An empty identity falls back to `metadata.user`.
    ApproveRepair(String),
    RejectRepair(String),
    RequestExit,
    StopWaiting,
    RequestContinueAsNew,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApproveRepair(_) => "ApproveRepair",
            Self::RejectRepair(_) => "RejectRepair",
            Self::RequestExit => "RequestExit",
            Self::StopWaiting => "StopWaiting",
            Self::RequestContinueAsNew => "RequestContinueAsNew",
        }
    }

    fn is_proactive_only(&self) -> bool {
        matches!(
            self,
            Self::RequestExit | Self::StopWaiting | Self::RequestContinueAsNew
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApproveRepair(who) | Self::RejectRepair(who) if !who.is_empty() => {
                write!(f, "{}({who})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

impl FromStr for Signal {
    type Err = DomainError;

    /// Parses `approve [who]`, `reject [who]`, `exit`, `stop-waiting`,
    /// `continue-as-new`, or the canonical signal names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::trim).unwrap_or_default().to_string();
        match command.to_ascii_lowercase().as_str() {
            "approve" | "approverepair" => Ok(Self::ApproveRepair(argument)),
            "reject" | "rejectrepair" => Ok(Self::RejectRepair(argument)),
            "exit" | "requestexit" => Ok(Self::RequestExit),
            "stop-waiting" | "stopwaiting" => Ok(Self::StopWaiting),
            "continue-as-new" | "requestcontinueasnew" => Ok(Self::RequestContinueAsNew),
            _ => Err(DomainError::InvalidSignal(s.trim().to_string())),
        }
    }
}

/// What a delivered signal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Applied,
    Ignored(&'static str),
}

/// Post-planning branch selected by the gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessState {
    pub variant: WorkflowVariant,
    pub status: RepairStatus,
    pub approved: bool,
    pub rejected: bool,
    pub planned: bool,
    pub exit_requested: bool,
    pub continue_as_new_requested: bool,
    pub stop_waiting: bool,
    /// Completed proactive cycles since the last continuation.
    pub iteration_count: u32,
    pub context: ProcessContext,
    pub problems_confidence_score: Option<f64>,
    pub planning_confidence_score: Option<f64>,
    pub details: Option<StatusSnapshot>,
}

impl ProcessState {
    pub fn new(variant: WorkflowVariant, context: ProcessContext) -> Self {
        Self {
            variant,
            status: RepairStatus::Initializing,
            approved: false,
            rejected: false,
            planned: false,
            exit_requested: false,
            continue_as_new_requested: false,
            stop_waiting: false,
            iteration_count: 0,
            context,
            problems_confidence_score: None,
            planning_confidence_score: None,
            details: None,
        }
    }

    /// Clear the per-cycle gates at the top of a proactive iteration.
    ///
    /// Phase results stay in the context, so the result queries keep
    /// answering with the previous cycle's values until this cycle replaces
    /// them.
    pub fn reset_cycle_gates(&mut self) {
        self.approved = false;
        self.rejected = false;
        self.planned = false;
        self.stop_waiting = false;
    }

    /// Apply a signal. Approval and rejection are one-shot per cycle: once
    /// either gate is set, further approve/reject signals are ignored.
    pub fn apply(&mut self, signal: &Signal) -> SignalOutcome {
        if signal.is_proactive_only() && self.variant == WorkflowVariant::Base {
            return SignalOutcome::Ignored("signal is only handled by proactive workflows");
        }
        match signal {
            Signal::ApproveRepair(who) => {
                if self.approved {
                    return SignalOutcome::Ignored("repair already approved");
                }
                if self.rejected {
                    return SignalOutcome::Ignored("repair already rejected");
                }
                let approver = if who.trim().is_empty() {
                    self.context
                        .metadata_user()
                        .unwrap_or_else(|| "unknown".to_string())
                } else {
                    who.clone()
                };
                self.approved = true;
                self.context.insert(keys::APPROVED_BY, json!(approver));
            }
            Signal::RejectRepair(who) => {
                if self.rejected {
                    return SignalOutcome::Ignored("repair already rejected");
                }
                if self.approved {
                    return SignalOutcome::Ignored("repair already approved");
                }
                let rejecter = if who.trim().is_empty() { "unknown" } else { who.as_str() };
                self.rejected = true;
                self.context.insert(keys::REJECTED_BY, json!(rejecter));
            }
            Signal::RequestExit => self.exit_requested = true,
            Signal::StopWaiting => self.stop_waiting = true,
            Signal::RequestContinueAsNew => self.continue_as_new_requested = true,
        }
        SignalOutcome::Applied
    }

    /// Rejection is checked first, so it wins if both gates are somehow set.
    pub fn decision(&self) -> Option<ApprovalDecision> {
        if self.rejected {
            Some(ApprovalDecision::Rejected)
        } else if self.approved {
            Some(ApprovalDecision::Approved)
        } else {
            None
        }
    }

    pub fn has_decision(&self) -> bool {
        self.decision().is_some()
    }

    /// Whether the proactive inter-cycle wait should end.
    pub fn cycle_wait_over(&self) -> bool {
        self.exit_requested || self.continue_as_new_requested || self.stop_waiting
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn context_value(&self, key: &str) -> DomainResult<Value> {
        self.context.value(key)
    }

    pub fn context_keys(&self) -> Vec<String> {
        self.context.keys()
    }

    fn phase_result<T: DeserializeOwned>(&self, key: &str, label: &str) -> DomainResult<T> {
        self.context
            .get_typed(key)?
            .ok_or_else(|| DomainError::NotReady(label.to_string()))
    }

    pub fn detection_result(&self) -> DomainResult<DetectionResult> {
        self.phase_result(keys::DETECTION_RESULT, "Detection result")
    }

    pub fn analysis_result(&self) -> DomainResult<AnalysisResult> {
        self.phase_result(keys::ANALYSIS_RESULT, "Analysis result")
    }

    pub fn planning_result(&self) -> DomainResult<PlanningResult> {
        self.phase_result(keys::PLANNING_RESULT, "Planning result")
    }

    pub fn tool_results(&self) -> DomainResult<RepairResult> {
        self.phase_result(keys::REPAIR_RESULT, "Repair tool execution result")
    }

    pub fn report(&self) -> DomainResult<ReportResult> {
        self.phase_result(keys::REPORT_RESULT, "Repair report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_state() -> ProcessState {
        let mut context = ProcessContext::new();
        context.insert(keys::METADATA, json!({"user": "alice"}));
        ProcessState::new(WorkflowVariant::Base, context)
    }

    #[test]
    fn test_initial_state() {
        let state = base_state();
        assert_eq!(state.status, RepairStatus::Initializing);
        assert!(!state.approved && !state.rejected && !state.planned);
        assert_eq!(state.decision(), None);
    }

    #[test]
    fn test_approve_falls_back_to_metadata_user() {
        let mut state = base_state();
        assert_eq!(state.apply(&Signal::ApproveRepair(String::new())), SignalOutcome::Applied);
        assert!(state.approved);
        assert_eq!(state.context.identity(keys::APPROVED_BY), "alice");
    }

    #[test]
    fn test_second_approve_does_not_overwrite_approver() {
        let mut state = base_state();
        state.apply(&Signal::ApproveRepair("bob".to_string()));
        let outcome = state.apply(&Signal::ApproveRepair("carol".to_string()));
        assert!(matches!(outcome, SignalOutcome::Ignored(_)));
        assert!(state.approved);
        assert_eq!(state.context.identity(keys::APPROVED_BY), "bob");
    }

    #[test]
    fn test_opposing_signal_is_ignored() {
        let mut state = base_state();
        state.apply(&Signal::RejectRepair("bob".to_string()));
        assert!(matches!(
            state.apply(&Signal::ApproveRepair("carol".to_string())),
            SignalOutcome::Ignored(_)
        ));
        assert!(!state.approved);
        assert!(!state.context.contains_key(keys::APPROVED_BY));
        assert_eq!(state.decision(), Some(ApprovalDecision::Rejected));
    }

    #[test]
    fn test_rejection_wins_when_both_gates_set() {
        let mut state = base_state();
        state.approved = true;
        state.rejected = true;
        assert_eq!(state.decision(), Some(ApprovalDecision::Rejected));
    }

    #[test]
    fn test_proactive_signals_ignored_by_base() {
        let mut state = base_state();
        assert!(matches!(state.apply(&Signal::RequestExit), SignalOutcome::Ignored(_)));
        assert!(!state.exit_requested);

        let mut proactive = ProcessState::new(WorkflowVariant::Proactive, ProcessContext::new());
        assert_eq!(proactive.apply(&Signal::StopWaiting), SignalOutcome::Applied);
        assert!(proactive.cycle_wait_over());
    }

    #[test]
    fn test_reset_cycle_gates_keeps_context() {
        let mut state = ProcessState::new(WorkflowVariant::Proactive, ProcessContext::new());
        state.apply(&Signal::RejectRepair("bob".to_string()));
        state.apply(&Signal::StopWaiting);
        state.planned = true;
        state.reset_cycle_gates();
        assert!(!state.rejected && !state.planned && !state.stop_waiting);
        assert!(state.context.contains_key(keys::REJECTED_BY));
    }

    #[test]
    fn test_previous_cycle_plan_survives_reset() {
        let mut state = ProcessState::new(WorkflowVariant::Proactive, ProcessContext::new());
        state.context.insert(
            keys::PLANNING_RESULT,
            json!({"proposed_tools": {}, "overall_confidence_score": 0.9}),
        );
        state.planned = true;

        state.reset_cycle_gates();

        assert!(!state.planned);
        let plan = state.planning_result().unwrap();
        assert!((plan.overall_confidence_score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_phase_queries_not_ready() {
        let state = base_state();
        assert!(matches!(state.planning_result(), Err(DomainError::NotReady(_))));
        assert!(matches!(state.tool_results(), Err(DomainError::NotReady(_))));
        assert!(matches!(state.report(), Err(DomainError::NotReady(_))));
    }

    #[test]
    fn test_signal_parsing() {
        assert_eq!(
            "approve bob".parse::<Signal>().unwrap(),
            Signal::ApproveRepair("bob".to_string())
        );
        assert_eq!(
            "ApproveRepair".parse::<Signal>().unwrap(),
            Signal::ApproveRepair(String::new())
        );
        assert_eq!(
            "reject  Bob Smith ".parse::<Signal>().unwrap(),
            Signal::RejectRepair("Bob Smith".to_string())
        );
        assert_eq!("stop-waiting".parse::<Signal>().unwrap(), Signal::StopWaiting);
        assert_eq!(
            "RequestContinueAsNew".parse::<Signal>().unwrap(),
            Signal::RequestContinueAsNew
        );
        assert!(matches!(
            "launch".parse::<Signal>(),
            Err(DomainError::InvalidSignal(_))
        ));
    }
}
