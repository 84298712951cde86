//! Property tests for approval gates and confidence thresholds.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use repair_agent::domain::models::{
    ApprovalDecision, Config, PlanningResult, ProcessContext, ProcessState, ProposedTool,
    RepairStatus, Signal, SignalOutcome, StartPayload, WorkflowVariant,
};
use repair_agent::domain::ports::Heartbeat;
use repair_agent::services::{execute_planned_repairs, FnTool, ToolRegistry};
use repair_agent::RepairWorkflow;
use serde_json::json;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("Failed to build runtime")
}

fn decision_signal() -> impl Strategy<Value = Signal> {
    prop_oneof![
        "[a-z]{0,6}".prop_map(Signal::ApproveRepair),
        "[a-z]{0,6}".prop_map(Signal::RejectRepair),
    ]
}

proptest! {
    /// Property: the first approve/reject signal of a cycle decides it
    ///
    /// Every later decision signal is ignored and never flips the gates.
    #[test]
    fn prop_first_decision_signal_wins(signals in prop::collection::vec(decision_signal(), 1..12)) {
        let mut state = ProcessState::new(WorkflowVariant::Base, ProcessContext::new());

        let outcomes: Vec<SignalOutcome> = signals.iter().map(|s| state.apply(s)).collect();

        prop_assert_eq!(outcomes[0], SignalOutcome::Applied);
        prop_assert!(outcomes[1..].iter().all(|o| matches!(o, SignalOutcome::Ignored(_))));
        prop_assert!(!(state.approved && state.rejected));

        let expected = match signals[0] {
            Signal::ApproveRepair(_) => ApprovalDecision::Approved,
            _ => ApprovalDecision::Rejected,
        };
        prop_assert_eq!(state.decision(), Some(expected));
    }

    /// Property: resetting the gates reopens the decision for the next cycle
    #[test]
    fn prop_reset_reopens_decision(first in decision_signal(), second in decision_signal()) {
        let mut state = ProcessState::new(WorkflowVariant::Proactive, ProcessContext::new());
        state.apply(&first);
        state.apply(&Signal::StopWaiting);
        state.reset_cycle_gates();

        prop_assert_eq!(state.decision(), None);
        prop_assert!(!state.stop_waiting && !state.planned);
        prop_assert_eq!(state.apply(&second), SignalOutcome::Applied);
    }

    /// Property: skipped + repaired always covers every planned tool, and a
    /// tool is skipped exactly when its confidence is below the threshold
    #[test]
    fn prop_tool_threshold_partitions_plan(
        scores in prop::collection::vec(0.0f64..=1.0, 0..8),
        threshold in 0.0f64..=1.0,
    ) {
        let mut proposed_tools = BTreeMap::new();
        for (i, score) in scores.iter().enumerate() {
            proposed_tools.insert(
                format!("ORD-{i}"),
                vec![ProposedTool {
                    tool_name: "noop".to_string(),
                    tool_arguments: json!({"order_id": format!("ORD-{i}")}),
                    confidence_score: *score,
                    additional_notes: None,
                }],
            );
        }
        let plan = PlanningResult {
            proposed_tools,
            overall_confidence_score: 0.9,
            additional_notes: None,
        };
        let registry = ToolRegistry::new().with_tool(FnTool::new("noop", |_| Ok(json!({"status": "success"}))));
        let (heartbeat, _beats) = Heartbeat::channel();

        let result = paused_runtime()
            .block_on(execute_planned_repairs(&plan, &registry, threshold, &heartbeat))
            .unwrap();

        let below = scores.iter().filter(|s| **s < threshold).count() as u32;
        prop_assert_eq!(result.problems_skipped, below);
        prop_assert_eq!(result.problems_repaired + result.problems_skipped, scores.len() as u32);
        prop_assert_eq!(result.repair_tool_details.len() as u32, result.problems_repaired);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: the run stops at NO-REPAIR-NEEDED exactly when detection
    /// confidence is strictly below the threshold
    #[test]
    fn prop_detection_threshold_decides_the_branch(score in 0.0f64..=1.0) {
        let summary = paused_runtime().block_on(async {
            let activities = Arc::new(common::scripted(score, 0.9));
            let workflow = RepairWorkflow::new(
                "repair-prop",
                &StartPayload::new("repair stuck orders"),
                activities,
                &Config::default(),
            );
            workflow.handle().reject_repair("prop").await;
            workflow.run().await
        });
        let summary = summary.unwrap();

        if score < 0.5 {
            prop_assert_eq!(summary.status, RepairStatus::NoRepairNeeded);
        } else {
            prop_assert_eq!(summary.status, RepairStatus::Rejected);
        }
    }
}
