//! Application layer: activity invocation and the repair workflows.

pub mod activity_runner;
pub mod workflow;

pub use activity_runner::{ActivityOptions, ActivityRunner, ActivitySettings, RetryPolicy};
pub use workflow::{
    LoopOutcome, ProactiveRepairWorkflow, RepairHandle, RepairWorkflow, RunSummary,
};
