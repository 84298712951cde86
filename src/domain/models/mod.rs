//! Domain models for the repair orchestrator.

pub mod config;
pub mod context;
pub mod payload;
pub mod results;
pub mod state;
pub mod status;

pub use config::{
    ActivityConfig, ApprovalConfig, ApprovalTimeoutPolicy, CollaboratorConfig, Config,
    LoggingConfig, ProactiveConfig, RetryConfig, SnapshotConfig, ThresholdConfig,
};
pub use context::{keys, ProcessContext};
pub use payload::{Metadata, StartPayload};
pub use results::{
    parse_output, ActivityOutput, AnalysisResult, DetectionResult, Issue, NotificationResult,
    PlanningResult, ProposedTool, RepairResult, RepairToolDetail, ReportResult,
};
pub use state::{
    ApprovalDecision, ProcessState, Signal, SignalOutcome, WorkflowVariant,
};
pub use status::{RepairStatus, StatusSnapshot};
