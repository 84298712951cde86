//! Repair Agent - approval-gated repair orchestrator
//!
//! A repair process runs a fixed sequence of collaborator activities
//! (detect, analyze, plan, execute repairs, report) around a human approval
//! gate. Other tasks steer a running process with signals and read its state
//! with queries. The proactive variant repeats the cycle on a cadence,
//! approves very confident plans on its own, and periodically continues as
//! new to keep its state bounded.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): process state, activity results, ports and errors
//! - **Application Layer** (`application`): activity runner and the workflows
//! - **Service Layer** (`services`): workflow registry and local repair tools
//! - **Adapters** (`adapters`): HTTP collaborator and scripted activities
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use repair_agent::adapters::activities::ScriptedActivities;
//! use repair_agent::{Config, StartPayload, WorkflowRegistry, WorkflowVariant};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let registry = WorkflowRegistry::new(Arc::new(ScriptedActivities::demo()), Config::default());
//! let handle = registry
//!     .start(WorkflowVariant::Base, StartPayload::new("repair stuck orders").with_user("bob"))
//!     .await?;
//! handle.wait_for(|state| state.planned).await;
//! handle.approve_repair("bob").await;
//! let summary = registry.wait(handle.workflow_id()).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{
    ActivityRunner, ActivitySettings, LoopOutcome, ProactiveRepairWorkflow, RepairHandle,
    RepairWorkflow, RetryPolicy, RunSummary,
};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, ProcessContext, ProcessState, RepairStatus, Signal, SignalOutcome, StartPayload,
    StatusSnapshot, WorkflowVariant,
};
pub use domain::ports::{ActivityError, ActivityKind, Heartbeat, RepairActivities};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ToolRegistry, WorkflowInfo, WorkflowRegistry};
