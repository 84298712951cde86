//! `repair-agent run`: one approval-gated repair cycle.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::session::{self, SessionArgs};
use crate::cli::display::{plan_table, repair_table};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{
    ApprovalTimeoutPolicy, Config, PlanningResult, RepairResult, Signal, WorkflowVariant,
};
use crate::infrastructure::config::ConfigLoader;
use crate::services::WorkflowRegistry;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Approve the plan as soon as it is ready, as the `--user` identity
    #[arg(long)]
    pub auto_approve: bool,

    /// Override the approval window in seconds
    #[arg(long)]
    pub approval_timeout_secs: Option<u64>,

    /// Treat an elapsed approval window as a rejection instead of a failure
    #[arg(long)]
    pub reject_on_timeout: bool,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub workflow_id: String,
    pub run_id: String,
    pub status: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_result: Option<PlanningResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_result: Option<RepairResult>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Workflow: {} (run {})", self.workflow_id, self.run_id),
            format!("Status:   {}", self.status),
            format!("Summary:  {}", self.summary),
        ];
        if let Some(ref plan) = self.planning_result {
            lines.push(String::new());
            lines.push(format!(
                "Planned repairs (overall confidence {:.2}):",
                plan.overall_confidence_score
            ));
            lines.push(plan_table(plan).to_string());
        }
        if let Some(ref repair) = self.repair_result {
            lines.push(String::new());
            lines.push(repair.repair_summary.clone());
            if !repair.repair_tool_details.is_empty() {
                lines.push(repair_table(repair).to_string());
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl RunArgs {
    /// Apply the approval flags on top of the loaded configuration.
    pub fn apply_overrides(&self, mut config: Config) -> Result<Config> {
        if let Some(secs) = self.approval_timeout_secs {
            config.approval.timeout_secs = secs;
        }
        if self.reject_on_timeout {
            config.approval.on_timeout = ApprovalTimeoutPolicy::Reject;
        }
        ConfigLoader::validate(&config)?;
        Ok(config)
    }
}

pub async fn execute(args: RunArgs, config: Config, json_mode: bool) -> Result<()> {
    let config = args.apply_overrides(config)?;

    let activities = args.session.activities(&config)?;
    let registry = WorkflowRegistry::new(activities, config);
    let handle = session::start(&registry, WorkflowVariant::Base, &args.session).await?;

    let mut helpers = Vec::new();
    if !json_mode {
        helpers.push(session::spawn_status_printer(&handle));
    }
    if args.auto_approve {
        let approver = handle.clone();
        let identity = args.session.user.clone().unwrap_or_default();
        helpers.push(tokio::spawn(async move {
            approver.wait_for(|state| state.planned).await;
            approver.approve_repair(identity).await;
        }));
    }
    if args.session.interactive {
        eprintln!(
            "Workflow {} started. Type approve [who], reject [who], status, details or keys.",
            handle.workflow_id()
        );
        helpers.push(session::spawn_stdin_reader(handle.clone()));
    }

    let result = session::wait_with_interrupt(
        &registry,
        &handle,
        Signal::RejectRepair("interrupted".to_string()),
    )
    .await;
    for helper in helpers {
        helper.abort();
    }
    let summary = result?;

    let run_output = RunOutput {
        workflow_id: handle.workflow_id().to_string(),
        run_id: handle.run_id().await,
        status: summary.status.to_string(),
        summary: summary.summary,
        planning_result: handle.planning_result().await.ok(),
        repair_result: handle.tool_results().await.ok(),
    };
    output(&run_output, json_mode);
    Ok(())
}
