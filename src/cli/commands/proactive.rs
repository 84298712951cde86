//! `repair-agent proactive`: the always-on repair loop.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::session::{self, SessionArgs};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Signal, WorkflowVariant};
use crate::services::WorkflowRegistry;

#[derive(Args, Debug)]
pub struct ProactiveArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Cycles before the loop continues as new
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Upper bound of the wait between cycles in seconds
    #[arg(long)]
    pub cycle_wait_secs: Option<u64>,

    /// Approval window inside a cycle in seconds
    #[arg(long)]
    pub approval_timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ProactiveOutput {
    pub workflow_id: String,
    pub run_id: String,
    pub continuations: u32,
    pub iterations: u32,
    pub status: String,
    pub summary: String,
}

impl CommandOutput for ProactiveOutput {
    fn to_human(&self) -> String {
        [
            format!("Workflow:      {} (run {})", self.workflow_id, self.run_id),
            format!("Continuations: {}", self.continuations),
            format!("Iterations:    {} in the last run", self.iterations),
            format!("Status:        {}", self.status),
            format!("Summary:       {}", self.summary),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ProactiveArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if let Some(max_iterations) = args.max_iterations {
        config.proactive.max_iterations = max_iterations;
    }
    if let Some(secs) = args.cycle_wait_secs {
        config.proactive.cycle_wait_secs = secs;
    }
    if let Some(secs) = args.approval_timeout_secs {
        config.proactive.approval_timeout_secs = secs;
    }
    crate::infrastructure::config::ConfigLoader::validate(&config)?;

    let activities = args.session.activities(&config)?;
    let registry = WorkflowRegistry::new(activities, config);
    let handle = session::start(&registry, WorkflowVariant::Proactive, &args.session).await?;

    let mut helpers = Vec::new();
    if !json_mode {
        helpers.push(session::spawn_status_printer(&handle));
    }
    if args.session.interactive {
        eprintln!(
            "Workflow {} started. Type approve [who], reject [who], stop-waiting, \
             continue-as-new, exit, status, details or keys.",
            handle.workflow_id()
        );
        helpers.push(session::spawn_stdin_reader(handle.clone()));
    }

    let result = session::wait_with_interrupt(&registry, &handle, Signal::RequestExit).await;
    for helper in helpers {
        helper.abort();
    }
    let summary = result?;

    let proactive_output = ProactiveOutput {
        workflow_id: handle.workflow_id().to_string(),
        run_id: handle.run_id().await,
        continuations: handle.continuation_count().await,
        iterations: handle.iteration_count().await,
        status: summary.status.to_string(),
        summary: summary.summary,
    };
    output(&proactive_output, json_mode);
    Ok(())
}
