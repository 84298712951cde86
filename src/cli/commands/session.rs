//! Pieces shared by the `run` and `proactive` commands.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::activities::{HttpActivities, ScriptedActivities};
use crate::application::{RepairHandle, RunSummary};
use crate::domain::models::{Config, Signal, SignalOutcome, StartPayload, WorkflowVariant};
use crate::domain::ports::RepairActivities;
use crate::services::WorkflowRegistry;

/// Arguments common to every command that starts a workflow.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Instruction handed to the detection step
    #[arg(short, long)]
    pub prompt: String,

    /// Caller identity recorded in the metadata
    #[arg(short, long)]
    pub user: Option<String>,

    /// System tag recorded in the metadata
    #[arg(long)]
    pub system: Option<String>,

    /// Notification target (proactive notify step)
    #[arg(long)]
    pub notify: Option<String>,

    /// Explicit workflow id (default: repair-{user}-{uuid})
    #[arg(long)]
    pub workflow_id: Option<String>,

    /// Read signals (approve, reject, exit, stop-waiting, continue-as-new)
    /// and queries (status, details, keys) from stdin
    #[arg(short, long)]
    pub interactive: bool,

    /// Use built-in scripted activities instead of the HTTP collaborator
    #[arg(long)]
    pub dry_run: bool,
}

impl SessionArgs {
    pub fn payload(&self) -> StartPayload {
        let mut payload = StartPayload::new(self.prompt.clone());
        if let Some(ref user) = self.user {
            payload = payload.with_user(user.clone());
        }
        if let Some(ref system) = self.system {
            payload = payload.with_system(system.clone());
        }
        if let Some(ref target) = self.notify {
            payload = payload.with_callback(json!({ "type": "email", "email": target }));
        }
        payload
    }

    pub fn activities(&self, config: &Config) -> Result<Arc<dyn RepairActivities>> {
        if self.dry_run {
            return Ok(Arc::new(
                ScriptedActivities::demo().with_tool_threshold(config.thresholds.tool_execution),
            ));
        }
        let activities = HttpActivities::new(&config.collaborator)
            .context("Failed to create collaborator client")?;
        Ok(Arc::new(activities))
    }
}

/// Start a workflow under the requested or a generated id.
pub async fn start(
    registry: &WorkflowRegistry,
    variant: WorkflowVariant,
    args: &SessionArgs,
) -> Result<RepairHandle> {
    let payload = args.payload();
    let handle = match args.workflow_id {
        Some(ref id) => registry.start_with_id(id.clone(), variant, payload).await,
        None => registry.start(variant, payload).await,
    }
    .context("Failed to start workflow")?;
    info!(workflow_id = %handle.workflow_id(), variant = ?variant, "Workflow started");
    Ok(handle)
}

/// Wait for the workflow to finish, delivering `on_interrupt` on every Ctrl-C.
pub async fn wait_with_interrupt(
    registry: &WorkflowRegistry,
    handle: &RepairHandle,
    on_interrupt: Signal,
) -> Result<RunSummary> {
    let finished = registry.wait(handle.workflow_id());
    tokio::pin!(finished);
    loop {
        tokio::select! {
            result = &mut finished => {
                return result.with_context(|| format!("Workflow {} failed", handle.workflow_id()));
            }
            interrupt = tokio::signal::ctrl_c() => {
                interrupt.context("Failed to listen for Ctrl-C")?;
                warn!(signal = %on_interrupt, "Interrupted, signalling workflow");
                handle.signal(on_interrupt.clone()).await;
            }
        }
    }
}

/// Print every status transition to stderr.
pub fn spawn_status_printer(handle: &RepairHandle) -> JoinHandle<()> {
    let mut updates = handle.subscribe_status();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(snapshot) => {
                    let iteration = snapshot
                        .iteration
                        .map(|n| format!(" (iteration {n})"))
                        .unwrap_or_default();
                    eprintln!(
                        "[{}] {}{iteration}",
                        snapshot.updated_at.format("%H:%M:%S"),
                        snapshot.phase
                    );
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Status printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Forward stdin lines to the workflow until stdin closes.
pub fn spawn_stdin_reader(handle: RepairHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => eprintln!("{}", handle_line(&handle, &line).await),
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Failed to read stdin");
                    break;
                }
            }
        }
        debug!(workflow_id = %handle.workflow_id(), "Stdin reader finished");
    })
}

/// Apply one interactive command and describe the result.
pub async fn handle_line(handle: &RepairHandle, line: &str) -> String {
    match line.trim() {
        "status" => format!("status: {}", handle.status().await),
        "details" => match handle.status_details().await {
            Some(snapshot) => snapshot.to_markdown(),
            None => "no status details yet".to_string(),
        },
        "keys" => handle.context_keys().await.join(", "),
        command => match command.parse::<Signal>() {
            Ok(signal) => {
                let name = signal.name();
                match handle.signal(signal).await {
                    SignalOutcome::Applied => format!("{name} applied"),
                    SignalOutcome::Ignored(reason) => format!("{name} ignored: {reason}"),
                }
            }
            Err(err) => err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::activities::ScriptedActivities;
    use crate::domain::models::WorkflowVariant;
    use crate::services::WorkflowRegistry;

    fn args() -> SessionArgs {
        SessionArgs {
            prompt: "repair orders".to_string(),
            user: Some("bob".to_string()),
            system: Some("orders".to_string()),
            notify: Some("ops@example.com".to_string()),
            workflow_id: None,
            interactive: false,
            dry_run: true,
        }
    }

    #[test]
    fn test_payload_from_args() {
        let payload = args().payload();
        assert_eq!(payload.prompt, "repair orders");
        assert_eq!(payload.metadata.user.as_deref(), Some("bob"));
        assert_eq!(payload.metadata.system.as_deref(), Some("orders"));
        assert_eq!(
            payload.callback,
            Some(json!({"type": "email", "email": "ops@example.com"}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interactive_lines() {
        let registry = WorkflowRegistry::new(Arc::new(ScriptedActivities::new()), Config::default());
        let handle = registry
            .start_with_id("repair-bob-1", WorkflowVariant::Proactive, args().payload())
            .await
            .unwrap();

        assert!(handle_line(&handle, "keys").await.contains("prompt"));
        assert_eq!(handle_line(&handle, "exit").await, "RequestExit applied");
        assert!(handle_line(&handle, "dance").await.starts_with("Invalid signal"));

        registry.wait("repair-bob-1").await.unwrap();
        assert!(handle_line(&handle, "status").await.starts_with("status: "));
    }
}
