//! Workflow registry - one running instance per workflow id.
//!
//! Instances run as independent tokio tasks. Signals and queries reach them
//! through their [`RepairHandle`], looked up by workflow id.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::workflow::{
    ProactiveRepairWorkflow, RepairHandle, RepairWorkflow, RunSummary,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, RepairStatus, Signal, SignalOutcome, StartPayload, WorkflowVariant};
use crate::domain::ports::RepairActivities;

struct Entry {
    handle: RepairHandle,
    variant: WorkflowVariant,
    task: Option<JoinHandle<DomainResult<RunSummary>>>,
}

impl Entry {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Row returned by [`WorkflowRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowInfo {
    pub workflow_id: String,
    pub variant: WorkflowVariant,
    pub status: RepairStatus,
    pub running: bool,
}

pub struct WorkflowRegistry {
    activities: Arc<dyn RepairActivities>,
    config: Config,
    workflows: RwLock<HashMap<String, Entry>>,
}

impl WorkflowRegistry {
    pub fn new(activities: Arc<dyn RepairActivities>, config: Config) -> Self {
        Self {
            activities,
            config,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    /// `repair-{user}-{uuid}`, with `anonymous` when no user is known.
    pub fn generate_workflow_id(payload: &StartPayload) -> String {
        let user = payload.metadata.user.as_deref().unwrap_or("anonymous");
        format!("repair-{user}-{}", Uuid::new_v4())
    }

    /// Start a workflow under a generated id.
    pub async fn start(
        &self,
        variant: WorkflowVariant,
        payload: StartPayload,
    ) -> DomainResult<RepairHandle> {
        let workflow_id = Self::generate_workflow_id(&payload);
        self.start_with_id(workflow_id, variant, payload).await
    }

    /// Start a workflow under `workflow_id`.
    ///
    /// Fails with `AlreadyRunning` while an instance with that id is still
    /// running; a finished instance is replaced.
    pub async fn start_with_id(
        &self,
        workflow_id: impl Into<String>,
        variant: WorkflowVariant,
        payload: StartPayload,
    ) -> DomainResult<RepairHandle> {
        let workflow_id = workflow_id.into();
        let mut workflows = self.workflows.write().await;
        if workflows.get(&workflow_id).is_some_and(Entry::is_running) {
            return Err(DomainError::AlreadyRunning(workflow_id));
        }

        let (handle, task) = match variant {
            WorkflowVariant::Base => {
                let workflow = RepairWorkflow::new(
                    workflow_id.clone(),
                    &payload,
                    self.activities.clone(),
                    &self.config,
                );
                let handle = workflow.handle();
                (handle, tokio::spawn(workflow.run()))
            }
            WorkflowVariant::Proactive => {
                let workflow = ProactiveRepairWorkflow::new(
                    workflow_id.clone(),
                    payload,
                    self.activities.clone(),
                    &self.config,
                );
                let handle = workflow.handle();
                (handle, tokio::spawn(workflow.run()))
            }
        };

        info!(workflow_id = %workflow_id, variant = ?variant, "Workflow started");
        workflows.insert(
            workflow_id,
            Entry {
                handle: handle.clone(),
                variant,
                task: Some(task),
            },
        );
        Ok(handle)
    }

    pub async fn handle(&self, workflow_id: &str) -> DomainResult<RepairHandle> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| DomainError::NotFound(format!("workflow '{workflow_id}'")))
    }

    pub async fn signal(&self, workflow_id: &str, signal: Signal) -> DomainResult<SignalOutcome> {
        let handle = self.handle(workflow_id).await?;
        Ok(handle.signal(signal).await)
    }

    pub async fn status(&self, workflow_id: &str) -> DomainResult<RepairStatus> {
        Ok(self.handle(workflow_id).await?.status().await)
    }

    pub async fn list(&self) -> Vec<WorkflowInfo> {
        let workflows = self.workflows.read().await;
        let mut rows = Vec::with_capacity(workflows.len());
        for (workflow_id, entry) in workflows.iter() {
            rows.push(WorkflowInfo {
                workflow_id: workflow_id.clone(),
                variant: entry.variant,
                status: entry.handle.status().await,
                running: entry.is_running(),
            });
        }
        rows.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        rows
    }

    /// Drop a finished workflow from the registry.
    ///
    /// Running workflows are kept and reported as `AlreadyRunning`.
    pub async fn remove(&self, workflow_id: &str) -> DomainResult<RepairHandle> {
        let mut workflows = self.workflows.write().await;
        if workflows.get(workflow_id).is_some_and(Entry::is_running) {
            return Err(DomainError::AlreadyRunning(workflow_id.to_string()));
        }
        workflows
            .remove(workflow_id)
            .map(|entry| entry.handle)
            .ok_or_else(|| DomainError::NotFound(format!("workflow '{workflow_id}'")))
    }

    /// Drop every finished workflow whose result has been collected.
    ///
    /// Returns how many entries were removed.
    pub async fn prune(&self) -> usize {
        let mut workflows = self.workflows.write().await;
        let before = workflows.len();
        workflows.retain(|_, entry| entry.task.is_some());
        let removed = before - workflows.len();
        if removed > 0 {
            debug!(removed, "Pruned finished workflows");
        }
        removed
    }

    /// Wait for a workflow to finish and return its result.
    ///
    /// The result can be collected once; later calls fail with `NotFound`.
    pub async fn wait(&self, workflow_id: &str) -> DomainResult<RunSummary> {
        let task = {
            let mut workflows = self.workflows.write().await;
            let entry = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| DomainError::NotFound(format!("workflow '{workflow_id}'")))?;
            entry.task.take().ok_or_else(|| {
                DomainError::NotFound(format!("result of workflow '{workflow_id}'"))
            })?
        };

        task.await.map_err(|err| {
            warn!(workflow_id, error = %err, "Workflow task did not complete");
            DomainError::Internal(format!("workflow '{workflow_id}' task failed: {err}"))
        })?
    }
}
