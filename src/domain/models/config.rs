use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the repair agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Activity retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Activity timeouts
    #[serde(default)]
    pub activities: ActivityConfig,

    /// Confidence thresholds used for branching
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Approval gate of the base workflow
    #[serde(default)]
    pub approval: ApprovalConfig,

    /// Proactive loop settings
    #[serde(default)]
    pub proactive: ProactiveConfig,

    /// Links embedded in status snapshots
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// HTTP collaborator serving the activities
    #[serde(default)]
    pub collaborator: CollaboratorConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Upper bound for the backoff delay in milliseconds
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,

    /// Total attempts (first try included) before an activity fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

const fn default_initial_interval_ms() -> u64 {
    1_000
}

const fn default_max_interval_ms() -> u64 {
    30_000
}

const fn default_backoff_coefficient() -> f64 {
    2.0
}

const fn default_max_attempts() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Activity timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ActivityConfig {
    /// Maximum duration of a single attempt
    #[serde(default = "default_start_to_close_secs")]
    pub start_to_close_secs: u64,

    /// Maximum silence between heartbeats
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    /// Heartbeat timeout for the slower plan and notify activities
    #[serde(default = "default_planning_heartbeat_timeout_secs")]
    pub planning_heartbeat_timeout_secs: u64,
}

const fn default_start_to_close_secs() -> u64 {
    300
}

const fn default_heartbeat_timeout_secs() -> u64 {
    20
}

const fn default_planning_heartbeat_timeout_secs() -> u64 {
    30
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            start_to_close_secs: default_start_to_close_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            planning_heartbeat_timeout_secs: default_planning_heartbeat_timeout_secs(),
        }
    }
}

/// Confidence thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdConfig {
    /// Detection confidence strictly below this ends the cycle without repair
    #[serde(default = "default_detection_threshold")]
    pub detection: f64,

    /// Planning confidence strictly above this bypasses human approval (proactive)
    #[serde(default = "default_auto_approve_threshold")]
    pub auto_approve: f64,

    /// Tools with confidence strictly below this are skipped
    #[serde(default = "default_tool_execution_threshold")]
    pub tool_execution: f64,
}

const fn default_detection_threshold() -> f64 {
    0.5
}

const fn default_auto_approve_threshold() -> f64 {
    0.95
}

const fn default_tool_execution_threshold() -> f64 {
    0.5
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            detection: default_detection_threshold(),
            auto_approve: default_auto_approve_threshold(),
            tool_execution: default_tool_execution_threshold(),
        }
    }
}

/// What happens when the approval window elapses without a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalTimeoutPolicy {
    /// Fail the run with an approval timeout error
    #[default]
    Fail,
    /// Treat the silence as a rejection
    Reject,
}

/// Approval gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApprovalConfig {
    /// Approval window of the base workflow
    #[serde(default = "default_approval_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub on_timeout: ApprovalTimeoutPolicy,
}

const fn default_approval_timeout_secs() -> u64 {
    5 * 24 * 60 * 60
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout_secs(),
            on_timeout: ApprovalTimeoutPolicy::default(),
        }
    }
}

/// Proactive loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProactiveConfig {
    /// Cycles before the loop continues as new
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Approval window inside a proactive cycle
    #[serde(default = "default_proactive_approval_timeout_secs")]
    pub approval_timeout_secs: u64,

    /// Upper bound of the wait between cycles
    #[serde(default = "default_cycle_wait_secs")]
    pub cycle_wait_secs: u64,
}

const fn default_max_iterations() -> u32 {
    10
}

const fn default_proactive_approval_timeout_secs() -> u64 {
    20 * 60 * 60
}

const fn default_cycle_wait_secs() -> u64 {
    24 * 60 * 60
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            approval_timeout_secs: default_proactive_approval_timeout_secs(),
            cycle_wait_secs: default_cycle_wait_secs(),
        }
    }
}

/// Report links shown in status snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    #[serde(default = "default_planning_report_link")]
    pub planning_report_link: String,

    #[serde(default = "default_repair_report_link")]
    pub repair_report_link: String,
}

fn default_planning_report_link() -> String {
    "file://reports/planning_report.md".to_string()
}

fn default_repair_report_link() -> String {
    "file://reports/tool_execution_report.md".to_string()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            planning_report_link: default_planning_report_link(),
            repair_report_link: default_repair_report_link(),
        }
    }
}

/// HTTP collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CollaboratorConfig {
    /// Base URL; activities are served at `{base_url}/activities/{name}`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Heartbeat cadence while a request is in flight
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    240
}

const fn default_heartbeat_interval_secs() -> u64 {
    5
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl CollaboratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
