use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding the project configuration files.
pub const CONFIG_DIR: &str = ".repair-agent";

/// Prefix of environment overrides, e.g. `REPAIR_AGENT_RETRY__MAX_ATTEMPTS`.
pub const ENV_PREFIX: &str = "REPAIR_AGENT_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_interval_ms ({0}) must be less than max_interval_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid backoff_coefficient: {0}. Must be at least 1.0")]
    InvalidBackoffCoefficient(f64),

    #[error("Invalid timeout: {0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Invalid threshold: {0} = {1}. Must be between 0.0 and 1.0")]
    InvalidThreshold(&'static str, f64),

    #[error("Invalid max_iterations: must be at least 1")]
    InvalidMaxIterations,

    #[error("Collaborator base_url cannot be empty")]
    EmptyBaseUrl,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .repair-agent/config.yaml
    /// 3. .repair-agent/local.yaml (optional local overrides)
    /// 4. Environment variables (REPAIR_AGENT_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(CONFIG_DIR)
    }

    /// Same as [`ConfigLoader::load`] with the config files read from `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let retry = &config.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(retry.max_attempts));
        }
        if retry.initial_interval_ms >= retry.max_interval_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_interval_ms,
                retry.max_interval_ms,
            ));
        }
        if retry.backoff_coefficient.is_nan() || retry.backoff_coefficient < 1.0 {
            return Err(ConfigError::InvalidBackoffCoefficient(retry.backoff_coefficient));
        }

        let timeouts = [
            ("activities.start_to_close_secs", config.activities.start_to_close_secs),
            ("activities.heartbeat_timeout_secs", config.activities.heartbeat_timeout_secs),
            (
                "activities.planning_heartbeat_timeout_secs",
                config.activities.planning_heartbeat_timeout_secs,
            ),
            ("approval.timeout_secs", config.approval.timeout_secs),
            ("proactive.approval_timeout_secs", config.proactive.approval_timeout_secs),
            ("proactive.cycle_wait_secs", config.proactive.cycle_wait_secs),
            ("collaborator.request_timeout_secs", config.collaborator.request_timeout_secs),
            ("collaborator.heartbeat_interval_secs", config.collaborator.heartbeat_interval_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ZeroTimeout(*name));
        }

        let thresholds = [
            ("thresholds.detection", config.thresholds.detection),
            ("thresholds.auto_approve", config.thresholds.auto_approve),
            ("thresholds.tool_execution", config.thresholds.tool_execution),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold(name, value));
            }
        }

        if config.proactive.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations);
        }

        if config.collaborator.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        Ok(())
    }
}
