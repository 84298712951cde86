//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading (`.repair-agent/config.yaml`, then `local.yaml`)
//! - Environment variable overrides (`REPAIR_AGENT_*`)
//! - Configuration validation

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR, ENV_PREFIX};
