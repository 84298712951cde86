//! `repair-agent config`: show and validate the effective configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::{ConfigLoader, CONFIG_DIR, ENV_PREFIX};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,
    /// Load and validate the configuration, reporting the first problem
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    pub source: String,
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        let yaml = serde_yaml::to_string(&self.config).unwrap_or_default();
        format!("# source: {}\n{yaml}", self.source)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub source: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        match self.error {
            None => format!("Configuration from {} is valid.", self.source),
            Some(ref error) => format!("Configuration from {} is invalid: {error}", self.source),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Load from `file` when given, otherwise from the project hierarchy.
pub fn load(file: Option<&Path>) -> Result<Config> {
    match file {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

fn describe_source(file: Option<&Path>) -> String {
    file.map_or_else(
        || format!("{CONFIG_DIR}/ + {ENV_PREFIX}* environment"),
        |path| path.display().to_string(),
    )
}

pub fn execute(args: ConfigArgs, file: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let file = file.as_deref();
    let source = describe_source(file);

    match args.command {
        ConfigCommands::Show => {
            let config = load(file).context("Failed to load configuration")?;
            output(&ConfigShowOutput { source, config }, json_mode);
        }
        ConfigCommands::Validate => {
            let error = load(file).err().map(|err| format!("{err:#}"));
            let valid = error.is_none();
            output(&ConfigValidateOutput { source, valid, error }, json_mode);
            if !valid {
                anyhow::bail!("configuration is invalid");
            }
        }
    }
    Ok(())
}
