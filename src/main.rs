//! Repair Agent CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use repair_agent::cli::commands::{config, proactive, run};
use repair_agent::cli::{handle_error, Cli, Commands};
use repair_agent::domain::models::Config;
use repair_agent::infrastructure::logging::{LogConfig, LoggerImpl};

/// Load configuration and install the logger it describes.
///
/// A logger failure only disables logging; the returned guard must outlive
/// the command.
fn load_with_logging(file: Option<&Path>) -> Result<(Config, Option<LoggerImpl>)> {
    let loaded = config::load(file)?;
    let logger = match LoggerImpl::init(&LogConfig::from(&loaded.logging)) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };
    Ok((loaded, logger))
}

async fn dispatch(command: Commands, file: Option<PathBuf>, json_mode: bool) -> Result<()> {
    match command {
        Commands::Config(args) => config::execute(args, file, json_mode),
        Commands::Run(args) => {
            let (loaded, _logger) = load_with_logging(file.as_deref())?;
            run::execute(args, loaded, json_mode).await
        }
        Commands::Proactive(args) => {
            let (loaded, _logger) = load_with_logging(file.as_deref())?;
            proactive::execute(args, loaded, json_mode).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = dispatch(cli.command, cli.config, cli.json).await {
        handle_error(err, cli.json);
    }
}
