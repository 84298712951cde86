//! CLI type definitions
//!
//! This module contains the top-level clap structures; each command owns its
//! own argument struct.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{config::ConfigArgs, proactive::ProactiveArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(name = "repair-agent")]
#[command(about = "Repair Agent - approval-gated repair orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of `.repair-agent/`
    #[arg(short, long, global = true, env = "REPAIR_AGENT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one detect, analyze, plan, approve, repair and report cycle
    Run(RunArgs),

    /// Run the repair cycle continuously with unattended auto-approval
    Proactive(ProactiveArgs),

    /// Inspect and validate configuration
    Config(ConfigArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "repair-agent",
            "--json",
            "run",
            "--prompt",
            "repair stuck orders",
            "--user",
            "bob",
            "--auto-approve",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.session.prompt, "repair stuck orders");
                assert_eq!(args.session.user.as_deref(), Some("bob"));
                assert!(args.auto_approve);
                assert!(!args.session.interactive);
            }
            other => panic!("Expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_proactive_overrides() {
        let cli = Cli::try_parse_from([
            "repair-agent",
            "proactive",
            "--prompt",
            "watch orders",
            "--max-iterations",
            "3",
            "--cycle-wait-secs",
            "60",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Commands::Proactive(args) => {
                assert_eq!(args.max_iterations, Some(3));
                assert_eq!(args.cycle_wait_secs, Some(60));
                assert!(args.session.dry_run);
            }
            other => panic!("Expected proactive command, got {other:?}"),
        }
    }
}
