//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{PlanCommand, RunCommand};

/// wsrun - Run scripts across workspaces
#[derive(Debug, Parser)]
#[command(name = "wsrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors and script output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Config file (default: search wsrun.toml / wsrun.yaml upwards)
    #[arg(short, long, global = true, env = "WSRUN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a script in every selected workspace
    Run(RunCommand),

    /// Show the execution waves without running anything
    Plan(PlanCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Plan(ref cmd) => cmd.execute(&self),
        }
    }
}
