//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, OutputFlags};
use crate::commands;

/// End-to-end tests on a disposable Windows VM attached to an OpenShift cluster
#[derive(Parser, Debug)]
#[command(
    name = "winvm-e2e",
    version,
    propagate_version = true,
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(flatten)]
    pub run: commands::run::RunArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Destroy the VM and security group recorded in $ARTIFACT_DIR
    Cleanup,

    /// Show version
    Version,
}

impl Cli {
    /// Flags shared by every command.
    #[must_use]
    pub fn output_flags(&self) -> OutputFlags {
        OutputFlags {
            no_color: self.no_color,
            quiet: self.quiet,
            json: self.json,
        }
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let app = AppContext::new(self.output_flags());
        match self.command {
            Some(Command::Version) => {
                commands::version::run(app.is_json());
                Ok(())
            }
            Some(Command::Cleanup) => commands::cleanup::run(&app).await,
            None => commands::run::run(&app, &self.run).await,
        }
    }
}
