//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vantage - Declarative compute profile reconciliation.
#[derive(Parser, Debug)]
#[command(name = "vantage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "VANTAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format (text, json).
    #[arg(long, global = true, default_value = "text", env = "VANTAGE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new Vantage project.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration against resource schemas.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the commands an apply would send.
    Plan {
        /// Show per-attribute changes and statements.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Converge remote objects to the configuration.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Read back every managed object and record drift.
    Refresh,

    /// Repair a tainted object by reading it back.
    Repair {
        /// Resource name or identity.
        target: String,
    },

    /// Drop every managed object.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect and manage stored records.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// List all records.
    List,

    /// Show one record with its history.
    Show {
        /// Resource name or identity.
        target: String,
    },

    /// Forget a record without touching the remote object.
    Rm {
        /// Resource name or identity.
        target: String,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Release the lease held on a record.
    Unlock {
        /// Resource name or identity.
        target: String,

        /// Lock ID to release.
        #[arg(long)]
        lock_id: Option<String>,

        /// Release whoever holds it (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log line formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from(["vantage", "--output", "json", "apply", "-y"]).expect("parse");
        assert!(matches!(cli.command, Commands::Apply { yes: true }));
        assert!(matches!(cli.output, OutputFormat::Json));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_state_unlock() {
        let cli = Cli::try_parse_from(["vantage", "state", "unlock", "analytics", "--force"])
            .expect("parse");
        let Commands::State {
            command: StateCommands::Unlock { target, lock_id, force },
        } = cli.command
        else {
            panic!("expected state unlock");
        };
        assert_eq!(target, "analytics");
        assert!(lock_id.is_none());
        assert!(force);
    }

    #[test]
    fn test_repair_requires_target() {
        assert!(Cli::try_parse_from(["vantage", "repair"]).is_err());
    }
}
