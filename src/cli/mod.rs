//! CLI module for the Vantage reconciliation tool.
//!
//! This module provides the command-line interface for managing
//! compute profiles from a configuration file.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, StateCommands};
pub use output::OutputFormatter;
