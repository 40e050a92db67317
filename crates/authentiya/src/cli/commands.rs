//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::store::ToggleState;

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Do not resume a session left active in the store
    #[arg(long)]
    pub no_restore: bool,
}

/// Start command arguments.
#[derive(Debug, Args)]
pub struct StartCommand {
    /// Course value or name
    #[arg(long, default_value = "")]
    pub course: String,

    /// Assignment value or label
    #[arg(short, long, default_value = "")]
    pub assignment: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Arguments shared by commands that only choose an output format.
#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Events command arguments.
#[derive(Debug, Args)]
pub struct EventsCommand {
    /// Show only the last N events
    #[arg(short, long)]
    pub last: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Output as JSON, same as `--format json`
    #[arg(short, long, conflicts_with = "format")]
    pub json: bool,
}

impl EventsCommand {
    /// The effective output format.
    #[must_use]
    pub fn output(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Cite command arguments.
#[derive(Debug, Args)]
pub struct CiteCommand {
    /// Entry index, or a content hash prefix of at least four characters
    pub entry: String,
}

/// Toggle command arguments.
#[derive(Debug, Args)]
pub struct ToggleCommand {
    /// New toggle position
    #[arg(value_enum)]
    pub state: ToggleArg,
}

/// Courses command arguments.
#[derive(Debug, Args)]
pub struct CoursesCommand {
    /// Fetch courses from Canvas instead of the configured catalog
    #[arg(short, long)]
    pub remote: bool,

    /// Only check that the configured Canvas URL answers
    #[arg(long, conflicts_with = "remote")]
    pub verify: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Toggle position argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToggleArg {
    /// Tracking on
    On,
    /// Tracking off
    Off,
}

impl From<ToggleArg> for ToggleState {
    fn from(arg: ToggleArg) -> Self {
        match arg {
            ToggleArg::On => Self::On,
            ToggleArg::Off => Self::Off,
        }
    }
}

/// Output format for the event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Aligned table
    #[default]
    Table,
    /// Report-style CSV
    Csv,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_arg_conversion() {
        assert_eq!(ToggleState::from(ToggleArg::On), ToggleState::On);
        assert_eq!(ToggleState::from(ToggleArg::Off), ToggleState::Off);
    }

    #[test]
    fn test_events_json_flag() {
        let cmd = EventsCommand {
            last: None,
            format: OutputFormat::Table,
            json: true,
        };
        assert_eq!(cmd.output(), OutputFormat::Json);
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }
}
