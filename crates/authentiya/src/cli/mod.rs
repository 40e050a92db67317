//! Command-line interface for authentiya.
//!
//! The CLI stands in for the extension's popup and options pages. `run`
//! starts the recorder over standard input; the other commands act on the
//! store directly.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{
    CiteCommand, ConfigCommand, CoursesCommand, EventsCommand, OutputArgs, OutputFormat,
    RunCommand, StartCommand, ToggleArg, ToggleCommand,
};

/// authentiya - Record writing sessions as verifiable activity reports
///
/// Tracks typing, copy and paste activity during a course assignment
/// session and exports it as a CSV report.
#[derive(Debug, Parser)]
#[command(name = "authentiya")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the recorder, reading newline-delimited JSON messages from stdin
    Run(RunCommand),

    /// Start a session
    Start(StartCommand),

    /// Submit the active session and export its report
    Submit(OutputArgs),

    /// Discard the active session
    Reset,

    /// Show the current session
    Status(OutputArgs),

    /// Show the recorded events of the active session
    Events(EventsCommand),

    /// Show copy/paste events and their citation status
    Citations(OutputArgs),

    /// Mark a copy/paste event as cited
    Cite(CiteCommand),

    /// Show past sessions
    History(OutputArgs),

    /// Record a tracking toggle change
    Toggle(ToggleCommand),

    /// List courses
    Courses(CoursesCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "authentiya");
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["authentiya", "-q", "status"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["authentiya", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["authentiya", "-v", "status"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["authentiya", "-vv", "status"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_start() {
        let cli = parse(&["authentiya", "start", "--course", "cs101", "-a", "hw1"]);
        let Command::Start(start) = cli.command else {
            panic!("expected start");
        };
        assert_eq!(start.course, "cs101");
        assert_eq!(start.assignment, "hw1");
        assert!(!start.json);
    }

    #[test]
    fn test_parse_start_without_selection() {
        let cli = parse(&["authentiya", "start"]);
        let Command::Start(start) = cli.command else {
            panic!("expected start");
        };
        assert!(start.course.is_empty());
    }

    #[test]
    fn test_parse_events() {
        let cli = parse(&["authentiya", "events", "--last", "5", "-f", "csv"]);
        let Command::Events(events) = cli.command else {
            panic!("expected events");
        };
        assert_eq!(events.last, Some(5));
        assert_eq!(events.format, OutputFormat::Csv);
    }

    #[test]
    fn test_parse_toggle_and_cite() {
        let cli = parse(&["authentiya", "toggle", "off"]);
        assert!(matches!(
            cli.command,
            Command::Toggle(ToggleCommand {
                state: ToggleArg::Off
            })
        ));

        let cli = parse(&["authentiya", "cite", "3"]);
        assert!(matches!(cli.command, Command::Cite(CiteCommand { ref entry }) if entry == "3"));
        assert!(Cli::try_parse_from(["authentiya", "toggle", "sideways"]).is_err());
    }

    #[test]
    fn test_parse_courses_flags_conflict() {
        assert!(Cli::try_parse_from(["authentiya", "courses", "--remote", "--verify"]).is_err());
        assert!(matches!(
            parse(&["authentiya", "courses", "--verify"]).command,
            Command::Courses(CoursesCommand {
                verify: true,
                remote: false,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["authentiya", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_config_subcommands() {
        assert!(matches!(
            parse(&["authentiya", "config", "show", "--json"]).command,
            Command::Config(ConfigCommand::Show { json: true })
        ));
        assert!(matches!(
            parse(&["authentiya", "config", "path"]).command,
            Command::Config(ConfigCommand::Path)
        ));
    }

    #[test]
    fn test_parse_run() {
        let cli = parse(&["authentiya", "run", "--no-restore"]);
        assert!(matches!(cli.command, Command::Run(RunCommand { no_restore: true })));
    }
}
