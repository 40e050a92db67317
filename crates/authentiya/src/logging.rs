//! Tracing setup.
//!
//! Everything is written to stderr; stdout is reserved for command output
//! and `--json` documents.

use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much the binary logs, chosen with `-q`, `-v` and `-vv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Session lifecycle and warnings.
    #[default]
    Normal,
    /// Adds per-message and per-tick diagnostics.
    Verbose,
    /// Adds suppressed keydowns and other capture detail.
    Trace,
}

impl Verbosity {
    /// The level this verbosity enables for the `authentiya` target.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::ERROR,
            Self::Normal => LevelFilter::INFO,
            Self::Verbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    ///
    /// Dependencies stay at `warn` so HTTP and SQLite internals do not drown
    /// out recorder events.
    #[must_use]
    pub fn directive(self) -> String {
        let level = match self {
            Self::Quiet => "error",
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Trace => "trace",
        };
        format!("warn,authentiya={level}")
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `verbosity`.
///
/// Calling it again is harmless; the first subscriber stays in place.
///
/// ```no_run
/// use authentiya::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(verbosity >= Verbosity::Verbose);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
