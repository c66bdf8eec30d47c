// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! `QuotaWatch` CLI - Antigravity model quotas from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Discover the language server and show quotas once
//! quotawatch
//!
//! # Use the model-config endpoint instead of user status
//! quotawatch usage --method model-config
//!
//! # JSON output
//! quotawatch --format json --pretty
//!
//! # Show what discovery finds
//! quotawatch detect
//!
//! # Poll continuously (r = retry, q = quick refresh, d = re-detect, x = exit)
//! quotawatch watch --interval 30
//!
//! # Change a setting
//! quotawatch config set pollingIntervalSecs 120
//! ```

mod commands;
mod context;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use quotawatch_probe::{DiscoveryError, EngineError, ErrorCategory, QuotaError};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, detect, usage, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// `QuotaWatch` CLI - Antigravity quota monitoring.
#[derive(Parser)]
#[command(name = "quotawatch")]
#[command(about = "Antigravity model quota monitoring CLI")]
#[command(long_about = r"
QuotaWatch finds the locally running Antigravity language server, reads its
CSRF token and port from the process list, and reports per-model quotas.

Supported platforms:
  • Windows (wmic, PowerShell fallback, netstat)
  • macOS   (ps, lsof)
  • Linux   (ps, lsof, ss fallback)

Examples:
  quotawatch                        # Fetch once
  quotawatch --format json          # JSON output
  quotawatch detect                 # Discovery only
  quotawatch watch                  # Poll continuously
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run. If none, runs 'usage' by default.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Settings file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch current quotas (default if no command specified).
    #[command(visible_alias = "u")]
    Usage(usage::UsageArgs),

    /// Locate the language server and show its connection details.
    #[command(visible_alias = "d")]
    Detect,

    /// Poll quotas until interrupted.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),

    /// Manage configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// General error.
    Error = 1,
    /// The language server was not found.
    NotRunning = 2,
    /// The server answered with something unparseable.
    ParseError = 3,
}

impl ExitCode {
    /// Picks the exit code for a failed command.
    pub fn for_error(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if cause.downcast_ref::<DiscoveryError>().is_some() {
                return Self::NotRunning;
            }
            let quota = cause.downcast_ref::<QuotaError>().or_else(|| {
                match cause.downcast_ref::<EngineError>() {
                    Some(EngineError::Fetch(e)) => Some(e),
                    _ => None,
                }
            });
            if quota.is_some_and(|e| e.category() == ErrorCategory::Parse) {
                return Self::ParseError;
            }
        }
        Self::Error
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(
                "quotawatch=debug,quotawatch_probe=debug,quotawatch_fetch=debug,quotawatch_store=debug,warn",
            )
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result: Result<()> = match &cli.command {
        Some(Commands::Usage(args)) => usage::run(args, &cli).await,
        Some(Commands::Detect) => detect::run(&cli).await,
        Some(Commands::Watch(args)) => watch::run(args, &cli).await,
        Some(Commands::Config(args)) => config::run(args, &cli).await,
        None => usage::run(&usage::UsageArgs::default(), &cli).await,
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e}");
            }
            ExitCode::for_error(&e) as i32
        }
    };

    // A blocking stdin read left by watch mode would otherwise keep the
    // runtime from shutting down.
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotawatch_fetch::TransportError;

    #[test]
    fn test_exit_code_not_running() {
        let err = anyhow::Error::new(DiscoveryError::Exhausted { attempts: 3 });
        assert_eq!(ExitCode::for_error(&err), ExitCode::NotRunning);
    }

    #[test]
    fn test_exit_code_parse_error() {
        let err = anyhow::Error::new(QuotaError::MissingField("userStatus"));
        assert_eq!(ExitCode::for_error(&err), ExitCode::ParseError);

        let err = anyhow::Error::new(EngineError::Fetch(QuotaError::InvalidJson("eof".into())));
        assert_eq!(ExitCode::for_error(&err), ExitCode::ParseError);
    }

    #[test]
    fn test_exit_code_general() {
        let err = anyhow::Error::new(QuotaError::Transport(TransportError::Timeout(
            std::time::Duration::from_secs(5),
        )));
        assert_eq!(ExitCode::for_error(&err), ExitCode::Error);

        let err = anyhow::anyhow!("something else").context("while testing");
        assert_eq!(ExitCode::for_error(&err), ExitCode::Error);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["quotawatch", "watch", "--interval", "30"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Watch(ref a)) if a.interval == Some(30)));

        let cli = Cli::try_parse_from(["quotawatch", "--format", "json", "detect"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Some(Commands::Detect)));
    }
}
