//! Per-OS process and port inspection.
//!
//! A [`PlatformStrategy`] knows which commands list language-server processes
//! and their listening ports on one OS family, and how to parse their output.
//! [`PlatformDetector`] picks the strategy and the expected binary name for
//! the running OS.
//!
//! Strategies carry an explicit inspection mode. When a command turns out to
//! be missing, [`PlatformStrategy::handle_command_unavailable`] moves the
//! strategy to its alternative command for good.

pub mod flags;
pub mod unix;
pub mod windows;

use std::collections::BTreeSet;
use std::fmt;

use quotawatch_core::ProcessCandidate;
use quotawatch_fetch::{ProcessError, ProcessOutput};
use tracing::{debug, info};

use crate::error::DiscoveryError;

pub use flags::{LaunchCredentials, extract_credentials, is_target_command};
pub use unix::{PortTool, UnixFlavor, UnixStrategy};
pub use windows::{WindowsListMode, WindowsStrategy};

// ============================================================================
// Commands
// ============================================================================

/// An external command: program plus arguments, no shell involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    /// Program name or absolute path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl ShellCommand {
    /// Creates a command.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Which inspection command a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStage {
    /// Listing processes.
    ProcessList,
    /// Listing a process's listening ports.
    ListeningPorts,
}

/// OS-specific guidance shown when discovery gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessages {
    /// Shown when no matching process exists.
    pub process_not_found: String,
    /// Shown when an inspection command is missing.
    pub command_not_available: String,
    /// Checklist for the user.
    pub requirements: Vec<String>,
}

// ============================================================================
// Strategy
// ============================================================================

/// Process and port inspection for one OS family.
pub trait PlatformStrategy: Send + Sync + fmt::Debug {
    /// Display name of the platform, e.g. "Windows".
    fn platform_name(&self) -> &'static str;

    /// Command listing processes named `process_name` with full command lines.
    fn process_list_command(&self, process_name: &str) -> ShellCommand;

    /// Parses a process listing into target candidates, in output order.
    ///
    /// Processes whose name matches but whose command line lacks the target
    /// marker are dropped.
    fn parse_process_list(&self, output: &str, process_name: &str) -> Vec<ProcessCandidate>;

    /// Extracts the extension port and CSRF token from a command line.
    fn extract_credentials(&self, command_line: &str) -> Option<LaunchCredentials> {
        extract_credentials(command_line)
    }

    /// Command listing TCP ports in LISTEN state.
    fn listening_ports_command(&self, pid: u32) -> ShellCommand;

    /// Parses listening ports owned by `pid` on loopback or any-address
    /// bindings. Sorted ascending, without duplicates.
    fn parse_listening_ports(&self, output: &str, pid: u32) -> Vec<u16>;

    /// Guidance for the user.
    fn error_messages(&self) -> ErrorMessages;

    /// Switches to the alternative command for `stage`, if there is one.
    ///
    /// Returns true if the mode changed. A switch is permanent.
    fn handle_command_unavailable(&mut self, stage: CommandStage) -> bool;

    /// Returns true if a command result means the program itself is missing.
    fn is_command_unavailable(&self, result: &Result<ProcessOutput, ProcessError>) -> bool {
        is_command_unavailable(result)
    }
}

/// Picks the first candidate carrying a CSRF token.
///
/// Later candidates are logged as skipped.
///
/// # Errors
///
/// Returns `ProcessNotFound` for an empty list and `MissingCsrfToken` when no
/// candidate has a token.
pub fn select_candidate(
    strategy: &dyn PlatformStrategy,
    candidates: &[ProcessCandidate],
) -> Result<(ProcessCandidate, LaunchCredentials), DiscoveryError> {
    if candidates.is_empty() {
        return Err(DiscoveryError::ProcessNotFound);
    }

    let mut selected = None;
    for candidate in candidates {
        if selected.is_some() {
            info!(pid = candidate.pid, "Skipping additional language server process");
            continue;
        }
        match strategy.extract_credentials(&candidate.command_line) {
            Some(creds) => selected = Some((candidate.clone(), creds)),
            None => debug!(pid = candidate.pid, "Candidate has no CSRF token"),
        }
    }

    selected.ok_or(DiscoveryError::MissingCsrfToken)
}

/// Default check for a missing program.
///
/// Covers spawn failures and shell-style "not found" diagnostics, including
/// the Windows `cmd` exit code 9009.
pub fn is_command_unavailable(result: &Result<ProcessOutput, ProcessError>) -> bool {
    match result {
        Err(ProcessError::NotFound(_)) => true,
        Err(ProcessError::Io(e)) => e.kind() == std::io::ErrorKind::NotFound,
        Err(_) => false,
        Ok(output) => {
            if output.success() {
                return false;
            }
            let stderr = output.stderr.to_lowercase();
            output.exit_code == 9009
                || output.exit_code == 127
                || stderr.contains("not recognized")
                || stderr.contains("command not found")
                || stderr.contains("no such file or directory")
        }
    }
}

// ============================================================================
// Address helpers
// ============================================================================

/// Splits `host:port`, accepting bracketed IPv6 hosts.
pub(crate) fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    Some((host, port.parse().ok()?))
}

/// Returns true for loopback and wildcard listen addresses.
pub(crate) fn is_local_bind(host: &str) -> bool {
    matches!(
        host,
        "127.0.0.1" | "0.0.0.0" | "[::1]" | "[::]" | "::1" | "::" | "*" | "localhost"
    )
}

/// Collects ports into ascending order without duplicates.
pub(crate) fn sorted_ports(ports: impl IntoIterator<Item = u16>) -> Vec<u16> {
    ports.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

// ============================================================================
// Platform Detection
// ============================================================================

/// Supported operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows.
    Windows,
    /// macOS.
    MacOs,
    /// Linux.
    Linux,
}

impl Platform {
    /// Returns the platform of the running process.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` for any other OS.
    pub fn current() -> Result<Self, DiscoveryError> {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps a `std::env::consts::OS` value.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` for an unknown OS.
    pub fn from_os(os: &str) -> Result<Self, DiscoveryError> {
        match os {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(DiscoveryError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Expected language-server binary name.
    pub fn process_name(&self) -> &'static str {
        match self {
            Self::Windows => "language_server_windows_x64.exe",
            Self::MacOs => "language_server_macos",
            Self::Linux => "language_server_linux",
        }
    }

    /// Display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
        }
    }
}

/// Selects the strategy and process name for a platform.
#[derive(Debug, Clone)]
pub struct PlatformDetector {
    platform: Platform,
    force_powershell: bool,
}

impl PlatformDetector {
    /// Detects the running platform.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` on an OS other than Windows, macOS or
    /// Linux.
    pub fn new() -> Result<Self, DiscoveryError> {
        Ok(Self::for_platform(Platform::current()?))
    }

    /// Uses an explicit platform.
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            force_powershell: false,
        }
    }

    /// Starts the Windows strategy in PowerShell mode.
    #[must_use]
    pub fn with_force_powershell(mut self, force: bool) -> Self {
        self.force_powershell = force;
        self
    }

    /// Returns the platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Expected language-server binary name.
    pub fn process_name(&self) -> &'static str {
        self.platform.process_name()
    }

    /// Builds a fresh strategy for the platform.
    pub fn strategy(&self) -> Box<dyn PlatformStrategy> {
        match self.platform {
            Platform::Windows => {
                let mode = if self.force_powershell {
                    info!("forcePowerShell is enabled, using PowerShell mode");
                    WindowsListMode::PowerShell
                } else {
                    WindowsListMode::Wmic
                };
                Box::new(WindowsStrategy::new(mode))
            }
            Platform::MacOs => Box::new(UnixStrategy::new(UnixFlavor::MacOs)),
            Platform::Linux => Box::new(UnixStrategy::new(UnixFlavor::Linux)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
