//! Discovery, quota and engine errors.

use std::fmt;

use quotawatch_fetch::TransportError;
use thiserror::Error;

// ============================================================================
// Discovery Error
// ============================================================================

/// Errors raised while locating the language server.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// The running OS has no platform strategy. Not retried.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// No process in the listing belongs to the target application.
    #[error("Language server process not found")]
    ProcessNotFound,

    /// Matching processes exist but none carries a CSRF token.
    #[error("CSRF token not found in process arguments")]
    MissingCsrfToken,

    /// The selected process listens on no loopback port.
    #[error("Process {pid} is not listening on any ports")]
    NoListeningPorts {
        /// Process id.
        pid: u32,
    },

    /// No listening port answered the liveness probe.
    #[error("No port answered the API probe (tried {ports:?})")]
    NoResponsivePort {
        /// Ports probed, in order.
        ports: Vec<u16>,
    },

    /// An inspection command failed.
    #[error("Command failed: {0}")]
    Command(String),

    /// Every attempt failed.
    #[error("Discovery failed after {attempts} attempts")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl DiscoveryError {
    /// Returns true if a later attempt may succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UnsupportedPlatform(_) | Self::Exhausted { .. })
    }
}

// ============================================================================
// Quota Error
// ============================================================================

/// Broad class of a quota fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, timeout or protocol failure.
    Transport,
    /// Non-success `code` inside a 200 response.
    Application,
    /// Malformed body or missing required field.
    Parse,
    /// Missing or unusable credentials.
    Credential,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport",
            Self::Application => "application",
            Self::Parse => "parse",
            Self::Credential => "credential",
        })
    }
}

/// Errors raised by a single quota fetch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuotaError {
    /// The bundle has no CSRF token.
    #[error("CSRF token is missing")]
    MissingCsrfToken,

    /// The request did not produce a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a status other than 200.
    #[error("HTTP {0}")]
    HttpStatus(u16),

    /// The body is not valid JSON for the expected shape.
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    /// The body reports a non-success `code`.
    #[error("API error (code {code}){}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Application {
        /// Reported code, rendered as text.
        code: String,
        /// Reported message.
        message: Option<String>,
    },

    /// A required object is absent.
    #[error("Response is missing {0}")]
    MissingField(&'static str),
}

impl QuotaError {
    /// Maps the error onto its category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCsrfToken => ErrorCategory::Credential,
            Self::Transport(_) | Self::HttpStatus(_) => ErrorCategory::Transport,
            Self::Application { .. } => ErrorCategory::Application,
            Self::InvalidJson(_) | Self::MissingField(_) => ErrorCategory::Parse,
        }
    }
}

// ============================================================================
// Engine Error
// ============================================================================

/// Errors returned by [`crate::PollingEngine`] operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Another start or manual retry is still running.
    #[error("A polling transition is already in progress")]
    TransitionInProgress,

    /// The engine task has shut down.
    #[error("Polling engine is closed")]
    Closed,

    /// The fetch performed by the operation failed.
    #[error(transparent)]
    Fetch(#[from] QuotaError),
}
