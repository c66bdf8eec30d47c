//! Discovery output types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of token characters kept visible when a CSRF token is displayed.
const VISIBLE_TOKEN_CHARS: usize = 8;

// ============================================================================
// Process Candidate
// ============================================================================

/// A process found in a process listing whose name matched the language server.
///
/// Candidates are short-lived: they are produced by a platform parser,
/// filtered by the target marker and dropped once one has been selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCandidate {
    /// Operating system process id.
    pub pid: u32,
    /// Full invocation, executable plus arguments.
    pub command_line: String,
}

impl ProcessCandidate {
    /// Creates a new candidate.
    pub fn new(pid: u32, command_line: impl Into<String>) -> Self {
        Self {
            pid,
            command_line: command_line.into(),
        }
    }
}

// ============================================================================
// Credential Bundle
// ============================================================================

/// Everything needed to call the language server's private RPC endpoint.
///
/// A bundle is created once per successful discovery and replaced as a whole
/// on re-discovery. Its fields are never edited in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    /// Plain HTTP fallback port from `--extension_server_port`. Zero means none.
    pub extension_port: u16,
    /// HTTPS port that answered the liveness probe.
    pub connect_port: u16,
    /// Value for the CSRF request header.
    pub csrf_token: String,
}

impl CredentialBundle {
    /// Creates a new bundle.
    pub fn new(extension_port: u16, connect_port: u16, csrf_token: impl Into<String>) -> Self {
        Self {
            extension_port,
            connect_port,
            csrf_token: csrf_token.into(),
        }
    }

    /// Returns the HTTP fallback port, if the process declared one.
    pub fn fallback_port(&self) -> Option<u16> {
        (self.extension_port != 0).then_some(self.extension_port)
    }

    /// Returns true if the bundle carries a non-empty CSRF token.
    pub fn has_token(&self) -> bool {
        !self.csrf_token.trim().is_empty()
    }

    /// Returns the token shortened for logs and terminal output.
    pub fn masked_token(&self) -> String {
        mask_token(&self.csrf_token)
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("extension_port", &self.extension_port)
            .field("connect_port", &self.connect_port)
            .field("csrf_token", &self.masked_token())
            .finish()
    }
}

/// Masks a secret, keeping only its first few characters.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(VISIBLE_TOKEN_CHARS).collect();
    if visible.len() == token.len() {
        visible
    } else {
        format!("{visible}...")
    }
}
