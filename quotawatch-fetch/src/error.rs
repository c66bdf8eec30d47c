//! Host API error types.

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Process Error
// ============================================================================

/// Error type for process operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Command not found.
    #[error("Command not found: {0}")]
    NotFound(String),

    /// Command execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Command timed out.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Transport Error
// ============================================================================

/// Error type for loopback RPC calls.
///
/// Variants carry rendered messages rather than the `reqwest` error so the
/// type stays `Clone` and can be handed to several observers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Nothing accepted the connection.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The peer answered a TLS handshake with plain HTTP.
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Any other request failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// The response body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    /// Returns true if a plain HTTP retry may succeed.
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(self, Self::ProtocolMismatch(_))
    }

    /// Returns true for timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
