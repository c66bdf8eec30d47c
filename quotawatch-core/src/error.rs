//! Core error types for `QuotaWatch`.

use thiserror::Error;

/// Core error type for `QuotaWatch` value types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string did not name a known variant.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// What was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
