// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Core
//!
//! Core value types shared by every other `QuotaWatch` crate.
//!
//! Nothing in this crate performs I/O. It describes what discovery produces,
//! what the polling engine hands to its observers, and the small enums that
//! travel between them.
//!
//! ## Key Types
//!
//! ### Discovery
//! - [`ProcessCandidate`] - A language-server process found in a process listing
//! - [`CredentialBundle`] - Ports and CSRF token needed to talk to the server
//!
//! ### Quota Data
//! - [`QuotaSnapshot`] - Normalized result of one successful fetch
//! - [`ModelQuotaInfo`] - Per-model remaining quota and reset countdown
//! - [`PromptCreditsInfo`] - Monthly prompt credit balance
//! - [`PaceStatus`] - Usage pace classification
//! - [`QuotaLevel`] - Threshold-based severity of a remaining percentage
//!
//! ### Polling
//! - [`QuotaApiMethod`] - Which RPC method the client calls
//! - [`PollStatus`] - Transient status events emitted while polling

pub mod error;
pub mod models;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Discovery
    CredentialBundle,
    ProcessCandidate,
    // Quota data
    ModelQuotaInfo,
    PaceStatus,
    PromptCreditsInfo,
    QuotaLevel,
    QuotaSnapshot,
    // Polling
    PollStatus,
    QuotaApiMethod,
};
