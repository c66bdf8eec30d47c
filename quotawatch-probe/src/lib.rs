// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Probe
//!
//! Discovery of the local language server and polling of its quota API.
//!
//! ## Pipeline
//!
//! 1. [`PlatformDetector`] picks the [`PlatformStrategy`] and binary name for
//!    the running OS.
//! 2. [`CredentialDiscovery`] lists processes, selects the target one, lists
//!    its listening ports and probes them in order until one answers.
//! 3. [`QuotaClient`] calls `GetUserStatus` or `GetCommandModelConfigs` over
//!    HTTPS, falling back to plain HTTP on a protocol mismatch.
//! 4. [`ResponseNormalizer`] turns the response into a
//!    [`quotawatch_core::QuotaSnapshot`].
//! 5. [`PollingEngine`] repeats 3 and 4 on a timer with a bounded retry
//!    ladder and reports to its observers.
//!
//! ## Platforms
//!
//! | Platform | Processes | Ports | Fallback |
//! |----------|-----------|-------|----------|
//! | Windows | WMIC | `netstat -ano` | PowerShell `Get-CimInstance` |
//! | macOS | `ps` | `lsof` | none |
//! | Linux | `ps` | `lsof` | `ss -tlnp` |
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use quotawatch_probe::{ClientInfo, CredentialDiscovery, PlatformDetector};
//! use quotawatch_fetch::{LocalRpcTransport, ProcessRunner};
//!
//! let client_info = Arc::new(ClientInfo::detect());
//! let transport = Arc::new(LocalRpcTransport::new()?);
//! let detector = PlatformDetector::new()?;
//! let mut discovery = CredentialDiscovery::new(
//!     &detector,
//!     Arc::new(ProcessRunner::new()),
//!     transport,
//!     client_info,
//! );
//! let bundle = discovery.discover_with_defaults().await?;
//! ```

pub mod client;
pub mod client_info;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod normalizer;
pub mod platform;
pub mod rpc;
pub mod service;

// Re-export error types
pub use error::{DiscoveryError, EngineError, ErrorCategory, QuotaError};

// Discovery
pub use client_info::ClientInfo;
pub use discovery::{CredentialDiscovery, DiscoveryOptions};
pub use platform::{
    CommandStage, ErrorMessages, Platform, PlatformDetector, PlatformStrategy, ShellCommand,
};

// Quota fetching
pub use client::QuotaClient;
pub use normalizer::{NormalizeOptions, PaceConfig, ResponseNormalizer};
pub use rpc::{QuotaResponse, ResponseCodePolicy};
pub use service::{QuotaFetcher, QuotaService};

// Polling
pub use engine::{EngineStatus, PollingEngine, PollingState};
