// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Fetch
//!
//! Host APIs used by discovery and polling.
//!
//! ## Host APIs
//!
//! The [`host`] module provides abstractions for system interactions:
//!
//! - [`host::process`] - Subprocess execution with a hard timeout, behind the
//!   [`CommandRunner`] trait so parsers and discovery can be tested with
//!   scripted output
//! - [`host::http`] - POSTs JSON to `127.0.0.1` over HTTPS (certificate checks
//!   off) or plain HTTP, behind the [`RpcTransport`] trait
//!
//! ## Retry
//!
//! [`RetryPolicy`] describes the bounded, fixed-delay retry ladder used by the
//! polling engine.

pub mod error;
pub mod host;
pub mod retry;

// Errors
pub use error::{ProcessError, TransportError};

// Host APIs
pub use host::{
    http::{CSRF_HEADER, LocalRpcTransport, RpcRequest, RpcResponse, RpcTransport, Scheme},
    process::{CommandRunner, ProcessOutput, ProcessRunner},
};

// Retry
pub use retry::RetryPolicy;
