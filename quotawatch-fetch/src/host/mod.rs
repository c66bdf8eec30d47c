//! Host APIs for `QuotaWatch`.
//!
//! This module provides abstractions for interacting with the local system:
//!
//! - [`process`] - Subprocess execution with timeouts
//! - [`http`] - JSON-RPC calls to a loopback server

pub mod http;
pub mod process;

// Re-export key types
pub use http::{LocalRpcTransport, RpcRequest, RpcResponse, RpcTransport, Scheme};
pub use process::{CommandRunner, ProcessOutput, ProcessRunner};
