//! JSON-RPC transport to a server on the loopback interface.
//!
//! The language server serves its API over HTTPS with a self-generated
//! certificate, so certificate verification is disabled. Requests carry the
//! Connect protocol header and a CSRF token header.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::TransportError;

/// Header carrying the CSRF token.
pub const CSRF_HEADER: &str = "X-Codeium-Csrf-Token";

/// Connect protocol version header.
const CONNECT_PROTOCOL_HEADER: &str = "Connect-Protocol-Version";

/// Loopback host every request targets.
const LOOPBACK_HOST: &str = "127.0.0.1";

/// Error fragments that mean a TLS client reached a plain HTTP server.
const PROTOCOL_MISMATCH_MARKERS: &[&str] = &[
    "wrong version number",
    "invalidcontenttype",
    "invalid content type",
    "corrupt message",
    "eproto",
    "http request to an https server",
];

// ============================================================================
// Request / Response
// ============================================================================

/// URL scheme of an RPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTPS without certificate verification.
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Https => "https",
        })
    }
}

/// A single POST to the loopback server.
#[derive(Clone)]
pub struct RpcRequest {
    /// Scheme to use.
    pub scheme: Scheme,
    /// Target port on `127.0.0.1`.
    pub port: u16,
    /// Absolute request path.
    pub path: String,
    /// CSRF header value.
    pub csrf_token: String,
    /// JSON body.
    pub body: Value,
    /// Total request timeout.
    pub timeout: Duration,
}

impl RpcRequest {
    /// Returns the full URL of this request.
    pub fn url(&self) -> String {
        format!("{}://{LOOPBACK_HOST}:{}{}", self.scheme, self.port, self.path)
    }

    /// Returns a copy aimed at another scheme and port.
    #[must_use]
    pub fn redirected(&self, scheme: Scheme, port: u16) -> Self {
        Self {
            scheme,
            port,
            ..self.clone()
        }
    }
}

impl fmt::Debug for RpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcRequest")
            .field("url", &self.url())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Raw response of an RPC call.
#[derive(Debug, Clone)]
pub struct RpcResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl RpcResponse {
    /// Returns true for HTTP 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Sends JSON-RPC requests to the local server.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Posts `request.body` and returns the status and raw body.
    ///
    /// Any HTTP status is a successful transport result; only failures to
    /// obtain a response are errors.
    async fn post_json(&self, request: RpcRequest) -> Result<RpcResponse, TransportError>;
}

/// [`RpcTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct LocalRpcTransport {
    inner: Client,
}

impl LocalRpcTransport {
    /// Creates a transport that accepts the server's self-signed certificate.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, TransportError> {
        let inner = Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl RpcTransport for LocalRpcTransport {
    #[instrument(skip(self, request), fields(scheme = %request.scheme, port = request.port, path = %request.path))]
    async fn post_json(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
        debug!("POST request with JSON");

        let response = self
            .inner
            .post(request.url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(CONNECT_PROTOCOL_HEADER, "1")
            .header(CSRF_HEADER, &request.csrf_token)
            .timeout(request.timeout)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| classify(&e, request.timeout))?;

        let status = response.status().as_u16();
        debug!(status, "Response received");

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else {
                TransportError::Body(error_chain(&e))
            }
        })?;

        Ok(RpcResponse {
            status,
            body: body.to_vec(),
        })
    }
}

// ============================================================================
// Error classification
// ============================================================================

fn classify(err: &reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(timeout);
    }

    let message = error_chain(err);
    // Handshake failures also report is_connect(), so test the text first.
    if is_protocol_mismatch(&message) {
        TransportError::ProtocolMismatch(message)
    } else if err.is_connect() {
        TransportError::Connect(message)
    } else {
        TransportError::Request(message)
    }
}

/// Returns true if an error message describes TLS talking to plain HTTP.
pub fn is_protocol_mismatch(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    PROTOCOL_MISMATCH_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Joins an error and all of its sources into one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

// ============================================================================
// Tests
// ============================================================================
