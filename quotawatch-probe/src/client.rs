//! Quota RPC client.
//!
//! Calls go to the connect port over HTTPS. When the peer answers the TLS
//! handshake in plain HTTP and the bundle declares an extension port, the call
//! is repeated once over HTTP on that port.

use std::sync::Arc;
use std::time::Duration;

use quotawatch_core::{CredentialBundle, QuotaApiMethod};
use quotawatch_fetch::{RpcRequest, RpcResponse, RpcTransport, Scheme, TransportError};
use tracing::{debug, instrument, warn};

use crate::client_info::ClientInfo;
use crate::error::QuotaError;
use crate::rpc::{QuotaResponse, ResponseCodePolicy, method_path, request_body};

/// Default timeout of a quota call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the two quota methods.
#[derive(Clone)]
pub struct QuotaClient {
    transport: Arc<dyn RpcTransport>,
    client_info: Arc<ClientInfo>,
    policy: ResponseCodePolicy,
    timeout: Duration,
}

impl QuotaClient {
    /// Creates a client with the default code policy and timeout.
    pub fn new(transport: Arc<dyn RpcTransport>, client_info: Arc<ClientInfo>) -> Self {
        Self {
            transport,
            client_info,
            policy: ResponseCodePolicy::default(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Replaces the success-code allow-list.
    #[must_use]
    pub fn with_policy(mut self, policy: ResponseCodePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Calls `method` and returns the parsed response.
    ///
    /// # Errors
    ///
    /// Returns `MissingCsrfToken` without sending anything when the bundle
    /// has no token, `Transport` when no response arrives, `HttpStatus` for
    /// any status but 200, `InvalidJson` for an unparseable body and
    /// `Application` for a non-success `code`.
    #[instrument(skip(self, bundle), fields(port = bundle.connect_port))]
    pub async fn call(
        &self,
        method: QuotaApiMethod,
        bundle: &CredentialBundle,
    ) -> Result<QuotaResponse, QuotaError> {
        if !bundle.has_token() {
            return Err(QuotaError::MissingCsrfToken);
        }

        let request = RpcRequest {
            scheme: Scheme::Https,
            port: bundle.connect_port,
            path: method_path(method).to_string(),
            csrf_token: bundle.csrf_token.clone(),
            body: request_body(method, &self.client_info),
            timeout: self.timeout,
        };

        let response = self.send_with_fallback(request, bundle.fallback_port()).await?;
        if !response.is_ok() {
            debug!(status = response.status, body = %response.text(), "Non-200 response");
            return Err(QuotaError::HttpStatus(response.status));
        }

        let parsed = QuotaResponse::parse(method, &response.body)?;
        if let Err(e) = self.policy.check(parsed.code(), parsed.message()) {
            warn!(
                code = ?parsed.code(),
                message = parsed.message().unwrap_or_default(),
                "API returned an error code"
            );
            return Err(e);
        }
        Ok(parsed)
    }

    async fn send_with_fallback(
        &self,
        request: RpcRequest,
        fallback_port: Option<u16>,
    ) -> Result<RpcResponse, TransportError> {
        match self.transport.post_json(request.clone()).await {
            Err(e) if e.is_protocol_mismatch() => match fallback_port {
                Some(port) => {
                    warn!(port, error = %e, "HTTPS rejected, retrying over HTTP");
                    self.transport
                        .post_json(request.redirected(Scheme::Http, port))
                        .await
                }
                None => Err(e),
            },
            other => other,
        }
    }
}

impl std::fmt::Debug for QuotaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaClient")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
