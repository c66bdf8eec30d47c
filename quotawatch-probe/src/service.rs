//! One quota fetch: RPC call followed by normalization.

use async_trait::async_trait;
use chrono::Utc;
use quotawatch_core::{CredentialBundle, QuotaApiMethod, QuotaSnapshot};
use tracing::instrument;

use crate::client::QuotaClient;
use crate::error::QuotaError;
use crate::normalizer::ResponseNormalizer;

/// Produces a snapshot for a method and bundle.
#[async_trait]
pub trait QuotaFetcher: Send + Sync {
    /// Fetches and normalizes one snapshot.
    async fn fetch(
        &self,
        method: QuotaApiMethod,
        bundle: &CredentialBundle,
    ) -> Result<QuotaSnapshot, QuotaError>;
}

/// [`QuotaFetcher`] combining [`QuotaClient`] and [`ResponseNormalizer`].
#[derive(Debug, Clone)]
pub struct QuotaService {
    client: QuotaClient,
    normalizer: ResponseNormalizer,
}

impl QuotaService {
    /// Creates a service.
    pub fn new(client: QuotaClient, normalizer: ResponseNormalizer) -> Self {
        Self { client, normalizer }
    }
}

#[async_trait]
impl QuotaFetcher for QuotaService {
    #[instrument(skip(self, bundle))]
    async fn fetch(
        &self,
        method: QuotaApiMethod,
        bundle: &CredentialBundle,
    ) -> Result<QuotaSnapshot, QuotaError> {
        let response = self.client.call(method, bundle).await?;
        self.normalizer.normalize(response, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use quotawatch_fetch::{RpcRequest, RpcResponse, RpcTransport, TransportError};

    use crate::client_info::ClientInfo;
    use crate::normalizer::NormalizeOptions;
    use crate::rpc::GET_COMMAND_MODEL_CONFIGS_PATH;

    struct FixedTransport(&'static str);

    #[async_trait]
    impl RpcTransport for FixedTransport {
        async fn post_json(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
            assert_eq!(request.path, GET_COMMAND_MODEL_CONFIGS_PATH);
            Ok(RpcResponse {
                status: 200,
                body: self.0.as_bytes().to_vec(),
            })
        }
    }

    fn service(body: &'static str) -> QuotaService {
        let client = QuotaClient::new(Arc::new(FixedTransport(body)), Arc::new(ClientInfo::detect()));
        QuotaService::new(client, ResponseNormalizer::new(NormalizeOptions::default()))
    }

    #[tokio::test]
    async fn test_fetch_normalizes_response() {
        let service = service(
            r#"{"clientModelConfigs": [{"label": "Gemini Pro (Low)", "quotaInfo": {"remainingFraction": 0.2}}, {"label": "No quota"}]}"#,
        );
        let bundle = CredentialBundle::new(0, 53412, "token");

        let snapshot = service.fetch(QuotaApiMethod::ModelConfig, &bundle).await.unwrap();

        assert_eq!(snapshot.models.len(), 1);
        assert_eq!(snapshot.models[0].label, "Gemini Pro (Low)");
    }

    #[tokio::test]
    async fn test_application_error_skips_normalizer() {
        let service = service(r#"{"code": "PERMISSION_DENIED", "clientModelConfigs": []}"#);
        let bundle = CredentialBundle::new(0, 53412, "token");

        let err = service.fetch(QuotaApiMethod::ModelConfig, &bundle).await.unwrap_err();

        assert!(matches!(err, QuotaError::Application { .. }));
    }
}
