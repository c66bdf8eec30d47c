//! Language-server RPC paths, request bodies and response shapes.

use std::collections::HashSet;
use std::fmt;

use quotawatch_core::QuotaApiMethod;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::client_info::ClientInfo;
use crate::error::QuotaError;

// ============================================================================
// Paths
// ============================================================================

/// `GetUserStatus` path.
pub const GET_USER_STATUS_PATH: &str =
    "/exa.language_server_pb.LanguageServerService/GetUserStatus";

/// `GetCommandModelConfigs` path.
pub const GET_COMMAND_MODEL_CONFIGS_PATH: &str =
    "/exa.language_server_pb.LanguageServerService/GetCommandModelConfigs";

/// `GetUnleashData` path, reachable without a signed-in user.
pub const GET_UNLEASH_DATA_PATH: &str =
    "/exa.language_server_pb.LanguageServerService/GetUnleashData";

/// Returns the RPC path for a method.
pub fn method_path(method: QuotaApiMethod) -> &'static str {
    match method {
        QuotaApiMethod::UserStatus => GET_USER_STATUS_PATH,
        QuotaApiMethod::ModelConfig => GET_COMMAND_MODEL_CONFIGS_PATH,
    }
}

/// Builds the request body for a method.
///
/// Both methods currently take only the client metadata.
pub fn request_body(method: QuotaApiMethod, client: &ClientInfo) -> Value {
    match method {
        QuotaApiMethod::UserStatus | QuotaApiMethod::ModelConfig => {
            json!({ "metadata": client.metadata() })
        }
    }
}

// ============================================================================
// Response code policy
// ============================================================================

/// Application-level `code` value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CodeValue {
    /// Numeric code.
    Int(i64),
    /// Text code.
    String(String),
}

impl fmt::Display for CodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Allow-list of `code` values that mean success.
///
/// Text codes are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCodePolicy {
    numeric: HashSet<i64>,
    text: HashSet<String>,
}

impl ResponseCodePolicy {
    /// Creates a policy from explicit values.
    pub fn new(
        numeric: impl IntoIterator<Item = i64>,
        text: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            numeric: numeric.into_iter().collect(),
            text: text
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Returns true if `code` is a success value. An absent code is success.
    pub fn is_success(&self, code: Option<&CodeValue>) -> bool {
        match code {
            None => true,
            Some(CodeValue::Int(v)) => self.numeric.contains(v),
            Some(CodeValue::String(s)) => self.text.contains(&s.trim().to_ascii_lowercase()),
        }
    }

    /// Fails with [`QuotaError::Application`] on a non-success code.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check(&self, code: Option<&CodeValue>, message: Option<&str>) -> Result<(), QuotaError> {
        if self.is_success(code) {
            return Ok(());
        }
        Err(QuotaError::Application {
            code: code.map(ToString::to_string).unwrap_or_default(),
            message: message.map(str::to_string),
        })
    }
}

impl Default for ResponseCodePolicy {
    fn default() -> Self {
        Self::new([0], ["0", "OK", "SUCCESS"])
    }
}

// ============================================================================
// Response shapes
// ============================================================================

/// A parsed response, tagged by the method that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum QuotaResponse {
    /// `GetUserStatus` response.
    UserStatus(UserStatusResponse),
    /// `GetCommandModelConfigs` response.
    ModelConfig(ModelConfigResponse),
}

impl QuotaResponse {
    /// Parses `body` as the shape of `method`.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::InvalidJson`] if the body does not parse.
    pub fn parse(method: QuotaApiMethod, body: &[u8]) -> Result<Self, QuotaError> {
        let invalid = |e: serde_json::Error| QuotaError::InvalidJson(e.to_string());
        Ok(match method {
            QuotaApiMethod::UserStatus => Self::UserStatus(serde_json::from_slice(body).map_err(invalid)?),
            QuotaApiMethod::ModelConfig => Self::ModelConfig(serde_json::from_slice(body).map_err(invalid)?),
        })
    }

    /// Returns the embedded `code`.
    pub fn code(&self) -> Option<&CodeValue> {
        match self {
            Self::UserStatus(r) => r.code.as_ref(),
            Self::ModelConfig(r) => r.code.as_ref(),
        }
    }

    /// Returns the embedded `message`.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::UserStatus(r) => r.message.as_deref(),
            Self::ModelConfig(r) => r.message.as_deref(),
        }
    }
}

/// `GetUserStatus` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusResponse {
    /// Application code.
    pub code: Option<CodeValue>,
    /// Application message.
    pub message: Option<String>,
    /// Status object; required by the normalizer.
    pub user_status: Option<UserStatus>,
}

/// `GetCommandModelConfigs` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfigResponse {
    /// Application code.
    pub code: Option<CodeValue>,
    /// Application message.
    pub message: Option<String>,
    /// Model entries.
    #[serde(default)]
    pub client_model_configs: Vec<ModelConfig>,
}

/// Signed-in user status.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    /// Display name.
    pub name: Option<String>,
    /// Account e-mail.
    pub email: Option<String>,
    /// Plan and credit balance.
    pub plan_status: Option<PlanStatus>,
    /// Model entries.
    pub cascade_model_config_data: Option<ModelConfigData>,
}

/// Plan status with credit balance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatus {
    /// Plan description.
    pub plan_info: Option<PlanInfo>,
    /// Prompt credits left.
    pub available_prompt_credits: Option<FlexibleNumber>,
    /// Flow credits left.
    pub available_flow_credits: Option<FlexibleNumber>,
}

/// Plan description.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    /// Internal plan name.
    pub plan_name: Option<String>,
    /// Display name of the plan.
    pub plan_display_name: Option<String>,
    /// Generic display name.
    pub display_name: Option<String>,
    /// Product name.
    pub product_name: Option<String>,
    /// Teams tier.
    pub teams_tier: Option<String>,
    /// Monthly prompt credit allowance.
    pub monthly_prompt_credits: Option<FlexibleNumber>,
    /// Monthly flow credit allowance.
    pub monthly_flow_credits: Option<FlexibleNumber>,
}

impl PlanInfo {
    /// Returns the most user-facing non-empty name.
    pub fn preferred_name(&self) -> Option<&str> {
        [
            &self.plan_display_name,
            &self.display_name,
            &self.product_name,
            &self.plan_name,
        ]
        .into_iter()
        .filter_map(|name| name.as_deref())
        .map(str::trim)
        .find(|name| !name.is_empty())
    }
}

/// Container of model entries inside the user status.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfigData {
    /// Model entries.
    #[serde(default)]
    pub client_model_configs: Vec<ModelConfig>,
}

/// One model entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Model identifier wrapper.
    pub model_or_alias: Option<ModelAlias>,
    /// Quota; entries without it are skipped.
    pub quota_info: Option<QuotaInfo>,
}

impl ModelConfig {
    /// Returns the model identifier, or an empty string.
    pub fn model_id(&self) -> &str {
        self.model_or_alias
            .as_ref()
            .and_then(|m| m.model.as_deref())
            .unwrap_or_default()
    }
}

/// Model identifier wrapper.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelAlias {
    /// Model identifier.
    pub model: Option<String>,
}

/// Quota of one model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
    /// Remaining share in `[0, 1]`; absent when exhausted.
    pub remaining_fraction: Option<f64>,
    /// Reset instant as RFC 3339 or Unix seconds.
    pub reset_time: Option<FlexibleString>,
}

// ============================================================================
// Lenient scalars
// ============================================================================

/// A number that may arrive as a JSON number or a decimal string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlexibleNumber(pub f64);

impl<'de> Deserialize<'de> for FlexibleNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| serde::de::Error::custom(format!("invalid number: {s:?}"))),
        }
    }
}

/// A string that may arrive as a JSON string or number.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexibleString(pub String);

impl<'de> Deserialize<'de> for FlexibleString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_service_prefix() {
        for path in [GET_USER_STATUS_PATH, GET_COMMAND_MODEL_CONFIGS_PATH, GET_UNLEASH_DATA_PATH] {
            assert!(path.starts_with("/exa.language_server_pb.LanguageServerService/"));
        }
        assert_eq!(method_path(QuotaApiMethod::ModelConfig), GET_COMMAND_MODEL_CONFIGS_PATH);
    }

    #[test]
    fn test_request_body_carries_metadata() {
        let client = ClientInfo::detect();
        for method in QuotaApiMethod::ALL {
            let body = request_body(method, &client);
            assert_eq!(body["metadata"]["ideName"], "antigravity");
            assert_eq!(body["metadata"]["locale"], "en");
        }
    }

    #[test]
    fn test_default_code_policy() {
        let policy = ResponseCodePolicy::default();
        assert!(policy.is_success(None));
        assert!(policy.is_success(Some(&CodeValue::Int(0))));
        assert!(policy.is_success(Some(&CodeValue::String("0".into()))));
        assert!(policy.is_success(Some(&CodeValue::String("ok".into()))));
        assert!(policy.is_success(Some(&CodeValue::String("Success".into()))));
        assert!(!policy.is_success(Some(&CodeValue::Int(7))));
        assert!(!policy.is_success(Some(&CodeValue::String("unauthenticated".into()))));
    }

    #[test]
    fn test_custom_code_policy() {
        let policy = ResponseCodePolicy::new([0, 200], ["done"]);
        assert!(policy.is_success(Some(&CodeValue::Int(200))));
        assert!(policy.is_success(Some(&CodeValue::String("DONE".into()))));
        assert!(!policy.is_success(Some(&CodeValue::String("OK".into()))));
    }

    #[test]
    fn test_check_reports_code_and_message() {
        let err = ResponseCodePolicy::default()
            .check(Some(&CodeValue::Int(16)), Some("unauthenticated"))
            .unwrap_err();
        assert_eq!(
            err,
            QuotaError::Application {
                code: "16".into(),
                message: Some("unauthenticated".into())
            }
        );
    }

    #[test]
    fn test_preferred_plan_name() {
        let info = PlanInfo {
            plan_name: Some("g1-pro".into()),
            plan_display_name: Some("  ".into()),
            display_name: None,
            product_name: Some("Google AI Pro".into()),
            ..PlanInfo::default()
        };
        assert_eq!(info.preferred_name(), Some("Google AI Pro"));
        assert_eq!(PlanInfo::default().preferred_name(), None);
    }

    #[test]
    fn test_flexible_number() {
        let status: PlanStatus = serde_json::from_str(
            r#"{"availablePromptCredits": "500", "planInfo": {"monthlyPromptCredits": 1000}}"#,
        )
        .unwrap();
        assert_eq!(status.available_prompt_credits, Some(FlexibleNumber(500.0)));
        assert_eq!(
            status.plan_info.unwrap().monthly_prompt_credits,
            Some(FlexibleNumber(1000.0))
        );
        assert!(serde_json::from_str::<FlexibleNumber>(r#""lots""#).is_err());
    }

    #[test]
    fn test_parse_tags_by_method() {
        let body = br#"{"clientModelConfigs": []}"#;
        let parsed = QuotaResponse::parse(QuotaApiMethod::ModelConfig, body).unwrap();
        assert!(matches!(parsed, QuotaResponse::ModelConfig(_)));

        let err = QuotaResponse::parse(QuotaApiMethod::UserStatus, b"<html>").unwrap_err();
        assert!(matches!(err, QuotaError::InvalidJson(_)));
    }
}
