//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use quotawatch_core::{CredentialBundle, ModelQuotaInfo, PollStatus, QuotaApiMethod, QuotaSnapshot};
use quotawatch_probe::{ErrorMessages, QuotaError};
use serde::{Serialize, Serializer};

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for one fetch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOutput {
    pub method: QuotaApiMethod,
    #[serde(serialize_with = "serialize_datetime")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_credits: Option<CreditsOutput>,
    pub models: Vec<ModelOutput>,
}

/// Prompt credits.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsOutput {
    pub available: f64,
    pub monthly: f64,
    pub used_percentage: f64,
    pub remaining_percentage: f64,
}

/// One model.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutput {
    pub label: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_percentage: Option<f64>,
    pub is_exhausted: bool,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_datetime_opt")]
    pub reset_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_reset_ms: Option<i64>,
    pub time_until_reset_formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_pace_gap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace_status: Option<String>,
}

/// Discovery result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectOutput {
    pub found: bool,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
    pub tools: Vec<ToolOutput>,
}

/// Availability of one inspection command.
#[derive(Debug, Serialize)]
pub struct ToolOutput {
    pub name: String,
    pub found: bool,
}

/// One line of `watch --format json`.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WatchEvent {
    /// Fresh snapshot.
    Update {
        /// Snapshot.
        snapshot: SnapshotOutput,
    },
    /// Status change.
    Status {
        /// Status.
        status: PollStatus,
    },
    /// Failure reported to the user.
    Error {
        /// Error class.
        category: String,
        /// Message.
        message: String,
    },
}

// ============================================================================
// Serialization helpers
// ============================================================================

fn serialize_datetime<S>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&dt.to_rfc3339())
}

#[allow(clippy::ref_option)]
fn serialize_datetime_opt<S>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match dt {
        Some(dt) => s.serialize_str(&dt.to_rfc3339()),
        None => s.serialize_none(),
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
#[derive(Debug, Clone, Copy)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats a snapshot.
    pub fn format_snapshot(&self, snapshot: &QuotaSnapshot, method: QuotaApiMethod) -> Result<String> {
        self.format(&snapshot_to_output(snapshot, method))
    }

    /// Formats a successful discovery.
    pub fn format_bundle(
        &self,
        bundle: &CredentialBundle,
        platform: &str,
        tools: &[(String, bool)],
    ) -> Result<String> {
        self.format(&DetectOutput {
            found: true,
            platform: platform.to_string(),
            connect_port: Some(bundle.connect_port),
            extension_port: bundle.fallback_port(),
            csrf_token: Some(bundle.masked_token()),
            requirements: Vec::new(),
            tools: tools_to_output(tools),
        })
    }

    /// Formats a failed discovery.
    pub fn format_discovery_failure(
        &self,
        messages: &ErrorMessages,
        platform: &str,
        tools: &[(String, bool)],
    ) -> Result<String> {
        self.format(&DetectOutput {
            found: false,
            platform: platform.to_string(),
            connect_port: None,
            extension_port: None,
            csrf_token: None,
            requirements: messages.requirements.clone(),
            tools: tools_to_output(tools),
        })
    }

    /// Formats a watch event. Always compact, one event per line.
    pub fn format_event(event: &WatchEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }
}

/// Converts a snapshot to output.
pub fn snapshot_to_output(snapshot: &QuotaSnapshot, method: QuotaApiMethod) -> SnapshotOutput {
    SnapshotOutput {
        method,
        timestamp: snapshot.timestamp,
        plan_name: snapshot.plan_name.clone(),
        account_email: snapshot.account_email.clone(),
        prompt_credits: snapshot.prompt_credits.map(|c| CreditsOutput {
            available: c.available,
            monthly: c.monthly,
            used_percentage: c.used_percentage,
            remaining_percentage: c.remaining_percentage,
        }),
        models: snapshot.models.iter().map(model_to_output).collect(),
    }
}

fn model_to_output(model: &ModelQuotaInfo) -> ModelOutput {
    ModelOutput {
        label: model.label.clone(),
        model_id: model.model_id.clone(),
        remaining_fraction: model.remaining_fraction,
        remaining_percentage: model.remaining_percentage,
        is_exhausted: model.is_exhausted,
        reset_time: model.reset_time,
        time_until_reset_ms: model.time_until_reset.map(|d| d.num_milliseconds()),
        time_until_reset_formatted: model.time_until_reset_formatted.clone(),
        usage_pace_gap: model.usage_pace_gap,
        pace_status: model.pace_status.map(|p| p.label().to_string()),
    }
}

fn tools_to_output(tools: &[(String, bool)]) -> Vec<ToolOutput> {
    tools
        .iter()
        .map(|(name, found)| ToolOutput {
            name: name.clone(),
            found: *found,
        })
        .collect()
}

impl WatchEvent {
    /// Builds an error event.
    pub fn error(error: &QuotaError) -> Self {
        Self::Error {
            category: error.category().to_string(),
            message: error.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pretty() {
        let formatter = JsonFormatter::new(true);
        let data = serde_json::json!({"key": "value"});
        let output = formatter.format(&data).unwrap();
        assert!(output.contains('\n'));
    }

    #[test]
    fn test_format_compact() {
        let formatter = JsonFormatter::new(false);
        let data = serde_json::json!({"key": "value"});
        let output = formatter.format(&data).unwrap();
        assert!(!output.contains('\n'));
    }

    #[test]
    fn test_error_event() {
        let event = WatchEvent::error(&QuotaError::HttpStatus(403));
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter::format_event(&event).unwrap()).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["category"], "transport");
        assert_eq!(json["message"], "HTTP 403");
    }
}
