//! Identity of this client as reported to the language server.
//!
//! Built once at startup and shared as `Arc<ClientInfo>`.

use serde_json::{Value, json};

/// Name the language server expects for the IDE and extension.
const IDE_NAME: &str = "antigravity";

/// IDE version sent when the real one is unknown.
const DEFAULT_IDE_VERSION: &str = "1.11.2";

/// Client identity fields used in request metadata and the liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Extension name.
    pub extension_name: String,
    /// Extension version.
    pub extension_version: String,
    /// IDE name.
    pub ide_name: String,
    /// IDE version.
    pub ide_version: String,
    /// Operating system (`windows`, `darwin`, `linux`).
    pub os: String,
    /// Locale tag.
    pub locale: String,
    /// Installation identifier sent with the probe.
    pub installation_id: String,
}

impl ClientInfo {
    /// Builds the identity for the running process.
    pub fn detect() -> Self {
        Self {
            extension_name: IDE_NAME.to_string(),
            extension_version: env!("CARGO_PKG_VERSION").to_string(),
            ide_name: IDE_NAME.to_string(),
            ide_version: DEFAULT_IDE_VERSION.to_string(),
            os: os_label(std::env::consts::OS).to_string(),
            locale: "en".to_string(),
            installation_id: "quotawatch".to_string(),
        }
    }

    /// Overrides the IDE version.
    #[must_use]
    pub fn with_ide_version(mut self, version: impl Into<String>) -> Self {
        self.ide_version = version.into();
        self
    }

    /// Request metadata for quota RPC calls.
    pub fn metadata(&self) -> Value {
        json!({
            "ideName": self.ide_name,
            "extensionName": self.extension_name,
            "ideVersion": self.ide_version,
            "locale": self.locale,
        })
    }

    /// Body of the `GetUnleashData` liveness probe.
    pub fn probe_body(&self) -> Value {
        json!({
            "context": {
                "properties": {
                    "devMode": "false",
                    "extensionVersion": self.extension_version,
                    "hasAnthropicModelAccess": "true",
                    "ide": self.ide_name,
                    "ideVersion": self.ide_version,
                    "installationId": self.installation_id,
                    "language": "UNSPECIFIED",
                    "os": self.os,
                    "requestedModelId": "MODEL_UNSPECIFIED",
                }
            }
        })
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::detect()
    }
}

fn os_label(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}
