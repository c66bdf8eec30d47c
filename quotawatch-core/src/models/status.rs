//! Polling-related enums.
//!
//! - [`QuotaApiMethod`] - Which RPC method provides quota data
//! - [`PollStatus`] - Transient status reported while polling

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// Quota API Method
// ============================================================================

/// RPC method used to fetch quota data.
///
/// The two methods live on different paths and answer with different
/// response shapes. Only `UserStatus` carries plan and prompt credit data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QuotaApiMethod {
    /// `GetUserStatus`: plan, prompt credits and per-model quotas.
    #[default]
    #[serde(rename = "GET_USER_STATUS")]
    UserStatus,
    /// `GetCommandModelConfigs`: per-model quotas only.
    #[serde(rename = "COMMAND_MODEL_CONFIG")]
    ModelConfig,
}

impl QuotaApiMethod {
    /// All methods, in preference order.
    pub const ALL: [Self; 2] = [Self::UserStatus, Self::ModelConfig];

    /// Returns the configuration key for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserStatus => "GET_USER_STATUS",
            Self::ModelConfig => "COMMAND_MODEL_CONFIG",
        }
    }

    /// Returns true if responses of this method can carry plan data.
    pub fn has_plan_data(&self) -> bool {
        matches!(self, Self::UserStatus)
    }
}

impl fmt::Display for QuotaApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaApiMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "get-user-status" | "user-status" | "userstatus" => Ok(Self::UserStatus),
            "command-model-config" | "model-config" | "modelconfig" => Ok(Self::ModelConfig),
            _ => Err(CoreError::UnknownVariant {
                kind: "API method",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Poll Status
// ============================================================================

/// Transient status reported to the status observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollStatus {
    /// A fetch is in flight.
    Fetching,
    /// A failed fetch will be retried.
    Retrying {
        /// Which retry this is, starting at 1.
        retry_count: u32,
        /// Retry budget.
        max_retries: u32,
    },
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetching => f.write_str("fetching"),
            Self::Retrying {
                retry_count,
                max_retries,
            } => write!(f, "retrying ({retry_count}/{max_retries})"),
        }
    }
}
