//! Quota data types.
//!
//! This module contains the normalized result of a quota fetch:
//! - [`QuotaSnapshot`] - One successful fetch
//! - [`ModelQuotaInfo`] - Per-model quota with derived fields
//! - [`PromptCreditsInfo`] - Monthly prompt credits
//! - [`PaceStatus`] - Usage pace classification
//! - [`QuotaLevel`] - Severity of a remaining percentage

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Quota Snapshot
// ============================================================================

/// Normalized quota data from one successful fetch.
///
/// A snapshot is built fresh for every fetch and handed to observers by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// When the snapshot was produced.
    pub timestamp: DateTime<Utc>,
    /// Prompt credits, present only when a positive monthly figure was reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_credits: Option<PromptCreditsInfo>,
    /// Per-model quotas in response order.
    #[serde(default)]
    pub models: Vec<ModelQuotaInfo>,
    /// Subscription plan name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    /// Account e-mail reported alongside the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
}

impl QuotaSnapshot {
    /// Creates an empty snapshot taken at `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            prompt_credits: None,
            models: Vec::new(),
            plan_name: None,
            account_email: None,
        }
    }

    /// Returns true if the snapshot carries neither models nor credits.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.prompt_credits.is_none()
    }

    /// Returns the model with the lowest remaining percentage.
    ///
    /// Exhausted models without a fraction count as zero.
    pub fn most_constrained(&self) -> Option<&ModelQuotaInfo> {
        self.models.iter().min_by(|a, b| {
            a.remaining_or_zero()
                .partial_cmp(&b.remaining_or_zero())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Returns the number of exhausted models.
    pub fn exhausted_count(&self) -> usize {
        self.models.iter().filter(|m| m.is_exhausted).count()
    }
}

// ============================================================================
// Model Quota
// ============================================================================

/// Quota for a single model.
///
/// `is_exhausted` is true exactly when `remaining_fraction` is absent or zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelQuotaInfo {
    /// Display label, e.g. "Gemini 3 Pro (High)".
    pub label: String,
    /// Model identifier, e.g. `MODEL_PLACEHOLDER_M7`.
    pub model_id: String,
    /// Remaining share of the quota in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_fraction: Option<f64>,
    /// `remaining_fraction * 100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_percentage: Option<f64>,
    /// True when nothing is left.
    pub is_exhausted: bool,
    /// When the quota resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
    /// Time left until the reset, relative to the snapshot timestamp.
    #[serde(
        default,
        rename = "time_until_reset_ms",
        with = "duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_until_reset: Option<Duration>,
    /// Human-readable countdown, e.g. "1h 0m from now".
    pub time_until_reset_formatted: String,
    /// Ideal used percentage minus actual used percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_pace_gap: Option<f64>,
    /// Pace classification of `usage_pace_gap`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace_status: Option<PaceStatus>,
}

impl ModelQuotaInfo {
    /// Returns the used percentage (`100 - remaining`), if known.
    pub fn used_percentage(&self) -> Option<f64> {
        self.remaining_percentage.map(|r| 100.0 - r)
    }

    /// Returns the quota level for the given thresholds.
    pub fn level(&self, warning: f64, critical: f64) -> QuotaLevel {
        QuotaLevel::from_remaining(self.remaining_or_zero(), warning, critical)
    }

    fn remaining_or_zero(&self) -> f64 {
        self.remaining_percentage.unwrap_or(0.0)
    }
}

// ============================================================================
// Prompt Credits
// ============================================================================

/// Monthly prompt credit balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptCreditsInfo {
    /// Credits still available.
    pub available: f64,
    /// Monthly allowance.
    pub monthly: f64,
    /// `(monthly - available) / monthly * 100`.
    pub used_percentage: f64,
    /// `available / monthly * 100`.
    pub remaining_percentage: f64,
}

impl PromptCreditsInfo {
    /// Derives the percentages from raw counts.
    ///
    /// Returns `None` unless `monthly` is positive.
    pub fn from_counts(available: f64, monthly: f64) -> Option<Self> {
        if !monthly.is_finite() || monthly <= 0.0 {
            return None;
        }
        Some(Self {
            available,
            monthly,
            used_percentage: (monthly - available) / monthly * 100.0,
            remaining_percentage: available / monthly * 100.0,
        })
    }
}

// ============================================================================
// Pace Status
// ============================================================================

/// How actual usage compares with an even spend across the quota cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaceStatus {
    /// Used more than the ideal share by more than the margin.
    Ahead,
    /// Within the margin of the ideal share.
    OnTrack,
    /// Below the ideal share by at least the warning gap.
    Behind,
    /// Below the ideal share by at least the critical gap.
    Critical,
}

impl PaceStatus {
    /// Returns a short label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ahead => "ahead",
            Self::OnTrack => "on track",
            Self::Behind => "behind",
            Self::Critical => "critical",
        }
    }
}

// ============================================================================
// Quota Level
// ============================================================================

/// Severity of a remaining percentage against warning/critical thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaLevel {
    /// Above the warning threshold.
    Normal,
    /// At or below the warning threshold.
    Warning,
    /// At or below the critical threshold.
    Critical,
    /// Nothing left.
    Depleted,
}

impl QuotaLevel {
    /// Classifies `remaining` (percent).
    pub fn from_remaining(remaining: f64, warning: f64, critical: f64) -> Self {
        if remaining <= 0.0 {
            Self::Depleted
        } else if remaining <= critical {
            Self::Critical
        } else if remaining <= warning {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Returns an emoji for the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Normal => "🟢",
            Self::Warning => "🟡",
            Self::Critical => "🔴",
            Self::Depleted => "⚫",
        }
    }
}

// ============================================================================
// Serde helpers
// ============================================================================

mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.num_milliseconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<i64>::deserialize(d)?.map(Duration::milliseconds))
    }
}
