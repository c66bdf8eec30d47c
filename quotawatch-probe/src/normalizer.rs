//! Maps raw quota responses onto [`QuotaSnapshot`].

use chrono::{DateTime, Duration, Utc};
use quotawatch_core::{ModelQuotaInfo, PaceStatus, PromptCreditsInfo, QuotaSnapshot};
use tracing::debug;

use crate::error::QuotaError;
use crate::rpc::{
    ModelConfig, ModelConfigResponse, PlanStatus, QuotaResponse, UserStatusResponse,
};

/// Countdown text for a missing or unparseable reset time.
pub const UNKNOWN_COUNTDOWN: &str = "unknown";

/// Countdown text for a reset time in the past.
pub const EXPIRED_COUNTDOWN: &str = "expired";

// ============================================================================
// Options
// ============================================================================

/// Usage-pace thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaceConfig {
    /// Length of one quota cycle, ending at the reset time.
    pub cycle: Duration,
    /// Gap at or above which usage is `Behind`.
    pub warning_gap: f64,
    /// Gap at or above which usage is `Critical`.
    pub critical_gap: f64,
    /// Negative gap beyond which usage is `Ahead`.
    pub on_track_margin: f64,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            cycle: Duration::minutes(300),
            warning_gap: 15.0,
            critical_gap: 30.0,
            on_track_margin: 5.0,
        }
    }
}

impl PaceConfig {
    /// Classifies a gap of ideal minus actual used percentage.
    pub fn classify(&self, gap: f64) -> PaceStatus {
        if gap < -self.on_track_margin {
            PaceStatus::Ahead
        } else if gap >= self.critical_gap {
            PaceStatus::Critical
        } else if gap >= self.warning_gap {
            PaceStatus::Behind
        } else {
            PaceStatus::OnTrack
        }
    }

    /// Returns the gap for `remaining_percentage` with `time_until_reset` left.
    ///
    /// Elapsed time is clamped into the cycle.
    pub fn gap(&self, remaining_percentage: f64, time_until_reset: Duration) -> Option<f64> {
        let cycle = self.cycle.to_std().ok().filter(|c| !c.is_zero())?;
        // A reset already in the past counts as a fully elapsed cycle.
        let until = time_until_reset.to_std().unwrap_or_default();
        let elapsed = cycle.saturating_sub(until);
        let ideal_used = elapsed.as_secs_f64() / cycle.as_secs_f64() * 100.0;
        let actual_used = 100.0 - remaining_percentage;
        Some(ideal_used - actual_used)
    }
}

/// Normalizer options.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizeOptions {
    /// Usage-pace tracking; `None` disables it.
    pub pace: Option<PaceConfig>,
}

// ============================================================================
// Normalizer
// ============================================================================

/// Turns parsed responses into snapshots.
#[derive(Debug, Clone, Default)]
pub struct ResponseNormalizer {
    options: NormalizeOptions,
}

impl ResponseNormalizer {
    /// Creates a normalizer.
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Maps a response taken at `now`.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for a user-status response without its status
    /// object.
    pub fn normalize(
        &self,
        response: QuotaResponse,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, QuotaError> {
        match response {
            QuotaResponse::UserStatus(r) => self.map_user_status(r, now),
            QuotaResponse::ModelConfig(r) => Ok(self.map_model_config(r, now)),
        }
    }

    /// Maps a `GetUserStatus` response.
    ///
    /// # Errors
    ///
    /// Returns `MissingField("userStatus")` when the status object is absent.
    pub fn map_user_status(
        &self,
        response: UserStatusResponse,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, QuotaError> {
        let status = response
            .user_status
            .ok_or(QuotaError::MissingField("userStatus"))?;

        let mut snapshot = QuotaSnapshot::new(now);
        snapshot.account_email = status.email.filter(|e| !e.trim().is_empty());

        if let Some(plan) = &status.plan_status {
            snapshot.prompt_credits = prompt_credits(plan);
            snapshot.plan_name = plan
                .plan_info
                .as_ref()
                .and_then(|info| info.preferred_name())
                .map(str::to_string);
        }

        let configs = status
            .cascade_model_config_data
            .map(|data| data.client_model_configs)
            .unwrap_or_default();
        snapshot.models = self.map_models(&configs, now);

        debug!(
            models = snapshot.models.len(),
            has_credits = snapshot.prompt_credits.is_some(),
            "Normalized user status"
        );
        Ok(snapshot)
    }

    /// Maps a `GetCommandModelConfigs` response. Plan and credits stay empty.
    pub fn map_model_config(
        &self,
        response: ModelConfigResponse,
        now: DateTime<Utc>,
    ) -> QuotaSnapshot {
        let mut snapshot = QuotaSnapshot::new(now);
        snapshot.models = self.map_models(&response.client_model_configs, now);
        debug!(models = snapshot.models.len(), "Normalized model configs");
        snapshot
    }

    fn map_models(&self, configs: &[ModelConfig], now: DateTime<Utc>) -> Vec<ModelQuotaInfo> {
        configs
            .iter()
            .filter_map(|config| self.map_model(config, now))
            .collect()
    }

    /// Derives one model's quota. Entries without quota info yield `None`.
    fn map_model(&self, config: &ModelConfig, now: DateTime<Utc>) -> Option<ModelQuotaInfo> {
        let quota = config.quota_info.as_ref()?;

        let remaining_fraction = quota.remaining_fraction;
        let remaining_percentage = remaining_fraction.map(|f| f * 100.0);
        let is_exhausted = remaining_fraction.is_none_or(|f| f == 0.0);

        let reset_time = quota
            .reset_time
            .as_ref()
            .and_then(|raw| parse_reset_time(&raw.0));
        if quota.reset_time.is_some() && reset_time.is_none() {
            debug!(label = %config.label, "Unparseable reset time");
        }
        let time_until_reset = reset_time.map(|reset| reset - now);

        let (usage_pace_gap, pace_status) =
            match (self.options.pace, remaining_percentage, time_until_reset) {
                (Some(pace), Some(remaining), Some(until)) => match pace.gap(remaining, until) {
                    Some(gap) => (Some(gap), Some(pace.classify(gap))),
                    None => (None, None),
                },
                _ => (None, None),
            };

        Some(ModelQuotaInfo {
            label: config.label.clone(),
            model_id: config.model_id().to_string(),
            remaining_fraction,
            remaining_percentage,
            is_exhausted,
            reset_time,
            time_until_reset,
            time_until_reset_formatted: time_until_reset
                .map_or_else(|| UNKNOWN_COUNTDOWN.to_string(), format_countdown),
            usage_pace_gap,
            pace_status,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Derives prompt credits when both counts are present and the allowance is
/// positive.
fn prompt_credits(plan: &PlanStatus) -> Option<PromptCreditsInfo> {
    let monthly = plan.plan_info.as_ref()?.monthly_prompt_credits?.0;
    let available = plan.available_prompt_credits?.0;
    PromptCreditsInfo::from_counts(available, monthly)
}

/// Parses an RFC 3339 instant or Unix seconds.
pub fn parse_reset_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Formats a countdown with its two largest units.
///
/// ```
/// use chrono::Duration;
/// use quotawatch_probe::normalizer::format_countdown;
///
/// assert_eq!(format_countdown(Duration::minutes(90)), "1h 30m from now");
/// assert_eq!(format_countdown(Duration::zero()), "expired");
/// ```
pub fn format_countdown(remaining: Duration) -> String {
    if remaining <= Duration::zero() {
        return EXPIRED_COUNTDOWN.to_string();
    }

    let total_secs = remaining.num_seconds();
    let days = total_secs / 86_400;
    let hours = total_secs % 86_400 / 3_600;
    let minutes = total_secs % 3_600 / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{days}d {hours}h from now")
    } else if hours > 0 {
        format!("{hours}h {minutes}m from now")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s from now")
    } else {
        format!("{seconds}s from now")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn model_config(body: serde_json::Value) -> ModelConfigResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_example_model_entry() {
        let reset = (now() + Duration::hours(1)).to_rfc3339();
        let response = model_config(serde_json::json!({
            "clientModelConfigs": [{
                "label": "Gemini Pro (Low)",
                "modelOrAlias": {"model": "MODEL_PLACEHOLDER_M7"},
                "quotaInfo": {"remainingFraction": 0.2, "resetTime": reset}
            }]
        }));

        let snapshot = ResponseNormalizer::default().map_model_config(response, now());
        let model = &snapshot.models[0];

        assert_eq!(model.label, "Gemini Pro (Low)");
        assert_eq!(model.model_id, "MODEL_PLACEHOLDER_M7");
        assert!(approx(model.remaining_percentage.unwrap(), 20.0));
        assert!(!model.is_exhausted);
        assert_eq!(model.time_until_reset, Some(Duration::milliseconds(3_600_000)));
        assert_eq!(model.time_until_reset_formatted, "1h 0m from now");
        assert!(model.pace_status.is_none());
    }

    #[test]
    fn test_entries_without_quota_info_are_skipped() {
        let response = model_config(serde_json::json!({
            "clientModelConfigs": [
                {"label": "A", "quotaInfo": {"remainingFraction": 1.0}},
                {"label": "B"},
                {"label": "C", "quotaInfo": {}},
            ]
        }));

        let snapshot = ResponseNormalizer::default().map_model_config(response, now());
        let labels: Vec<_> = snapshot.models.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "C"]);
        assert!(snapshot.prompt_credits.is_none());
        assert!(snapshot.plan_name.is_none());
    }

    #[test]
    fn test_exhausted_iff_fraction_missing_or_zero() {
        let response = model_config(serde_json::json!({
            "clientModelConfigs": [
                {"label": "zero", "quotaInfo": {"remainingFraction": 0.0}},
                {"label": "missing", "quotaInfo": {"resetTime": "2025-11-20T13:00:00Z"}},
                {"label": "tiny", "quotaInfo": {"remainingFraction": 0.001}},
            ]
        }));

        let snapshot = ResponseNormalizer::default().map_model_config(response, now());
        let exhausted: Vec<_> = snapshot.models.iter().map(|m| m.is_exhausted).collect();
        assert_eq!(exhausted, vec![true, true, false]);
        assert!(snapshot.models[1].remaining_percentage.is_none());
        assert_eq!(snapshot.exhausted_count(), 2);
    }

    #[test]
    fn test_user_status_requires_status_object() {
        let err = ResponseNormalizer::default()
            .normalize(
                QuotaResponse::UserStatus(UserStatusResponse::default()),
                now(),
            )
            .unwrap_err();
        assert_eq!(err, QuotaError::MissingField("userStatus"));
    }

    #[test]
    fn test_user_status_credits_and_plan() {
        let response: UserStatusResponse = serde_json::from_value(serde_json::json!({
            "userStatus": {
                "email": "dev@example.com",
                "planStatus": {
                    "planInfo": {
                        "planName": "pro",
                        "planDisplayName": "  ",
                        "productName": "Antigravity Pro",
                        "monthlyPromptCredits": 500
                    },
                    "availablePromptCredits": "100"
                },
                "cascadeModelConfigData": {
                    "clientModelConfigs": [
                        {"label": "Claude", "quotaInfo": {"remainingFraction": 0.5}}
                    ]
                }
            }
        }))
        .unwrap();

        let snapshot = ResponseNormalizer::default()
            .map_user_status(response, now())
            .unwrap();

        let credits = snapshot.prompt_credits.unwrap();
        assert!(approx(credits.used_percentage, 80.0));
        assert!(approx(credits.remaining_percentage, 20.0));
        assert_eq!(snapshot.plan_name.as_deref(), Some("Antigravity Pro"));
        assert_eq!(snapshot.account_email.as_deref(), Some("dev@example.com"));
        assert_eq!(snapshot.models.len(), 1);
        assert_eq!(snapshot.models[0].time_until_reset_formatted, UNKNOWN_COUNTDOWN);
    }

    #[test]
    fn test_credits_need_positive_monthly_and_available() {
        let plan = |monthly: serde_json::Value, available: serde_json::Value| -> PlanStatus {
            serde_json::from_value(serde_json::json!({
                "planInfo": {"monthlyPromptCredits": monthly},
                "availablePromptCredits": available
            }))
            .unwrap()
        };

        assert!(prompt_credits(&plan(0.into(), 10.into())).is_none());
        assert!(prompt_credits(&plan(serde_json::Value::Null, 10.into())).is_none());
        assert!(prompt_credits(&plan(100.into(), serde_json::Value::Null)).is_none());
        assert!(prompt_credits(&plan(100.into(), 0.into())).is_some());
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::seconds(-5)), "expired");
        assert_eq!(format_countdown(Duration::seconds(42)), "42s from now");
        assert_eq!(format_countdown(Duration::seconds(125)), "2m 5s from now");
        assert_eq!(format_countdown(Duration::minutes(61)), "1h 1m from now");
        assert_eq!(format_countdown(Duration::hours(50)), "2d 2h from now");
        assert_eq!(format_countdown(Duration::milliseconds(500)), "0s from now");
    }

    #[test]
    fn test_parse_reset_time() {
        assert_eq!(parse_reset_time("2025-11-20T13:00:00Z"), Some(now() + Duration::hours(1)));
        assert_eq!(
            parse_reset_time("1763643600"),
            Some(Utc.with_ymd_and_hms(2025, 11, 20, 13, 0, 0).unwrap())
        );
        assert_eq!(parse_reset_time("soon"), None);
    }

    #[test]
    fn test_expired_reset_time() {
        let reset = (now() - Duration::minutes(1)).to_rfc3339();
        let response = model_config(serde_json::json!({
            "clientModelConfigs": [{"label": "A", "quotaInfo": {"remainingFraction": 0.4, "resetTime": reset}}]
        }));
        let snapshot = ResponseNormalizer::default().map_model_config(response, now());
        assert_eq!(snapshot.models[0].time_until_reset_formatted, "expired");
    }

    #[test]
    fn test_pace_classification() {
        let pace = PaceConfig::default();
        // Half the 300 minute cycle has elapsed, so the ideal usage is 50%.
        let until = Duration::minutes(150);

        let status = |remaining: f64| pace.classify(pace.gap(remaining, until).unwrap());
        assert_eq!(status(80.0), PaceStatus::Critical);
        assert_eq!(status(65.0), PaceStatus::Behind);
        assert_eq!(status(60.0), PaceStatus::OnTrack);
        assert_eq!(status(47.0), PaceStatus::OnTrack);
        assert_eq!(status(40.0), PaceStatus::Ahead);
    }

    #[test]
    fn test_pace_elapsed_is_clamped() {
        let pace = PaceConfig::default();
        assert!(approx(pace.gap(100.0, Duration::hours(10)).unwrap(), 0.0));
        assert!(approx(pace.gap(0.0, Duration::zero()).unwrap(), 0.0));
        assert!(approx(pace.gap(40.0, Duration::minutes(-5)).unwrap(), 40.0));
    }

    #[test]
    fn test_pace_sub_second_precision() {
        let pace = PaceConfig {
            cycle: Duration::milliseconds(1_000),
            ..PaceConfig::default()
        };
        assert!(approx(pace.gap(100.0, Duration::milliseconds(750)).unwrap(), 25.0));
    }

    #[test]
    fn test_pace_needs_positive_cycle() {
        let pace = PaceConfig {
            cycle: Duration::zero(),
            ..PaceConfig::default()
        };
        assert!(pace.gap(50.0, Duration::minutes(10)).is_none());
    }

    #[test]
    fn test_pace_applied_when_enabled() {
        let reset = (now() + Duration::minutes(150)).to_rfc3339();
        let response = model_config(serde_json::json!({
            "clientModelConfigs": [{"label": "A", "quotaInfo": {"remainingFraction": 0.8, "resetTime": reset}}]
        }));
        let normalizer = ResponseNormalizer::new(NormalizeOptions {
            pace: Some(PaceConfig::default()),
        });

        let snapshot = normalizer.map_model_config(response, now());
        let model = &snapshot.models[0];
        assert!(approx(model.usage_pace_gap.unwrap(), 30.0));
        assert_eq!(model.pace_status, Some(PaceStatus::Critical));
    }
}
