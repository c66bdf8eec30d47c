//! Integration tests for core snapshot types.

use chrono::{Duration, TimeZone, Utc};
use quotawatch_core::{
    CredentialBundle, ModelQuotaInfo, PaceStatus, PromptCreditsInfo, QuotaApiMethod, QuotaSnapshot,
};

fn sample_snapshot() -> QuotaSnapshot {
    let now = Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap();
    let mut snapshot = QuotaSnapshot::new(now);
    snapshot.plan_name = Some("Pro".to_string());
    snapshot.prompt_credits = PromptCreditsInfo::from_counts(500.0, 1000.0);
    snapshot.models.push(ModelQuotaInfo {
        label: "Gemini Pro (Low)".to_string(),
        model_id: "MODEL_PLACEHOLDER_M8".to_string(),
        remaining_fraction: Some(0.2),
        remaining_percentage: Some(20.0),
        is_exhausted: false,
        reset_time: Some(now + Duration::hours(1)),
        time_until_reset: Some(Duration::hours(1)),
        time_until_reset_formatted: "1h 0m from now".to_string(),
        usage_pace_gap: Some(-60.0),
        pace_status: Some(PaceStatus::Ahead),
    });
    snapshot
}

#[test]
fn test_snapshot_serialization_roundtrip() {
    let snapshot = sample_snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: QuotaSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, snapshot);
}

#[test]
fn test_empty_snapshot_omits_optional_fields() {
    let snapshot = QuotaSnapshot::new(Utc::now());
    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json.get("prompt_credits").is_none());
    assert!(json.get("plan_name").is_none());
    assert!(snapshot.is_empty());
}

#[test]
fn test_used_percentage() {
    let snapshot = sample_snapshot();
    let used = snapshot.models[0].used_percentage().unwrap();
    assert!((used - 80.0).abs() < 1e-9);
}

#[test]
fn test_bundle_and_method_are_plain_values() {
    let bundle = CredentialBundle::new(0, 443, "token");
    let copy = bundle.clone();
    assert_eq!(bundle, copy);
    assert!(QuotaApiMethod::UserStatus.has_plan_data());
    assert!(!QuotaApiMethod::ModelConfig.has_plan_data());
}
