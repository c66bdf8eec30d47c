//! Persistence round-trip and edge case tests.
//!
//! Tests file I/O operations, JSON persistence, and the settings store on disk.

use std::path::PathBuf;
use tempfile::TempDir;

use crate::error::StoreError;
use crate::persistence::{load_json, save_json};
use crate::settings_store::{DisplayStyle, Settings, SettingsStore};
use quotawatch_core::QuotaApiMethod;

// ============================================================================
// JSON Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested_path = temp_dir.path().join("deeply").join("nested").join("settings.json");

    let data = serde_json::json!({"key": "value"});

    save_json(&nested_path, &data).await.unwrap();
    assert!(nested_path.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_saved_file_and_directory_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("quotawatch");
    let file_path = dir.join("settings.json");

    save_json(&file_path, &Settings::default()).await.unwrap();

    let file_mode = std::fs::metadata(&file_path).unwrap().permissions().mode() & 0o777;
    let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
    assert_eq!(file_mode, 0o600);
    assert_eq!(dir_mode, 0o700);
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let file_path = PathBuf::from("/nonexistent/path/settings.json");

    let result: Result<Settings, _> = load_json(&file_path).await;
    assert!(result.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_load_garbage_is_serialization_error() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("garbage.json");
    tokio::fs::write(&file_path, "not json").await.unwrap();

    let result: Result<Settings, _> = load_json(&file_path).await;
    assert!(matches!(result, Err(StoreError::Serialization(_))));
}

#[tokio::test]
async fn test_atomic_write() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("atomic.json");

    save_json(&file_path, &Settings::default()).await.unwrap();

    let temp_path = file_path.with_extension("json.tmp");
    assert!(!temp_path.exists());
    assert!(file_path.exists());
}

// ============================================================================
// Settings Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_settings_full_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");

    let mut settings = Settings::default();
    settings.polling_interval_secs = 120;
    settings.api_method = QuotaApiMethod::ModelConfig;
    settings.display_style = DisplayStyle::Percentage;
    settings.force_powershell = true;
    settings.usage_pace.enabled = false;
    settings.discovery.max_attempts = 5;
    settings.success_codes.text.push("DONE".to_string());

    save_json(&file_path, &settings).await.unwrap();
    let loaded: Settings = load_json(&file_path).await.unwrap();

    assert_eq!(loaded, settings);
}

#[tokio::test]
async fn test_load_minimal_json_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("minimal.json");
    tokio::fs::write(&file_path, "{}").await.unwrap();

    let loaded: Settings = load_json(&file_path).await.unwrap();
    assert_eq!(loaded, Settings::default());
}

#[tokio::test]
async fn test_load_json_with_unknown_fields() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("extra_fields.json");

    let json = r#"{
        "pollingIntervalSecs": 90,
        "unknown_field_1": "value1",
        "nested_unknown": {"key": "value"}
    }"#;
    tokio::fs::write(&file_path, json).await.unwrap();

    let loaded: Settings = load_json(&file_path).await.unwrap();
    assert_eq!(loaded.polling_interval_secs, 90);
}

// ============================================================================
// Settings Store On Disk
// ============================================================================

#[tokio::test]
async fn test_store_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let store = SettingsStore::load(temp_dir.path().join("settings.json"))
        .await
        .unwrap();

    assert_eq!(store.get().await, Settings::default());
}

#[tokio::test]
async fn test_store_sanitizes_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");
    tokio::fs::write(
        &file_path,
        r#"{"pollingIntervalSecs": 2, "warningThreshold": 20, "criticalThreshold": 40}"#,
    )
    .await
    .unwrap();

    let settings = SettingsStore::load(file_path).await.unwrap().get().await;

    assert_eq!(settings.polling_interval_secs, 10);
    assert_eq!(settings.critical_threshold, 20);
}

#[tokio::test]
async fn test_store_unparseable_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");
    tokio::fs::write(&file_path, r#"{"enabled": "#).await.unwrap();

    let store = SettingsStore::load(file_path).await.unwrap();
    assert_eq!(store.get().await, Settings::default());
}

#[tokio::test]
async fn test_store_set_save_reload() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");

    let store = SettingsStore::load(file_path.clone()).await.unwrap();
    store.set_value("showPromptCredits", "true").await.unwrap();
    store.save().await.unwrap();

    let reloaded = SettingsStore::load(file_path).await.unwrap();
    assert!(reloaded.get().await.show_prompt_credits);
}

#[tokio::test]
async fn test_store_set_value_error_leaves_settings() {
    let temp_dir = TempDir::new().unwrap();
    let store = SettingsStore::new(temp_dir.path().join("settings.json"));
    let mut rx = store.subscribe();

    let err = store.set_value("discovery.maxAttempts", "-1").await.unwrap_err();

    assert!(matches!(err, StoreError::Config(_)));
    assert!(!rx.has_changed().unwrap());
    assert_eq!(store.get().await, Settings::default());
}

#[tokio::test]
async fn test_store_init_only_once() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");
    let store = SettingsStore::new(file_path.clone());

    assert!(store.init().await.unwrap());
    assert!(!store.init().await.unwrap());
    assert!(file_path.exists());
}

#[tokio::test]
async fn test_reload_picks_up_external_edit() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");
    let store = SettingsStore::load(file_path.clone()).await.unwrap();
    let mut rx = store.subscribe();

    assert!(!store.reload().await.unwrap());
    assert!(!rx.has_changed().unwrap());

    tokio::fs::write(
        &file_path,
        r#"{"apiMethod": "COMMAND_MODEL_CONFIG", "pollingIntervalSecs": 2}"#,
    )
    .await
    .unwrap();

    assert!(store.reload().await.unwrap());
    assert!(rx.has_changed().unwrap());
    let settings = store.get().await;
    assert_eq!(settings.api_method, QuotaApiMethod::ModelConfig);
    assert_eq!(settings.polling_interval_secs, 10);
}

#[tokio::test]
async fn test_reload_keeps_settings_on_garbage() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");
    tokio::fs::write(&file_path, r#"{"enabled": false}"#).await.unwrap();
    let store = SettingsStore::load(file_path.clone()).await.unwrap();
    let mut rx = store.subscribe();

    tokio::fs::write(&file_path, "{ half written").await.unwrap();

    assert!(!store.reload().await.unwrap());
    assert!(!rx.has_changed().unwrap());
    assert!(!store.get().await.enabled);
}
