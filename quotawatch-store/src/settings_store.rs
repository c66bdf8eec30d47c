//! User preferences store.
//!
//! Manages user settings with persistence and change notification.

use quotawatch_core::QuotaApiMethod;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};

/// Shortest allowed polling interval.
pub const MIN_POLLING_INTERVAL_SECS: u64 = 10;

// ============================================================================
// Settings Types
// ============================================================================

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct Settings {
    /// Master switch for polling.
    pub enabled: bool,

    /// Seconds between polls; see [`Settings::polling_interval`].
    pub polling_interval_secs: u64,

    /// Remaining percent at or below which a model is a warning.
    pub warning_threshold: u8,

    /// Remaining percent at or below which a model is critical.
    pub critical_threshold: u8,

    /// RPC method used for quota fetches.
    pub api_method: QuotaApiMethod,

    /// Show the prompt credit balance.
    pub show_prompt_credits: bool,

    /// Show the plan name.
    pub show_plan_name: bool,

    /// How remaining quota is rendered.
    pub display_style: DisplayStyle,

    /// Start the Windows strategy in PowerShell mode.
    #[serde(rename = "forcePowerShell")]
    pub force_powershell: bool,

    /// Usage pace classification.
    pub usage_pace: UsagePaceSettings,

    /// Discovery retries.
    pub discovery: DiscoverySettings,

    /// Application `code` values that mean success.
    pub success_codes: SuccessCodes,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval_secs: 60,
            warning_threshold: 50,
            critical_threshold: 30,
            api_method: QuotaApiMethod::UserStatus,
            show_prompt_credits: false,
            show_plan_name: false,
            display_style: DisplayStyle::default(),
            force_powershell: false,
            usage_pace: UsagePaceSettings::default(),
            discovery: DiscoverySettings::default(),
            success_codes: SuccessCodes::default(),
        }
    }
}

impl Settings {
    /// Returns the polling interval, never below
    /// [`MIN_POLLING_INTERVAL_SECS`].
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs.max(MIN_POLLING_INTERVAL_SECS))
    }

    /// Returns the warning and critical thresholds as percentages.
    pub fn thresholds(&self) -> (f64, f64) {
        (
            f64::from(self.warning_threshold),
            f64::from(self.critical_threshold),
        )
    }

    /// Brings out-of-range values back into range.
    ///
    /// Returns true if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();

        self.polling_interval_secs = self.polling_interval_secs.max(MIN_POLLING_INTERVAL_SECS);
        self.warning_threshold = self.warning_threshold.min(100);
        self.critical_threshold = self.critical_threshold.min(self.warning_threshold);
        self.discovery.max_attempts = self.discovery.max_attempts.max(1);
        self.usage_pace.cycle_minutes = self.usage_pace.cycle_minutes.max(1);

        let changed = *self != before;
        if changed {
            debug!("Settings sanitized");
        }
        changed
    }

    /// Sets one value by its camelCase key.
    ///
    /// Nested keys use dots (`usagePace.enabled`). `raw` is parsed as JSON
    /// and taken as a plain string when that fails, so
    /// `apiMethod COMMAND_MODEL_CONFIG` and `successCodes.text ["OK"]` both
    /// work.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an unknown key or a value of the
    /// wrong type.
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<(), StoreError> {
        let mut document = serde_json::to_value(&*self)?;

        let slot = key
            .split('.')
            .try_fold(&mut document, |node, part| node.get_mut(part))
            .ok_or_else(|| StoreError::Config(format!("Unknown setting: {key}")))?;
        *slot = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let mut updated: Settings = serde_json::from_value(document)
            .map_err(|e| StoreError::Config(format!("Invalid value for {key}: {e}")))?;
        updated.sanitize();
        *self = updated;
        Ok(())
    }
}

/// How remaining quota is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DisplayStyle {
    /// Plain percentage.
    Percentage,
    /// Bar with percentage.
    #[default]
    ProgressBar,
}

impl std::fmt::Display for DisplayStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayStyle::Percentage => write!(f, "percentage"),
            DisplayStyle::ProgressBar => write!(f, "progress bar"),
        }
    }
}

/// Usage pace parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsagePaceSettings {
    /// Compute pace at all.
    pub enabled: bool,
    /// Quota cycle length in minutes.
    pub cycle_minutes: u32,
    /// Gap (percentage points) classified as behind.
    pub warning_gap: f64,
    /// Gap classified as critical.
    pub critical_gap: f64,
    /// Tolerance before usage counts as ahead.
    pub on_track_margin: f64,
}

impl Default for UsagePaceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_minutes: 300,
            warning_gap: 15.0,
            critical_gap: 30.0,
            on_track_margin: 5.0,
        }
    }
}

/// Discovery retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscoverySettings {
    /// Full discovery attempts.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_delay_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl DiscoverySettings {
    /// Returns the pause between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Allow-list of application `code` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuccessCodes {
    /// Numeric codes.
    pub numeric: Vec<i64>,
    /// Text codes, compared case-insensitively.
    pub text: Vec<String>,
}

impl Default for SuccessCodes {
    fn default() -> Self {
        Self {
            numeric: vec![0],
            text: vec!["0".to_string(), "OK".to_string(), "SUCCESS".to_string()],
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Persistent settings store with change notifications.
#[derive(Debug)]
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
    notify: watch::Sender<u64>,
}

impl SettingsStore {
    /// Creates a store holding defaults, backed by `path`.
    pub fn new(path: PathBuf) -> Self {
        Self::with_settings(path, Settings::default())
    }

    fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
            notify,
        }
    }

    /// Loads settings from the default path.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from a path.
    ///
    /// A missing file yields defaults. A file that does not parse is logged
    /// and replaced by defaults in memory; it is only overwritten on the
    /// next [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let settings = read_settings_file(&path).await?.unwrap_or_default();
        Ok(Self::with_settings(path, settings))
    }

    /// Re-reads the backing file and notifies subscribers if it changed.
    ///
    /// A missing file means defaults. A file that does not parse leaves the
    /// current settings in place. Returns true if the settings changed.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read.
    pub async fn reload(&self) -> Result<bool, StoreError> {
        let Some(fresh) = read_settings_file(&self.path).await? else {
            return Ok(false);
        };

        {
            let mut settings = self.settings.write().await;
            if *settings == fresh {
                return Ok(false);
            }
            *settings = fresh;
        }

        info!(path = %self.path.display(), "Settings changed on disk");
        self.notify_change();
        Ok(true)
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings and notifies subscribers.
    ///
    /// The result is sanitized before subscribers see it.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        {
            let mut settings = self.settings.write().await;
            f(&mut settings);
            settings.sanitize();
        }
        self.notify_change();
    }

    /// Sets one value by key; see [`Settings::set_value`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for an unknown key or bad value.
    pub async fn set_value(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        {
            let mut settings = self.settings.write().await;
            settings.set_value(key, raw)?;
        }
        self.notify_change();
        Ok(())
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await;
        save_json(&self.path, &*settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Writes the current settings only if no file exists yet.
    ///
    /// Returns true if a file was written.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub async fn init(&self) -> Result<bool, StoreError> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    /// Subscribes to settings changes. The value is a change counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn notify_change(&self) {
        self.notify.send_modify(|version| *version += 1);
    }

    // ========================================================================
    // Convenience Methods
    // ========================================================================

    /// Gets the API method.
    pub async fn api_method(&self) -> QuotaApiMethod {
        self.settings.read().await.api_method
    }

    /// Sets the API method.
    pub async fn set_api_method(&self, method: QuotaApiMethod) {
        self.update(|s| s.api_method = method).await;
    }

    /// Gets the clamped polling interval.
    pub async fn polling_interval(&self) -> Duration {
        self.settings.read().await.polling_interval()
    }
}

/// Reads and sanitizes a settings file.
///
/// A missing file yields defaults; `Ok(None)` means the file did not parse.
async fn read_settings_file(path: &Path) -> Result<Option<Settings>, StoreError> {
    let mut settings = match load_json::<Settings>(path).await {
        Ok(settings) => {
            info!(path = %path.display(), "Loaded settings");
            settings
        }
        Err(e) if e.is_not_found() => {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        }
        Err(StoreError::Serialization(e)) => {
            warn!(path = %path.display(), error = %e, "Failed to parse settings");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if settings.sanitize() {
        warn!(path = %path.display(), "Settings contained out-of-range values");
    }
    Ok(Some(settings))
}
