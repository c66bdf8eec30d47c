// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaWatch` Store
//!
//! Persisted user settings for `QuotaWatch`.
//!
//! This crate provides:
//!
//! - **Settings**: The configuration document, camelCase JSON with defaults
//! - **SettingsStore**: Shared settings with persistence and change notification
//! - **Persistence**: File I/O helpers for JSON data with owner-only permissions
//!
//! Nothing here talks to the language server. The binary turns [`Settings`]
//! into the plain option types of `quotawatch-probe`.
//!
//! ## Usage
//!
//! ```ignore
//! use quotawatch_store::SettingsStore;
//!
//! let store = SettingsStore::load_default().await?;
//! let interval = store.get().await.polling_interval();
//!
//! // Subscribe to changes
//! let mut rx = store.subscribe();
//! while rx.changed().await.is_ok() {
//!     println!("Settings updated!");
//! }
//! ```

pub mod error;
pub mod persistence;
pub mod settings_store;

pub use error::StoreError;
pub use persistence::{default_config_dir, default_settings_path, load_json, save_json};
pub use settings_store::{
    DiscoverySettings, DisplayStyle, MIN_POLLING_INTERVAL_SECS, Settings, SettingsStore,
    SuccessCodes, UsagePaceSettings,
};

#[cfg(test)]
mod persistence_tests;
