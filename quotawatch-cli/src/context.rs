//! Wiring from settings to discovery, client and engine.

use std::sync::Arc;

use anyhow::Result;
use quotawatch_core::CredentialBundle;
use quotawatch_fetch::{CommandRunner, LocalRpcTransport, ProcessRunner, RpcTransport};
use quotawatch_probe::{
    ClientInfo, CredentialDiscovery, DiscoveryError, DiscoveryOptions, ErrorMessages,
    NormalizeOptions, PaceConfig, Platform, PlatformDetector, QuotaClient, QuotaService,
    ResponseCodePolicy, ResponseNormalizer,
};
use quotawatch_store::{Settings, SettingsStore};
use tokio::sync::Mutex;
use tracing::debug;

use crate::Cli;

/// Opens the settings store selected on the command line.
pub async fn open_store(cli: &Cli) -> Result<SettingsStore> {
    let store = match &cli.config {
        Some(path) => SettingsStore::load(path.clone()).await?,
        None => SettingsStore::load_default().await?,
    };
    Ok(store)
}

/// Everything a command needs to talk to the language server.
///
/// Holds a single discovery so a switch to a fallback inspection command
/// sticks for the rest of the run.
pub struct AppContext {
    /// Settings the context was built from.
    pub settings: Settings,
    platform: Platform,
    client_info: Arc<ClientInfo>,
    transport: Arc<dyn RpcTransport>,
    discovery: Mutex<CredentialDiscovery>,
}

impl AppContext {
    /// Loads settings and builds the context.
    pub async fn load(cli: &Cli) -> Result<Self> {
        let settings = open_store(cli).await?.get().await;
        Self::from_settings(settings)
    }

    /// Builds the context for the running platform.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let detector = PlatformDetector::new()?.with_force_powershell(settings.force_powershell);
        let transport: Arc<dyn RpcTransport> = Arc::new(LocalRpcTransport::new()?);
        debug!(platform = detector.platform().display_name(), "Context ready");

        Ok(Self::with_parts(
            settings,
            &detector,
            Arc::new(ProcessRunner::new()),
            transport,
        ))
    }

    fn with_parts(
        settings: Settings,
        detector: &PlatformDetector,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn RpcTransport>,
    ) -> Self {
        let client_info = Arc::new(ClientInfo::detect());
        let discovery = CredentialDiscovery::new(
            detector,
            runner,
            Arc::clone(&transport),
            Arc::clone(&client_info),
        )
        .with_options(discovery_options(&settings));

        Self {
            settings,
            platform: detector.platform(),
            client_info,
            transport,
            discovery: Mutex::new(discovery),
        }
    }

    /// Running platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Locates the language server with the configured attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Exhausted`] when every attempt fails.
    pub async fn discover(&self) -> Result<CredentialBundle, DiscoveryError> {
        self.discovery.lock().await.discover_with_defaults().await
    }

    /// Guidance for the current inspection commands.
    pub async fn error_messages(&self) -> ErrorMessages {
        self.discovery.lock().await.error_messages()
    }

    /// Creates the fetch-and-normalize service.
    pub fn service(&self) -> QuotaService {
        let client = QuotaClient::new(Arc::clone(&self.transport), Arc::clone(&self.client_info))
            .with_policy(code_policy(&self.settings));
        QuotaService::new(client, ResponseNormalizer::new(normalize_options(&self.settings)))
    }
}

// ============================================================================
// Settings conversion
// ============================================================================

/// Discovery options from settings; command timeouts keep their defaults.
pub fn discovery_options(settings: &Settings) -> DiscoveryOptions {
    DiscoveryOptions {
        max_attempts: settings.discovery.max_attempts,
        retry_delay: settings.discovery.retry_delay(),
        ..DiscoveryOptions::default()
    }
}

/// Normalizer options; pace is omitted when disabled.
pub fn normalize_options(settings: &Settings) -> NormalizeOptions {
    let pace = &settings.usage_pace;
    NormalizeOptions {
        pace: pace.enabled.then(|| PaceConfig {
            cycle: chrono::Duration::minutes(i64::from(pace.cycle_minutes)),
            warning_gap: pace.warning_gap,
            critical_gap: pace.critical_gap,
            on_track_margin: pace.on_track_margin,
        }),
    }
}

/// Success-code allow-list.
pub fn code_policy(settings: &Settings) -> ResponseCodePolicy {
    ResponseCodePolicy::new(
        settings.success_codes.numeric.iter().copied(),
        settings.success_codes.text.iter(),
    )
}
