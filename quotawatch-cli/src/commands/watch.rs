//! Watch command - poll quotas until interrupted.
//!
//! Keys (followed by Enter): `r` retry after an error, `q` quick refresh,
//! `d` re-detect the server, `s` engine status, `x` exit.
//!
//! The settings file is re-read while watching. A new API method or
//! interval restarts polling; `enabled: false` stops it until re-enabled.

use std::io::{Write, stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use quotawatch_fetch::RetryPolicy;
use quotawatch_probe::{EngineError, PollingEngine};
use quotawatch_store::{MIN_POLLING_INTERVAL_SECS, Settings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::commands::discover;
use crate::context::{AppContext, open_store};
use crate::output::{JsonFormatter, TextFormatter, WatchEvent, snapshot_to_output};
use crate::{Cli, OutputFormat};

/// Arguments for watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Refresh interval in seconds. Defaults to the configured interval.
    #[arg(long, short)]
    pub interval: Option<u64>,
}

/// Interactive key commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Retry,
    QuickRefresh,
    Rediscover,
    Status,
    Exit,
}

fn parse_key(line: &str) -> Option<KeyAction> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "retry" => Some(KeyAction::Retry),
        "q" | "refresh" => Some(KeyAction::QuickRefresh),
        "d" | "detect" => Some(KeyAction::Rediscover),
        "s" | "status" => Some(KeyAction::Status),
        "x" | "exit" | "quit" => Some(KeyAction::Exit),
        _ => None,
    }
}

/// Resolves the polling interval, never below the configured minimum.
fn resolve_interval(arg: Option<u64>, settings: &Settings) -> Duration {
    arg.map_or_else(
        || settings.polling_interval(),
        |secs| Duration::from_secs(secs.max(MIN_POLLING_INTERVAL_SECS)),
    )
}

/// How often the settings file is re-read.
const SETTINGS_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

/// Keeps the engine in line with the current settings.
struct SettingsFollower {
    current: Settings,
    interval_override: Option<u64>,
}

impl SettingsFollower {
    fn new(current: Settings, interval_override: Option<u64>) -> Self {
        Self {
            current,
            interval_override,
        }
    }

    fn interval(&self) -> Duration {
        resolve_interval(self.interval_override, &self.current)
    }

    /// Starts polling unless it is disabled. Returns true if started.
    async fn start_if_enabled(&self, engine: &PollingEngine) -> Result<bool, EngineError> {
        if !self.current.enabled {
            info!("Polling is disabled in settings");
            return Ok(false);
        }
        engine.start_polling(self.interval()).await?;
        Ok(true)
    }

    /// Applies changed settings.
    ///
    /// The method is switched first. Disabling stops the timer; a new
    /// method, a new interval or re-enabling restarts polling.
    async fn apply(&mut self, engine: &PollingEngine, fresh: Settings) -> Result<(), EngineError> {
        let previous_interval = self.interval();
        let previous = std::mem::replace(&mut self.current, fresh);

        let method_changed = previous.api_method != self.current.api_method;
        if method_changed {
            engine.set_api_method(self.current.api_method)?;
        }

        if !self.current.enabled {
            if previous.enabled {
                info!("Polling disabled, stopping");
            }
            return engine.stop_polling();
        }

        if method_changed || !previous.enabled || previous_interval != self.interval() {
            info!(
                interval_secs = self.interval().as_secs(),
                method = %self.current.api_method,
                "Settings changed, restarting polling"
            );
            engine.start_polling(self.interval()).await?;
        }
        Ok(())
    }
}

/// Runs the watch command.
pub async fn run(args: &WatchArgs, cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    let ctx = AppContext::from_settings(store.get().await)?;
    let mut follower = SettingsFollower::new(ctx.settings.clone(), args.interval);
    let method = follower.current.api_method;

    info!(
        interval_secs = follower.interval().as_secs(),
        method = %method,
        enabled = follower.current.enabled,
        "Starting watch mode"
    );

    let bundle = discover(&ctx, cli).await?;

    let engine = PollingEngine::spawn(Arc::new(ctx.service()), method, RetryPolicy::default());
    register_observers(&engine, cli, &follower.current, follower.interval())?;
    engine.set_credentials(bundle)?;

    let mut formatter = TextFormatter::with_settings(!cli.no_color, &follower.current);
    match follower.start_if_enabled(&engine).await {
        Ok(true) => {}
        Ok(false) => eprintln!(
            "{}",
            formatter.dim("Polling is disabled. Set enabled to true to start.")
        ),
        Err(e) => report(cli, &formatter, &e),
    }

    let mut changes = store.subscribe();
    let mut reload = tokio::time::interval(SETTINGS_RELOAD_INTERVAL);
    reload.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
            _ = reload.tick() => {
                if let Err(e) = store.reload().await {
                    warn!(error = %e, "Failed to re-read settings");
                }
            }
            Ok(()) = changes.changed() => {
                let fresh = store.get().await;
                if let Err(e) = follower.apply(&engine, fresh).await {
                    report(cli, &formatter, &e);
                }
                register_observers(&engine, cli, &follower.current, follower.interval())?;
                formatter = TextFormatter::with_settings(!cli.no_color, &follower.current);
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed, keys disabled");
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                        continue;
                    }
                };

                match parse_key(&line) {
                    Some(KeyAction::Retry) => {
                        if let Err(e) = engine.retry_from_error(follower.interval()).await {
                            report(cli, &formatter, &e);
                        }
                    }
                    Some(KeyAction::QuickRefresh) => {
                        if let Err(e) = engine.quick_refresh().await {
                            report(cli, &formatter, &e);
                        }
                    }
                    Some(KeyAction::Rediscover) => {
                        let Ok(bundle) = discover(&ctx, cli).await else {
                            continue;
                        };
                        engine.set_credentials(bundle)?;
                        if let Err(e) = follower.start_if_enabled(&engine).await {
                            report(cli, &formatter, &e);
                        }
                    }
                    Some(KeyAction::Status) => {
                        let status = engine.status().await?;
                        eprintln!(
                            "{}",
                            formatter.dim(&format!(
                                "polling: {}, method: {}, retry pending: {}, consecutive errors: {}",
                                status.polling,
                                status.method,
                                status.retry_pending,
                                status.state.consecutive_errors
                            ))
                        );
                    }
                    Some(KeyAction::Exit) => break,
                    None => {
                        if !line.trim().is_empty() {
                            eprintln!("{}", formatter.dim("Keys: r retry, q refresh, d detect, s status, x exit"));
                        }
                    }
                }
            }
        }
    }

    engine.shutdown().await;
    info!("Watch mode stopped");
    Ok(())
}

/// Wires the engine observers to stdout.
///
/// Observers replace earlier ones, so this runs again after a settings
/// change.
fn register_observers(
    engine: &PollingEngine,
    cli: &Cli,
    settings: &Settings,
    interval: Duration,
) -> Result<()> {
    let method = settings.api_method;
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::with_settings(!cli.no_color, settings);

            let f = formatter.clone();
            engine.on_quota_update(move |snapshot| {
                print!("\x1b[2J\x1b[H");
                println!(
                    "{} - {} (refresh: {}s)",
                    f.bold("QuotaWatch"),
                    chrono::Local::now().format("%H:%M:%S"),
                    interval.as_secs()
                );
                println!("{}", "─".repeat(50));
                println!("{}", f.format_snapshot(&snapshot));
                println!();
                println!("{}", f.dim("Keys: r retry, q refresh, d detect, s status, x exit"));
                let _ = stdout().flush();
            })?;

            let f = formatter.clone();
            engine.on_status(move |status| eprintln!("{}", f.format_status(status)))?;

            let f = formatter;
            engine.on_error(move |e| {
                eprintln!("{}", f.format_error(&e.to_string()));
                eprintln!("{}", f.dim("Polling stopped. Press r to retry."));
            })?;
        }
        OutputFormat::Json => {
            engine.on_quota_update(move |snapshot| {
                emit(&WatchEvent::Update {
                    snapshot: snapshot_to_output(&snapshot, method),
                });
            })?;
            engine.on_status(|status| emit(&WatchEvent::Status { status }))?;
            engine.on_error(|e| emit(&WatchEvent::error(e)))?;
        }
    }
    Ok(())
}

/// Prints one JSON event line.
fn emit(event: &WatchEvent) {
    match JsonFormatter::format_event(event) {
        Ok(line) => {
            println!("{line}");
            let _ = stdout().flush();
        }
        Err(e) => warn!(error = %e, "Failed to serialize watch event"),
    }
}

/// Reports a failed engine request.
fn report(cli: &Cli, formatter: &TextFormatter, error: &EngineError) {
    match (cli.format, error) {
        (OutputFormat::Json, EngineError::Fetch(e)) => emit(&WatchEvent::error(e)),
        (_, EngineError::TransitionInProgress) => {
            debug!("Another start or retry is running");
        }
        _ => eprintln!("{}", formatter.format_error(&error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use quotawatch_core::{CredentialBundle, QuotaApiMethod, QuotaSnapshot};
    use quotawatch_probe::{QuotaError, QuotaFetcher};
    use quotawatch_store::SettingsStore;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingFetcher {
        methods: Mutex<Vec<QuotaApiMethod>>,
    }

    impl RecordingFetcher {
        fn methods(&self) -> Vec<QuotaApiMethod> {
            self.methods.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuotaFetcher for RecordingFetcher {
        async fn fetch(
            &self,
            method: QuotaApiMethod,
            _bundle: &CredentialBundle,
        ) -> Result<QuotaSnapshot, QuotaError> {
            self.methods.lock().unwrap().push(method);
            Ok(QuotaSnapshot::new(chrono::Utc::now()))
        }
    }

    fn engine_for(fetcher: &Arc<RecordingFetcher>, method: QuotaApiMethod) -> PollingEngine {
        let engine = PollingEngine::spawn(fetcher.clone(), method, RetryPolicy::no_retry());
        engine
            .set_credentials(CredentialBundle::new(0, 42100, "8d2c61aa-7f55"))
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_settings_file_edit_reaches_engine() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let store = SettingsStore::load(path.clone()).await.unwrap();
        let mut changes = store.subscribe();

        let fetcher = Arc::new(RecordingFetcher::default());
        let mut follower = SettingsFollower::new(store.get().await, None);
        let engine = engine_for(&fetcher, follower.current.api_method);
        assert!(follower.start_if_enabled(&engine).await.unwrap());

        tokio::fs::write(
            &path,
            r#"{"apiMethod": "COMMAND_MODEL_CONFIG", "pollingIntervalSecs": 30}"#,
        )
        .await
        .unwrap();
        assert!(store.reload().await.unwrap());
        changes.changed().await.unwrap();
        follower.apply(&engine, store.get().await).await.unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.method, QuotaApiMethod::ModelConfig);
        assert!(status.polling);
        assert_eq!(follower.interval(), Duration::from_secs(30));
        assert_eq!(
            fetcher.methods(),
            [QuotaApiMethod::UserStatus, QuotaApiMethod::ModelConfig]
        );

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_disable_stops_and_enable_restarts() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::load(temp_dir.path().join("settings.json"))
            .await
            .unwrap();
        let mut changes = store.subscribe();

        let fetcher = Arc::new(RecordingFetcher::default());
        let mut follower = SettingsFollower::new(store.get().await, None);
        let engine = engine_for(&fetcher, follower.current.api_method);
        follower.start_if_enabled(&engine).await.unwrap();

        store.set_value("enabled", "false").await.unwrap();
        changes.changed().await.unwrap();
        follower.apply(&engine, store.get().await).await.unwrap();
        assert!(!engine.status().await.unwrap().polling);

        store.set_value("enabled", "true").await.unwrap();
        changes.changed().await.unwrap();
        follower.apply(&engine, store.get().await).await.unwrap();
        assert!(engine.status().await.unwrap().polling);
        assert_eq!(fetcher.methods().len(), 2);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_unrelated_change_does_not_refetch() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let mut follower = SettingsFollower::new(Settings::default(), None);
        let engine = engine_for(&fetcher, follower.current.api_method);
        follower.start_if_enabled(&engine).await.unwrap();

        let fresh = Settings {
            show_plan_name: true,
            ..Settings::default()
        };
        follower.apply(&engine, fresh).await.unwrap();

        assert_eq!(fetcher.methods().len(), 1);
        assert!(engine.status().await.unwrap().polling);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_interval_flag_overrides_settings_interval() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let mut follower = SettingsFollower::new(Settings::default(), Some(20));
        let engine = engine_for(&fetcher, follower.current.api_method);
        follower.start_if_enabled(&engine).await.unwrap();

        let fresh = Settings {
            polling_interval_secs: 120,
            ..Settings::default()
        };
        follower.apply(&engine, fresh).await.unwrap();

        assert_eq!(follower.interval(), Duration::from_secs(20));
        assert_eq!(fetcher.methods().len(), 1);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_at_launch_does_not_start() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let settings = Settings {
            enabled: false,
            ..Settings::default()
        };
        let follower = SettingsFollower::new(settings, None);
        let engine = engine_for(&fetcher, follower.current.api_method);

        assert!(!follower.start_if_enabled(&engine).await.unwrap());

        let status = engine.status().await.unwrap();
        assert!(!status.polling);
        assert!(fetcher.methods().is_empty());

        engine.shutdown().await;
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("r"), Some(KeyAction::Retry));
        assert_eq!(parse_key(" Q \n"), Some(KeyAction::QuickRefresh));
        assert_eq!(parse_key("d"), Some(KeyAction::Rediscover));
        assert_eq!(parse_key("status"), Some(KeyAction::Status));
        assert_eq!(parse_key("x"), Some(KeyAction::Exit));
        assert_eq!(parse_key("z"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn test_resolve_interval() {
        let settings = Settings::default();

        assert_eq!(resolve_interval(Some(30), &settings), Duration::from_secs(30));
        assert_eq!(
            resolve_interval(Some(1), &settings),
            Duration::from_secs(MIN_POLLING_INTERVAL_SECS)
        );
        assert_eq!(resolve_interval(None, &settings), settings.polling_interval());
    }
}
