//! Config command - manage configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use quotawatch_store::{DisplayStyle, Settings, default_config_dir};
use tracing::info;

use crate::commands::usage::MethodArg;
use crate::context::open_store;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Show configuration paths.
    Path,

    /// Write the default configuration if none exists.
    Init,

    /// Set one value by key, e.g. `usagePace.cycleMinutes 180`.
    Set {
        /// Dotted camelCase key.
        key: String,
        /// JSON value; bare words are taken as strings.
        value: String,
    },

    /// Choose the quota endpoint.
    Method {
        /// Endpoint.
        #[arg(value_enum)]
        method: MethodArg,
    },

    /// Reset to defaults.
    Reset,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(cli).await,
        ConfigAction::Path => show_paths(cli).await,
        ConfigAction::Init => init_config(cli).await,
        ConfigAction::Set { key, value } => set_value(key, value, cli).await,
        ConfigAction::Method { method } => set_method(*method, cli).await,
        ConfigAction::Reset => reset_config(cli).await,
    }
}

async fn show_config(cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    let settings = store.get().await;

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.bold("QuotaWatch Configuration"));
            println!("{}", "─".repeat(40));
            println!();
            for line in settings_lines(&settings) {
                println!("{line}");
            }
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&settings)?);
        }
    }

    Ok(())
}

/// Human-readable settings listing.
fn settings_lines(settings: &Settings) -> Vec<String> {
    let style = match settings.display_style {
        DisplayStyle::Percentage => "percentage",
        DisplayStyle::ProgressBar => "progress bar",
    };
    let pace = &settings.usage_pace;

    vec![
        format!("Enabled:            {}", settings.enabled),
        format!("API method:         {}", settings.api_method),
        format!("Polling interval:   {}s", settings.polling_interval().as_secs()),
        format!(
            "Thresholds:         warning {}%, critical {}%",
            settings.warning_threshold, settings.critical_threshold
        ),
        format!("Display style:      {style}"),
        format!("Show credits:       {}", settings.show_prompt_credits),
        format!("Show plan:          {}", settings.show_plan_name),
        format!("Force PowerShell:   {}", settings.force_powershell),
        format!(
            "Usage pace:         {} (cycle {}m, gaps {}/{}, margin {})",
            if pace.enabled { "on" } else { "off" },
            pace.cycle_minutes,
            pace.warning_gap,
            pace.critical_gap,
            pace.on_track_margin
        ),
        format!(
            "Discovery:          {} attempts, {}ms apart",
            settings.discovery.max_attempts, settings.discovery.retry_delay_ms
        ),
        format!(
            "Success codes:      {:?} {:?}",
            settings.success_codes.numeric, settings.success_codes.text
        ),
    ]
}

async fn show_paths(cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    let config_dir = default_config_dir();
    let settings_path = store.path();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:    {}", config_dir.display());
            println!("Settings file: {}", settings_path.display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "configDir": config_dir.display().to_string(),
                "settingsFile": settings_path.display().to_string(),
            });
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format(&paths)?);
        }
    }

    Ok(())
}

async fn init_config(cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;

    if store.init().await? {
        println!("Wrote defaults to {}", store.path().display());
    } else {
        println!("Configuration already exists at {}", store.path().display());
    }

    Ok(())
}

async fn set_value(key: &str, value: &str, cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    store.set_value(key, value).await?;
    store.save().await?;

    info!(key, value, "Setting updated");
    println!("{key} updated");

    Ok(())
}

async fn set_method(method: MethodArg, cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    store.set_api_method(method.into()).await;
    store.save().await?;

    let method = store.api_method().await;
    info!(method = %method, "API method updated");
    println!("API method set to: {method}");

    Ok(())
}

async fn reset_config(cli: &Cli) -> Result<()> {
    let store = open_store(cli).await?;
    let path = store.path();

    if tokio::fs::try_exists(path).await? {
        tokio::fs::remove_file(path).await?;
        info!(path = %path.display(), "Settings reset");
        println!("Configuration reset to defaults");
    } else {
        println!("No configuration file to reset");
    }

    Ok(())
}
