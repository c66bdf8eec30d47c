//! CLI command implementations.

pub mod config;
pub mod detect;
pub mod usage;
pub mod watch;

use anyhow::Result;
use quotawatch_core::CredentialBundle;
use quotawatch_probe::Platform;
use tracing::{debug, info};

use crate::context::AppContext;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs discovery, printing the platform guidance when it fails.
///
/// Text guidance goes to stderr; in JSON mode the failure document goes to
/// stdout so scripts always get one object.
pub async fn discover(ctx: &AppContext, cli: &Cli) -> Result<CredentialBundle> {
    match ctx.discover().await {
        Ok(bundle) => {
            info!(port = bundle.connect_port, "Language server found");
            Ok(bundle)
        }
        Err(e) => {
            let messages = ctx.error_messages().await;
            match cli.format {
                OutputFormat::Text if !cli.quiet => {
                    let formatter = TextFormatter::new(!cli.no_color);
                    eprintln!("{}", formatter.format_discovery_failure(&messages));
                }
                OutputFormat::Text => {}
                OutputFormat::Json => {
                    let tools = tool_report(ctx.platform());
                    let formatter = JsonFormatter::new(cli.pretty);
                    println!(
                        "{}",
                        formatter.format_discovery_failure(
                            &messages,
                            ctx.platform().display_name(),
                            &tools
                        )?
                    );
                }
            }
            Err(e.into())
        }
    }
}

/// Inspection commands discovery relies on for a platform.
pub fn required_tools(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => &["wmic", "powershell", "netstat"],
        Platform::MacOs => &["ps", "lsof"],
        Platform::Linux => &["ps", "lsof", "ss"],
    }
}

/// Checks which inspection commands are on `PATH`.
pub fn tool_report(platform: Platform) -> Vec<(String, bool)> {
    required_tools(platform)
        .iter()
        .map(|tool| {
            let found = which::which(tool).is_ok();
            debug!(tool, found, "Tool lookup");
            ((*tool).to_string(), found)
        })
        .collect()
}
