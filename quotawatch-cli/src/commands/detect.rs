//! Detect command - locate the language server without fetching quotas.

use anyhow::Result;
use tracing::info;

use crate::commands::{discover, tool_report};
use crate::context::AppContext;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the detect command.
pub async fn run(cli: &Cli) -> Result<()> {
    let ctx = AppContext::load(cli).await?;
    let platform = ctx.platform();

    info!(platform = platform.display_name(), "Detecting language server");

    let bundle = discover(&ctx, cli).await?;
    let tools = tool_report(platform);

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_bundle(&bundle, platform.display_name()));
            println!();
            println!("Inspection tools:");
            println!("{}", formatter.format_tools(&tools));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!(
                "{}",
                formatter.format_bundle(&bundle, platform.display_name(), &tools)?
            );
        }
    }

    Ok(())
}
