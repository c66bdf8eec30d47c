//! Usage command - discover the server and show quotas once.

use anyhow::Result;
use clap::{Args, ValueEnum};
use quotawatch_core::QuotaApiMethod;
use quotawatch_probe::QuotaFetcher;
use tracing::{info, warn};

use crate::commands::discover;
use crate::context::AppContext;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for the usage command.
#[derive(Args, Default)]
pub struct UsageArgs {
    /// Endpoint to query. Defaults to the configured method.
    #[arg(long, short, value_enum)]
    pub method: Option<MethodArg>,
}

/// Quota endpoint selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// `GetUserStatus`: models, plan and prompt credits.
    UserStatus,
    /// `GetCommandModelConfigs`: models only.
    ModelConfig,
}

impl From<MethodArg> for QuotaApiMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::UserStatus => Self::UserStatus,
            MethodArg::ModelConfig => Self::ModelConfig,
        }
    }
}

/// Runs the usage command.
pub async fn run(args: &UsageArgs, cli: &Cli) -> Result<()> {
    let ctx = AppContext::load(cli).await?;
    let method = args.method.map_or(ctx.settings.api_method, QuotaApiMethod::from);

    info!(method = %method, platform = ctx.platform().display_name(), "Fetching quota");

    let bundle = discover(&ctx, cli).await?;
    let snapshot = match ctx.service().fetch(method, &bundle).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(category = %e.category(), error = %e, "Quota fetch failed");
            return Err(e.into());
        }
    };

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::with_settings(!cli.no_color, &ctx.settings);
            println!("{}", formatter.format_snapshot(&snapshot));
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_snapshot(&snapshot, method)?);
        }
    }

    Ok(())
}
