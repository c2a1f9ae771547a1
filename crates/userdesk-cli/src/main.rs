//! userdesk command line tool
//!
//! Signs in against the admin API, edits the user schema and manages users
//! through forms and tables derived from that schema.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error};
use userdesk_cli::{App, Cli, commands};
use userdesk_core::context_error::Result;
use userdesk_core::{Config, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err.chain(), "command failed");
            eprintln!("error: {}", err.chain());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    init_logging(&config.logging)?;
    debug!(base_url = %config.api.base_url, "configuration resolved");

    let app = App::new(config, cli.json)?;
    commands::dispatch(&app, cli.command).await
}

/// File and environment first, then command line overrides
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_from(cli.config.as_deref())?;

    if let Some(base_url) = &cli.base_url {
        config.api.base_url.clone_from(base_url);
    }
    if let Some(token) = &cli.token {
        config.api.token = Some(token.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if cli.json {
        config.logging.format = "json".to_string();
    }

    config.validate()?;
    Ok(config)
}
