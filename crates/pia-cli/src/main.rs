//! PIA CLI
//!
//! MCP tool server and utilities for the Program Integrity Alliance search API.

use anyhow::Result;
use clap::Parser;
use pia_core::error::exit_codes;
use pia_core::{Config, PiaError};

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout carries the JSON-RPC stream, so logs go to stderr
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<PiaError>()
            .map(PiaError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve => commands::serve::run(config).await,
        Commands::Filter(args) => commands::filter::run(args, &config, cli.format),
        Commands::Tools(args) => commands::tools::run(args, cli.format),
        Commands::Call(args) => commands::call::run(args, config, cli.format).await,
        Commands::Interrogate => commands::interrogate::run(&config, cli.format).await,
        Commands::Config(args) => {
            commands::config::run(args, &config, cli.config.as_deref(), cli.format)
        }
    }
}

/// Defaults, then the config file, then `PIA_*` variables, then flags
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(key) = cli.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        config.api_key = Some(key.clone());
    }
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}
