//! Call command

use crate::app::{CallArgs, OutputFormat};
use anyhow::{Context, Result};
use pia_core::{Config, PiaError, ToolService, DEFAULT_CALLER};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub async fn run(args: CallArgs, config: Config, format: OutputFormat) -> Result<()> {
    let arguments: Value = serde_json::from_str(&args.args)
        .map_err(|e| PiaError::validation(format!("--args is not valid JSON: {}", e)))?;

    let service = ToolService::new(config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = service
        .call(&args.tool, &arguments, DEFAULT_CALLER, &cancel)
        .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Cli => {
            if let Some(filter) = &outcome.filter {
                eprintln!("filter: {}", filter);
            }
            for note in &outcome.notes {
                eprintln!("note: {}", note);
            }
            for warning in &outcome.warnings {
                eprintln!("warning: {}", warning);
            }
            let text = serde_json::to_string_pretty(&outcome.payload)
                .context("failed to render backend payload")?;
            println!("{}", text);
        }
    }
    Ok(())
}
