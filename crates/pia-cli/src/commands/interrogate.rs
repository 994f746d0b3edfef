//! Interrogate command

use crate::app::OutputFormat;
use anyhow::Result;
use futures::future::join;
use pia_core::dispatch::{BackendFailure, HttpBackend};
use pia_core::{Config, PiaError};
use serde_json::{json, Value};

pub async fn run(config: &Config, format: OutputFormat) -> Result<()> {
    config.require_api_key()?;
    let backend = HttpBackend::new(config)?;

    tracing::info!(url = backend.url(), "interrogating backend");

    let (tools, prompts) = join(
        backend.rpc("tools/list", json!({})),
        backend.rpc("prompts/list", json!({})),
    )
    .await;
    let tools = tools.map_err(into_error)?;
    // Older deployments do not serve prompts
    let prompts = match prompts {
        Ok(prompts) => prompts,
        Err(e) => {
            tracing::warn!("prompts/list failed: {}", e.message());
            json!({"prompts": []})
        }
    };

    match format {
        OutputFormat::Json => {
            let output = json!({
                "url": backend.url(),
                "tools": tools.get("tools").cloned().unwrap_or_else(|| json!([])),
                "prompts": prompts.get("prompts").cloned().unwrap_or_else(|| json!([])),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Cli => {
            println!("Server: {}", backend.url());
            print_section("Tools", &tools, "tools");
            print_section("Prompts", &prompts, "prompts");
        }
    }
    Ok(())
}

fn print_section(title: &str, body: &Value, key: &str) {
    let items = body.get(key).and_then(Value::as_array);
    let count = items.map(Vec::len).unwrap_or(0);
    println!();
    println!("{} ({})", title, count);
    for item in items.into_iter().flatten() {
        let name = item.get("name").and_then(Value::as_str).unwrap_or("?");
        let description = item
            .get("description")
            .and_then(Value::as_str)
            .and_then(|d| d.lines().next())
            .unwrap_or("");
        println!("  {:<38} {}", name, description);
    }
}

fn into_error(failure: BackendFailure) -> PiaError {
    match failure {
        BackendFailure::Transient(message) => PiaError::BackendUnavailable {
            attempts: 1,
            message,
        },
        BackendFailure::Rejected(message) => PiaError::RequestRejected(message),
    }
}
