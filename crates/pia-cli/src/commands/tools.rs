//! Tools command

use crate::app::{OutputFormat, ToolsArgs};
use anyhow::Result;
use pia_core::{ToolKind, ToolRegistry};
use serde_json::json;

pub fn run(args: ToolsArgs, format: OutputFormat) -> Result<()> {
    let registry = ToolRegistry::pia()?;

    if let Some(name) = &args.name {
        let spec = registry.lookup(name)?;
        let definition = json!({
            "name": spec.name,
            "description": spec.description,
            "backendTool": spec.backend_tool,
            "preset": spec.preset_text(),
            "inputSchema": spec.input_schema(),
        });
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&definition)?),
            OutputFormat::Cli => {
                println!("{}", spec.name);
                println!();
                println!("{}", spec.description);
                println!();
                if let Some(preset) = spec.preset_text() {
                    println!("Preset:   {}", preset);
                }
                if let Some(backend) = &spec.backend_tool {
                    println!("Backend:  {}", backend);
                }
                let params: Vec<&str> = spec.params.accepted.iter().map(|p| p.name()).collect();
                println!("Params:   {}", params.join(", "));
            }
        }
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            let tools = pia_mcp::tool_definitions(&registry);
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
        OutputFormat::Cli => {
            for spec in registry.iter() {
                let kind = match spec.kind {
                    ToolKind::Search => "search",
                    ToolKind::Facets => "facets",
                    ToolKind::ConnectorSearch => "connector",
                    ToolKind::Fetch => "fetch",
                    ToolKind::RateLimitStats => "stats",
                };
                match spec.preset_text() {
                    Some(preset) => println!("{:<38} {:<10} {}", spec.name, kind, preset),
                    None => println!("{:<38} {}", spec.name, kind),
                }
            }
        }
    }
    Ok(())
}
