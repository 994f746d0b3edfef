//! Serve command

use anyhow::Result;
use pia_core::{Config, ToolService};
use std::sync::Arc;

pub async fn run(config: Config) -> Result<()> {
    config.require_api_key()?;
    tracing::info!(api_url = %config.api_url, "starting MCP server on stdio");

    let service = ToolService::new(config)?;
    pia_mcp::start_server(Arc::new(service)).await
}
