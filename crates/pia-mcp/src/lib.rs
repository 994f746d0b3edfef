//! PIA MCP Server
//!
//! Model Context Protocol server exposing the PIA search tools to AI assistants.

mod prompts;
mod protocol;
mod server;
mod tools;

pub use prompts::{get_prompt, prompt_definitions};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
pub use server::{start_server, McpServer};
pub use tools::tool_definitions;
