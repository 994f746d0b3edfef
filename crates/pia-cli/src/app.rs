//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pia")]
#[command(
    author,
    version,
    about = "MCP tool server for the Program Integrity Alliance search API"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/pia-mcp/config.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API key for the PIA backend
    #[arg(long, global = true, env = "PIA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Backend URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the MCP server on stdio
    Serve,

    /// Parse and check a filter expression
    Filter(FilterArgs),

    /// List the tool catalog
    Tools(ToolsArgs),

    /// Call one tool and print the result
    Call(CallArgs),

    /// List the tools and prompts of the remote PIA server
    Interrogate,

    /// Show or create the config file
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct FilterArgs {
    /// Filter expression, e.g. "SourceDocumentDataSource eq 'GAO'"
    pub expression: String,

    /// Show the filter as this tool would send it, preset included
    #[arg(long)]
    pub tool: Option<String>,
}

#[derive(Args)]
pub struct ToolsArgs {
    /// Show one tool with its input schema
    pub name: Option<String>,
}

#[derive(Args)]
pub struct CallArgs {
    /// Tool name
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long, short, default_value = "{}")]
    pub args: String,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
