//! PIA Core Library
//!
//! Core functionality for the Program Integrity Alliance MCP tool server.
//!
//! # Features
//! - OData-subset filter parser, serializer and validator
//! - Preset filter composition for per-agency tool variants
//! - Argument normalization with paging bounds and legacy filter translation
//! - Fixed-window rate limiting per caller
//! - JSON-RPC backend dispatch with retry, timeouts and cancellation

pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod ratelimit;
pub mod registry;
pub mod request;
pub mod service;

pub use config::{Config, RateLimitConfig, RetryConfig};
pub use dispatch::{
    BackendCall, BackendFailure, Dispatcher, HttpBackend, RetryPolicy, SearchBackend,
    SearchResult,
};
pub use error::{Error, ErrorKind, PiaError, Result, SyntaxError};
pub use filter::{compose, parse, to_filter_string, validate, Expr, FacetSet, Warning};
pub use ratelimit::{Decision, MemoryStore, RateLimitStore, RateLimiter};
pub use registry::{ToolKind, ToolRegistry, ToolSpec};
pub use request::{normalize, Limits, Normalized, SearchMode, SearchRequest};
pub use service::{Prepared, ToolOutcome, ToolService, DEFAULT_CALLER};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "pia-mcp";
