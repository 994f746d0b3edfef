//! Error types for the PIA server

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias using PiaError
pub type Result<T> = std::result::Result<T, PiaError>;

/// Error type alias for convenience
pub type Error = PiaError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_INPUT: i32 = 3;
    pub const BACKEND_ERROR: i32 = 4;
}

/// A filter string that does not follow the grammar.
///
/// `offset` is a byte offset into the original text. For unterminated
/// groups and strings it equals the text length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub expected: String,
    pub found: Option<String>,
}

impl SyntaxError {
    pub fn new(offset: usize, expected: impl Into<String>) -> Self {
        Self {
            offset,
            expected: expected.into(),
            found: None,
        }
    }

    pub fn found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(found) => write!(
                f,
                "{} at offset {}, found {}",
                self.expected, self.offset, found
            ),
            None => write!(f, "{} at offset {}", self.expected, self.offset),
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Main error type for the PIA server
#[derive(Debug, Error)]
pub enum PiaError {
    #[error("Filter syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry after {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Search backend unavailable after {attempts} attempt(s): {message}")]
    BackendUnavailable { attempts: u32, message: String },

    #[error("Request rejected by search backend: {0}")]
    RequestRejected(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Caller-facing classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SyntaxError,
    ValidationError,
    RateLimited,
    BackendUnavailable,
    RequestRejected,
    Cancelled,
    Internal,
}

impl PiaError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Map onto the fixed taxonomy reported to tool callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax(_) => ErrorKind::SyntaxError,
            Self::Validation(_) | Self::UnknownTool(_) => ErrorKind::ValidationError,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::BackendUnavailable { .. } | Self::Http(_) => ErrorKind::BackendUnavailable,
            Self::RequestRejected(_) => ErrorKind::RequestRejected,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Yaml(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the caller can fix the problem by changing its arguments
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SyntaxError | ErrorKind::ValidationError
        )
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::SyntaxError | ErrorKind::ValidationError => exit_codes::INVALID_INPUT,
            ErrorKind::BackendUnavailable | ErrorKind::RequestRejected => {
                exit_codes::BACKEND_ERROR
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
