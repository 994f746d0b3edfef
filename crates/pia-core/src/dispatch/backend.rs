//! Remote search backend
//!
//! The PIA server is itself an MCP server reached over HTTP. Every tool call
//! is a JSON-RPC 2.0 `tools/call` envelope posted to the configured URL.

use crate::config::Config;
use crate::error::{PiaError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// One backend tool invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendCall {
    pub tool: String,
    pub arguments: Value,
}

impl BackendCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// Why a backend call failed, classified for the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFailure {
    /// Timeouts, transport errors, 5xx, 408 and 429
    Transient(String),
    /// The backend refused the request; retrying will not help
    Rejected(String),
}

impl BackendFailure {
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Rejected(m) => m,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Anything that can execute a backend tool call
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Execute one attempt and return the `result` payload verbatim
    async fn call(&self, call: &BackendCall) -> std::result::Result<Value, BackendFailure>;
}

/// HTTP statuses worth another attempt
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// JSON-RPC client for the remote PIA server
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    next_id: AtomicU64,
}

impl HttpBackend {
    /// Create a backend from configuration; the client timeout bounds each attempt
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("pia-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PiaError::Http)?;

        Ok(Self::with_client(
            client,
            config.api_url.clone(),
            config.api_key.clone(),
        ))
    }

    pub fn with_client(client: reqwest::Client, url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            url,
            api_key,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a JSON-RPC request and return its `result`
    pub async fn rpc(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, BackendFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&envelope);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        tracing::debug!(id, method, url = %self.url, "sending backend request");

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_transient_status(status) {
                return Err(BackendFailure::Transient(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    body.trim()
                )));
            }
            tracing::warn!(id, status = status.as_u16(), "backend rejected request");
            // The backend's own message goes back to the caller untouched
            let message = if body.trim().is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                body
            };
            return Err(BackendFailure::Rejected(message));
        }

        let body: Value = response.json().await.map_err(|e| {
            BackendFailure::Transient(format!("invalid response body: {}", e))
        })?;

        unwrap_envelope(body)
    }
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn call(&self, call: &BackendCall) -> std::result::Result<Value, BackendFailure> {
        self.rpc(
            "tools/call",
            json!({"name": call.tool, "arguments": call.arguments}),
        )
        .await
    }
}

fn transport_failure(err: reqwest::Error) -> BackendFailure {
    if err.is_builder() {
        BackendFailure::Rejected(format!("invalid request: {}", err))
    } else if err.is_timeout() {
        BackendFailure::Transient(format!("request timed out: {}", err))
    } else {
        BackendFailure::Transient(format!("request failed: {}", err))
    }
}

/// Split a JSON-RPC response into its result or a rejection.
///
/// An MCP tool result flagged `isError` counts as a rejection carrying the
/// tool's text. A response without `result` is an empty success.
pub fn unwrap_envelope(body: Value) -> std::result::Result<Value, BackendFailure> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(BackendFailure::Rejected(message));
    }

    let result = match body {
        Value::Object(mut map) => map.remove("result").unwrap_or(Value::Null),
        _ => return Err(BackendFailure::Transient("response is not a JSON object".into())),
    };

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        let text = result
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "backend tool reported an error".to_string());
        return Err(BackendFailure::Rejected(text));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_unwrap_result() {
        let payload = unwrap_envelope(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"output": {"total_count": 0, "results": []}}
        }))
        .unwrap();
        assert_eq!(payload["output"]["total_count"], 0);
    }

    #[test]
    fn test_unwrap_error_verbatim() {
        let failure = unwrap_envelope(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "Invalid filter: unknown field 'Foo'"}
        }))
        .unwrap_err();
        assert_eq!(
            failure,
            BackendFailure::Rejected("Invalid filter: unknown field 'Foo'".into())
        );
    }

    #[test]
    fn test_unwrap_tool_error() {
        let failure = unwrap_envelope(json!({
            "result": {"isError": true, "content": [{"type": "text", "text": "bad filter"}]}
        }))
        .unwrap_err();
        assert_eq!(failure.message(), "bad filter");
        assert!(!failure.is_transient());
    }

    #[test]
    fn test_missing_result_is_empty() {
        assert_eq!(unwrap_envelope(json!({"id": 1})).unwrap(), Value::Null);
    }
}
