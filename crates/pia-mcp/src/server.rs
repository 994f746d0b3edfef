//! MCP server implementation
//!
//! Reads line-delimited JSON-RPC from the input stream. Each request runs in
//! its own task, bounded by a semaphore, so a slow backend call never blocks
//! the rest of the session. Responses are written by a single writer task.

use crate::prompts;
use crate::protocol::*;
use crate::tools;
use anyhow::Result;
use pia_core::{PiaError, ToolService, DEFAULT_CALLER};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct McpServer {
    service: Arc<ToolService>,
    /// Rate-limit key, taken from `clientInfo.name` at initialize
    caller: Arc<RwLock<String>>,
    /// Tokens of running requests by JSON-RPC id. Clients may reuse an id,
    /// so each entry is tagged with a per-session sequence number.
    in_flight: Arc<Mutex<HashMap<String, Vec<(u64, CancellationToken)>>>>,
    permits: Arc<Semaphore>,
}

impl McpServer {
    pub fn new(service: Arc<ToolService>) -> Self {
        let permits = service.config().max_concurrent_calls.max(1);
        Self {
            service,
            caller: Arc::new(RwLock::new(DEFAULT_CALLER.to_string())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Serve over stdin/stdout until stdin closes
    pub async fn run(&self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve over any line-oriented stream pair
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(BufWriter::new(writer), rx));

        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();
        let mut seq: u64 = 0;

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(JsonRpcResponse::error(
                        None,
                        PARSE_ERROR,
                        &format!("Parse error: {}", e),
                    ));
                    continue;
                }
            };

            if request.is_notification() {
                self.handle_notification(&request);
                continue;
            }

            seq += 1;
            let ticket = seq;
            let cancel = CancellationToken::new();
            if let Some(key) = request_key(&request.id) {
                self.lock_in_flight()
                    .entry(key)
                    .or_default()
                    .push((ticket, cancel.clone()));
            }

            let server = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let key = request_key(&request.id);
                let response = server.dispatch(&request, &cancel).await;
                if let Some(key) = key {
                    server.finish(&key, ticket);
                }
                if let Some(response) = response {
                    let _ = tx.send(response);
                }
            });

            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}
        drop(tx);
        writer_task.await??;
        Ok(())
    }

    fn lock_in_flight(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(u64, CancellationToken)>>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop one request's token, leaving others that share its id
    fn finish(&self, key: &str, ticket: u64) {
        let mut in_flight = self.lock_in_flight();
        if let Some(entries) = in_flight.get_mut(key) {
            entries.retain(|(t, _)| *t != ticket);
            if entries.is_empty() {
                in_flight.remove(key);
            }
        }
    }

    fn caller(&self) -> String {
        match self.caller.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/cancelled" => {
                let tokens: Vec<CancellationToken> =
                    match request_key(&request.params.get("requestId").cloned()) {
                        Some(key) => self
                            .lock_in_flight()
                            .get(&key)
                            .map(|entries| entries.iter().map(|(_, t)| t.clone()).collect())
                            .unwrap_or_default(),
                        None => Vec::new(),
                    };
                if tokens.is_empty() {
                    tracing::debug!("cancellation for unknown request ignored");
                }
                for token in tokens {
                    tracing::debug!(request_id = ?request.params.get("requestId"), "cancelling request");
                    token.cancel();
                }
            }
            "notifications/initialized" => {}
            other => tracing::debug!(method = other, "ignoring notification"),
        }
    }

    /// Handle one request; `None` means the request was cancelled and gets no reply
    async fn dispatch(
        &self,
        request: &JsonRpcRequest,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return Some(JsonRpcResponse::error(
                        request.id.clone(),
                        INTERNAL_ERROR,
                        "server is shutting down",
                    ))
                }
            },
        };
        self.handle_request(request, cancel).await
    }

    pub async fn handle_request(
        &self,
        request: &JsonRpcRequest,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "ping" => JsonRpcResponse::success(request.id.clone(), json!({})),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => return self.handle_tools_call(request, cancel).await,
            "resources/list" => self.handle_resources_list(request),
            "prompts/list" => self.handle_prompts_list(request),
            "prompts/get" => self.handle_prompts_get(request),
            _ => JsonRpcResponse::error(
                request.id.clone(),
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        if let Some(name) = request
            .params
            .pointer("/clientInfo/name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            tracing::info!(client = name, "client connected");
            match self.caller.write() {
                Ok(mut guard) => *guard = name.to_string(),
                Err(poisoned) => *poisoned.into_inner() = name.to_string(),
            }
        }

        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": { "subscribe": false },
                "prompts": {}
            },
            "serverInfo": {
                "name": "pia-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        JsonRpcResponse::success(request.id.clone(), result)
    }

    fn handle_tools_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let tools = tools::tool_definitions(self.service.registry());
        JsonRpcResponse::success(request.id.clone(), json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        request: &JsonRpcRequest,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let Some(name) = request.params.get("name").and_then(Value::as_str) else {
            return Some(JsonRpcResponse::error(
                request.id.clone(),
                INVALID_PARAMS,
                "tools/call requires a tool name",
            ));
        };

        let arguments = request
            .params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        tracing::debug!(tool = name, "tool call");
        let caller = self.caller();

        let result = match self.service.call(name, &arguments, &caller, cancel).await {
            Ok(outcome) => tools::outcome_result(&outcome),
            Err(PiaError::Cancelled) => {
                tracing::debug!(tool = name, "tool call cancelled");
                return None;
            }
            Err(e) => {
                if e.is_caller_error() {
                    tracing::debug!(tool = name, error = %e, "tool call refused");
                } else {
                    tracing::warn!(tool = name, error = %e, "tool call failed");
                }
                tools::error_result(&e)
            }
        };

        Some(match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(request.id.clone(), value),
            Err(e) => JsonRpcResponse::error(request.id.clone(), INTERNAL_ERROR, &e.to_string()),
        })
    }

    fn handle_resources_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(request.id.clone(), json!({ "resources": [] }))
    }

    fn handle_prompts_list(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            request.id.clone(),
            json!({ "prompts": prompts::prompt_definitions() }),
        )
    }

    fn handle_prompts_get(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let Some(name) = request.params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                request.id.clone(),
                INVALID_PARAMS,
                "prompts/get requires a prompt name",
            );
        };
        let arguments = request.params.get("arguments").cloned().unwrap_or(Value::Null);

        match prompts::get_prompt(name, &arguments).and_then(|p| Ok(serde_json::to_value(p)?)) {
            Ok(value) => JsonRpcResponse::success(request.id.clone(), value),
            Err(e) => JsonRpcResponse::error(request.id.clone(), INVALID_PARAMS, &e.to_string()),
        }
    }
}

/// Map key for a request id; ids may be numbers or strings
fn request_key(id: &Option<Value>) -> Option<String> {
    id.as_ref().filter(|v| !v.is_null()).map(Value::to_string)
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

pub async fn start_server(service: Arc<ToolService>) -> Result<()> {
    let server = McpServer::new(service);
    server.run().await
}
