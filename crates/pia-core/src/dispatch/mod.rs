//! Backend dispatch with retry and cancellation
//!
//! Provides:
//! - Translation of a [`SearchRequest`] into backend tool arguments
//! - Per-attempt timeouts and bounded exponential backoff
//! - Mapping of backend failures onto the caller-facing error taxonomy

mod backend;
mod retry;

pub use backend::{
    is_transient_status, unwrap_envelope, BackendCall, BackendFailure, HttpBackend, SearchBackend,
};
pub use retry::RetryPolicy;

use crate::error::{PiaError, Result};
use crate::request::SearchRequest;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backend payload plus how many attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// The backend `result`, unmodified
    pub payload: Value,
    pub attempts: u32,
    /// JSON found inside the payload's text content, if any
    embedded: Option<Value>,
}

impl SearchResult {
    pub fn new(payload: Value, attempts: u32) -> Self {
        let embedded = payload
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| {
                items.iter().find_map(|item| {
                    item.get("text")
                        .and_then(Value::as_str)
                        .and_then(|text| serde_json::from_str::<Value>(text).ok())
                        .filter(Value::is_object)
                })
            });
        Self {
            payload,
            attempts,
            embedded,
        }
    }

    /// Find `key` in the payload or the usual wrappers around it
    fn locate(&self, key: &str) -> Option<&Value> {
        let roots = std::iter::once(&self.payload).chain(self.embedded.as_ref());
        for root in roots {
            let candidates = [
                Some(root),
                root.get("output"),
                root.get("structuredContent"),
                root.get("structuredContent").and_then(|s| s.get("output")),
            ];
            for candidate in candidates.into_iter().flatten() {
                if let Some(found) = candidate.get(key) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Result items; empty when the backend found nothing
    pub fn items(&self) -> &[Value] {
        self.locate("results")
            .or_else(|| self.locate("items"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn citations(&self) -> &[Value] {
        self.locate("citations")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn facets(&self) -> Option<&Value> {
        self.locate("facets").filter(|f| !f.is_null())
    }

    pub fn total_count(&self) -> Option<u64> {
        self.locate("total_count").and_then(Value::as_u64)
    }
}

/// Build backend tool arguments from a resolved request.
///
/// Only fields the request carries are sent; the filter goes out as text.
pub fn backend_arguments(request: &SearchRequest) -> Value {
    let mut args = Map::new();
    if let Some(query) = &request.query {
        args.insert("query".into(), Value::String(query.clone()));
    }
    if let Some(filter) = &request.filter {
        args.insert("filter".into(), Value::String(filter.to_string()));
    }
    if let Some(page) = request.page {
        args.insert("page".into(), page.into());
    }
    if let Some(page_size) = request.page_size {
        args.insert("page_size".into(), page_size.into());
    }
    if let Some(mode) = request.mode {
        args.insert("search_mode".into(), Value::String(mode.to_string()));
    }
    if request.include_facets {
        args.insert("include_facets".into(), Value::Bool(true));
    }
    if let Some(id) = &request.id {
        args.insert("id".into(), Value::String(id.clone()));
    }
    Value::Object(args)
}

/// Sends backend calls with retries
pub struct Dispatcher {
    backend: Arc<dyn SearchBackend>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn SearchBackend>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            backend,
            policy,
            attempt_timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Serialize `request` for `tool` and send it
    pub async fn dispatch(
        &self,
        tool: &str,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResult> {
        let call = BackendCall::new(tool, backend_arguments(request));
        self.send(&call, cancel).await
    }

    /// Run `call` until it succeeds, is rejected, runs out of attempts or is cancelled
    pub async fn send(&self, call: &BackendCall, cancel: &CancellationToken) -> Result<SearchResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PiaError::Cancelled),
                outcome = tokio::time::timeout(self.attempt_timeout, self.backend.call(call)) => outcome,
            };

            let failure = match outcome {
                Ok(Ok(payload)) => {
                    tracing::debug!(tool = %call.tool, attempt, "backend call succeeded");
                    return Ok(SearchResult::new(payload, attempt));
                }
                Ok(Err(failure)) => failure,
                Err(_) => BackendFailure::Transient(format!(
                    "attempt timed out after {}s",
                    self.attempt_timeout.as_secs_f64()
                )),
            };

            let message = match failure {
                BackendFailure::Rejected(message) => {
                    tracing::warn!(tool = %call.tool, %message, "backend rejected request");
                    return Err(PiaError::RequestRejected(message));
                }
                BackendFailure::Transient(message) => message,
            };

            if !self.policy.should_retry(attempt) {
                tracing::warn!(tool = %call.tool, attempt, %message, "backend unavailable");
                return Err(PiaError::BackendUnavailable {
                    attempts: attempt,
                    message,
                });
            }

            let delay = self.policy.delay_after(attempt);
            tracing::info!(
                tool = %call.tool,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %message,
                "transient backend failure, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PiaError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;
    use crate::request::SearchMode;
    use serde_json::json;

    #[test]
    fn test_backend_arguments() {
        let request = SearchRequest::query("fraud")
            .with_filter(parse("SourceDocumentDataSource eq 'GAO' and RecStatus eq 'Open'").unwrap())
            .with_paging(2, 25);
        let request = SearchRequest {
            mode: Some(SearchMode::Titles),
            include_facets: true,
            ..request
        };

        assert_eq!(
            backend_arguments(&request),
            json!({
                "query": "fraud",
                "filter": "SourceDocumentDataSource eq 'GAO' and RecStatus eq 'Open'",
                "page": 2,
                "page_size": 25,
                "search_mode": "titles",
                "include_facets": true
            })
        );
    }

    #[test]
    fn test_backend_arguments_minimal() {
        assert_eq!(
            backend_arguments(&SearchRequest::query("q")),
            json!({"query": "q"})
        );
    }

    #[test]
    fn test_result_accessors_structured() {
        let result = SearchResult::new(
            json!({
                "output": {
                    "total_count": 2,
                    "results": [{"id": "a"}, {"id": "b"}],
                    "citations": [{"id": "a", "label": "[1]", "url": "https://example.org"}]
                }
            }),
            1,
        );
        assert_eq!(result.items().len(), 2);
        assert_eq!(result.citations().len(), 1);
        assert_eq!(result.total_count(), Some(2));
        assert!(result.facets().is_none());
    }

    #[test]
    fn test_result_accessors_embedded_text() {
        let text = json!({"facets": {"RecStatus": ["Open"]}}).to_string();
        let result = SearchResult::new(json!({"content": [{"type": "text", "text": text}]}), 1);
        assert!(result.facets().is_some());
        assert!(result.items().is_empty());
    }
}
