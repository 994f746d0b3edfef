//! HTTP backend against a mock JSON-RPC server

use pia_core::dispatch::{
    BackendCall, BackendFailure, Dispatcher, HttpBackend, RetryPolicy, SearchBackend,
};
use pia_core::{Config, PiaError, SearchRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    let config = Config {
        api_url: format!("{}/mcp", server.uri()),
        api_key: Some("test-key".to_string()),
        request_timeout_secs: 5,
        ..Default::default()
    };
    HttpBackend::new(&config).unwrap()
}

fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

#[tokio::test]
async fn test_envelope_and_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("x-api-key", "test-key"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {
                "name": "pia_search_content",
                "arguments": {"query": "fraud", "filter": "SourceDocumentDataSource eq 'GAO'"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"output": {"total_count": 1, "results": [{"id": "GAO-24-1"}]}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let call = BackendCall::new(
        "pia_search_content",
        json!({"query": "fraud", "filter": "SourceDocumentDataSource eq 'GAO'"}),
    );
    let payload = backend(&server).call(&call).await.unwrap();
    assert_eq!(payload["output"]["results"][0]["id"], "GAO-24-1");
}

#[tokio::test]
async fn test_status_classification() {
    let cases = [
        (500, true),
        (503, true),
        (408, true),
        (429, true),
        (400, false),
        (401, false),
        (404, false),
    ];

    for (status, transient) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let failure = backend(&server)
            .call(&BackendCall::new("search", json!({"query": "q"})))
            .await
            .unwrap_err();
        assert_eq!(failure.is_transient(), transient, "status {status}");
        let expected = if transient {
            format!("HTTP {status}: nope")
        } else {
            "nope".to_string()
        };
        assert_eq!(failure.message(), expected, "status {status}");
    }
}

#[tokio::test]
async fn test_rejection_without_body_names_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let failure = backend(&server)
        .call(&BackendCall::new("search", json!({"query": "q"})))
        .await
        .unwrap_err();
    assert_eq!(failure, BackendFailure::Rejected("HTTP 403".to_string()));
}

#[tokio::test]
async fn test_jsonrpc_error_is_rejected_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "Invalid filter: Unknown field 'Foo'"}
        })))
        .mount(&server)
        .await;

    let failure = backend(&server)
        .call(&BackendCall::new("search", json!({"query": "q"})))
        .await
        .unwrap_err();
    assert_eq!(
        failure,
        BackendFailure::Rejected("Invalid filter: Unknown field 'Foo'".to_string())
    );
}

#[tokio::test]
async fn test_dispatcher_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "result": {"output": {"results": []}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        Arc::new(backend(&server)),
        quick_retries(),
        Duration::from_secs(5),
    );
    let result = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    assert!(result.items().is_empty());
}

#[tokio::test]
async fn test_dispatcher_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("  Invalid filter: unknown field 'Bogus'\n"))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new(
        Arc::new(backend(&server)),
        quick_retries(),
        Duration::from_secs(5),
    );
    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PiaError::RequestRejected(ref m) if m == "  Invalid filter: unknown field 'Bogus'\n"));
}

#[tokio::test]
async fn test_unreachable_backend_is_unavailable() {
    let config = Config {
        api_url: "http://127.0.0.1:9/mcp".to_string(),
        api_key: Some("k".to_string()),
        request_timeout_secs: 2,
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(
        Arc::new(HttpBackend::new(&config).unwrap()),
        quick_retries(),
        Duration::from_secs(2),
    );

    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PiaError::BackendUnavailable { attempts: 3, .. }));
}
