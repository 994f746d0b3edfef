//! Retry, rejection and cancellation behavior of the dispatcher

use async_trait::async_trait;
use pia_core::dispatch::{
    BackendCall, BackendFailure, Dispatcher, RetryPolicy, SearchBackend,
};
use pia_core::{PiaError, SearchRequest};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Replays a script of outcomes, then succeeds forever
struct Scripted {
    script: Mutex<VecDeque<Result<Value, BackendFailure>>>,
    calls: AtomicU32,
}

impl Scripted {
    fn new(script: Vec<Result<Value, BackendFailure>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for Scripted {
    async fn call(&self, _call: &BackendCall) -> Result<Value, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(json!({"output": {"results": [{"id": "doc-1"}]}})))
    }
}

/// Never answers
struct Hanging {
    calls: AtomicU32,
}

#[async_trait]
impl SearchBackend for Hanging {
    async fn call(&self, _call: &BackendCall) -> Result<Value, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

fn transient(message: &str) -> Result<Value, BackendFailure> {
    Err(BackendFailure::Transient(message.to_string()))
}

fn dispatcher(backend: Arc<dyn SearchBackend>) -> Dispatcher {
    Dispatcher::new(backend, RetryPolicy::default(), Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn test_three_transient_failures_then_success() {
    let backend = Scripted::new(vec![
        transient("HTTP 503: unavailable"),
        transient("HTTP 502: bad gateway"),
        transient("request timed out"),
    ]);
    let dispatcher = dispatcher(backend.clone());

    let started = Instant::now();
    let result = dispatcher
        .dispatch(
            "pia_search_content",
            &SearchRequest::query("fraud"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.attempts, 4);
    assert_eq!(result.items().len(), 1);
    assert_eq!(backend.calls(), 4);
    assert!(backend.calls() <= dispatcher.policy().max_attempts);
    assert_eq!(started.elapsed(), dispatcher.policy().total_backoff());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_are_unavailable() {
    let backend = Scripted::new((0..10).map(|_| transient("HTTP 500: boom")).collect());
    let dispatcher = dispatcher(backend.clone());

    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        PiaError::BackendUnavailable { attempts, message } => {
            assert_eq!(attempts, 4);
            assert_eq!(message, "HTTP 500: boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_is_attempted_once() {
    let backend = Scripted::new(vec![Err(BackendFailure::Rejected(
        "HTTP 400: Invalid filter".to_string(),
    ))]);
    let dispatcher = dispatcher(backend.clone());

    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PiaError::RequestRejected(ref m) if m == "HTTP 400: Invalid filter"));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_transient() {
    let backend = Arc::new(Hanging {
        calls: AtomicU32::new(0),
    });
    let policy = RetryPolicy {
        max_attempts: 2,
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(backend.clone(), policy, Duration::from_secs(5));

    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PiaError::BackendUnavailable { attempts: 2, .. }));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_request() {
    let backend = Arc::new(Hanging {
        calls: AtomicU32::new(0),
    });
    let dispatcher = dispatcher(backend);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PiaError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let backend = Scripted::new((0..10).map(|_| transient("HTTP 503")).collect());
    let policy = RetryPolicy {
        initial_delay: Duration::from_secs(30),
        max_delay: Duration::from_secs(30),
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(backend.clone(), policy, Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PiaError::Cancelled));
    assert_eq!(backend.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_already_cancelled_makes_no_call() {
    let backend = Scripted::new(Vec::new());
    let dispatcher = dispatcher(backend.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = dispatcher
        .dispatch("search", &SearchRequest::query("q"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PiaError::Cancelled));
    assert_eq!(backend.calls(), 0);
}
