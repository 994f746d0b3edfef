//! Generic tool handler
//!
//! Every catalog entry runs through the same pipeline: normalize the raw
//! arguments, parse and validate the caller's filter, conjoin the tool's
//! preset, admit against the rate limiter and dispatch to the backend.

use crate::config::Config;
use crate::dispatch::{
    BackendCall, Dispatcher, HttpBackend, RetryPolicy, SearchBackend, SearchResult,
};
use crate::error::{PiaError, Result};
use crate::filter::{compose, parse, validate, FacetSet, Warning};
use crate::ratelimit::RateLimiter;
use crate::registry::{ToolKind, ToolRegistry, ToolSpec};
use crate::request::{normalize, Param, SearchRequest};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// Rate-limit key used when the caller does not identify itself
pub const DEFAULT_CALLER: &str = "default";

/// A request ready for dispatch, plus what was learned building it
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub request: SearchRequest,
    pub notes: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Result of one successful tool call
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub payload: Value,
    /// Filter text actually sent, preset included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    pub attempts: u32,
}

pub struct ToolService {
    config: Config,
    registry: ToolRegistry,
    facets: RwLock<Arc<FacetSet>>,
    limiter: RateLimiter,
    dispatcher: Dispatcher,
}

impl ToolService {
    /// Service talking to the configured HTTP backend
    pub fn new(config: Config) -> Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!("no API key configured; backend calls will be refused");
        }
        let backend = Arc::new(HttpBackend::new(&config)?);
        Self::with_backend(config, backend)
    }

    /// Service over any backend, with a fresh limiter and the PIA catalog
    pub fn with_backend(config: Config, backend: Arc<dyn SearchBackend>) -> Result<Self> {
        let registry = ToolRegistry::pia()?;
        let limiter = RateLimiter::new(config.rate_limit);
        let dispatcher = Dispatcher::new(
            backend,
            RetryPolicy::from(&config.retry),
            config.request_timeout(),
        );
        Ok(Self::from_parts(config, registry, limiter, dispatcher))
    }

    pub fn from_parts(
        config: Config,
        registry: ToolRegistry,
        limiter: RateLimiter,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            config,
            registry,
            facets: RwLock::new(Arc::new(FacetSet::pia_default())),
            limiter,
            dispatcher,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Current facet snapshot
    pub fn facets(&self) -> Arc<FacetSet> {
        match self.facets.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn merge_facets(&self, incoming: FacetSet) {
        if incoming.is_empty() {
            return;
        }
        let mut guard = match self.facets.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(fields = incoming.len(), "merging facets from backend response");
        Arc::make_mut(&mut guard).merge(incoming);
    }

    /// Build the backend request for `spec` without touching the network
    pub fn prepare(&self, spec: &ToolSpec, args: &Value) -> Result<Prepared> {
        let normalized = normalize(&spec.params, spec.mode, args, &self.config.limits())?;

        let user = match &normalized.filter {
            Some(text) => parse(text)?,
            None => None,
        };
        let legacy = match &normalized.legacy_filter {
            Some(text) => parse(text)?,
            None => None,
        };
        let user = compose(legacy, user);

        let warnings = match &user {
            Some(tree) => validate(tree, Some(&self.facets())),
            None => Vec::new(),
        };
        if self.config.strict_fields {
            if let Some(unknown) = warnings.iter().find(|w| w.is_unknown_field()) {
                return Err(PiaError::validation(unknown.to_string()));
            }
        }

        let params = &spec.params;
        let paginated = params.paginated();
        let request = SearchRequest {
            filter: compose(user, spec.preset.clone()),
            query: normalized.query,
            page: paginated.then_some(normalized.page),
            page_size: paginated.then_some(normalized.page_size),
            mode: if params.accepts(Param::SearchMode) {
                normalized.mode
            } else {
                None
            },
            include_facets: normalized.include_facets,
            id: normalized.id,
        };

        Ok(Prepared {
            request,
            notes: normalized.notes,
            warnings,
        })
    }

    /// Run one tool call end to end
    pub async fn call(
        &self,
        tool: &str,
        args: &Value,
        caller: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutcome> {
        let spec = self.registry.lookup(tool)?;

        if spec.kind == ToolKind::RateLimitStats {
            return self.rate_limit_stats(spec, args, caller, cancel).await;
        }

        let prepared = self.prepare(spec, args)?;
        for warning in &prepared.warnings {
            tracing::debug!(tool, %warning, "filter warning");
        }

        self.limiter.check(caller, Utc::now())?;

        let backend_tool = spec.backend_tool.as_deref().unwrap_or(&spec.name);
        let result = self
            .dispatcher
            .dispatch(backend_tool, &prepared.request, cancel)
            .await?;

        self.absorb_facets(spec, &result);

        tracing::info!(
            tool,
            caller,
            attempts = result.attempts,
            items = result.items().len(),
            "tool call completed"
        );

        Ok(ToolOutcome {
            tool: spec.name.clone(),
            filter: prepared.request.filter.as_ref().map(|f| f.to_string()),
            payload: result.payload,
            notes: prepared.notes,
            warnings: prepared.warnings,
            attempts: result.attempts,
        })
    }

    fn absorb_facets(&self, spec: &ToolSpec, result: &SearchResult) {
        let facets = match (spec.kind, result.facets()) {
            (_, Some(facets)) => FacetSet::from_response(facets),
            (ToolKind::Facets, None) => FacetSet::from_response(&result.payload),
            _ => return,
        };
        self.merge_facets(facets);
    }

    /// Local limiter state, plus the backend's own statistics when an API
    /// key is configured. Never counted against the caller's quota.
    async fn rate_limit_stats(
        &self,
        spec: &ToolSpec,
        args: &Value,
        caller: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolOutcome> {
        let mut notes: Vec<String> = match args.as_object() {
            Some(map) => map
                .keys()
                .map(|k| format!("ignored unsupported parameter '{}'", k))
                .collect(),
            None => Vec::new(),
        };
        let stats = self.limiter.snapshot();
        let current = self.limiter.stats(caller, Utc::now());

        let mut payload = json!({
            "caller": caller,
            "remaining": current.remaining,
            "reset_at": current.reset_at,
            "config": {
                "window_secs": stats.window_secs,
                "max_requests": stats.max_requests,
            },
            "totals": {
                "admitted": stats.admitted_total,
                "rejected": stats.rejected_total,
                "tracked_keys": stats.tracked_keys,
            },
        });

        let mut attempts = 0;
        let remote = spec
            .backend_tool
            .as_deref()
            .filter(|_| self.config.require_api_key().is_ok());
        if let Some(tool) = remote {
            match self
                .dispatcher
                .send(&BackendCall::new(tool, json!({})), cancel)
                .await
            {
                Ok(result) => {
                    attempts = result.attempts;
                    payload["server"] = result.payload;
                }
                Err(PiaError::Cancelled) => return Err(PiaError::Cancelled),
                Err(e) => {
                    tracing::warn!(tool, "backend rate limit stats unavailable: {}", e);
                    notes.push(format!("backend statistics unavailable: {}", e));
                }
            }
        }

        Ok(ToolOutcome {
            tool: spec.name.clone(),
            payload,
            filter: None,
            notes,
            warnings: Vec::new(),
            attempts,
        })
    }
}
