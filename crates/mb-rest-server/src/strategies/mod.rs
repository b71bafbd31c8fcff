// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-scenario interception behavior
//!
//! A strategy sees an intercepted request before the controller runs and the
//! controller's response afterwards. It can also take over the response
//! entirely. Strategies hold no per-session state; everything they record
//! goes to the session store or a tracker.

mod camera;
mod default;
mod remove_listing;
mod response_override;
mod rotation;

pub use camera::CameraPerformanceStrategy;
pub use default::DefaultStrategy;
pub use remove_listing::RemoveListingStrategy;
pub use response_override::OverrideStrategy;
pub use rotation::RotationStrategy;

use crate::scenarios::ResolvedOverride;
use crate::session_store::TestSession;
use crate::trackers::{Trackers, identifier_of};
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    extract::Query,
    http::{HeaderMap, Method, header, request::Parts},
    response::Response,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Strategy used when a scenario has no registered strategy of its own.
pub const DEFAULT_STRATEGY: &str = "default";

/// What a strategy gets to see of the inbound request.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub path: String,
    /// Route name, route template or raw path, whichever resolved first
    pub endpoint: String,
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    /// Body parsed as JSON; `None` when empty or not JSON
    pub body: Option<Value>,
}

impl InterceptedRequest {
    pub fn from_parts(parts: &Parts, endpoint: impl Into<String>, body: &[u8]) -> Self {
        let query = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let body = if body.is_empty() {
            None
        } else {
            serde_json::from_slice(body).ok()
        };
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            endpoint: endpoint.into(),
            query,
            headers: parts.headers.clone(),
            body,
        }
    }

    /// Body field first, then query parameter.
    pub fn input(&self, key: &str) -> Option<Value> {
        self.body
            .as_ref()
            .and_then(|body| body.get(key))
            .cloned()
            .or_else(|| self.query.get(key).map(|v| Value::String(v.clone())))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Result of the pre-request hook.
///
/// The pipeline logs it but does not act on `proceed`; only
/// [`ScenarioStrategy::should_override`] decides whether the controller runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PreHookOutcome {
    pub proceed: bool,
    pub details: Map<String, Value>,
}

impl PreHookOutcome {
    pub fn proceed() -> Self {
        Self {
            proceed: true,
            details: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[async_trait]
pub trait ScenarioStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before the controller. Side effects only.
    async fn process_request(
        &self,
        request: &InterceptedRequest,
        config: &ResolvedOverride,
        session: &TestSession,
    ) -> PreHookOutcome;

    /// Runs on the controller's response when the strategy did not override.
    async fn process_response(
        &self,
        response: Response,
        _config: &ResolvedOverride,
        _session: &TestSession,
    ) -> Response {
        response
    }

    fn should_override(&self, _config: &ResolvedOverride) -> bool {
        false
    }

    /// Complete response replacing the controller's.
    async fn generate_response(
        &self,
        _request: &InterceptedRequest,
        _config: &ResolvedOverride,
        _session: &TestSession,
    ) -> Option<Response> {
        None
    }
}

/// Strategy instances by key.
pub struct StrategyRegistry {
    strategies: RwLock<HashMap<String, Arc<dyn ScenarioStrategy>>>,
}

impl StrategyRegistry {
    /// Registry holding only the default strategy.
    pub fn new() -> Self {
        let registry = Self {
            strategies: RwLock::new(HashMap::new()),
        };
        registry.register(DEFAULT_STRATEGY, Arc::new(DefaultStrategy));
        registry
    }

    pub fn with_builtins(trackers: &Trackers) -> Self {
        let registry = Self::new();
        registry.register(
            "camera-performance-test",
            Arc::new(CameraPerformanceStrategy::new(trackers.camera.clone())),
        );
        registry.register(
            "rotation-test",
            Arc::new(RotationStrategy::new(trackers.rotation.clone())),
        );
        registry.register(
            "remove-listing-test",
            Arc::new(RemoveListingStrategy::new(trackers.remove_listing.clone())),
        );
        registry.register("override", Arc::new(OverrideStrategy));
        registry
    }

    /// Add or replace the strategy for `key`.
    pub fn register(&self, key: impl Into<String>, strategy: Arc<dyn ScenarioStrategy>) {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), strategy);
    }

    pub fn has(&self, key: &str) -> bool {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Strategy for `key`, else the default one. `None` only if the default
    /// strategy has been replaced by nothing, which the pipeline treats as a
    /// lookup failure.
    pub fn resolve(&self, key: &str) -> Option<Arc<dyn ScenarioStrategy>> {
        let strategies = self.strategies.read().unwrap_or_else(PoisonError::into_inner);
        strategies
            .get(key)
            .or_else(|| strategies.get(DEFAULT_STRATEGY))
            .cloned()
    }

    pub fn unregister(&self, key: &str) -> bool {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Edit a response body in place when it is a JSON object.
///
/// Status and headers are kept except `Content-Length`, which no longer
/// matches once the body is rewritten. Other bodies pass through untouched.
pub async fn map_json_object<F>(response: Response, edit: F) -> Response
where
    F: FnOnce(&mut Map<String, Value>) + Send,
{
    let (mut parts, body) = response.into_parts();
    let bytes = match body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "Failed to buffer response body for rewriting");
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };
    let Ok(Value::Object(mut object)) = serde_json::from_slice::<Value>(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };
    edit(&mut object);
    match serde_json::to_vec(&Value::Object(object)) {
        Ok(rewritten) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(rewritten))
        }
        Err(err) => {
            warn!(error = %err, "Failed to serialize rewritten response body");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

/// Set `value` at a dot-separated path, creating intermediate objects and
/// replacing non-object intermediates.
pub fn set_nested_value(target: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
}

/// Post-hook shared by the tracking strategies: pin `last_modified` to the
/// configured `fixed_last_modified` parameter.
pub(crate) async fn apply_fixed_last_modified(
    response: Response,
    config: &ResolvedOverride,
) -> Response {
    let Some(fixed) = config.config.parameter("fixed_last_modified").cloned() else {
        return response;
    };
    map_json_object(response, |object| {
        object.insert("last_modified".to_string(), fixed);
    })
    .await
}

/// Entries of `changes.<section>` in the request body.
pub(crate) fn changes_section(request: &InterceptedRequest, section: &str) -> Vec<Value> {
    request
        .input("changes")
        .and_then(|changes| changes.get(section).and_then(Value::as_array).cloned())
        .unwrap_or_default()
}

/// `id` when present and non-null, otherwise `temp_id`.
pub(crate) fn id_or_temp_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(id) if !id.is_null() => identifier_of(Some(id)),
        _ => identifier_of(item.get("temp_id")),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::session_store::SessionState;
    use axum::http::Request;
    use chrono::Utc;
    use mb_scenario_format::ResponseOverride;

    pub fn session(scenario: &str) -> TestSession {
        TestSession {
            session_id: "maestro_session_test".to_string(),
            scenario: scenario.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now(),
            metadata: Map::new(),
            state: SessionState::default(),
        }
    }

    pub fn resolved(config: Value) -> ResolvedOverride {
        let config: ResponseOverride = serde_json::from_value(config).expect("override config");
        ResolvedOverride {
            endpoint: "catalog.changes".to_string(),
            config,
            generator: None,
            handler: None,
        }
    }

    pub fn request(method: Method, uri: &str, endpoint: &str, body: Value) -> InterceptedRequest {
        let (parts, ()) = Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .expect("request")
            .into_parts();
        let bytes = if body.is_null() {
            Vec::new()
        } else {
            serde_json::to_vec(&body).expect("body")
        };
        InterceptedRequest::from_parts(&parts, endpoint, &bytes)
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }
}
