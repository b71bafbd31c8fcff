// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test scenario interception middleware
//!
//! Requests carrying a live test session id are matched against the
//! session's scenario. A matching response config hands the request to the
//! scenario's strategy, which may record it, delay it, answer it outright or
//! rewrite the controller's answer. Every other request reaches the
//! controller exactly as it arrived.

use crate::error::ServerError;
use crate::handlers::mobile;
use crate::state::AppState;
use crate::strategies::InterceptedRequest;
use axum::{
    body::{self, Body},
    extract::{MatchedPath, Query, Request, State},
    http::{HeaderMap, HeaderValue, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use mb_logging::SCENARIO_LOG_TARGET;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

pub const SESSION_HEADER: &str = "x-test-session-id";
pub const SESSION_PARAM: &str = "test_session_id";
pub const SCENARIO_HEADER: &str = "x-test-scenario";

/// Control API prefix; requests under it are never intercepted.
pub const CONTROL_PREFIX: &str = "/api/test-scenarios";

/// Health probe; a `*` response config must not capture it.
const HEALTH_PATH: &str = "/health";

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Session id from the header, then the query string, then (when
/// `include_cookie`) the `test_session_id` cookie.
pub fn extract_session_id(headers: &HeaderMap, uri: &Uri, include_cookie: bool) -> Option<String> {
    if let Some(id) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
    {
        return Some(id);
    }
    if let Some(id) = Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.get(SESSION_PARAM).and_then(|v| non_empty(v)))
    {
        return Some(id);
    }
    if include_cookie {
        return CookieJar::from_headers(headers)
            .get(SESSION_PARAM)
            .and_then(|cookie| non_empty(cookie.value()));
    }
    None
}

/// Endpoint identifier: route name, else route template, else raw path.
fn endpoint_of(request: &Request) -> String {
    let template = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string());
    if let Some(name) = template
        .as_deref()
        .and_then(|t| mobile::route_name(request.method(), t))
    {
        return name.to_string();
    }
    template
        .unwrap_or_else(|| request.uri().path().to_string())
        .trim_start_matches('/')
        .to_string()
}

fn is_excluded_path(path: &str) -> bool {
    path == HEALTH_PATH
        || path == CONTROL_PREFIX
        || path
            .strip_prefix(CONTROL_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Axum middleware applying test scenarios to requests.
pub async fn scenario_pipeline(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let metrics = &state.metrics;
    metrics.record_seen();
    let settings = &state.config.scenarios;

    if !settings.enabled || is_excluded_path(request.uri().path()) {
        metrics.record_passed_through();
        return next.run(request).await;
    }

    let Some(session_id) = extract_session_id(request.headers(), request.uri(), true) else {
        metrics.record_passed_through();
        return next.run(request).await;
    };

    let Some(session) = state.sessions.get(&session_id).await else {
        warn!(
            target: SCENARIO_LOG_TARGET,
            session_id = %session_id,
            path = request.uri().path(),
            "Invalid or expired test session"
        );
        metrics.record_passed_through();
        return next.run(request).await;
    };

    state.sessions.increment_request_count(&session_id).await;

    let Some(scenario) = state.scenarios.get(&session.scenario) else {
        error!(
            target: SCENARIO_LOG_TARGET,
            session_id = %session_id,
            scenario = %session.scenario,
            "Scenario not found for test session"
        );
        metrics.record_passed_through();
        return next.run(request).await;
    };

    let endpoint = endpoint_of(&request);

    let strategy_key = scenario.definition.strategy_key().to_string();
    let Some(strategy) = state.strategies.resolve(&strategy_key) else {
        error!(
            target: SCENARIO_LOG_TARGET,
            session_id = %session_id,
            scenario = %session.scenario,
            strategy = %strategy_key,
            "No strategy available for scenario"
        );
        metrics.record_passed_through();
        return next.run(request).await;
    };

    let Some(config) = scenario.response_for(&endpoint) else {
        metrics.record_passed_through();
        return next.run(request).await;
    };
    metrics.record_intercepted();

    if settings.debug.logging {
        info!(
            target: SCENARIO_LOG_TARGET,
            session_id = %session_id,
            scenario = %session.scenario,
            endpoint = %endpoint,
            strategy = strategy.name(),
            config_type = ?config.config.kind,
            "Processing test scenario request"
        );
    }

    let (parts, body) = request.into_parts();
    let bytes = match body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(target: SCENARIO_LOG_TARGET, session_id = %session_id, error = %err, "Failed to buffer request body");
            return ServerError::PayloadTooLarge.into_response();
        }
    };
    let intercepted = InterceptedRequest::from_parts(&parts, endpoint.as_str(), &bytes);

    let outcome = strategy.process_request(&intercepted, &config, &session).await;
    debug!(
        target: SCENARIO_LOG_TARGET,
        session_id = %session_id,
        proceed = outcome.proceed,
        details = %serde_json::Value::Object(outcome.details),
        "Pre-request hook completed"
    );

    let response = if strategy.should_override(&config) {
        match strategy.generate_response(&intercepted, &config, &session).await {
            Some(response) => {
                metrics.record_overridden();
                response
            }
            None => {
                let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
                metrics.record_post_processed();
                strategy.process_response(response, &config, &session).await
            }
        }
    } else {
        let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
        metrics.record_post_processed();
        strategy.process_response(response, &config, &session).await
    };

    if settings.debug.headers {
        with_debug_headers(response, &session.scenario, &session_id)
    } else {
        response
    }
}

fn with_debug_headers(mut response: Response, scenario: &str, session_id: &str) -> Response {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(scenario) {
        headers.insert(SCENARIO_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(session_id) {
        headers.insert(SESSION_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).expect("name"),
                HeaderValue::from_str(value).expect("value"),
            );
        }
        map
    }

    #[test]
    fn header_beats_query_beats_cookie() {
        let uri: Uri = "/x?test_session_id=from-query".parse().expect("uri");
        let all = headers(&[
            ("x-test-session-id", "from-header"),
            (header::COOKIE.as_str(), "test_session_id=from-cookie"),
        ]);
        assert_eq!(extract_session_id(&all, &uri, true).as_deref(), Some("from-header"));

        let cookie_only = headers(&[(header::COOKIE.as_str(), "a=1; test_session_id=from-cookie")]);
        assert_eq!(
            extract_session_id(&cookie_only, &uri, true).as_deref(),
            Some("from-query")
        );
        let bare: Uri = "/x".parse().expect("uri");
        assert_eq!(
            extract_session_id(&cookie_only, &bare, true).as_deref(),
            Some("from-cookie")
        );
        assert_eq!(extract_session_id(&cookie_only, &bare, false), None);
    }

    #[test]
    fn blank_values_are_ignored() {
        let uri: Uri = "/x?test_session_id=".parse().expect("uri");
        let blank = headers(&[("x-test-session-id", "  ")]);
        assert_eq!(extract_session_id(&blank, &uri, true), None);
    }

    #[test]
    fn control_prefix_and_probes_are_excluded() {
        assert!(is_excluded_path("/api/test-scenarios"));
        assert!(is_excluded_path("/api/test-scenarios/activate"));
        assert!(is_excluded_path("/health"));
        assert!(!is_excluded_path("/api/test-scenarios-extra"));
        assert!(!is_excluded_path("/mobile-api/v1/catalog/hydrate"));
    }
}
