// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Strategy that serves configured responses instead of the controller

use super::{InterceptedRequest, PreHookOutcome, ScenarioStrategy, map_json_object, set_nested_value};
use crate::generators::Variables;
use crate::scenarios::ResolvedOverride;
use crate::session_store::TestSession;
use async_trait::async_trait;
use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use mb_logging::SCENARIO_LOG_TARGET;
use mb_scenario_format::OverrideKind;
use serde_json::json;
use std::time::Duration;
use tracing::{error, warn};

/// Replaces the controller for `static`, `dynamic`, `error` and `custom`
/// configs. `normal` configs reach the controller and get `modify` applied
/// to the response.
pub struct OverrideStrategy;

fn status_or(code: Option<u16>, fallback: StatusCode) -> StatusCode {
    code.and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or(fallback)
}

fn failure(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn with_headers(mut response: Response, config: &ResolvedOverride) -> Response {
    for (name, value) in &config.config.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(
                target: SCENARIO_LOG_TARGET,
                endpoint = %config.endpoint,
                header = %name,
                "Skipping invalid override header"
            ),
        }
    }
    response
}

#[async_trait]
impl ScenarioStrategy for OverrideStrategy {
    fn name(&self) -> &str {
        "override"
    }

    async fn process_request(
        &self,
        _request: &InterceptedRequest,
        config: &ResolvedOverride,
        _session: &TestSession,
    ) -> PreHookOutcome {
        PreHookOutcome::proceed().with("override", config.config.kind.replaces_controller())
    }

    fn should_override(&self, config: &ResolvedOverride) -> bool {
        config.config.kind.replaces_controller()
    }

    async fn generate_response(
        &self,
        request: &InterceptedRequest,
        config: &ResolvedOverride,
        session: &TestSession,
    ) -> Option<Response> {
        let settings = &config.config;
        if let Some(ms) = settings.delay_ms.filter(|ms| *ms > 0) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let response = match settings.kind {
            OverrideKind::Normal => return None,
            OverrideKind::Static => {
                let mut data = settings.data.clone().unwrap_or_else(|| json!({}));
                Variables::at(Utc::now()).apply(&mut data);
                (status_or(settings.status_code, StatusCode::OK), Json(data)).into_response()
            }
            OverrideKind::Error => {
                let data = settings
                    .data
                    .clone()
                    .unwrap_or_else(|| json!({ "error": "Test scenario error" }));
                (
                    status_or(settings.status_code, StatusCode::INTERNAL_SERVER_ERROR),
                    Json(data),
                )
                    .into_response()
            }
            OverrideKind::Dynamic => {
                let Some(generator) = config.generator.as_ref() else {
                    error!(endpoint = %config.endpoint, "Dynamic override has no generator");
                    return Some(failure("Response generation failed"));
                };
                match generator.generate(&settings.parameters, session) {
                    Ok(data) => {
                        (status_or(settings.status_code, StatusCode::OK), Json(data)).into_response()
                    }
                    Err(err) => {
                        error!(
                            generator = generator.name(),
                            session_id = %session.session_id,
                            error = %err,
                            "Response generator failed"
                        );
                        return Some(failure("Response generation failed"));
                    }
                }
            }
            OverrideKind::Custom => {
                let Some(handler) = config.handler.as_ref() else {
                    error!(endpoint = %config.endpoint, "Custom override has no handler");
                    return Some(failure("Custom response failed"));
                };
                match handler.handle(request, session, settings) {
                    Ok(response) => response,
                    Err(err) => {
                        error!(
                            handler = handler.name(),
                            session_id = %session.session_id,
                            error = %err,
                            "Custom handler failed"
                        );
                        return Some(failure("Custom response failed"));
                    }
                }
            }
        };
        Some(with_headers(response, config))
    }

    async fn process_response(
        &self,
        response: Response,
        config: &ResolvedOverride,
        _session: &TestSession,
    ) -> Response {
        let modify = &config.config.modify;
        if config.config.kind != OverrideKind::Normal || modify.is_empty() {
            return response;
        }
        map_json_object(response, |object| {
            for (path, value) in modify {
                set_nested_value(object, path, value.clone());
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{CustomHandler, ResponseGenerator, SessionEchoHandler, SingleEventGenerator};
    use crate::strategies::test_support::*;
    use axum::http::Method;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    struct FailingGenerator;

    impl ResponseGenerator for FailingGenerator {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn generate(&self, _: &Map<String, Value>, _: &TestSession) -> anyhow::Result<Value> {
            anyhow::bail!("boom")
        }
    }

    fn get() -> InterceptedRequest {
        request(Method::GET, "/mobile-api/v1/catalog/sync?since=1", "catalog.sync", json!(null))
    }

    #[tokio::test]
    async fn error_configs_use_their_status_headers_and_data() {
        let config = resolved(json!({
            "type": "error",
            "status_code": 429,
            "headers": {"Retry-After": "60"},
            "data": {"error": "Too Many Requests", "retry_after": 60},
        }));
        let session = session("rate_limit");
        assert!(OverrideStrategy.should_override(&config));

        let response = OverrideStrategy
            .generate_response(&get(), &config, &session)
            .await
            .expect("override");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "60");
        assert_eq!(
            body_json(response).await,
            json!({"error": "Too Many Requests", "retry_after": 60})
        );
    }

    #[tokio::test]
    async fn error_without_data_gets_a_generic_body() {
        let config = resolved(json!({"type": "error"}));
        let response = OverrideStrategy
            .generate_response(&get(), &config, &session("server_error"))
            .await
            .expect("override");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"error": "Test scenario error"}));
    }

    #[tokio::test]
    async fn static_data_gets_variables_substituted() {
        let config = resolved(json!({
            "type": "static",
            "data": {"generated_at": "{{date}}", "id": "{{uuid}}", "fixed": "x"},
        }));
        let response = OverrideStrategy
            .generate_response(&get(), &config, &session("default"))
            .await
            .expect("override");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["fixed"], "x");
        assert_eq!(body["generated_at"], Utc::now().format("%Y-%m-%d").to_string());
        assert_eq!(body["id"].as_str().map(str::len), Some(36));
    }

    #[tokio::test]
    async fn generator_failures_become_generic_500s() {
        let mut config = resolved(json!({"type": "dynamic", "generator": "failing"}));
        config.generator = Some(Arc::new(FailingGenerator));
        let response = OverrideStrategy
            .generate_response(&get(), &config, &session("broken"))
            .await
            .expect("override");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"error": "Response generation failed"}));
    }

    #[tokio::test]
    async fn dynamic_configs_run_their_generator() {
        let mut config = resolved(json!({
            "type": "dynamic",
            "generator": "single_event",
            "parameters": {"event_count": 2, "listing_count": 1},
        }));
        config.generator = Some(Arc::new(SingleEventGenerator));
        let response = OverrideStrategy
            .generate_response(&get(), &config, &session("single_event"))
            .await
            .expect("override");
        let body = body_json(response).await;
        assert_eq!(body["events"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn custom_handlers_build_the_response() {
        let mut config = resolved(json!({"type": "custom", "handler": "session-echo", "status_code": 202}));
        let handler: Arc<dyn CustomHandler> = Arc::new(SessionEchoHandler);
        config.handler = Some(handler);
        let response = OverrideStrategy
            .generate_response(&get(), &config, &session("echo"))
            .await
            .expect("override");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["endpoint"], "catalog.sync");
        assert_eq!(body["query"], json!({"since": "1"}));
    }

    #[tokio::test]
    async fn normal_configs_pass_through_with_modifications() {
        let config = resolved(json!({
            "type": "normal",
            "modify": {"meta.source": "scenario", "count": 0},
        }));
        let session = session("modified");
        assert!(!OverrideStrategy.should_override(&config));
        assert!(OverrideStrategy
            .generate_response(&get(), &config, &session)
            .await
            .is_none());

        let response = Json(json!({"count": 5, "items": []})).into_response();
        let response = OverrideStrategy.process_response(response, &config, &session).await;
        assert_eq!(
            body_json(response).await,
            json!({"count": 0, "items": [], "meta": {"source": "scenario"}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delay_ms_is_applied_before_responding() {
        let config = resolved(json!({"type": "error", "status_code": 504, "delay_ms": 30000}));
        let started = tokio::time::Instant::now();
        let response = OverrideStrategy
            .generate_response(&get(), &config, &session("network_timeout"))
            .await
            .expect("override");
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
