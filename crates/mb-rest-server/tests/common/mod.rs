// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use mb_rest_server::{
    ServerConfig, ServerDependencies, clock::ManualClock, server::Server, state::AppState,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TOKEN: &str = "Bearer mock_pat_integration";
pub const SESSION_HEADER: &str = "X-Test-Session-ID";

pub const SCENARIOS_YAML: &str = r#"
default:
  name: Default Scenario
  description: Default mock server responses

camera-performance-test:
  name: Camera Performance Test
  description: Tracks uploads and changes
  responses:
    catalog.request-upload:
      type: dynamic
      generator: camera-performance
      parameters:
        enable_logging: true
    catalog.changes:
      type: dynamic
      generator: camera-performance
      parameters:
        enable_logging: true
    catalog.hydrate:
      type: dynamic
      generator: camera-performance
      parameters:
        fixed_last_modified: "2025-08-27 20:24:35"

rotation-test:
  name: Rotation Test
  description: Tracks media added and removed around a rotation
  responses:
    catalog.changes:
      type: dynamic
      generator: rotation-test
      parameters:
        track_changes: true
        enable_logging: true

remove-listing-test:
  name: Remove Listing Test
  description: Tracks listing and media removals
  responses:
    catalog.changes:
      type: dynamic
      generator: remove-listing-test
      parameters:
        track_changes: true
        enable_logging: true
"#;

pub const OVERRIDE_YAML: &str = r#"
server_error:
  name: Server Error
  description: Every endpoint fails
  strategy: override
  responses:
    "*":
      type: error
      status_code: 500
      data:
        error: Internal Server Error
        code: SRV_001

static_catalog:
  name: Static Catalog
  strategy: override
  responses:
    catalog.hydrate:
      type: static
      data:
        events: []
        generated_at: "{{timestamp}}"
      headers:
        X-Mock-Source: static
    catalog.sync:
      type: normal
      modify:
        changes.events: ["patched"]
    catalog.request-upload:
      type: custom
      handler: session-echo
      status_code: 202
    mock-s3.upload:
      type: dynamic
      generator: single_event
"#;

/// Scenario directory plus the in-process application.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    dir: TempDir,
}

pub fn write_scenarios(dir: &Path) {
    std::fs::write(dir.join("10-scenarios.yaml"), SCENARIOS_YAML).expect("write scenarios");
    std::fs::write(dir.join("20-overrides.yaml"), OVERRIDE_YAML).expect("write overrides");
}

pub fn test_config(dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.scenarios.config_path = dir.to_path_buf();
    config.scenarios.session.ttl_seconds = 600;
    config.scenarios.session.auto_cleanup = false;
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        write_scenarios(dir.path());
        let mut config = test_config(dir.path());
        configure(&mut config);

        let start = Utc.with_ymd_and_hms(2025, 8, 27, 12, 0, 0).single().expect("start time");
        let clock = Arc::new(ManualClock::new(start));
        let state = ServerDependencies::with_clock(config.clone(), clock.clone())
            .expect("dependencies")
            .into_state();
        let router = Server::with_state(config, state.clone()).router();
        Self {
            router,
            state,
            clock,
            dir,
        }
    }

    pub fn scenario_dir(&self) -> &Path {
        self.dir.path()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request");
        let response = self.router.clone().oneshot(request).await.expect("response");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, headers, json)
    }

    /// Activate a session and return its id.
    pub async fn activate(&self, scenario: &str) -> String {
        let (status, _, body) = self
            .send(
                Method::POST,
                "/api/test-scenarios/activate",
                &[],
                Some(serde_json::json!({ "scenario": scenario })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "activation failed: {body}");
        body["session_id"].as_str().expect("session id").to_string()
    }
}
