// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test scenario control endpoints
//!
//! Session lifecycle for test runners: activate, inspect, switch and reset a
//! session, plus scenario discovery and diagnostics. These endpoints read the
//! session id from the `X-Test-Session-ID` header only.

use crate::error::{ServerError, ServerResult};
use crate::generators::GeneratorInfo;
use crate::pipeline::SESSION_HEADER;
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use mb_logging::SCENARIO_LOG_TARGET;
use mb_scenario_format::ScenarioSummary;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use tracing::{info, warn};

const METADATA_STRING_FIELDS: [&str; 3] = ["test_name", "test_suite", "maestro_flow"];

fn header_session_id(headers: &HeaderMap) -> ServerResult<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ServerError::MissingSessionHeader)
}

fn json_object(body: &Bytes) -> ServerResult<Map<String, Value>> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(object)) => Ok(object),
        _ => Err(ServerError::validation(
            "body",
            "The request body must be a JSON object.",
        )),
    }
}

fn scenario_field(body: &Map<String, Value>) -> ServerResult<Option<String>> {
    match body.get("scenario") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(_) => Err(ServerError::validation(
            "scenario",
            "The scenario field must be a string.",
        )),
    }
}

fn metadata_field(body: &Map<String, Value>) -> ServerResult<Map<String, Value>> {
    let metadata = match body.get("metadata") {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(Value::Object(metadata)) => metadata.clone(),
        Some(_) => {
            return Err(ServerError::validation(
                "metadata",
                "The metadata field must be an object.",
            ));
        }
    };
    for field in METADATA_STRING_FIELDS {
        if metadata.get(field).is_some_and(|v| !v.is_string()) {
            let key = format!("metadata.{}", field);
            let message = format!("The {} field must be a string.", key);
            return Err(ServerError::validation(key, message));
        }
    }
    Ok(metadata)
}

/// `POST /activate`
pub async fn activate(
    State(state): State<AppState>,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<Value>)> {
    let body = json_object(&body)?;
    let requested = scenario_field(&body)?
        .unwrap_or_else(|| state.scenarios.default_scenario().to_string());
    let mut metadata = metadata_field(&body)?;

    let scenario = state
        .scenarios
        .resolve_name(&requested)
        .ok_or_else(|| ServerError::UnknownScenario(requested.clone()))?;
    metadata.insert("requested_scenario".to_string(), json!(requested));

    let max_sessions = state.config.scenarios.session.max_sessions;
    let live = state.sessions.list_all().await.len();
    if live >= max_sessions {
        warn!(
            target: SCENARIO_LOG_TARGET,
            live_sessions = live,
            max_sessions,
            "Session limit reached; activating anyway"
        );
    }

    let session = state.sessions.create(&scenario, metadata).await;
    info!(
        target: SCENARIO_LOG_TARGET,
        session_id = %session.session_id,
        scenario = %session.scenario,
        requested_scenario = %requested,
        "Test session activated"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session.session_id,
            "scenario": session.scenario,
            "is_generic": requested != session.scenario,
            "requested_scenario": requested,
            "expires_at": session.expires_at,
        })),
    ))
}

/// `GET /current`
pub async fn current(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<Json<Value>> {
    let session_id = header_session_id(&headers)?;
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or(ServerError::SessionNotFound("Session expired or not found"))?;

    Ok(Json(json!({
        "session_id": session.session_id,
        "scenario": session.scenario,
        "active": true,
        "request_count": session.state.request_count,
        "expires_at": session.expires_at,
    })))
}

/// `POST /switch`
pub async fn switch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Json<Value>> {
    let session_id = header_session_id(&headers)?;
    let requested = scenario_field(&json_object(&body)?)?
        .ok_or_else(|| ServerError::validation("scenario", "The scenario field is required."))?;
    let scenario = state
        .scenarios
        .resolve_name(&requested)
        .ok_or_else(|| ServerError::UnknownScenario(requested.clone()))?;

    let session = state
        .sessions
        .switch_scenario(&session_id, &scenario)
        .await
        .ok_or(ServerError::SessionNotFound("Session expired or not found"))?;
    info!(
        target: SCENARIO_LOG_TARGET,
        session_id = %session.session_id,
        scenario = %session.scenario,
        "Test scenario switched"
    );

    Ok(Json(json!({
        "session_id": session.session_id,
        "scenario": session.scenario,
        "message": "Scenario switched successfully",
    })))
}

/// `POST /reset`
pub async fn reset(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<Json<Value>> {
    let session_id = header_session_id(&headers)?;
    if !state.sessions.destroy(&session_id).await {
        return Err(ServerError::SessionNotFound(
            "Session not found or already destroyed",
        ));
    }
    info!(target: SCENARIO_LOG_TARGET, session_id = %session_id, "Test session destroyed");
    Ok(Json(json!({ "message": "Session destroyed successfully" })))
}

#[derive(Serialize)]
pub struct AvailableResponse {
    pub scenarios: Vec<ScenarioSummary>,
    /// Generator keys usable by `dynamic` overrides
    pub generators: Vec<GeneratorInfo>,
    /// Handler keys usable by `custom` overrides
    pub handlers: Vec<String>,
}

/// `GET /available`
pub async fn available(State(state): State<AppState>) -> Json<AvailableResponse> {
    Json(AvailableResponse {
        scenarios: state.scenarios.list(),
        generators: state.generators.describe(),
        handlers: state.handlers.keys(),
    })
}

/// `GET /debug/{session_id}`
pub async fn debug(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ServerResult<Json<Value>> {
    if !state.config.scenarios.debug.enabled {
        return Err(ServerError::DebugDisabled);
    }
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or(ServerError::SessionNotFound("Session not found"))?;
    let scenario_metadata = state.scenarios.metadata(&session.scenario);

    Ok(Json(json!({
        "session": session,
        "scenario_metadata": scenario_metadata,
    })))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> ServerResult<Json<Value>> {
    if !state.config.scenarios.metrics.enabled {
        return Err(ServerError::MetricsDisabled);
    }
    let sessions = state.sessions.list_all().await;

    let mut seen = HashSet::new();
    let scenarios_in_use: Vec<&str> = sessions
        .iter()
        .map(|s| s.scenario.as_str())
        .filter(|name| seen.insert(*name))
        .collect();
    let total_requests: u64 = sessions.iter().map(|s| s.state.request_count).sum();
    let details: Vec<Value> = sessions
        .iter()
        .map(|s| {
            json!({
                "session_id": s.session_id,
                "scenario": s.scenario,
                "request_count": s.state.request_count,
                "created_at": s.created_at,
                "expires_at": s.expires_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "active_sessions": sessions.len(),
        "scenarios_in_use": scenarios_in_use,
        "total_requests": total_requests,
        "sessions": details,
        "pipeline": state.metrics.snapshot(),
    })))
}

/// `POST /reload`
pub async fn reload(State(state): State<AppState>) -> ServerResult<Json<Value>> {
    let count = state.scenarios.reload()?;
    info!(target: SCENARIO_LOG_TARGET, scenarios = count, "Scenario definitions reloaded");
    Ok(Json(json!({
        "message": "Scenarios reloaded",
        "scenarios": count,
    })))
}
