// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tracker analysis endpoints
//!
//! Test runners query these after a flow finishes to get the pass/fail
//! verdict for the session. The session id may come from the header or the
//! `test_session_id` query parameter.

use crate::error::{ServerError, ServerResult};
use crate::pipeline::extract_session_id;
use crate::state::AppState;
use crate::trackers::{Tracker, TrackerKind};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Uri},
    routing::{get, post},
};
use mb_logging::SCENARIO_LOG_TARGET;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/camera-performance-test/analysis", get(camera_analysis))
        .route("/camera-performance-test/clear", post(camera_clear))
        .route("/rotation-test/analysis", get(rotation_analysis))
        .route("/rotation-test/clear", post(rotation_clear))
        .route("/remove-listing-test/analysis", get(remove_listing_analysis))
        .route("/remove-listing-test/clear", post(remove_listing_clear))
        .route("/remove-listing-test/timeline", get(remove_listing_timeline))
}

fn log_prefix(kind: TrackerKind) -> &'static str {
    match kind {
        TrackerKind::CameraPerformance => "[CAMERA-PERFORMANCE-ANALYSIS]",
        TrackerKind::Rotation => "[ROTATION-TEST-ANALYSIS]",
        TrackerKind::RemoveListing => "[REMOVE-LISTING-TEST-ANALYSIS]",
    }
}

fn session_id_of(headers: &HeaderMap, uri: &Uri) -> ServerResult<String> {
    extract_session_id(headers, uri, false).ok_or(ServerError::TrackerSessionIdMissing)
}

/// Resolves the session id and checks the session is on the tracker's scenario.
async fn authorize(
    state: &AppState,
    kind: TrackerKind,
    headers: &HeaderMap,
    uri: &Uri,
) -> ServerResult<(String, Arc<dyn Tracker>)> {
    let session_id = session_id_of(headers, uri)?;
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ServerError::TrackerSessionNotFound(session_id.clone()))?;
    if session.scenario != kind.scenario() {
        return Err(ServerError::ScenarioMismatch {
            current: session.scenario,
            required: kind.scenario(),
        });
    }
    Ok((session_id, state.trackers.get(kind)))
}

async fn analysis(
    state: AppState,
    kind: TrackerKind,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    let (session_id, tracker) = authorize(&state, kind, &headers, &uri).await?;
    let report = tracker
        .report(&session_id)
        .await
        .ok_or_else(|| ServerError::NoTrackingData {
            session_id: session_id.clone(),
            message: kind.no_data_message(),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": report.data,
        "summary": report.summary,
    })))
}

async fn clear(
    state: AppState,
    kind: TrackerKind,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    let (session_id, tracker) = authorize(&state, kind, &headers, &uri).await?;
    tracker.clear_session(&session_id).await;
    tracker.initialize(&session_id).await;

    info!(
        target: SCENARIO_LOG_TARGET,
        session_id = %session_id,
        "{} Tracking data cleared and re-initialized",
        log_prefix(kind)
    );
    Ok(Json(json!({
        "success": true,
        "message": "Tracking data cleared and re-initialized",
        "session_id": session_id,
    })))
}

/// `GET /camera-performance-test/analysis`
pub async fn camera_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    analysis(state, TrackerKind::CameraPerformance, headers, uri).await
}

/// `POST /camera-performance-test/clear`
pub async fn camera_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    clear(state, TrackerKind::CameraPerformance, headers, uri).await
}

/// `GET /rotation-test/analysis`
pub async fn rotation_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    analysis(state, TrackerKind::Rotation, headers, uri).await
}

/// `POST /rotation-test/clear`
pub async fn rotation_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    clear(state, TrackerKind::Rotation, headers, uri).await
}

/// `GET /remove-listing-test/analysis`
pub async fn remove_listing_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    analysis(state, TrackerKind::RemoveListing, headers, uri).await
}

/// `POST /remove-listing-test/clear`
pub async fn remove_listing_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    clear(state, TrackerKind::RemoveListing, headers, uri).await
}

/// `GET /remove-listing-test/timeline`
///
/// Only needs a tracked record; the session's scenario is not checked.
pub async fn remove_listing_timeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> ServerResult<Json<Value>> {
    let session_id = session_id_of(&headers, &uri)?;
    let analysis = state
        .trackers
        .remove_listing
        .analysis(&session_id)
        .await
        .ok_or_else(|| ServerError::NoTrackingData {
            session_id: session_id.clone(),
            message: TrackerKind::RemoveListing.no_data_message(),
        })?;

    Ok(Json(json!({
        "success": true,
        "session_id": session_id,
        "timeline": analysis.timeline,
        "media_by_listing": analysis.media_by_listing,
    })))
}
