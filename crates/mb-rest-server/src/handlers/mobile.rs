// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Stand-in mobile API
//!
//! Minimal catalog and upload controllers so intercepted traffic has
//! something to reach. Their data is fabricated and nothing is persisted.

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, header},
    routing::{get, post, put},
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use uuid::Uuid;

pub const HYDRATE_PATH: &str = "/mobile-api/v1/catalog/hydrate";
pub const SYNC_PATH: &str = "/mobile-api/v1/catalog/sync";
pub const CHANGES_PATH: &str = "/mobile-api/v1/catalog/changes";
pub const REQUEST_UPLOAD_PATH: &str = "/mobile-api/v1/catalog/request-upload";
pub const S3_UPLOAD_PATH: &str = "/mock-s3-upload/:upload_id";

const TOKEN_PREFIX: &str = "mock_pat_";

/// (method, route template, route name). Scenario files key their
/// responses by these names.
pub const NAMED_ROUTES: &[(&str, &str, &str)] = &[
    ("GET", HYDRATE_PATH, "catalog.hydrate"),
    ("GET", SYNC_PATH, "catalog.sync"),
    ("POST", CHANGES_PATH, "catalog.changes"),
    ("POST", REQUEST_UPLOAD_PATH, "catalog.request-upload"),
    ("PUT", S3_UPLOAD_PATH, "mock-s3.upload"),
];

pub fn route_name(method: &Method, template: &str) -> Option<&'static str> {
    NAMED_ROUTES
        .iter()
        .find(|(m, t, _)| *m == method.as_str() && *t == template)
        .map(|(_, _, name)| *name)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(HYDRATE_PATH, get(hydrate))
        .route(SYNC_PATH, get(sync))
        .route(CHANGES_PATH, post(submit_changes))
        .route(REQUEST_UPLOAD_PATH, post(request_upload))
        .route(S3_UPLOAD_PATH, put(mock_s3_upload))
}

fn authenticate(headers: &HeaderMap) -> ServerResult<()> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(token) if token.starts_with(TOKEN_PREFIX) && token.len() > TOKEN_PREFIX.len() => {
            Ok(())
        }
        _ => Err(ServerError::Unauthenticated),
    }
}

fn last_modified(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn json_body(body: &Bytes) -> ServerResult<Value> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|_| ServerError::validation("body", "The request body must be valid JSON."))
}

fn catalog(now: DateTime<Utc>) -> Value {
    let events: Vec<Value> = (1..=2u64)
        .map(|event_id| {
            let listings: Vec<Value> = (1..=3u64)
                .map(|n| {
                    let listing_id = event_id * 100 + n;
                    let media: Vec<Value> = (1..=2u64)
                        .map(|m| {
                            json!({
                                "id": listing_id * 10 + m,
                                "listing_id": listing_id,
                                "url": format!("https://mock-cdn.local/media/{}-{}.jpg", listing_id, m),
                                "content_type": "image/jpeg",
                            })
                        })
                        .collect();
                    json!({
                        "id": listing_id,
                        "event_id": event_id,
                        "title": format!("Lot {}", n),
                        "description": format!("Mock listing {} of event {}", n, event_id),
                        "lot_number": n,
                        "category": "General",
                        "subcategory": "Misc",
                        "media": media,
                    })
                })
                .collect();
            let starts = now + Duration::days(event_id as i64 * 7);
            json!({
                "id": event_id,
                "title": format!("Mock Auction {}", event_id),
                "description": "Generated catalog event",
                "start_time": starts.to_rfc3339_opts(SecondsFormat::Secs, false),
                "end_time": (starts + Duration::hours(4)).to_rfc3339_opts(SecondsFormat::Secs, false),
                "location": "Springfield",
                "status": "active",
                "event_type": "auction",
                "listings": listings,
                "hero_media": Value::Null,
            })
        })
        .collect();
    json!({
        "events": events,
        "last_modified": last_modified(now),
    })
}

/// `GET /mobile-api/v1/catalog/hydrate`
pub async fn hydrate(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<Json<Value>> {
    authenticate(&headers)?;
    Ok(Json(catalog(state.clock.now())))
}

/// `GET /mobile-api/v1/catalog/sync?since=...`
pub async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> ServerResult<Json<Value>> {
    authenticate(&headers)?;
    let since = query
        .get("since")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::validation("since", "The since field is required."))?;
    Ok(Json(json!({
        "since": since,
        "changes": {"events": [], "listings": [], "media": []},
        "last_modified": last_modified(state.clock.now()),
    })))
}

fn process_change(kind: &str, change: &Value) -> Value {
    let action = change.get("action").and_then(Value::as_str);
    let id = change.get("id").cloned().unwrap_or(Value::Null);
    let temp_id = change.get("temp_id").cloned().unwrap_or(Value::Null);
    match action {
        Some("create") => json!({
            "temp_id": temp_id,
            "id": format!("{}_{}", kind, &Uuid::new_v4().simple().to_string()[..12]),
            "status": "success",
            "errors": [],
        }),
        Some("update") | Some("delete") | Some("remove") => json!({
            "id": id,
            "status": "success",
            "errors": [],
        }),
        other => json!({
            "temp_id": temp_id,
            "id": id,
            "status": "error",
            "errors": [format!("Invalid action: {}", other.unwrap_or_default())],
        }),
    }
}

/// `POST /mobile-api/v1/catalog/changes`
pub async fn submit_changes(headers: HeaderMap, body: Bytes) -> ServerResult<Json<Value>> {
    authenticate(&headers)?;
    let body = json_body(&body)?;
    let changes = body
        .get("changes")
        .filter(|c| c.as_object().is_some_and(|o| !o.is_empty()))
        .ok_or_else(|| ServerError::validation("changes", "The changes field is required."))?;

    let mut data = serde_json::Map::new();
    for (section, kind) in [("events", "event"), ("listings", "listing"), ("media", "media")] {
        let results: Vec<Value> = changes
            .get(section)
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|c| process_change(kind, c)).collect())
            .unwrap_or_default();
        data.insert(section.to_string(), Value::Array(results));
    }
    Ok(Json(json!({ "data": data })))
}

/// `POST /mobile-api/v1/catalog/request-upload`
pub async fn request_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Json<Value>> {
    authenticate(&headers)?;
    let body = json_body(&body)?;
    let media = body
        .get("media")
        .and_then(Value::as_array)
        .ok_or_else(|| ServerError::validation("media", "The media field is required."))?;

    let expires_at = (state.clock.now() + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, false);
    let uploads: Vec<Value> = media
        .iter()
        .map(|item| {
            let upload_id = Uuid::new_v4();
            json!({
                "identifier": item.get("identifier").cloned().unwrap_or(Value::Null),
                "storage_key": format!("temp-{}", Uuid::new_v4()),
                "upload_url": format!("/mock-s3-upload/{}", upload_id),
                "expires_at": expires_at,
            })
        })
        .collect();
    Ok(Json(json!({ "data": uploads })))
}

/// `PUT /mock-s3-upload/{upload_id}`
pub async fn mock_s3_upload(Path(upload_id): Path<String>, body: Bytes) -> Json<Value> {
    Json(json!({
        "ETag": format!("\"{}\"", Uuid::new_v4().simple()),
        "Key": upload_id,
        "Bucket": "mock-bucket",
        "Size": body.len(),
    }))
}
