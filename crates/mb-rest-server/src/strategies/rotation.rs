// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use super::{
    InterceptedRequest, PreHookOutcome, ScenarioStrategy, apply_fixed_last_modified,
    changes_section, id_or_temp_id,
};
use crate::scenarios::ResolvedOverride;
use crate::session_store::TestSession;
use crate::trackers::{MediaChanges, RotationTracker, Tracker, identifier_of};
use async_trait::async_trait;
use axum::response::Response;
use mb_logging::SCENARIO_LOG_TARGET;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Watches `changes` requests while the device rotates and records which
/// media the client added or deleted.
pub struct RotationStrategy {
    tracker: Arc<RotationTracker>,
}

impl RotationStrategy {
    pub fn new(tracker: Arc<RotationTracker>) -> Self {
        Self { tracker }
    }

    /// Added: has `temp_id` but no `id`. Removed: `deleted: true`.
    fn classify(media: &[Value]) -> MediaChanges {
        let mut changes = MediaChanges::default();
        for item in media {
            let has = |key: &str| item.get(key).is_some_and(|v| !v.is_null());
            if has("temp_id") && !has("id") {
                changes.added.push(identifier_of(item.get("temp_id")));
            }
            if item.get("deleted") == Some(&Value::Bool(true)) {
                changes.removed.push(id_or_temp_id(item));
            }
        }
        changes
    }
}

#[async_trait]
impl ScenarioStrategy for RotationStrategy {
    fn name(&self) -> &str {
        "rotation-test"
    }

    async fn process_request(
        &self,
        request: &InterceptedRequest,
        config: &ResolvedOverride,
        session: &TestSession,
    ) -> PreHookOutcome {
        let session_id = session.session_id.as_str();
        if !self.tracker.session_exists(session_id).await {
            self.tracker.initialize(session_id).await;
        }

        let logging = config.config.parameter_flag("enable_logging");
        if logging {
            info!(
                target: SCENARIO_LOG_TARGET,
                session_id,
                endpoint = %request.endpoint,
                method = %request.method,
                "[ROTATION-TEST] Request received"
            );
        }

        if request.path.contains("changes") && request.input("changes").is_some() {
            let changes = Self::classify(&changes_section(request, "media"));
            if !changes.is_empty() {
                self.tracker.track_media_changes(session_id, &changes).await;
                info!(
                    target: SCENARIO_LOG_TARGET,
                    session_id,
                    added_count = changes.added.len(),
                    removed_count = changes.removed.len(),
                    "[ROTATION-TEST] Media changes tracked"
                );
            }
        }

        PreHookOutcome::proceed()
            .with("tracking_enabled", config.config.parameter_flag("track_changes"))
            .with("logging_enabled", logging)
    }

    async fn process_response(
        &self,
        response: Response,
        config: &ResolvedOverride,
        _session: &TestSession,
    ) -> Response {
        apply_fixed_last_modified(response, config).await
    }
}
