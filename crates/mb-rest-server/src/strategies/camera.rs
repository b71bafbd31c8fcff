// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use super::{InterceptedRequest, PreHookOutcome, ScenarioStrategy, apply_fixed_last_modified};
use crate::scenarios::ResolvedOverride;
use crate::session_store::TestSession;
use crate::trackers::{CameraPerformanceTracker, Tracker, UploadMediaItem};
use async_trait::async_trait;
use axum::{http::header, response::Response};
use mb_logging::SCENARIO_LOG_TARGET;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Slows requests down and records upload and changes traffic, simulating a
/// device whose camera pipeline is slow.
pub struct CameraPerformanceStrategy {
    tracker: Arc<CameraPerformanceTracker>,
}

impl CameraPerformanceStrategy {
    pub fn new(tracker: Arc<CameraPerformanceTracker>) -> Self {
        Self { tracker }
    }

    async fn log_request(&self, request: &InterceptedRequest, session_id: &str) {
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let endpoint = request.endpoint.as_str();

        if endpoint.contains("changes") {
            info!(
                target: SCENARIO_LOG_TARGET,
                request_id = %request_id,
                session_id,
                user_agent = request.header(header::USER_AGENT.as_str()),
                full_request_data = %request.body.clone().unwrap_or(serde_json::Value::Null),
                "[CHANGES-REQUEST] Full request received"
            );
            if let Some(changes) = request.input("changes") {
                self.tracker.track_changes_request(session_id, &changes).await;
            }
        } else if endpoint.contains("request-upload") {
            let items: Vec<UploadMediaItem> = request
                .input("media")
                .and_then(|media| media.as_array().cloned())
                .unwrap_or_default()
                .iter()
                .map(UploadMediaItem::from_json)
                .collect();
            info!(
                target: SCENARIO_LOG_TARGET,
                request_id = %request_id,
                session_id,
                user_agent = request.header(header::USER_AGENT.as_str()),
                media_count = items.len(),
                "[UPLOAD-REQUEST-IN] Upload request received"
            );
            if !items.is_empty() {
                self.tracker.track_upload_request(session_id, &items).await;
            }
        } else if endpoint.contains("s3-upload") || endpoint.contains("mock-s3") {
            let upload_id = request.path.rsplit('/').next().unwrap_or_default();
            info!(
                target: SCENARIO_LOG_TARGET,
                request_id = %request_id,
                upload_id,
                content_type = request.header(header::CONTENT_TYPE.as_str()),
                content_length = request.header(header::CONTENT_LENGTH.as_str()),
                "[S3-UPLOAD] Upload received"
            );
        }
    }
}

#[async_trait]
impl ScenarioStrategy for CameraPerformanceStrategy {
    fn name(&self) -> &str {
        "camera-performance-test"
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

        let mut delay = config.config.parameter_f64("delay").unwrap_or(0.0);
        if delay > 0.0 {
            match Duration::try_from_secs_f64(delay) {
                Ok(duration) => tokio::time::sleep(duration).await,
                Err(err) => {
                    warn!(
                        target: SCENARIO_LOG_TARGET,
                        session_id,
                        delay,
                        error = %err,
                        "Ignoring out-of-range delay parameter"
                    );
                    delay = 0.0;
                }
            }
        }

        let logging = config.config.parameter_flag("enable_logging");
        if logging {
            self.log_request(request, session_id).await;
        }

        PreHookOutcome::proceed()
            .with("delay_applied", delay.max(0.0))
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
