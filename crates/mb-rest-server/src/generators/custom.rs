// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use super::CustomHandler;
use crate::session_store::TestSession;
use crate::strategies::InterceptedRequest;
use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mb_scenario_format::ResponseOverride;
use serde_json::json;

/// Echoes the intercepted request and the session it belongs to.
///
/// Handy for checking from a test what the server saw.
pub struct SessionEchoHandler;

impl CustomHandler for SessionEchoHandler {
    fn name(&self) -> &str {
        "session-echo"
    }

    fn handle(
        &self,
        request: &InterceptedRequest,
        session: &TestSession,
        config: &ResponseOverride,
    ) -> anyhow::Result<Response> {
        let status = match config.status_code {
            Some(code) => StatusCode::from_u16(code)
                .with_context(|| format!("invalid status code {}", code))?,
            None => StatusCode::OK,
        };
        let body = json!({
            "session_id": session.session_id,
            "scenario": session.scenario,
            "request_count": session.state.request_count,
            "endpoint": request.endpoint,
            "method": request.method.as_str(),
            "path": request.path,
            "query": request.query,
            "body": request.body,
        });
        Ok((status, Json(body)).into_response())
    }
}
