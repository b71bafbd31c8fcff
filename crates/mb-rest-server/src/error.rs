// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server error types and handling

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mb_scenario_format::ScenarioError;
use serde_json::{json, Value};

/// Server result type
pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `TSE001`
    #[error("Invalid session ID: Session ID header required")]
    MissingSessionHeader,

    /// `TSE002`; the message differs per control endpoint
    #[error("{0}")]
    SessionNotFound(&'static str),

    /// `TSE003`
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("No test session ID provided")]
    TrackerSessionIdMissing,

    #[error("Session not found: {0}")]
    TrackerSessionNotFound(String),

    #[error("Invalid scenario: {current} (requires {required})")]
    ScenarioMismatch {
        current: String,
        required: &'static str,
    },

    #[error("No tracking data available for {session_id}")]
    NoTrackingData {
        session_id: String,
        message: &'static str,
    },

    #[error("Debug endpoint disabled")]
    DebugDisabled,

    #[error("Metrics endpoint disabled")]
    MetricsDisabled,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Scenario load failed: {0}")]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::MissingSessionHeader
            | ServerError::UnknownScenario(_)
            | ServerError::TrackerSessionIdMissing => StatusCode::BAD_REQUEST,
            ServerError::SessionNotFound(_)
            | ServerError::TrackerSessionNotFound(_)
            | ServerError::NoTrackingData { .. } => StatusCode::NOT_FOUND,
            ServerError::ScenarioMismatch { .. }
            | ServerError::DebugDisabled
            | ServerError::MetricsDisabled => StatusCode::FORBIDDEN,
            ServerError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServerError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Scenario(_) | ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON body rendered for this error
    pub fn body(&self) -> Value {
        match self {
            ServerError::MissingSessionHeader => json!({
                "error": "TSE001",
                "message": self.to_string(),
            }),
            ServerError::SessionNotFound(message) => json!({
                "error": "TSE002",
                "message": message,
            }),
            ServerError::UnknownScenario(name) => json!({
                "error": "TSE003",
                "message": format!("Invalid scenario: {}", name),
            }),
            ServerError::Validation { field, message } => json!({
                "message": message,
                "errors": { field.as_str(): [message] },
            }),
            ServerError::TrackerSessionIdMissing => json!({
                "error": "No test session ID provided",
                "message": "Please provide X-Test-Session-ID header or test_session_id query parameter",
            }),
            ServerError::TrackerSessionNotFound(session_id) => json!({
                "error": "Session not found",
                "session_id": session_id,
                "message": "The test session may have expired or does not exist",
            }),
            ServerError::ScenarioMismatch { current, required } => json!({
                "error": "Invalid scenario",
                "current_scenario": current,
                "required_scenario": required,
                "message": format!("This endpoint is only available for {} scenario", required),
            }),
            ServerError::NoTrackingData { session_id, message } => json!({
                "error": "No tracking data available",
                "session_id": session_id,
                "message": message,
            }),
            ServerError::DebugDisabled | ServerError::MetricsDisabled => json!({
                "error": self.to_string(),
            }),
            ServerError::Unauthenticated => json!({ "message": self.to_string() }),
            ServerError::PayloadTooLarge => json!({
                "error": "Payload too large",
                "message": self.to_string(),
            }),
            ServerError::Scenario(_) | ServerError::Config(_) | ServerError::Internal(_) => {
                json!({
                    "error": "Internal server error",
                    "message": self.to_string(),
                })
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

/// Convert any error to ServerError
impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

/// Convert IO errors
impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn control_errors_carry_stable_codes() {
        let missing = ServerError::MissingSessionHeader;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            missing.body(),
            json!({"error": "TSE001", "message": "Invalid session ID: Session ID header required"})
        );

        let gone = ServerError::SessionNotFound("Session expired or not found");
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        assert_eq!(gone.body()["error"], "TSE002");

        let unknown = ServerError::UnknownScenario("nope".to_string());
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.body()["error"], "TSE003");
        assert_eq!(unknown.body()["message"], "Invalid scenario: nope");
    }

    #[test]
    fn validation_errors_group_messages_by_field() {
        let err = ServerError::validation("scenario", "The scenario field is required.");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.body(),
            json!({
                "message": "The scenario field is required.",
                "errors": {"scenario": ["The scenario field is required."]}
            })
        );
    }

    #[test]
    fn scenario_mismatch_names_both_scenarios() {
        let err = ServerError::ScenarioMismatch {
            current: "default".to_string(),
            required: "rotation-test",
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let body = err.body();
        assert_eq!(body["current_scenario"], "default");
        assert_eq!(body["required_scenario"], "rotation-test");
        assert_eq!(
            body["message"],
            "This endpoint is only available for rotation-test scenario"
        );
    }
}
