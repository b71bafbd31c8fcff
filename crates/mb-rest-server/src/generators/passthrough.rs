// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use super::ResponseGenerator;
use crate::session_store::TestSession;
use serde_json::{json, Map, Value};

/// Generator for the tracking scenarios.
///
/// Their strategies never override the controller, so this only describes
/// what the strategy will do with the configured parameters. It is what a
/// caller sees if such a config is routed through the `override` strategy.
pub struct PassthroughGenerator {
    name: &'static str,
    description: &'static str,
    tracks_changes: bool,
}

impl PassthroughGenerator {
    pub fn camera() -> Self {
        Self {
            name: "camera-performance",
            description: "Camera performance testing generator with delays and logging",
            tracks_changes: false,
        }
    }

    pub fn rotation() -> Self {
        Self {
            name: "rotation-test",
            description:
                "Rotation testing generator that tracks media changes during device rotation",
            tracks_changes: true,
        }
    }

    pub fn remove_listing() -> Self {
        Self {
            name: "remove-listing-test",
            description: "Remove listing testing generator that tracks listing and media removals",
            tracks_changes: true,
        }
    }
}

impl ResponseGenerator for PassthroughGenerator {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn generate(
        &self,
        parameters: &Map<String, Value>,
        _session: &TestSession,
    ) -> anyhow::Result<Value> {
        let mut body = json!({
            "passthrough": true,
            "delay_applied": parameters.get("delay").cloned().unwrap_or(json!(0)),
            "logging_enabled": parameters.get("enable_logging").cloned().unwrap_or(json!(false)),
            "modifications": {
                "last_modified": parameters.get("fixed_last_modified").cloned().unwrap_or(Value::Null),
            },
        });
        if self.tracks_changes {
            body["track_changes"] = json!(true);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::SessionState;
    use chrono::Utc;

    fn session() -> TestSession {
        TestSession {
            session_id: "maestro_session_x".to_string(),
            scenario: "camera-performance-test".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now(),
            metadata: Map::new(),
            state: SessionState::default(),
        }
    }

    #[test]
    fn describes_the_configured_parameters() {
        let params = json!({"delay": 5, "fixed_last_modified": "2025-08-27 20:24:35"});
        let body = PassthroughGenerator::camera()
            .generate(params.as_object().unwrap(), &session())
            .unwrap();
        assert_eq!(
            body,
            json!({
                "passthrough": true,
                "delay_applied": 5,
                "logging_enabled": false,
                "modifications": {"last_modified": "2025-08-27 20:24:35"},
            })
        );

        let body = PassthroughGenerator::rotation()
            .generate(&Map::new(), &session())
            .unwrap();
        assert_eq!(body["track_changes"], true);
        assert_eq!(body["modifications"]["last_modified"], Value::Null);
    }
}
