// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{Result, ScenarioError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Endpoint key that matches any endpoint not listed explicitly.
pub const WILDCARD_ENDPOINT: &str = "*";

/// How a configured endpoint response is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideKind {
    /// Controller runs; the strategy may still adjust its response.
    #[default]
    Normal,
    /// Literal payload with variable substitution.
    Static,
    /// Payload built by a named generator.
    Dynamic,
    /// Literal error payload.
    Error,
    /// Response produced by a named custom handler.
    Custom,
}

impl OverrideKind {
    /// Whether this kind replaces the controller response entirely.
    pub fn replaces_controller(self) -> bool {
        !matches!(self, OverrideKind::Normal)
    }
}

/// Per-endpoint response configuration inside a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseOverride {
    #[serde(rename = "type", default)]
    pub kind: OverrideKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Generator key for `dynamic` overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,

    /// Custom handler key for `custom` overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    /// Free-form parameters read by generators and strategies.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Dot-path edits applied to a pass-through JSON response.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modify: BTreeMap<String, Value>,
}

impl ResponseOverride {
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key).filter(|v| !v.is_null())
    }

    /// Truthiness of a parameter; absent means false.
    pub fn parameter_flag(&self, key: &str) -> bool {
        match self.parameter(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty() && s != "0" && s != "false",
            Some(_) => true,
            None => false,
        }
    }

    /// Non-negative numeric parameter; strings holding numbers are accepted.
    pub fn parameter_f64(&self, key: &str) -> Option<f64> {
        let value = match self.parameter(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameter(key).and_then(Value::as_str)
    }

    fn validate(&self, scenario: &str, endpoint: &str) -> Result<()> {
        let at = || format!("scenario '{}' endpoint '{}'", scenario, endpoint);
        if let Some(code) = self.status_code {
            if !(100..=599).contains(&code) {
                return Err(ScenarioError::Validation(format!(
                    "{}: status_code {} is not a valid HTTP status",
                    at(),
                    code
                )));
            }
        }
        match self.kind {
            OverrideKind::Dynamic if blank(self.generator.as_deref()) => Err(
                ScenarioError::Validation(format!("{}: dynamic response requires 'generator'", at())),
            ),
            OverrideKind::Custom if blank(self.handler.as_deref()) => Err(
                ScenarioError::Validation(format!("{}: custom response requires 'handler'", at())),
            ),
            _ => Ok(()),
        }
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

/// A named bundle of endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Lookup key; taken from the mapping key in the scenario file.
    #[serde(skip)]
    pub key: String,

    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Strategy key; when absent the scenario key is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub responses: BTreeMap<String, ResponseOverride>,
}

/// Listing entry for the `available` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub endpoints: Vec<String>,
}

/// Descriptive fields surfaced by the debug endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub name: String,
    pub description: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

impl ScenarioDefinition {
    /// Empty scenario used when no `default` definition is configured.
    pub fn builtin_default(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: Some("Default Scenario".to_string()),
            description: "Default mock server responses".to_string(),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.key)
    }

    /// Strategy registry key for this scenario.
    pub fn strategy_key(&self) -> &str {
        self.strategy.as_deref().unwrap_or(&self.key)
    }

    /// Response configuration for `endpoint`: exact match first, then `*`.
    pub fn response_for(&self, endpoint: &str) -> Option<&ResponseOverride> {
        self.responses
            .get(endpoint)
            .or_else(|| self.responses.get(WILDCARD_ENDPOINT))
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            name: self.key.clone(),
            display_name: self.display_name().to_string(),
            description: self.description.clone(),
            endpoints: self.responses.keys().cloned().collect(),
        }
    }

    pub fn metadata(&self) -> ScenarioMetadata {
        ScenarioMetadata {
            name: self.display_name().to_string(),
            description: self.description.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
            author: self.author.clone(),
            tags: self.tags.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(ScenarioError::Validation(
                "scenario key must not be empty".to_string(),
            ));
        }
        for (endpoint, config) in &self.responses {
            if endpoint.trim().is_empty() {
                return Err(ScenarioError::Validation(format!(
                    "scenario '{}' has an empty endpoint key",
                    self.key
                )));
            }
            config.validate(&self.key, endpoint)?;
        }
        Ok(())
    }
}
