// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Response generators and custom handlers
//!
//! Scenario files refer to generators and handlers by key. Keys are resolved
//! against these registries when scenarios are loaded, so a typo fails the
//! load instead of the first matching request.

mod catalog;
mod custom;
mod passthrough;
mod substitution;

pub use catalog::{EmptyCatalogGenerator, SingleEventGenerator};
pub use custom::SessionEchoHandler;
pub use passthrough::PassthroughGenerator;
pub use substitution::Variables;

use crate::session_store::TestSession;
use crate::strategies::InterceptedRequest;
use axum::response::Response;
use mb_scenario_format::ResponseOverride;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds the JSON body of a `dynamic` override.
pub trait ResponseGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn generate(
        &self,
        parameters: &Map<String, Value>,
        session: &TestSession,
    ) -> anyhow::Result<Value>;
}

/// Produces the whole response of a `custom` override.
pub trait CustomHandler: Send + Sync {
    fn name(&self) -> &str;

    fn handle(
        &self,
        request: &InterceptedRequest,
        session: &TestSession,
        config: &ResponseOverride,
    ) -> anyhow::Result<Response>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorInfo {
    pub key: String,
    pub name: String,
    pub description: String,
}

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Arc<dyn ResponseGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every bundled generator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("empty_catalog", Arc::new(EmptyCatalogGenerator));
        registry.register("single_event", Arc::new(SingleEventGenerator));
        registry.register("camera-performance", Arc::new(PassthroughGenerator::camera()));
        registry.register("rotation-test", Arc::new(PassthroughGenerator::rotation()));
        registry.register(
            "remove-listing-test",
            Arc::new(PassthroughGenerator::remove_listing()),
        );
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, generator: Arc<dyn ResponseGenerator>) {
        self.generators.insert(key.into(), generator);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ResponseGenerator>> {
        self.generators.get(key).cloned()
    }

    pub fn describe(&self) -> Vec<GeneratorInfo> {
        self.generators
            .iter()
            .map(|(key, generator)| GeneratorInfo {
                key: key.clone(),
                name: generator.name().to_string(),
                description: generator.description().to_string(),
            })
            .collect()
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn CustomHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("session-echo", Arc::new(SessionEchoHandler));
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, handler: Arc<dyn CustomHandler>) {
        self.handlers.insert(key.into(), handler);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn CustomHandler>> {
        self.handlers.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_generators_are_registered_by_key() {
        let registry = GeneratorRegistry::with_builtins();
        let keys: Vec<String> = registry.describe().into_iter().map(|g| g.key).collect();
        assert_eq!(
            keys,
            vec![
                "camera-performance",
                "empty_catalog",
                "remove-listing-test",
                "rotation-test",
                "single_event"
            ]
        );
        assert_eq!(
            registry.get("camera-performance").map(|g| g.name().to_string()),
            Some("camera-performance".to_string())
        );
        assert!(registry.get("EmptyCatalogGenerator").is_none());
    }

    #[test]
    fn builtin_handlers_are_registered_by_key() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.keys(), vec!["session-echo"]);
        assert!(registry.get("missing").is_none());
    }
}
