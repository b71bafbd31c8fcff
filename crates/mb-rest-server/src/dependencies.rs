// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dependency wiring for the REST server

use crate::{
    clock::{SharedClock, SystemClock},
    config::ServerConfig,
    generators::{GeneratorRegistry, HandlerRegistry},
    metrics::PipelineMetrics,
    scenarios::ScenarioRegistry,
    session_store::{InMemorySessionStore, SessionStore},
    state::AppState,
    strategies::StrategyRegistry,
    trackers::Trackers,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Builds the in-process engine: scenario registry, stores, trackers and
/// strategy dispatch.
pub struct ServerDependencies {
    state: AppState,
}

impl ServerDependencies {
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as `new` with an injected clock, so tests control expiry.
    pub fn with_clock(config: ServerConfig, clock: SharedClock) -> Result<Self> {
        let engine = &config.scenarios;
        let generators = Arc::new(GeneratorRegistry::with_builtins());
        let handlers = Arc::new(HandlerRegistry::with_builtins());

        let scenarios = ScenarioRegistry::load(
            Some(engine.config_path.clone()),
            engine.registry_mode,
            engine.default_scenario.clone(),
            generators.clone(),
            handlers.clone(),
        )
        .with_context(|| {
            format!(
                "loading scenarios from {}",
                engine.config_path.display()
            )
        })?;

        let trackers = Trackers::new(engine.trackers.ttl_seconds, clock.clone());
        let strategies = StrategyRegistry::with_builtins(&trackers);
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(
            engine.session.ttl_seconds,
            clock.clone(),
        ));

        let state = AppState {
            config: Arc::new(config),
            sessions,
            scenarios: Arc::new(scenarios),
            strategies: Arc::new(strategies),
            generators,
            handlers,
            trackers,
            metrics: Arc::new(PipelineMetrics::new()),
            clock,
        };

        Ok(Self { state })
    }

    /// Consume the dependency builder and return the resulting app state
    pub fn into_state(self) -> AppState {
        self.state
    }
}
