// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server state management

use crate::clock::SharedClock;
use crate::config::ServerConfig;
use crate::generators::{GeneratorRegistry, HandlerRegistry};
use crate::metrics::PipelineMetrics;
use crate::scenarios::ScenarioRegistry;
use crate::session_store::SessionStore;
use crate::strategies::StrategyRegistry;
use crate::trackers::Trackers;
use std::sync::Arc;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Test sessions keyed by session id
    pub sessions: Arc<dyn SessionStore>,

    pub scenarios: Arc<ScenarioRegistry>,
    pub strategies: Arc<StrategyRegistry>,
    pub generators: Arc<GeneratorRegistry>,
    pub handlers: Arc<HandlerRegistry>,
    pub trackers: Trackers,
    pub metrics: Arc<PipelineMetrics>,
    pub clock: SharedClock,
}

impl AppState {
    /// Get configuration reference
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
