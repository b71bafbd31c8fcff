// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Main server implementation

use crate::config::ServerConfig;
use crate::dependencies::ServerDependencies;
use crate::error::{ServerError, ServerResult};
use crate::handlers::{control, health, mobile, trackers};
use crate::pipeline::{CONTROL_PREFIX, scenario_pipeline};
use crate::state::AppState;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use mb_logging::SCENARIO_LOG_TARGET;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

/// Mock backend HTTP server
pub struct Server {
    config: ServerConfig,
    state: AppState,
    app: Router,
}

impl Server {
    /// Create a new server instance
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let state = ServerDependencies::new(config.clone())?.into_state();
        Ok(Self::with_state(config, state))
    }

    /// Construct a server from an already-built app state (used for custom dependencies)
    pub fn with_state(config: ServerConfig, state: AppState) -> Self {
        let app = Self::build_app(state.clone(), &config);
        Self { config, state, app }
    }

    /// The full application router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Build the Axum application with routes and middleware
    pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
        let middleware_stack = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(Self::cors_layer(config.enable_cors));

        // Test scenario control API
        let control_routes = Router::new()
            .route("/activate", post(control::activate))
            .route("/current", get(control::current))
            .route("/switch", post(control::switch))
            .route("/reset", post(control::reset))
            .route("/available", get(control::available))
            .route("/debug/:session_id", get(control::debug))
            .route("/metrics", get(control::metrics))
            .route("/reload", post(control::reload))
            .merge(trackers::router());

        Router::new()
            .route("/health", get(health::health_check))
            .merge(mobile::router())
            .nest(CONTROL_PREFIX, control_routes)
            .layer(from_fn_with_state(state.clone(), scenario_pipeline))
            .with_state(state)
            .layer(middleware_stack)
    }

    fn cors_layer(permissive: bool) -> CorsLayer {
        if permissive {
            return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
        }
        CorsLayer::new()
            .allow_origin([
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ])
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(crate::pipeline::SESSION_HEADER),
            ])
    }

    /// Periodically purge expired sessions and tracker records.
    ///
    /// Reads already treat expired records as absent; this only bounds memory.
    pub fn spawn_cleanup(state: AppState) -> JoinHandle<()> {
        let interval = state.config.scenarios.session.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let sessions = state.sessions.purge_expired().await;
                let mut records = 0;
                for tracker in state.trackers.all() {
                    records += tracker.purge_expired().await;
                }
                debug!(
                    target: SCENARIO_LOG_TARGET,
                    sessions,
                    tracker_records = records,
                    "Purged expired test data"
                );
            }
        })
    }

    /// Run the server
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.config.bind_addr;
        info!("Starting server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        let cleanup = self
            .config
            .scenarios
            .session
            .auto_cleanup
            .then(|| Self::spawn_cleanup(self.state.clone()));

        let result = axum::serve(listener, self.app)
            .await
            .map_err(|err| ServerError::Internal(format!("HTTP server error: {err}")));

        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }
        result
    }

    /// Get the bind address
    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session_store::SessionStore;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Map;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_purges_expired_sessions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = ServerConfig::default();
        config.scenarios.config_path = dir.path().to_path_buf();
        config.scenarios.session.ttl_seconds = 60;
        config.scenarios.session.cleanup_interval_seconds = 30;

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("time"),
        ));
        let state = ServerDependencies::with_clock(config, clock.clone())
            .expect("deps")
            .into_state();
        let session = state.sessions.create("default", Map::new()).await;

        let cleanup = Server::spawn_cleanup(state.clone());
        clock.advance(Duration::seconds(120));
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;

        // Already dropped by the background task.
        assert_eq!(state.sessions.purge_expired().await, 0);
        assert!(state.sessions.get(&session.session_id).await.is_none());
        cleanup.abort();
    }
}
