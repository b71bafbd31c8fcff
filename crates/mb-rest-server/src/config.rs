// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server configuration
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `MOCK_BACKEND_*` environment variables (`__` separates nested keys, e.g.
//! `MOCK_BACKEND_SCENARIOS__SESSION__TTL_SECONDS=60`), then CLI flags applied by
//! the binary.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "MOCK_BACKEND";

/// Upper bound for TTLs and the cleanup interval (one year).
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Enable permissive CORS headers for development
    pub enable_cors: bool,

    /// Largest request body the interception pipeline will buffer
    pub max_body_bytes: usize,

    /// Test scenario engine settings
    pub scenarios: ScenarioEngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            enable_cors: false,
            max_body_bytes: 10 * 1024 * 1024,
            scenarios: ScenarioEngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load defaults, then `file` (if any), then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        let built = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        let scenarios = &self.scenarios;
        if scenarios.default_scenario.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "scenarios.default_scenario must not be empty".to_string(),
            ));
        }
        if scenarios.session.ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "scenarios.session.ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if scenarios.trackers.ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "scenarios.trackers.ttl_seconds must be greater than zero".to_string(),
            ));
        }
        for (key, value) in [
            ("scenarios.session.ttl_seconds", scenarios.session.ttl_seconds),
            ("scenarios.trackers.ttl_seconds", scenarios.trackers.ttl_seconds),
            (
                "scenarios.session.cleanup_interval_seconds",
                scenarios.session.cleanup_interval_seconds,
            ),
        ] {
            if value > MAX_TTL_SECONDS {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be at most {MAX_TTL_SECONDS}"
                )));
            }
        }
        if scenarios.session.auto_cleanup && scenarios.session.cleanup_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "scenarios.session.cleanup_interval_seconds must be greater than zero"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// How the scenario registry treats names it does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryMode {
    /// Unknown names are absent; activation rejects them.
    #[default]
    Strict,
    /// Unknown names resolve to the configured default scenario.
    AlwaysDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioEngineConfig {
    /// Master switch for request interception
    pub enabled: bool,

    /// Scenario YAML file or directory of files
    pub config_path: PathBuf,

    pub registry_mode: RegistryMode,

    /// Scenario used for activation without a name, and for coercion in
    /// `always-default` mode
    pub default_scenario: String,

    pub session: SessionConfig,
    pub trackers: TrackerConfig,
    pub debug: DebugConfig,
    pub metrics: MetricsConfig,
}

impl Default for ScenarioEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            config_path: PathBuf::from("scenarios"),
            registry_mode: RegistryMode::Strict,
            default_scenario: "default".to_string(),
            session: SessionConfig::default(),
            trackers: TrackerConfig::default(),
            debug: DebugConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_seconds: u64,

    /// Advisory limit; exceeding it logs a warning but activation still succeeds
    pub max_sessions: usize,

    /// Periodically purge expired sessions and tracker records
    pub auto_cleanup: bool,

    pub cleanup_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 7200,
            max_sessions: 100,
            auto_cleanup: true,
            cleanup_interval_seconds: 300,
        }
    }
}

impl SessionConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub ttl_seconds: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { ttl_seconds: 7200 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Serve `GET /debug/{session_id}`
    pub enabled: bool,

    /// Add `X-Test-Scenario` and `X-Test-Session-ID` to intercepted responses
    pub headers: bool,

    /// Emit the per-request "Processing test scenario request" event
    pub logging: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headers: true,
            logging: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
