// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mobile mock backend with a test scenario engine
//!
//! UI test runners activate a session bound to a named scenario, tag their
//! requests with the session id, and the interception pipeline applies the
//! scenario's behavior to matching endpoints: recording requests for later
//! analysis, delaying them, or replacing or rewriting responses.

pub mod clock;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod generators;
pub mod handlers;
pub mod metrics;
pub mod pipeline;
pub mod scenarios;
pub mod server;
pub mod session_store;
pub mod state;
pub mod strategies;
pub mod trackers;

pub use config::{RegistryMode, ServerConfig};
pub use dependencies::ServerDependencies;
pub use error::{ServerError, ServerResult};
pub use server::Server;
