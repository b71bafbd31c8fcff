// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Scenario definitions for the mock backend's test scenario engine.
//!
//! A scenario is a named bundle of per-endpoint response overrides. This crate
//! owns the on-disk YAML format, load-time validation, and the
//! exact-then-wildcard endpoint lookup. It has no knowledge of HTTP serving.

pub mod error;
pub mod loader;
pub mod model;

pub use error::{Result, ScenarioError};
pub use loader::{ScenarioLoader, ScenarioSource};
pub use model::{
    OverrideKind, ResponseOverride, ScenarioDefinition, ScenarioMetadata, ScenarioSummary,
    WILDCARD_ENDPOINT,
};
