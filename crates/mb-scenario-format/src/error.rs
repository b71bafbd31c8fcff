// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::PathBuf;
use thiserror::Error;

/// Convenient result alias for scenario operations.
pub type Result<T> = std::result::Result<T, ScenarioError>;

/// Errors that can occur while loading scenario definitions.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Underlying IO error while accessing scenario files.
    #[error("Scenario IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error in a specific file.
    #[error("Scenario parse error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A definition was structurally valid YAML but semantically unusable.
    #[error("Scenario validation error: {0}")]
    Validation(String),
}
