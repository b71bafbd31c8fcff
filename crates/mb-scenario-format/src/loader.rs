// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::{Result, ScenarioDefinition, ScenarioError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Source of scenarios to load.
#[derive(Debug, Clone)]
pub enum ScenarioSource {
    File(PathBuf),
    Directory(PathBuf),
}

impl ScenarioSource {
    /// Picks `Directory` or `File` based on what exists at `path`.
    pub fn detect(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            ScenarioSource::Directory(path)
        } else {
            ScenarioSource::File(path)
        }
    }
}

/// Merges scenario files into one keyed table.
///
/// Each file is a mapping from scenario key to definition. Files are applied
/// in order and a later definition replaces an earlier one with the same key.
#[derive(Debug, Default)]
pub struct ScenarioLoader {
    scenarios: BTreeMap<String, ScenarioDefinition>,
    files: Vec<PathBuf>,
}

impl ScenarioLoader {
    pub fn from_sources<S>(sources: S) -> Result<Self>
    where
        S: IntoIterator<Item = ScenarioSource>,
    {
        let mut loader = Self::default();
        for source in sources {
            loader.load_source(source)?;
        }
        Ok(loader)
    }

    /// Parse a single YAML document; `origin` is only used in error messages.
    pub fn from_yaml_str(contents: &str, origin: impl Into<PathBuf>) -> Result<Self> {
        let mut loader = Self::default();
        loader.merge_document(contents, &origin.into())?;
        Ok(loader)
    }

    pub fn scenarios(&self) -> &BTreeMap<String, ScenarioDefinition> {
        &self.scenarios
    }

    /// Files that contributed definitions, in load order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn into_scenarios(self) -> BTreeMap<String, ScenarioDefinition> {
        self.scenarios
    }

    fn load_source(&mut self, source: ScenarioSource) -> Result<()> {
        match source {
            ScenarioSource::File(path) => self.load_file(&path),
            ScenarioSource::Directory(dir) => self.load_directory(&dir),
        }
    }

    fn load_directory(&mut self, dir: &Path) -> Result<()> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                continue;
            }
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if matches!(ext, "yaml" | "yml") {
                    paths.push(path);
                }
            }
        }
        // read_dir order is platform dependent
        paths.sort();
        for path in paths {
            self.load_file(&path)?;
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        self.merge_document(&contents, path)?;
        self.files.push(path.to_path_buf());
        Ok(())
    }

    fn merge_document(&mut self, contents: &str, path: &Path) -> Result<()> {
        if contents.trim().is_empty() {
            return Ok(());
        }
        let parsed: Option<BTreeMap<String, ScenarioDefinition>> = serde_yaml::from_str(contents)
            .map_err(|source| ScenarioError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        for (key, mut definition) in parsed.unwrap_or_default() {
            definition.key = key.clone();
            definition.validate()?;
            self.scenarios.insert(key, definition);
        }
        Ok(())
    }
}
