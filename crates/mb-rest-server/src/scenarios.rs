// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Scenario registry
//!
//! Holds the loaded scenario table with generators and handlers already
//! resolved. Reload builds a complete new table before swapping it in, so
//! readers see either the old table or the new one and a failed reload leaves
//! the old table serving.

use crate::config::RegistryMode;
use crate::generators::{CustomHandler, GeneratorRegistry, HandlerRegistry, ResponseGenerator};
use mb_scenario_format::{
    OverrideKind, ResponseOverride, ScenarioDefinition, ScenarioError, ScenarioLoader,
    ScenarioMetadata, ScenarioSource, ScenarioSummary, WILDCARD_ENDPOINT,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// A response config with its generator or handler looked up.
pub struct ResolvedOverride {
    pub endpoint: String,
    pub config: ResponseOverride,
    pub generator: Option<Arc<dyn ResponseGenerator>>,
    pub handler: Option<Arc<dyn CustomHandler>>,
}

impl std::fmt::Debug for ResolvedOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedOverride")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("generator", &self.generator.as_ref().map(|g| g.name().to_string()))
            .field("handler", &self.handler.as_ref().map(|h| h.name().to_string()))
            .finish()
    }
}

#[derive(Debug)]
pub struct ResolvedScenario {
    pub definition: ScenarioDefinition,
    responses: HashMap<String, Arc<ResolvedOverride>>,
}

impl ResolvedScenario {
    fn resolve(
        definition: ScenarioDefinition,
        generators: &GeneratorRegistry,
        handlers: &HandlerRegistry,
    ) -> Result<Self, ScenarioError> {
        let mut responses = HashMap::new();
        for (endpoint, config) in &definition.responses {
            let generator = match (config.kind, config.generator.as_deref()) {
                (OverrideKind::Dynamic, Some(key)) => Some(generators.get(key).ok_or_else(|| {
                    ScenarioError::Validation(format!(
                        "scenario '{}' endpoint '{}': unknown generator '{}'",
                        definition.key, endpoint, key
                    ))
                })?),
                _ => None,
            };
            let handler = match (config.kind, config.handler.as_deref()) {
                (OverrideKind::Custom, Some(key)) => Some(handlers.get(key).ok_or_else(|| {
                    ScenarioError::Validation(format!(
                        "scenario '{}' endpoint '{}': unknown handler '{}'",
                        definition.key, endpoint, key
                    ))
                })?),
                _ => None,
            };
            responses.insert(
                endpoint.clone(),
                Arc::new(ResolvedOverride {
                    endpoint: endpoint.clone(),
                    config: config.clone(),
                    generator,
                    handler,
                }),
            );
        }
        Ok(Self {
            definition,
            responses,
        })
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    /// Exact endpoint first, then the wildcard entry.
    pub fn response_for(&self, endpoint: &str) -> Option<Arc<ResolvedOverride>> {
        self.responses
            .get(endpoint)
            .or_else(|| self.responses.get(WILDCARD_ENDPOINT))
            .cloned()
    }
}

#[derive(Debug, Default)]
struct ScenarioTable {
    scenarios: BTreeMap<String, Arc<ResolvedScenario>>,
}

pub struct ScenarioRegistry {
    table: RwLock<Arc<ScenarioTable>>,
    source: Option<PathBuf>,
    mode: RegistryMode,
    default_scenario: String,
    generators: Arc<GeneratorRegistry>,
    handlers: Arc<HandlerRegistry>,
}

impl ScenarioRegistry {
    /// Load scenarios from `source` (a file or a directory of YAML files).
    pub fn load(
        source: Option<PathBuf>,
        mode: RegistryMode,
        default_scenario: impl Into<String>,
        generators: Arc<GeneratorRegistry>,
        handlers: Arc<HandlerRegistry>,
    ) -> Result<Self, ScenarioError> {
        let registry = Self {
            table: RwLock::new(Arc::default()),
            source,
            mode,
            default_scenario: default_scenario.into(),
            generators,
            handlers,
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Registry over in-memory definitions; `reload` keeps them unchanged.
    pub fn from_definitions<I>(
        definitions: I,
        mode: RegistryMode,
        default_scenario: impl Into<String>,
        generators: Arc<GeneratorRegistry>,
        handlers: Arc<HandlerRegistry>,
    ) -> Result<Self, ScenarioError>
    where
        I: IntoIterator<Item = ScenarioDefinition>,
    {
        let registry = Self {
            table: RwLock::new(Arc::default()),
            source: None,
            mode,
            default_scenario: default_scenario.into(),
            generators,
            handlers,
        };
        let definitions = definitions
            .into_iter()
            .map(|definition| (definition.key.clone(), definition))
            .collect();
        let table = registry.build_table(definitions)?;
        registry.swap(table);
        Ok(registry)
    }

    /// Re-read the source and atomically replace the table.
    ///
    /// Returns the number of scenarios now loaded.
    pub fn reload(&self) -> Result<usize, ScenarioError> {
        let Some(source) = &self.source else {
            return Ok(self.snapshot().scenarios.len());
        };
        let definitions = if source.exists() {
            let loader = ScenarioLoader::from_sources([ScenarioSource::detect(source.clone())])?;
            info!(
                source = %source.display(),
                files = loader.files().len(),
                "Loaded scenario files"
            );
            loader.into_scenarios()
        } else {
            warn!(
                source = %source.display(),
                "Scenario source not found; only the built-in default scenario is available"
            );
            BTreeMap::new()
        };
        let table = self.build_table(definitions)?;
        let count = table.scenarios.len();
        self.swap(table);
        Ok(count)
    }

    fn build_table(
        &self,
        mut definitions: BTreeMap<String, ScenarioDefinition>,
    ) -> Result<ScenarioTable, ScenarioError> {
        for key in ["default", self.default_scenario.as_str()] {
            if !definitions.contains_key(key) {
                definitions.insert(key.to_string(), ScenarioDefinition::builtin_default(key));
            }
        }
        let mut scenarios = BTreeMap::new();
        for (key, mut definition) in definitions {
            definition.key = key.clone();
            definition.validate()?;
            let resolved = ResolvedScenario::resolve(definition, &self.generators, &self.handlers)?;
            scenarios.insert(key, Arc::new(resolved));
        }
        Ok(ScenarioTable { scenarios })
    }

    fn swap(&self, table: ScenarioTable) {
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    fn snapshot(&self) -> Arc<ScenarioTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    pub fn default_scenario(&self) -> &str {
        &self.default_scenario
    }

    pub fn exists(&self, name: &str) -> bool {
        self.snapshot().scenarios.contains_key(name)
    }

    /// Name a requested scenario is stored under, or `None` when strict mode
    /// does not know it.
    pub fn resolve_name(&self, requested: &str) -> Option<String> {
        if self.exists(requested) {
            return Some(requested.to_string());
        }
        match self.mode {
            RegistryMode::Strict => None,
            RegistryMode::AlwaysDefault => Some(self.default_scenario.clone()),
        }
    }

    /// Definition for `name`; in `always-default` mode unknown names get the
    /// default scenario.
    pub fn get(&self, name: &str) -> Option<Arc<ResolvedScenario>> {
        let table = self.snapshot();
        match table.scenarios.get(name) {
            Some(scenario) => Some(scenario.clone()),
            None if self.mode == RegistryMode::AlwaysDefault => {
                table.scenarios.get(&self.default_scenario).cloned()
            }
            None => None,
        }
    }

    pub fn response_config(&self, scenario: &str, endpoint: &str) -> Option<Arc<ResolvedOverride>> {
        self.get(scenario)?.response_for(endpoint)
    }

    /// Summaries sorted by scenario key.
    pub fn list(&self) -> Vec<ScenarioSummary> {
        self.snapshot()
            .scenarios
            .values()
            .map(|scenario| scenario.definition.summary())
            .collect()
    }

    pub fn metadata(&self, name: &str) -> Option<ScenarioMetadata> {
        self.get(name).map(|scenario| scenario.definition.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const SCENARIOS: &str = r#"
default:
  name: Default Scenario
  description: Default mock server responses
camera-performance-test:
  name: Camera Performance Test
  responses:
    catalog.hydrate:
      type: dynamic
      generator: camera-performance
      parameters:
        fixed_last_modified: "2025-08-27 20:24:35"
auth_failure:
  strategy: override
  responses:
    "*":
      type: error
      status_code: 401
    catalog.sync:
      type: static
      data: {ok: true}
"#;

    fn registries() -> (Arc<GeneratorRegistry>, Arc<HandlerRegistry>) {
        (
            Arc::new(GeneratorRegistry::with_builtins()),
            Arc::new(HandlerRegistry::with_builtins()),
        )
    }

    fn registry_from(dir: &tempfile::TempDir, mode: RegistryMode) -> ScenarioRegistry {
        let (generators, handlers) = registries();
        ScenarioRegistry::load(
            Some(dir.path().to_path_buf()),
            mode,
            "default",
            generators,
            handlers,
        )
        .expect("load")
    }

    fn scenario_dir(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("scenarios.yaml"), contents).expect("write");
        dir
    }

    #[test]
    fn exact_endpoint_beats_wildcard() {
        let dir = scenario_dir(SCENARIOS);
        let registry = registry_from(&dir, RegistryMode::Strict);

        let sync = registry
            .response_config("auth_failure", "catalog.sync")
            .expect("exact");
        assert_eq!(sync.config.kind, OverrideKind::Static);
        let other = registry
            .response_config("auth_failure", "catalog.hydrate")
            .expect("wildcard");
        assert_eq!(other.config.status_code, Some(401));
        assert!(registry.response_config("default", "catalog.sync").is_none());
    }

    #[test]
    fn generators_are_resolved_at_load() {
        let dir = scenario_dir(SCENARIOS);
        let registry = registry_from(&dir, RegistryMode::Strict);
        let hydrate = registry
            .response_config("camera-performance-test", "catalog.hydrate")
            .expect("config");
        assert_eq!(
            hydrate.generator.as_ref().map(|g| g.name().to_string()),
            Some("camera-performance".to_string())
        );
    }

    #[test]
    fn unknown_generator_fails_the_load() {
        let dir = scenario_dir(
            "broken:\n  responses:\n    catalog.hydrate:\n      type: dynamic\n      generator: NoSuchGenerator\n",
        );
        let (generators, handlers) = registries();
        let err = ScenarioRegistry::load(
            Some(dir.path().to_path_buf()),
            RegistryMode::Strict,
            "default",
            generators,
            handlers,
        )
        .err()
        .expect("unknown generator");
        assert!(err.to_string().contains("NoSuchGenerator"));
    }

    #[test]
    fn strict_mode_reports_unknown_names_as_absent() {
        let dir = scenario_dir(SCENARIOS);
        let registry = registry_from(&dir, RegistryMode::Strict);
        assert!(registry.exists("auth_failure"));
        assert!(registry.get("nope").is_none());
        assert_eq!(registry.resolve_name("nope"), None);
        assert_eq!(registry.resolve_name("auth_failure").as_deref(), Some("auth_failure"));
    }

    #[test]
    fn always_default_mode_coerces_unknown_names() {
        let dir = scenario_dir(SCENARIOS);
        let registry = registry_from(&dir, RegistryMode::AlwaysDefault);
        assert_eq!(registry.resolve_name("nope").as_deref(), Some("default"));
        assert_eq!(registry.resolve_name("auth_failure").as_deref(), Some("auth_failure"));
        assert_eq!(registry.get("nope").map(|s| s.key().to_string()), Some("default".to_string()));
    }

    #[test]
    fn missing_source_still_provides_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (generators, handlers) = registries();
        let registry = ScenarioRegistry::load(
            Some(dir.path().join("absent")),
            RegistryMode::Strict,
            "default",
            generators,
            handlers,
        )
        .expect("load");

        let names: Vec<String> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["default"]);
        assert_eq!(
            registry.metadata("default").map(|m| m.name),
            Some("Default Scenario".to_string())
        );
    }

    #[test]
    fn failed_reload_keeps_the_previous_table() {
        let dir = scenario_dir(SCENARIOS);
        let registry = registry_from(&dir, RegistryMode::Strict);
        assert_eq!(registry.list().len(), 3);

        fs::write(dir.path().join("scenarios.yaml"), "default: [broken").expect("write");
        assert!(registry.reload().is_err());
        assert!(registry.exists("auth_failure"));

        fs::write(
            dir.path().join("scenarios.yaml"),
            "default:\n  name: Only\nextra:\n  name: Extra\n",
        )
        .expect("write");
        assert_eq!(registry.reload().expect("reload"), 2);
        assert!(!registry.exists("auth_failure"));
        assert!(registry.exists("extra"));
    }

    #[test]
    fn summaries_list_configured_endpoints() {
        let dir = scenario_dir(SCENARIOS);
        let registry = registry_from(&dir, RegistryMode::Strict);
        let auth = registry
            .list()
            .into_iter()
            .find(|s| s.name == "auth_failure")
            .expect("listed");
        assert_eq!(auth.endpoints, vec!["*", "catalog.sync"]);
        assert_eq!(auth.display_name, "auth_failure");
    }
}
