use std::collections::BTreeMap;

use bevy::prelude::Resource;
use knob_runtime::{build_catalog, CatalogError, KnobSet, SharedKnobSet, SystemSummary};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::KnobCatalogConfig;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("system '{system}' failed to start: {source}")]
    Catalog {
        system: String,
        #[source]
        source: CatalogError,
    },
    #[error("system '{0}' is registered more than once")]
    DuplicateSystem(String),
}

impl RegistryError {
    /// Name of the subsystem that failed to start.
    pub fn system(&self) -> &str {
        match self {
            RegistryError::Catalog { system, .. } => system,
            RegistryError::DuplicateSystem(system) => system,
        }
    }
}

/// Result of [`KnobRegistry::from_config`]: the subsystems that started and
/// the ones that did not.
#[derive(Debug)]
pub struct RegistryLoad {
    pub registry: KnobRegistry,
    pub failures: Vec<RegistryError>,
}

impl RegistryLoad {
    pub fn failed_systems(&self) -> Vec<&str> {
        self.failures.iter().map(RegistryError::system).collect()
    }
}

/// Knob sets of every subsystem, keyed by system name.
///
/// Built once at startup and handed to whoever serves or consumes knobs;
/// [`KnobRegistry::shutdown`] ends its lifetime explicitly.
#[derive(Resource, Debug, Clone, Default)]
pub struct KnobRegistry {
    systems: BTreeMap<String, SharedKnobSet>,
}

impl KnobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every subsystem of `config`.
    ///
    /// A subsystem whose catalog fails to build is left out and reported in
    /// [`RegistryLoad::failures`]; the others start normally.
    pub fn from_config(config: &KnobCatalogConfig) -> RegistryLoad {
        let mut registry = Self::new();
        let mut failures = Vec::new();
        for system in &config.systems {
            let built = build_catalog(
                system.name.clone(),
                system.initial_values(),
                &system.overrides(),
            )
            .map_err(|source| RegistryError::Catalog {
                system: system.name.clone(),
                source,
            })
            .and_then(|set| registry.register(set));

            if let Err(err) = built {
                error!(
                    target: "galactic::knobs",
                    system = %system.name,
                    error = %err,
                    "knobs.system.startup_failed"
                );
                failures.push(err);
            }
        }
        RegistryLoad { registry, failures }
    }

    pub fn register(&mut self, set: KnobSet) -> Result<SharedKnobSet, RegistryError> {
        let name = set.owner_name().to_string();
        if self.systems.contains_key(&name) {
            return Err(RegistryError::DuplicateSystem(name));
        }

        if set.is_empty() {
            warn!(target: "galactic::knobs", system = %name, "knobs.system.empty");
        }
        let clamped = set.init_log().iter().filter(|entry| entry.clamped).count();
        info!(
            target: "galactic::knobs",
            system = %name,
            knobs = set.len(),
            clamped_on_init = clamped,
            "knobs.system.registered"
        );

        let handle = SharedKnobSet::new(set);
        self.systems.insert(name, handle.clone());
        Ok(handle)
    }

    pub fn system(&self, name: &str) -> Option<&SharedKnobSet> {
        self.systems.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &SharedKnobSet> {
        self.systems.values()
    }

    pub fn summaries(&self) -> Vec<SystemSummary> {
        self.systems
            .values()
            .map(|handle| {
                handle.with_set(|set| SystemSummary {
                    name: set.owner_name().to_string(),
                    knob_count: set.len(),
                    set_last_updated_at: set.set_last_updated_at(),
                })
            })
            .collect()
    }

    /// Log the final value of every knob and drop all handles held here.
    pub fn shutdown(self) {
        for handle in self.systems.values() {
            let values = handle.with_set(KnobSet::values);
            info!(
                target: "galactic::knobs",
                system = %handle.name(),
                values = ?values,
                "knobs.system.shutdown"
            );
        }
        if self.systems.is_empty() {
            warn!(target: "galactic::knobs", "knobs.registry.shutdown_empty");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knob_runtime::UpdateRequest;

    fn builtin() -> KnobRegistry {
        let load = KnobRegistry::from_config(&KnobCatalogConfig::builtin());
        assert!(load.failures.is_empty(), "builtin catalog builds cleanly");
        load.registry
    }

    #[test]
    fn builtin_registry_has_six_systems() {
        let registry = builtin();
        assert_eq!(registry.len(), 6);
        let cities = registry.system("cities").expect("cities registered");
        assert_eq!(cities.current("industrial_development"), Some(0.6));
    }

    #[test]
    fn handles_share_state_with_registry() {
        let registry = builtin();
        let trade = registry.system("trade").cloned().expect("trade registered");
        trade.update(&UpdateRequest::default().with("route_security", "high"));
        assert_eq!(
            registry
                .system("trade")
                .and_then(|handle| handle.current("route_security")),
            Some(0.75)
        );
    }

    #[test]
    fn duplicate_knob_key_fails_only_that_system() {
        let config = KnobCatalogConfig::from_json_str(
            r#"{"systems":[
                {"name":"trade","knobs":[{"key":"tariff_level","initial":0.1}]},
                {"name":"cities","knobs":[
                    {"key":"industrial_development","initial":0.6},
                    {"key":"industrial_development","initial":0.2}
                ]}
            ]}"#,
        )
        .expect("config parses");
        let load = KnobRegistry::from_config(&config);

        assert_eq!(load.failed_systems(), vec!["cities"]);
        match &load.failures[0] {
            RegistryError::Catalog { source, .. } => {
                assert_eq!(source.kind(), "construction_duplicate_key");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(load.registry.system("cities").is_none());
        let trade = load.registry.system("trade").expect("trade still starts");
        trade.update(&UpdateRequest::default().with("tariff_level", "+0.05"));
        assert_eq!(trade.current("tariff_level"), Some(0.15));
    }

    #[test]
    fn duplicate_system_keeps_first_registration() {
        let config = KnobCatalogConfig::from_json_str(
            r#"{"systems":[
                {"name":"trade","knobs":[{"key":"a","initial":0.1}]},
                {"name":"trade","knobs":[{"key":"b","initial":0.1}]}
            ]}"#,
        )
        .expect("config parses");
        let load = KnobRegistry::from_config(&config);
        assert!(matches!(
            load.failures.as_slice(),
            [RegistryError::DuplicateSystem(name)] if name == "trade"
        ));
        let trade = load.registry.system("trade").expect("first trade registered");
        assert_eq!(trade.current("a"), Some(0.1));
        assert_eq!(trade.current("b"), None);
    }

    #[test]
    fn summaries_list_every_system() {
        let registry = builtin();
        let summaries = registry.summaries();
        let policy = summaries
            .iter()
            .find(|summary| summary.name == "policy")
            .expect("policy summary");
        assert_eq!(policy.knob_count, 5);
        registry.shutdown();
    }
}
