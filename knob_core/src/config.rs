//! Catalog configuration for every knob-owning subsystem.
//!
//! Loaded from `knob_catalog.json`, with a file override selected by the
//! `KNOB_CATALOG_PATH` environment variable.

use std::{
    collections::BTreeMap,
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use knob_runtime::{AcceptedFormats, KnobFormat, KnobOverride};
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_KNOB_CATALOG: &str = include_str!("data/knob_catalog.json");

/// Every subsystem and the knobs it owns.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KnobCatalogConfig {
    pub systems: Vec<SubsystemConfig>,
}

impl KnobCatalogConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_KNOB_CATALOG)
                .expect("builtin knob catalog should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, KnobCatalogConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| KnobCatalogConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = KnobCatalogConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn system(&self, name: &str) -> Option<&SubsystemConfig> {
        self.systems.iter().find(|system| system.name == name)
    }
}

#[derive(Debug, Error)]
pub enum KnobCatalogConfigError {
    #[error("failed to parse knob catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read knob catalog from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubsystemConfig {
    pub name: String,
    pub knobs: Vec<KnobConfigEntry>,
}

impl SubsystemConfig {
    /// Initial values in declaration order, duplicates included.
    pub fn initial_values(&self) -> Vec<(String, f64)> {
        self.knobs
            .iter()
            .map(|knob| (knob.key.clone(), knob.initial))
            .collect()
    }

    pub fn overrides(&self) -> BTreeMap<String, KnobOverride> {
        self.knobs
            .iter()
            .filter_map(|knob| knob.to_override().map(|o| (knob.key.clone(), o)))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnobConfigEntry {
    pub key: String,
    pub initial: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub accepted_formats: Option<Vec<KnobFormat>>,
}

impl KnobConfigEntry {
    fn to_override(&self) -> Option<KnobOverride> {
        let knob_override = KnobOverride {
            min: self.min,
            max: self.max,
            category: self.category.clone(),
            description: self.description.clone(),
            accepted_formats: self
                .accepted_formats
                .as_ref()
                .map(|formats| formats.iter().copied().collect::<AcceptedFormats>()),
        };
        (knob_override != KnobOverride::default()).then_some(knob_override)
    }
}

#[derive(Debug, Clone)]
pub struct KnobCatalogMetadata {
    path: Option<PathBuf>,
}

impl KnobCatalogMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_knob_catalog_config_from_env() -> (Arc<KnobCatalogConfig>, KnobCatalogMetadata) {
    let override_path = env::var("KNOB_CATALOG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/knob_catalog.json");

    let candidates: Vec<PathBuf> = match override_path {
        Some(ref path) => vec![path.clone()],
        None => vec![default_path.clone()],
    };

    for path in candidates {
        match KnobCatalogConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "galactic::config",
                    path = %path.display(),
                    systems = config.systems.len(),
                    "knob_catalog.loaded=file"
                );
                return (Arc::new(config), KnobCatalogMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "galactic::config",
                    path = %path.display(),
                    error = %err,
                    "knob_catalog.load_failed"
                );
            }
        }
    }

    let config = KnobCatalogConfig::builtin();
    tracing::info!(target: "galactic::config", "knob_catalog.loaded=builtin");
    (config, KnobCatalogMetadata::new(None))
}

/// Network settings for the knob server.
#[derive(Debug, Clone)]
pub struct KnobServerConfig {
    pub bind: SocketAddr,
}

impl Default for KnobServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 41100),
        }
    }
}

impl KnobServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var("KNOB_SERVER_BIND") {
            match raw.parse() {
                Ok(bind) => config.bind = bind,
                Err(err) => tracing::warn!(
                    target: "galactic::config",
                    value = %raw,
                    error = %err,
                    "knob_server.bind_invalid"
                ),
            }
        }
        config
    }
}
