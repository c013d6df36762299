//! Process wiring for the Galactic knob engine.
//!
//! Loads the knob catalog, builds one knob set per subsystem, exposes them
//! to Bevy game systems as resources and serves them over the knob line
//! protocol via [`protocol::dispatch_line`] and [`serve::serve_requests`].

mod config;
pub mod metrics;
pub mod protocol;
mod registry;
pub mod serve;

use bevy::prelude::*;

pub use config::{
    load_knob_catalog_config_from_env, KnobCatalogConfig, KnobCatalogConfigError,
    KnobCatalogMetadata, KnobConfigEntry, KnobServerConfig, SubsystemConfig,
    BUILTIN_KNOB_CATALOG,
};
pub use metrics::{KnobBatchApplied, KnobMetrics, KnobValueCache};
pub use registry::{KnobRegistry, RegistryError, RegistryLoad};

/// Installs a [`KnobRegistry`] and the systems that track it.
pub struct KnobPlugin {
    registry: KnobRegistry,
}

impl KnobPlugin {
    pub fn new(registry: KnobRegistry) -> Self {
        Self { registry }
    }
}

impl Plugin for KnobPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.registry.clone())
            .init_resource::<KnobMetrics>()
            .init_resource::<KnobValueCache>()
            .add_event::<KnobBatchApplied>()
            .add_systems(
                Update,
                (metrics::collect_knob_metrics, metrics::refresh_knob_cache).chain(),
            );
    }
}

/// Construct a headless Bevy [`App`] that owns `registry`.
pub fn build_headless_app(registry: KnobRegistry) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(KnobPlugin::new(registry));
    app
}

/// Run one update so metrics and the value cache catch up with the registry.
pub fn run_update(app: &mut App) {
    app.update();
}
