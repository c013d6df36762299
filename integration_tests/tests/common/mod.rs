use std::path::PathBuf;
use std::sync::Once;

use knob_core::{KnobCatalogConfig, KnobRegistry};

static INIT: Once = Once::new();

pub fn ensure_test_catalog() {
    INIT.call_once(|| {
        let catalog_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_knob_catalog.json");

        debug_assert!(
            catalog_path.exists(),
            "missing test knob catalog at {}",
            catalog_path.display()
        );

        std::env::set_var("KNOB_CATALOG_PATH", &catalog_path);
    });
}

pub fn builtin_registry() -> KnobRegistry {
    KnobRegistry::from_config(&KnobCatalogConfig::builtin()).registry
}
