mod common;

use knob_core::protocol::dispatch_line;
use knob_core::{load_knob_catalog_config_from_env, KnobCatalogConfig, KnobRegistry};
use knob_runtime::ProtocolErrorKind;

#[test]
fn env_override_selects_fixture_catalog() {
    common::ensure_test_catalog();
    let (config, metadata) = load_knob_catalog_config_from_env();

    assert!(metadata
        .path()
        .map(|path| path.ends_with("test_knob_catalog.json"))
        .unwrap_or(false));
    assert_eq!(config.systems.len(), 1);

    let load = KnobRegistry::from_config(&config);
    assert!(load.failures.is_empty());
    let registry = load.registry;
    let fixture = registry.system("fixture").expect("fixture system");
    assert_eq!(fixture.current("alpha"), Some(0.25));

    let clamped: Vec<_> = fixture.with_set(|set| {
        set.init_log()
            .iter()
            .filter(|entry| entry.clamped)
            .map(|entry| (entry.key.clone(), entry.seeded))
            .collect()
    });
    assert_eq!(clamped, vec![("beta".to_string(), 2.0)]);
}

#[test]
fn broken_subsystem_does_not_block_healthy_ones() {
    let config = KnobCatalogConfig::from_json_str(
        r#"{"systems":[
            {"name":"migration","knobs":[{"key":"border_openness","initial":0.5}]},
            {"name":"policy","knobs":[
                {"key":"reform_pace","initial":0.3},
                {"key":"reform_pace","initial":0.4}
            ]},
            {"name":"trade","knobs":[
                {"key":"tariff_level","initial":0.1,"min":0.4,"max":0.2}
            ]}
        ]}"#,
    )
    .expect("config parses");
    let load = KnobRegistry::from_config(&config);

    assert_eq!(load.failed_systems(), vec!["policy", "trade"]);
    let registry = load.registry;
    assert_eq!(registry.len(), 1);

    let dispatched = dispatch_line(
        &registry,
        r#"{"op":"update","system":"migration","knobs":{"border_openness":"high"}}"#,
    );
    assert!(dispatched.reply.ok);
    let missing = dispatch_line(&registry, r#"{"op":"values","system":"policy"}"#);
    assert_eq!(missing.reply.kind, Some(ProtocolErrorKind::UnknownSystem));
}
