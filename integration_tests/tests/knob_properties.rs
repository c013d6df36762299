mod common;

use std::collections::BTreeMap;

use knob_runtime::{
    build_catalog, update_knobs, KnobErrorKind, KnobOverride, KnobSet, UpdateRequest,
};
use serde_json::json;

fn unit_set(values: &[(&str, f64)]) -> KnobSet {
    build_catalog("cities", values.iter().copied(), &BTreeMap::new()).expect("catalog builds")
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("knob present");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn percentage_is_independent_of_prior_value() {
    let mut overrides = BTreeMap::new();
    overrides.insert(
        "birth_rate_modifier".to_string(),
        KnobOverride {
            min: Some(-0.5),
            max: Some(0.5),
            ..KnobOverride::default()
        },
    );

    for prior in [-0.5, -0.1, 0.0, 0.3, 0.5] {
        let mut set = build_catalog("demographics", [("birth_rate_modifier", prior)], &overrides)
            .expect("catalog builds");
        update_knobs(
            &mut set,
            &UpdateRequest::default().with("birth_rate_modifier", "50%"),
        );
        assert_close(set.current("birth_rate_modifier"), 0.0);
    }

    for prior in [0.0, 0.2, 1.0] {
        let mut set = unit_set(&[("tourism_investment", prior)]);
        update_knobs(&mut set, &UpdateRequest::default().with("tourism_investment", "50%"));
        assert_close(set.current("tourism_investment"), 0.5);
    }
}

#[test]
fn relative_delta_accumulates_and_clamps() {
    let mut set = unit_set(&[("industrial_development", 0.6)]);
    let outcome = update_knobs(
        &mut set,
        &UpdateRequest::default().with("industrial_development", "+0.5"),
    );
    let record = outcome.outcome("industrial_development").expect("outcome");
    assert!(record.applied);
    assert!(record.clamped);
    assert_eq!(record.new_value, Some(1.0));
    assert_eq!(set.current("industrial_development"), Some(1.0));
}

#[test]
fn qualitative_labels_ignore_case() {
    let mut upper = unit_set(&[("cultural_development", 0.1)]);
    let mut lower = unit_set(&[("cultural_development", 0.9)]);
    update_knobs(&mut upper, &UpdateRequest::default().with("cultural_development", "HIGH"));
    update_knobs(&mut lower, &UpdateRequest::default().with("cultural_development", "high"));
    assert_eq!(
        upper.current("cultural_development"),
        lower.current("cultural_development")
    );
    assert_eq!(upper.current("cultural_development"), Some(0.75));
}

#[test]
fn partial_failure_is_isolated() {
    let mut set = unit_set(&[("valid_key", 0.8)]);
    let outcome = update_knobs(
        &mut set,
        &UpdateRequest::default()
            .with("valid_key", "0.3")
            .with("nonexistent", "0.5"),
    );

    assert_eq!(set.current("valid_key"), Some(0.3));
    assert_eq!(outcome.applied_count, 1);
    assert_eq!(outcome.rejected_count, 1);
    assert!(!outcome.success);
    assert_eq!(
        outcome.outcome("nonexistent").and_then(|o| o.error_kind),
        Some(KnobErrorKind::UnknownKnob)
    );
}

#[test]
fn full_rejection_mutates_nothing() {
    let mut registry_set = unit_set(&[("a", 0.1), ("b", 0.9)]);
    let before: Vec<_> = registry_set.entries().cloned().collect();
    let before_stamp = registry_set.set_last_updated_at();

    let outcome = update_knobs(&mut registry_set, &UpdateRequest::default().with("badkey", "x"));
    assert!(!outcome.success);
    assert_eq!(outcome.applied_count, 0);

    let invalid = update_knobs(&mut registry_set, &UpdateRequest::default().with("a", "x"));
    assert_eq!(
        invalid.outcome("a").and_then(|o| o.error_kind),
        Some(KnobErrorKind::InvalidFormat)
    );

    let after: Vec<_> = registry_set.entries().cloned().collect();
    assert_eq!(before, after);
    assert_eq!(registry_set.set_last_updated_at(), before_stamp);
}

#[test]
fn industrial_development_absolute_update() {
    let registry = common::builtin_registry();
    let cities = registry.system("cities").expect("cities");
    let outcome = cities.update(&UpdateRequest::default().with("industrial_development", "0.9"));

    assert!(outcome.success);
    let record = outcome.outcome("industrial_development").expect("outcome");
    assert!(record.applied);
    assert!(!record.clamped);
    assert_eq!(record.previous_value, Some(0.6));
    assert_eq!(record.new_value, Some(0.9));
}

#[test]
fn research_priority_max_label() {
    let registry = common::builtin_registry();
    let cities = registry.system("cities").expect("cities");
    assert_eq!(cities.current("research_facility_priority"), Some(0.8));
    cities.update(&UpdateRequest::default().with("research_facility_priority", "max"));
    assert_eq!(cities.current("research_facility_priority"), Some(1.0));
}

#[test]
fn two_key_batch_with_percentage_and_label() {
    let registry = common::builtin_registry();
    let cities = registry.system("cities").expect("cities");
    let outcome = cities.update(
        &UpdateRequest::default()
            .with("tourism_investment", "75%")
            .with("cultural_development", "low"),
    );

    assert!(outcome.success);
    assert_eq!(outcome.applied_count, 2);
    assert_eq!(cities.current("tourism_investment"), Some(0.75));
    assert_eq!(cities.current("cultural_development"), Some(0.25));
}

#[test]
fn format_restrictions_come_from_catalog() {
    let registry = common::builtin_registry();
    let policy = registry.system("policy").expect("policy");

    let outcome = policy.update(&UpdateRequest::default().with("tax_rate_adjustment", "high"));
    assert_eq!(
        outcome.outcome("tax_rate_adjustment").and_then(|o| o.error_kind),
        Some(KnobErrorKind::InvalidFormat)
    );

    let outcome = policy.update(&UpdateRequest::default().with("emergency_powers", json!(true)));
    assert!(outcome.success);
    assert_eq!(policy.current("emergency_powers"), Some(1.0));
}
