mod common;

use anyhow::{Context, Result};
use knob_core::protocol::{dispatch_line, encode_reply};
use knob_runtime::{KnobDocs, ProtocolErrorKind, SystemSummary, UpdateResponse, ValuesSnapshot};
use serde_json::json;

#[test]
fn values_describe_update_roundtrip() -> Result<()> {
    let registry = common::builtin_registry();

    let values = dispatch_line(&registry, r#"{"op":"values","system":"migration"}"#);
    let snapshot: ValuesSnapshot =
        serde_json::from_value(values.reply.data.context("values data")?)?;
    assert_eq!(snapshot.values["border_openness"].current, 0.5);

    let docs = dispatch_line(&registry, r#"{"op":"describe","system":"migration"}"#);
    let docs: KnobDocs = serde_json::from_value(docs.reply.data.context("describe data")?)?;
    assert_eq!(docs.per_knob["border_openness"].category, "Border Policy");
    assert!(docs.examples.contains(&"high".to_string()));

    let update = dispatch_line(
        &registry,
        &json!({
            "op": "update",
            "system": "migration",
            "source": "manual",
            "knobs": { "border_openness": "+0.2", "refugee_acceptance": "medium", "ghost": 1 }
        })
        .to_string(),
    );
    let response: UpdateResponse =
        serde_json::from_value(update.reply.data.context("update data")?)?;
    assert_eq!(response.system, "migration");
    assert!(!response.outcome.success);
    assert_eq!(response.outcome.applied_count, 2);
    assert!(response.message.contains("ghost (unknown_knob)"));

    let keys: Vec<_> = response
        .outcome
        .outcomes
        .iter()
        .map(|outcome| outcome.key.as_str())
        .collect();
    assert_eq!(keys, vec!["border_openness", "refugee_acceptance", "ghost"]);

    let after = registry.system("migration").context("migration")?.snapshot();
    assert_eq!(after.values["border_openness"].current, 0.7);
    assert_eq!(after.values["border_openness"].last_source, "manual");
    Ok(())
}

#[test]
fn systems_listing_names_all_subsystems() -> Result<()> {
    let registry = common::builtin_registry();
    let reply = dispatch_line(&registry, r#"{"op":"systems"}"#).reply;
    let systems: Vec<SystemSummary> = serde_json::from_value(reply.data.context("systems")?)?;
    let names: Vec<_> = systems.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["cities", "demographics", "migration", "policy", "social_content", "trade"]
    );
    Ok(())
}

#[test]
fn schema_describes_update_request() -> Result<()> {
    let registry = common::builtin_registry();
    let reply = dispatch_line(&registry, r#"{"op":"schema"}"#).reply;
    let schema = reply.data.context("schema")?;
    assert_eq!(schema["title"], json!("UpdateRequest"));
    assert!(schema["properties"]["source"].is_object());
    Ok(())
}

#[test]
fn malformed_lines_never_reach_engine() {
    let registry = common::builtin_registry();
    let before = registry.system("cities").map(|h| h.snapshot());

    for line in [
        "not json",
        r#"{"op":"update","system":"cities"}"#,
        r#"{"op":"update","system":"cities","knobs":0.5}"#,
        r#"{"op":"explode"}"#,
    ] {
        let dispatched = dispatch_line(&registry, line);
        assert!(!dispatched.reply.ok, "line should fail: {line}");
        assert_eq!(dispatched.reply.kind, Some(ProtocolErrorKind::MalformedRequest));
        assert!(encode_reply(&dispatched.reply).contains("malformed_request"));
    }

    assert_eq!(registry.system("cities").map(|h| h.snapshot()), before);
}
