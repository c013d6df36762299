use knob_schema::{
    BatchOutcome, KnobDescription, KnobDocs, KnobReading, UpdateResponse, ValuesSnapshot,
};

use crate::normalize::LEVEL_MAP;
use crate::store::KnobSet;

/// Illustrative payloads, one per accepted format.
pub const EXAMPLE_PAYLOADS: [&str; 6] = ["0.75", "75%", "+0.1", "-0.05", "high", "true"];

/// Owned copy of every value of `set`, with bounds and provenance.
pub fn snapshot_with_metadata(set: &KnobSet) -> ValuesSnapshot {
    let values = set
        .entries()
        .map(|entry| {
            (
                entry.definition.key.clone(),
                KnobReading {
                    current: entry.value.current,
                    min: entry.definition.min,
                    max: entry.definition.max,
                    category: entry.definition.category.clone(),
                    last_source: entry.value.last_source.clone(),
                    last_updated_at: entry.value.last_updated_at,
                },
            )
        })
        .collect();

    ValuesSnapshot {
        system: set.owner_name().to_string(),
        values,
        set_last_updated_at: set.set_last_updated_at(),
    }
}

/// Static documentation of `set`.
pub fn describe(set: &KnobSet) -> KnobDocs {
    let per_knob = set
        .entries()
        .map(|entry| {
            let definition = &entry.definition;
            (
                definition.key.clone(),
                KnobDescription {
                    description: definition.description.clone(),
                    category: definition.category.clone(),
                    accepted_formats: definition.accepted_formats.formats(),
                    min: definition.min,
                    max: definition.max,
                    default: definition.default,
                },
            )
        })
        .collect();

    KnobDocs {
        system: set.owner_name().to_string(),
        per_knob,
        examples: EXAMPLE_PAYLOADS.iter().map(|s| s.to_string()).collect(),
        levels: LEVEL_MAP
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect(),
    }
}

/// Human summary of a batch, with a format hint when keys were rejected.
pub fn update_message(system: &str, outcome: &BatchOutcome) -> String {
    if outcome.outcomes.is_empty() {
        return format!("No knobs supplied for {system}");
    }

    let mut message = if outcome.success {
        format!("Updated {} knob(s) on {system}", outcome.applied_count)
    } else if outcome.applied_count > 0 {
        format!(
            "Partially updated {system}: {} applied, {} rejected",
            outcome.applied_count, outcome.rejected_count
        )
    } else {
        format!(
            "No knobs updated on {system}: {} rejected",
            outcome.rejected_count
        )
    };

    let clamped = outcome.clamped_count();
    if clamped > 0 {
        message.push_str(&format!("; {clamped} clamped to bounds"));
    }

    if outcome.rejected_count > 0 {
        let rejected: Vec<String> = outcome
            .rejected()
            .map(|entry| match entry.error_kind {
                Some(kind) => format!("{} ({kind})", entry.key),
                None => entry.key.clone(),
            })
            .collect();
        message.push_str(&format!(
            ". Rejected: {}. Accepted inputs look like: {}",
            rejected.join(", "),
            EXAMPLE_PAYLOADS.join(", ")
        ));
    }

    message
}

pub fn update_response(system: &str, outcome: BatchOutcome) -> UpdateResponse {
    UpdateResponse {
        system: system.to_string(),
        message: update_message(system, &outcome),
        outcome,
    }
}
