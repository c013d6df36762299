use knob_schema::{BatchOutcome, KnobErrorKind, PerKeyOutcome, UpdateRequest};
use tracing::{debug, info, warn};

use crate::normalize::normalize;
use crate::store::{now_ms, KnobSet};

/// Apply a batch of raw inputs to `set`, one key at a time.
///
/// Unknown keys and unparseable inputs are reported in the outcome and leave
/// the rest of the batch unaffected. This never fails for caller input.
pub fn update_knobs(set: &mut KnobSet, request: &UpdateRequest) -> BatchOutcome {
    update_knobs_at(set, request, now_ms())
}

/// [`update_knobs`] with an explicit timestamp for the provenance record.
pub fn update_knobs_at(set: &mut KnobSet, request: &UpdateRequest, now: u64) -> BatchOutcome {
    let system = set.owner_name().to_string();
    let mut outcomes = Vec::with_capacity(request.knobs.len());

    for (key, raw) in &request.knobs {
        let Some(entry) = set.entry_mut(key) else {
            warn!(
                target: "galactic::knobs",
                system = %system,
                key = %key,
                "knobs.update.rejected=unknown_knob"
            );
            outcomes.push(PerKeyOutcome::rejected(
                key.as_str(),
                KnobErrorKind::UnknownKnob,
                None,
                Some(format!("no knob named '{key}' in {system}")),
            ));
            continue;
        };

        let previous = entry.value.current;
        match normalize(raw, previous, &entry.definition) {
            Ok(normalized) => {
                entry
                    .value
                    .replace(normalized.value, &request.source, now);
                if normalized.clamped {
                    warn!(
                        target: "galactic::knobs",
                        system = %system,
                        key = %key,
                        value = normalized.value,
                        "knobs.update.clamped"
                    );
                }
                debug!(
                    target: "galactic::knobs",
                    system = %system,
                    key = %key,
                    previous,
                    value = normalized.value,
                    format = %normalized.format,
                    source = %request.source,
                    "knobs.update.applied"
                );
                outcomes.push(PerKeyOutcome::applied(
                    key.as_str(),
                    previous,
                    normalized.value,
                    normalized.clamped,
                ));
            }
            Err(rejection) => {
                warn!(
                    target: "galactic::knobs",
                    system = %system,
                    key = %key,
                    input = %raw,
                    reason = %rejection,
                    "knobs.update.rejected=invalid_format"
                );
                outcomes.push(PerKeyOutcome::rejected(
                    key.as_str(),
                    rejection.kind(),
                    Some(previous),
                    Some(rejection.to_string()),
                ));
            }
        }
    }

    let batch = BatchOutcome::from_outcomes(outcomes);
    if batch.applied_count > 0 {
        set.stamp(now);
    }
    info!(
        target: "galactic::knobs",
        system = %system,
        source = %request.source,
        applied = batch.applied_count,
        rejected = batch.rejected_count,
        success = batch.success,
        "knobs.batch.completed"
    );
    batch
}

/// Restore every knob of `set` to its catalog default.
pub fn reset_knobs(set: &mut KnobSet, source: &str) -> BatchOutcome {
    reset_knobs_at(set, source, now_ms())
}

pub fn reset_knobs_at(set: &mut KnobSet, source: &str, now: u64) -> BatchOutcome {
    let outcomes: Vec<_> = set
        .entries_mut()
        .map(|entry| {
            let previous = entry.value.current;
            let default = entry.definition.default;
            entry.value.replace(default, source, now);
            PerKeyOutcome::applied(entry.definition.key.as_str(), previous, default, false)
        })
        .collect();

    let batch = BatchOutcome::from_outcomes(outcomes);
    if batch.applied_count > 0 {
        set.stamp(now);
    }
    info!(
        target: "galactic::knobs",
        system = %set.owner_name(),
        source,
        reset = batch.applied_count,
        "knobs.reset.completed"
    );
    batch
}
