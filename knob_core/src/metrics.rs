use std::collections::BTreeMap;

use bevy::prelude::*;
use knob_runtime::BatchOutcome;

use crate::registry::KnobRegistry;

/// Emitted once per batch handled by the knob protocol.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct KnobBatchApplied {
    pub system: String,
    pub applied: usize,
    pub rejected: usize,
    pub clamped: usize,
    pub reset: bool,
}

impl KnobBatchApplied {
    pub fn from_outcome(system: &str, outcome: &BatchOutcome, reset: bool) -> Self {
        Self {
            system: system.to_string(),
            applied: outcome.applied_count,
            rejected: outcome.rejected_count,
            clamped: outcome.clamped_count(),
            reset,
        }
    }
}

#[derive(Resource, Default, Debug, Clone)]
pub struct KnobMetrics {
    pub batches: u64,
    pub resets: u64,
    pub applied: u64,
    pub rejected: u64,
    pub clamped: u64,
    pub per_system_batches: BTreeMap<String, u64>,
}

/// Latest `system -> key -> value` view, refreshed every update for game
/// systems that read knobs.
#[derive(Resource, Default, Debug, Clone)]
pub struct KnobValueCache {
    pub systems: BTreeMap<String, BTreeMap<String, f64>>,
}

impl KnobValueCache {
    pub fn value(&self, system: &str, key: &str) -> Option<f64> {
        self.systems.get(system)?.get(key).copied()
    }
}

pub fn collect_knob_metrics(
    mut events: EventReader<KnobBatchApplied>,
    mut metrics: ResMut<KnobMetrics>,
) {
    for event in events.read() {
        metrics.batches += 1;
        if event.reset {
            metrics.resets += 1;
        }
        metrics.applied += event.applied as u64;
        metrics.rejected += event.rejected as u64;
        metrics.clamped += event.clamped as u64;
        *metrics
            .per_system_batches
            .entry(event.system.clone())
            .or_insert(0) += 1;
    }
}

pub fn refresh_knob_cache(registry: Res<KnobRegistry>, mut cache: ResMut<KnobValueCache>) {
    for handle in registry.handles() {
        let values = handle.with_set(|set| set.values());
        cache.systems.insert(handle.name().to_string(), values);
    }
}
