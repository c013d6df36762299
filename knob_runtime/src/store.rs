use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::AcceptedFormats;

/// Milliseconds since the Unix epoch, used for knob provenance.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Static description of one knob. Immutable once the catalog is built.
#[derive(Debug, Clone, PartialEq)]
pub struct KnobDefinition {
    pub key: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub category: String,
    pub description: String,
    pub accepted_formats: AcceptedFormats,
}

/// Current value of one knob plus the provenance of its last write.
#[derive(Debug, Clone, PartialEq)]
pub struct KnobValue {
    pub key: String,
    pub current: f64,
    pub last_source: String,
    pub last_updated_at: u64,
}

impl KnobValue {
    pub(crate) fn replace(&mut self, value: f64, source: &str, now: u64) {
        self.current = value;
        self.last_source.clear();
        self.last_source.push_str(source);
        self.last_updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnobEntry {
    pub definition: KnobDefinition,
    pub value: KnobValue,
}

/// Record of how one knob was seeded when its catalog was built.
#[derive(Debug, Clone, PartialEq)]
pub struct InitLogEntry {
    pub key: String,
    pub requested: f64,
    pub seeded: f64,
    pub clamped: bool,
}

/// All knobs owned by one subsystem.
///
/// Values only change through [`crate::update_knobs`] and
/// [`crate::reset_knobs`], both of which route through the bounds enforcer.
#[derive(Debug, Clone)]
pub struct KnobSet {
    owner_name: String,
    entries: BTreeMap<String, KnobEntry>,
    set_last_updated_at: u64,
    init_log: Vec<InitLogEntry>,
}

impl KnobSet {
    pub(crate) fn new(
        owner_name: String,
        entries: BTreeMap<String, KnobEntry>,
        init_log: Vec<InitLogEntry>,
        created_at: u64,
    ) -> Self {
        Self {
            owner_name,
            entries,
            set_last_updated_at: created_at,
            init_log,
        }
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&KnobEntry> {
        self.entries.get(key)
    }

    pub fn current(&self, key: &str) -> Option<f64> {
        self.entries.get(key).map(|entry| entry.value.current)
    }

    pub fn definition(&self, key: &str) -> Option<&KnobDefinition> {
        self.entries.get(key).map(|entry| &entry.definition)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &KnobEntry> {
        self.entries.values()
    }

    /// Plain `key -> current` view for downstream game formulas.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.current))
            .collect()
    }

    pub fn set_last_updated_at(&self) -> u64 {
        self.set_last_updated_at
    }

    pub fn init_log(&self) -> &[InitLogEntry] {
        &self.init_log
    }

    pub(crate) fn entry_mut(&mut self, key: &str) -> Option<&mut KnobEntry> {
        self.entries.get_mut(key)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut KnobEntry> {
        self.entries.values_mut()
    }

    pub(crate) fn stamp(&mut self, now: u64) {
        self.set_last_updated_at = now;
    }
}
