use std::collections::{BTreeMap, HashSet};

use knob_schema::{KnobFormat, SYSTEM_SOURCE};
use thiserror::Error;
use tracing::warn;

use crate::bounds::{clamp, round_to_precision};
use crate::store::{now_ms, InitLogEntry, KnobDefinition, KnobEntry, KnobSet, KnobValue};

pub const DEFAULT_MIN: f64 = 0.0;
pub const DEFAULT_MAX: f64 = 1.0;
pub const DEFAULT_CATEGORY: &str = "General";

bitflags::bitflags! {
    /// Set of [`KnobFormat`]s a knob accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AcceptedFormats: u8 {
        const BOOLEAN = 1 << 0;
        const PERCENTAGE = 1 << 1;
        const RELATIVE_DELTA = 1 << 2;
        const QUALITATIVE_LABEL = 1 << 3;
        const ABSOLUTE = 1 << 4;
    }
}

impl Default for AcceptedFormats {
    fn default() -> Self {
        Self::all()
    }
}

impl AcceptedFormats {
    pub fn from_format(format: KnobFormat) -> Self {
        match format {
            KnobFormat::Boolean => Self::BOOLEAN,
            KnobFormat::Percentage => Self::PERCENTAGE,
            KnobFormat::RelativeDelta => Self::RELATIVE_DELTA,
            KnobFormat::QualitativeLabel => Self::QUALITATIVE_LABEL,
            KnobFormat::Absolute => Self::ABSOLUTE,
        }
    }

    pub fn accepts(self, format: KnobFormat) -> bool {
        self.contains(Self::from_format(format))
    }

    /// Accepted formats in parsing precedence order.
    pub fn formats(self) -> Vec<KnobFormat> {
        KnobFormat::ALL
            .into_iter()
            .filter(|format| self.accepts(*format))
            .collect()
    }
}

impl FromIterator<KnobFormat> for AcceptedFormats {
    fn from_iter<T: IntoIterator<Item = KnobFormat>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, format| acc | Self::from_format(format))
    }
}

/// Per-key adjustments applied on top of the default catalog entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnobOverride {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub accepted_formats: Option<AcceptedFormats>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("knob '{key}' is declared more than once for system '{owner}'")]
    DuplicateKey { owner: String, key: String },
    #[error("knob '{key}' has invalid bounds [{min}, {max}]")]
    InvalidBounds { key: String, min: f64, max: f64 },
    #[error("knob '{key}' has non-finite initial value {value}")]
    NonFiniteInitial { key: String, value: f64 },
    #[error("override for '{key}' does not match any knob of system '{owner}'")]
    OrphanOverride { owner: String, key: String },
}

impl CatalogError {
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::DuplicateKey { .. } => "construction_duplicate_key",
            CatalogError::InvalidBounds { .. } => "construction_invalid_bounds",
            CatalogError::NonFiniteInitial { .. } => "construction_non_finite_initial",
            CatalogError::OrphanOverride { .. } => "construction_orphan_override",
        }
    }
}

/// Build the knob set of one subsystem from its initial values.
pub fn build_catalog<I, K>(
    owner: impl Into<String>,
    initial_values: I,
    overrides: &BTreeMap<String, KnobOverride>,
) -> Result<KnobSet, CatalogError>
where
    I: IntoIterator<Item = (K, f64)>,
    K: Into<String>,
{
    build_catalog_at(owner, initial_values, overrides, now_ms())
}

/// [`build_catalog`] with an explicit creation timestamp.
pub fn build_catalog_at<I, K>(
    owner: impl Into<String>,
    initial_values: I,
    overrides: &BTreeMap<String, KnobOverride>,
    now: u64,
) -> Result<KnobSet, CatalogError>
where
    I: IntoIterator<Item = (K, f64)>,
    K: Into<String>,
{
    let owner = owner.into();
    let mut entries = BTreeMap::new();
    let mut init_log = Vec::new();
    let mut used_overrides = HashSet::new();

    for (key, requested) in initial_values {
        let key = key.into();
        if entries.contains_key(&key) {
            return Err(CatalogError::DuplicateKey { owner, key });
        }
        if !requested.is_finite() {
            return Err(CatalogError::NonFiniteInitial {
                key,
                value: requested,
            });
        }

        let adjust = overrides.get(&key);
        if adjust.is_some() {
            used_overrides.insert(key.clone());
        }
        let definition = define(&key, requested, adjust)?;
        let seeded = clamp(requested, definition.min, definition.max);
        if seeded.clamped {
            warn!(
                target: "galactic::knobs",
                system = %owner,
                key = %key,
                requested,
                seeded = seeded.value,
                "knobs.init.clamped"
            );
        }
        init_log.push(InitLogEntry {
            key: key.clone(),
            requested,
            seeded: seeded.value,
            clamped: seeded.clamped,
        });

        let definition = KnobDefinition {
            default: seeded.value,
            ..definition
        };
        let value = KnobValue {
            key: key.clone(),
            current: seeded.value,
            last_source: SYSTEM_SOURCE.to_string(),
            last_updated_at: now,
        };
        entries.insert(key, KnobEntry { definition, value });
    }

    if let Some(orphan) = overrides.keys().find(|key| !used_overrides.contains(*key)) {
        return Err(CatalogError::OrphanOverride {
            owner,
            key: orphan.clone(),
        });
    }

    Ok(KnobSet::new(owner, entries, init_log, now))
}

fn define(
    key: &str,
    initial: f64,
    adjust: Option<&KnobOverride>,
) -> Result<KnobDefinition, CatalogError> {
    let min = adjust.and_then(|o| o.min).unwrap_or(DEFAULT_MIN);
    let max = adjust.and_then(|o| o.max).unwrap_or(DEFAULT_MAX);
    // Bounds lie on the rounding grid.
    let on_grid = |bound: f64| round_to_precision(bound) == bound;
    if !min.is_finite() || !max.is_finite() || min > max || !on_grid(min) || !on_grid(max) {
        return Err(CatalogError::InvalidBounds {
            key: key.to_string(),
            min,
            max,
        });
    }

    Ok(KnobDefinition {
        key: key.to_string(),
        min,
        max,
        default: initial,
        category: adjust
            .and_then(|o| o.category.clone())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        description: adjust
            .and_then(|o| o.description.clone())
            .unwrap_or_else(|| humanize_key(key)),
        accepted_formats: adjust
            .and_then(|o| o.accepted_formats)
            .unwrap_or_default(),
    })
}

/// `"tourism_investment"` becomes `"Tourism investment"`.
fn humanize_key(key: &str) -> String {
    let spaced = key.replace(|c: char| c == '_' || c == '-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
