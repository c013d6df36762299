//! Knob engine shared by every Galactic subsystem.
//!
//! This crate re-exports the wire contract from `knob_schema` and adds the
//! engine that operates on it: catalog construction, input normalization,
//! bounds enforcement, batch updates and the read views. It has no
//! dependency on the Bevy runtime in `knob_core`.

pub use knob_schema::*;

mod batch;
mod bounds;
mod catalog;
mod normalize;
mod report;
mod shared;
mod store;

pub use batch::{reset_knobs, reset_knobs_at, update_knobs, update_knobs_at};
pub use bounds::{clamp, round_to_precision, Clamped, VALUE_PRECISION};
pub use catalog::{build_catalog, build_catalog_at, AcceptedFormats, CatalogError, KnobOverride};
pub use normalize::{level_value, normalize, Normalized, Rejection, LEVEL_MAP};
pub use report::{
    describe, snapshot_with_metadata, update_message, update_response, EXAMPLE_PAYLOADS,
};
pub use shared::SharedKnobSet;
pub use store::{now_ms, InitLogEntry, KnobDefinition, KnobEntry, KnobSet, KnobValue};
