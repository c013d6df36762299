//! Wire contract for the galactic knob engine.
//!
//! These types travel between the engine, the knob server and its clients.
//! They carry data only; normalization and bookkeeping live in
//! `knob_runtime`.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Provenance tag used when a request does not name its source.
pub const DEFAULT_SOURCE: &str = "ai";
/// Provenance tag used for values written by the engine itself.
pub const SYSTEM_SOURCE: &str = "system";

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_reset_source() -> String {
    SYSTEM_SOURCE.to_string()
}

/// Input formats a knob may accept, listed in parsing precedence order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum KnobFormat {
    Boolean,
    Percentage,
    RelativeDelta,
    QualitativeLabel,
    Absolute,
}

impl KnobFormat {
    pub const ALL: [KnobFormat; 5] = [
        KnobFormat::Boolean,
        KnobFormat::Percentage,
        KnobFormat::RelativeDelta,
        KnobFormat::QualitativeLabel,
        KnobFormat::Absolute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KnobFormat::Boolean => "boolean",
            KnobFormat::Percentage => "percentage",
            KnobFormat::RelativeDelta => "relative_delta",
            KnobFormat::QualitativeLabel => "qualitative_label",
            KnobFormat::Absolute => "absolute",
        }
    }
}

impl fmt::Display for KnobFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single key of a batch was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KnobErrorKind {
    UnknownKnob,
    InvalidFormat,
}

impl KnobErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KnobErrorKind::UnknownKnob => "unknown_knob",
            KnobErrorKind::InvalidFormat => "invalid_format",
        }
    }
}

impl fmt::Display for KnobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch of raw knob inputs submitted by an AI agent or an operator.
///
/// Keys are processed in the order they appear in `knobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateRequest {
    /// Knob key mapped to a raw input: a number, a numeric string, a
    /// percentage (`"75%"`), a relative delta (`"+0.1"`), a level label
    /// (`"high"`) or a boolean.
    pub knobs: JsonMap<String, JsonValue>,
    /// Provenance tag recorded on every applied knob. Defaults to `"ai"`.
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for UpdateRequest {
    fn default() -> Self {
        Self {
            knobs: JsonMap::new(),
            source: default_source(),
        }
    }
}

impl UpdateRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            knobs: JsonMap::new(),
            source: source.into(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, raw: impl Into<JsonValue>) -> Self {
        self.knobs.insert(key.into(), raw.into());
        self
    }
}

/// Result of one key of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerKeyOutcome {
    pub key: String,
    pub applied: bool,
    pub previous_value: Option<f64>,
    pub new_value: Option<f64>,
    pub clamped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<KnobErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PerKeyOutcome {
    pub fn applied(key: impl Into<String>, previous: f64, new: f64, clamped: bool) -> Self {
        Self {
            key: key.into(),
            applied: true,
            previous_value: Some(previous),
            new_value: Some(new),
            clamped,
            error_kind: None,
            detail: None,
        }
    }

    pub fn rejected(
        key: impl Into<String>,
        kind: KnobErrorKind,
        previous: Option<f64>,
        detail: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            applied: false,
            previous_value: previous,
            new_value: None,
            clamped: false,
            error_kind: Some(kind),
            detail,
        }
    }
}

/// Aggregated result of a batch update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BatchOutcome {
    /// True only when at least one key applied and none were rejected.
    pub success: bool,
    pub applied_count: usize,
    pub rejected_count: usize,
    pub outcomes: Vec<PerKeyOutcome>,
}

impl BatchOutcome {
    pub fn from_outcomes(outcomes: Vec<PerKeyOutcome>) -> Self {
        let applied_count = outcomes.iter().filter(|outcome| outcome.applied).count();
        let rejected_count = outcomes.len() - applied_count;
        Self {
            success: applied_count > 0 && rejected_count == 0,
            applied_count,
            rejected_count,
            outcomes,
        }
    }

    pub fn clamped_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.clamped).count()
    }

    pub fn outcome(&self, key: &str) -> Option<&PerKeyOutcome> {
        self.outcomes.iter().find(|outcome| outcome.key == key)
    }

    pub fn rejected(&self) -> impl Iterator<Item = &PerKeyOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.applied)
    }
}

/// Reply to a submitted update, echoing the owning system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateResponse {
    pub system: String,
    pub message: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// Current value and bounds of one knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnobReading {
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub category: String,
    pub last_source: String,
    pub last_updated_at: u64,
}

/// Point-in-time copy of every knob of one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValuesSnapshot {
    pub system: String,
    pub values: BTreeMap<String, KnobReading>,
    pub set_last_updated_at: u64,
}

/// Static documentation for one knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnobDescription {
    pub description: String,
    pub category: String,
    pub accepted_formats: Vec<KnobFormat>,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

/// Documentation view of one system, including example payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnobDocs {
    pub system: String,
    pub per_knob: BTreeMap<String, KnobDescription>,
    pub examples: Vec<String>,
    pub levels: BTreeMap<String, f64>,
}

/// Short listing entry for `systems` requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SystemSummary {
    pub name: String,
    pub knob_count: usize,
    pub set_last_updated_at: u64,
}

/// One request line of the knob line protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum KnobCommand {
    Systems,
    Values {
        system: String,
    },
    Describe {
        system: String,
    },
    Update {
        system: String,
        knobs: JsonMap<String, JsonValue>,
        #[serde(default = "default_source")]
        source: String,
    },
    Reset {
        system: String,
        #[serde(default = "default_reset_source")]
        source: String,
    },
    Schema,
    /// Stop the server after replying; in-flight connections are dropped.
    Shutdown,
}

impl KnobCommand {
    pub fn system(&self) -> Option<&str> {
        match self {
            KnobCommand::Values { system }
            | KnobCommand::Describe { system }
            | KnobCommand::Update { system, .. }
            | KnobCommand::Reset { system, .. } => Some(system.as_str()),
            KnobCommand::Systems | KnobCommand::Schema | KnobCommand::Shutdown => None,
        }
    }
}

/// Failure classes reported by the protocol layer before the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorKind {
    MalformedRequest,
    UnknownSystem,
    Internal,
}

/// One response line of the knob line protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProtocolErrorKind>,
}

impl KnobReply {
    pub fn success(data: JsonValue) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn failure(kind: ProtocolErrorKind, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
            kind: Some(kind),
        }
    }
}

/// JSON Schema of [`UpdateRequest`], served to callers discovering the format.
pub fn update_request_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(UpdateRequest)
}
