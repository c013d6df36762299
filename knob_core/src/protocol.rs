//! Newline-delimited JSON protocol in front of the knob registry.
//!
//! One request line produces exactly one [`KnobReply`]. Requests that fail to
//! parse (missing `knobs`, `knobs` not an object, unknown `op`) are answered
//! here and never reach the engine.

use knob_runtime::{
    update_request_schema, update_response, KnobCommand, KnobReply, ProtocolErrorKind,
    UpdateRequest,
};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::KnobBatchApplied;
use crate::registry::KnobRegistry;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown system '{0}'")]
    UnknownSystem(String),
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    pub fn kind(&self) -> ProtocolErrorKind {
        match self {
            ProtocolError::Malformed(_) => ProtocolErrorKind::MalformedRequest,
            ProtocolError::UnknownSystem(_) => ProtocolErrorKind::UnknownSystem,
            ProtocolError::Encode(_) => ProtocolErrorKind::Internal,
        }
    }
}

/// Reply to one request plus the batch event to feed into the Bevy app.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub reply: KnobReply,
    pub batch: Option<KnobBatchApplied>,
    /// Set when the request asked the server to stop.
    pub shutdown: bool,
}

pub fn parse_command(line: &str) -> Result<KnobCommand, ProtocolError> {
    serde_json::from_str(line.trim()).map_err(ProtocolError::Malformed)
}

/// Handle one raw request line.
pub fn dispatch_line(registry: &KnobRegistry, line: &str) -> Dispatched {
    let mut shutdown = false;
    let result = parse_command(line).and_then(|command| {
        debug!(
            target: "galactic::protocol",
            system = command.system().unwrap_or("-"),
            "protocol.request_received"
        );
        shutdown = command == KnobCommand::Shutdown;
        dispatch_command(registry, command)
    });
    match result {
        Ok((data, batch)) => Dispatched {
            reply: KnobReply::success(data),
            batch,
            shutdown,
        },
        Err(err) => {
            warn!(
                target: "galactic::protocol",
                kind = ?err.kind(),
                error = %err,
                "protocol.request_rejected"
            );
            Dispatched {
                reply: KnobReply::failure(err.kind(), err.to_string()),
                batch: None,
                shutdown: false,
            }
        }
    }
}

/// Handle one parsed command.
pub fn dispatch_command(
    registry: &KnobRegistry,
    command: KnobCommand,
) -> Result<(JsonValue, Option<KnobBatchApplied>), ProtocolError> {
    match command {
        KnobCommand::Systems => Ok((encode(&registry.summaries())?, None)),
        KnobCommand::Schema => Ok((encode(&update_request_schema())?, None)),
        KnobCommand::Shutdown => Ok((json!({ "stopping": true }), None)),
        KnobCommand::Values { system } => {
            let handle = lookup(registry, &system)?;
            Ok((encode(&handle.snapshot())?, None))
        }
        KnobCommand::Describe { system } => {
            let handle = lookup(registry, &system)?;
            Ok((encode(&handle.describe())?, None))
        }
        KnobCommand::Update {
            system,
            knobs,
            source,
        } => {
            let handle = lookup(registry, &system)?;
            let outcome = handle.update(&UpdateRequest { knobs, source });
            let event = KnobBatchApplied::from_outcome(&system, &outcome, false);
            Ok((encode(&update_response(&system, outcome))?, Some(event)))
        }
        KnobCommand::Reset { system, source } => {
            let handle = lookup(registry, &system)?;
            let outcome = handle.reset(&source);
            let event = KnobBatchApplied::from_outcome(&system, &outcome, true);
            Ok((encode(&update_response(&system, outcome))?, Some(event)))
        }
    }
}

/// Serialize a reply as a single protocol line (no trailing newline).
pub fn encode_reply(reply: &KnobReply) -> String {
    serde_json::to_string(reply).unwrap_or_else(|err| {
        warn!(target: "galactic::protocol", error = %err, "protocol.encode_failed");
        r#"{"ok":false,"error":"failed to encode response","kind":"internal"}"#.to_string()
    })
}

fn lookup<'a>(
    registry: &'a KnobRegistry,
    system: &str,
) -> Result<&'a knob_runtime::SharedKnobSet, ProtocolError> {
    registry
        .system(system)
        .ok_or_else(|| ProtocolError::UnknownSystem(system.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<JsonValue, ProtocolError> {
    serde_json::to_value(value).map_err(ProtocolError::Encode)
}
