use knob_schema::{KnobErrorKind, KnobFormat};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::bounds::{clamp, round_to_precision};
use crate::store::KnobDefinition;

/// Qualitative labels and their position within a knob's bounds.
pub const LEVEL_MAP: [(&str, f64); 5] = [
    ("none", 0.0),
    ("low", 0.25),
    ("medium", 0.5),
    ("high", 0.75),
    ("max", 1.0),
];

/// Canonical value produced from one raw input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub value: f64,
    pub clamped: bool,
    pub format: KnobFormat,
}

/// Why a raw input could not be turned into a knob value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("'{0}' is not a number, percentage, delta, level or boolean")]
    Unparseable(String),
    #[error("value is not a finite number")]
    NonFinite,
    #[error("{0} values are not supported")]
    UnsupportedType(&'static str),
    #[error("{format} input is not accepted by this knob")]
    FormatNotAccepted { format: KnobFormat },
}

impl Rejection {
    pub fn kind(&self) -> KnobErrorKind {
        KnobErrorKind::InvalidFormat
    }
}

/// Look up a qualitative label, ignoring ASCII case.
pub fn level_value(label: &str) -> Option<f64> {
    LEVEL_MAP
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label))
        .map(|(_, value)| *value)
}

/// Convert one raw input into a canonical value for `definition`.
///
/// Formats are tried in order: boolean, percentage, relative delta,
/// qualitative label, absolute number. The result is rounded to
/// [`crate::VALUE_PRECISION`] places and then clamped into bounds.
pub fn normalize(
    raw: &JsonValue,
    current: f64,
    definition: &KnobDefinition,
) -> Result<Normalized, Rejection> {
    let (format, candidate) = interpret(raw, current, definition)?;
    if !definition.accepted_formats.accepts(format) {
        return Err(Rejection::FormatNotAccepted { format });
    }
    if !candidate.is_finite() {
        return Err(Rejection::NonFinite);
    }

    let bounded = clamp(
        round_to_precision(candidate),
        definition.min,
        definition.max,
    );
    Ok(Normalized {
        value: bounded.value,
        clamped: bounded.clamped,
        format,
    })
}

fn interpret(
    raw: &JsonValue,
    current: f64,
    definition: &KnobDefinition,
) -> Result<(KnobFormat, f64), Rejection> {
    match raw {
        JsonValue::Bool(flag) => Ok((KnobFormat::Boolean, from_flag(*flag, definition))),
        JsonValue::Number(number) => number
            .as_f64()
            .filter(|value| value.is_finite())
            .map(|value| (KnobFormat::Absolute, value))
            .ok_or(Rejection::NonFinite),
        JsonValue::String(text) => interpret_text(text.trim(), current, definition),
        JsonValue::Null => Err(Rejection::UnsupportedType("null")),
        JsonValue::Array(_) => Err(Rejection::UnsupportedType("array")),
        JsonValue::Object(_) => Err(Rejection::UnsupportedType("object")),
    }
}

fn interpret_text(
    text: &str,
    current: f64,
    definition: &KnobDefinition,
) -> Result<(KnobFormat, f64), Rejection> {
    if let Some(flag) = parse_flag(text) {
        return Ok((KnobFormat::Boolean, from_flag(flag, definition)));
    }
    if let Some(percent) = parse_percentage(text) {
        return Ok((
            KnobFormat::Percentage,
            scale_into(percent / 100.0, definition),
        ));
    }
    if let Some(delta) = parse_relative_delta(text) {
        return Ok((KnobFormat::RelativeDelta, current + delta));
    }
    if let Some(level) = level_value(text) {
        return Ok((KnobFormat::QualitativeLabel, scale_into(level, definition)));
    }

    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok((KnobFormat::Absolute, value)),
        Ok(_) => Err(Rejection::NonFinite),
        Err(_) => Err(Rejection::Unparseable(text.to_string())),
    }
}

fn from_flag(flag: bool, definition: &KnobDefinition) -> f64 {
    if flag {
        definition.max
    } else {
        definition.min
    }
}

fn scale_into(fraction: f64, definition: &KnobDefinition) -> f64 {
    definition.min + fraction * (definition.max - definition.min)
}

fn parse_flag(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// `-?digits(.digits)?%`
fn parse_percentage(text: &str) -> Option<f64> {
    let number = text.strip_suffix('%')?;
    let unsigned = number.strip_prefix('-').unwrap_or(number);
    if !is_plain_decimal(unsigned) {
        return None;
    }
    number.parse().ok()
}

/// `[+-]digits(.digits)?`
fn parse_relative_delta(text: &str) -> Option<f64> {
    let (sign, magnitude) = if let Some(rest) = text.strip_prefix('+') {
        (1.0, rest)
    } else if let Some(rest) = text.strip_prefix('-') {
        (-1.0, rest)
    } else {
        return None;
    };
    if !is_plain_decimal(magnitude) {
        return None;
    }
    magnitude.parse::<f64>().ok().map(|value| sign * value)
}

fn is_plain_decimal(text: &str) -> bool {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(whole) && fraction.map_or(true, digits)
}
