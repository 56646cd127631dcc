//! Wire date handling.
//!
//! The protocol carries timestamps as ISO-8601 UTC strings in one of two
//! shapes: `YYYY-MM-DDTHH:MM:SS.sssZ` or `YYYY-MM-DDTHH:MM:SSZ`. Typed
//! payloads serialize their `DateTime<Utc>` fields through [`wire_time`];
//! untyped payloads (and replies from central systems that emit other
//! fractional precisions) are normalized by walking the JSON tree.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;

/// Millisecond wire form, the shape this simulator always produces.
static ISO8601_MILLIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$").expect("valid pattern")
});

/// Whole-second wire form, accepted on input.
static ISO8601_SECS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").expect("valid pattern")
});

/// Any UTC instant, fractional digits unconstrained. Used on the outbound
/// path so that timestamps serialized elsewhere (e.g. chrono's default
/// nanosecond precision) still leave in the wire form.
static ISO8601_ANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$").expect("valid pattern")
});

/// Format an instant in the fractional-seconds wire form.
pub fn format_wire(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a string in either accepted wire form. Returns `None` for
/// anything else, including non-UTC offsets.
pub fn parse_wire(text: &str) -> Option<DateTime<Utc>> {
    if !ISO8601_MILLIS.is_match(text) && !ISO8601_SECS.is_match(text) {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Recursively rewrite every timestamp-shaped string in `value` into the
/// fractional-seconds wire form. Applied to every payload before
/// transmission.
pub fn to_wire(value: &mut Value) {
    walk(value, &|text| {
        if !ISO8601_ANY.is_match(text) {
            return None;
        }
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| format_wire(&t.with_timezone(&Utc)))
    });
}

/// Recursively canonicalize every string matching one of the two accepted
/// wire forms. Applied to every payload on receipt, so that typed
/// deserialization and downstream comparisons see one representation.
pub fn from_wire(value: &mut Value) {
    walk(value, &|text| parse_wire(text).map(|t| format_wire(&t)));
}

fn walk(value: &mut Value, convert: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(text) => {
            if let Some(replacement) = convert(text) {
                *text = replacement;
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, convert);
            }
        }
        Value::Object(fields) => {
            for (_, field) in fields.iter_mut() {
                walk(field, convert);
            }
        }
        _ => {}
    }
}

/// Serde `with`-module for `DateTime<Utc>` fields on wire structs.
pub mod wire_time {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        instant: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_wire(instant))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_wire(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid wire timestamp: {text}")))
    }
}
