//! Value marshaler for the json platform.
//!
//! Native containers are `serde_json` values:
//!
//! | Neutral | Native |
//! |---|---|
//! | `Null`, `Undefined` | `Null` |
//! | `Bool` | `Bool` |
//! | `Number` | integer when integral and within ±2^53, float otherwise, `Null` if not finite |
//! | `String` | `String` |
//! | `Date` | `String` in JSON date form |
//! | `Array` | `Array` |
//! | `Object` | `Object` |
//!
//! Every JSON numeric representation (i64, u64, f64) deserializes to
//! `Number`. JSON has no value outside the closed kind set, so
//! deserialization here never yields `Undefined`; gaps on this platform come
//! from non-JSON native arguments (see `native::JsonArg`).

use serde_json::{Map, Number, Value as JsonValue};

use crate::marshal::{Marshal, NativeKind};
use crate::value::{date_to_json, Object, Value};

/// Largest integer magnitude an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Stateless marshaler for `serde_json` containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshal;

impl Marshal for JsonMarshal {
    type Native = JsonValue;

    fn kind_of(&self, native: &JsonValue) -> Option<NativeKind> {
        Some(kind_of(native))
    }

    fn serialize(&self, value: &Value) -> JsonValue {
        serialize(value)
    }

    fn deserialize(&self, native: &JsonValue) -> Value {
        deserialize(native)
    }
}

/// Kind of a JSON value.
#[must_use]
pub fn kind_of(native: &JsonValue) -> NativeKind {
    match native {
        JsonValue::Null => NativeKind::Null,
        JsonValue::Bool(_) => NativeKind::Bool,
        JsonValue::Number(_) => NativeKind::Number,
        JsonValue::String(_) => NativeKind::String,
        JsonValue::Array(_) => NativeKind::Array,
        JsonValue::Object(_) => NativeKind::Map,
    }
}

/// Convert a neutral value into a JSON value.
#[must_use]
pub fn serialize(value: &Value) -> JsonValue {
    match value {
        Value::Undefined | Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => serialize_number(*n),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Date(d) => JsonValue::String(date_to_json(d)),
        Value::Array(items) => JsonValue::Array(items.iter().map(serialize).collect()),
        Value::Object(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, item) in entries {
                map.insert(key.clone(), serialize(item));
            }
            JsonValue::Object(map)
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::float_cmp,
    reason = "integral values within 2^53 convert to i64 exactly"
)]
fn serialize_number(n: f64) -> JsonValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or_else(
        || {
            log::trace!("Non-finite number {n} has no JSON form, sending null");
            JsonValue::Null
        },
        JsonValue::Number,
    )
}

/// Convert a JSON value back into a neutral value.
#[must_use]
pub fn deserialize(native: &JsonValue) -> Value {
    match (kind_of(native), native) {
        (NativeKind::Null, _) => Value::Null,
        (NativeKind::Bool, JsonValue::Bool(b)) => Value::Bool(*b),
        (NativeKind::Number, JsonValue::Number(n)) => deserialize_number(n),
        (NativeKind::String, JsonValue::String(s)) => Value::String(s.clone()),
        (NativeKind::Array, JsonValue::Array(items)) => {
            Value::Array(items.iter().map(deserialize).collect())
        }
        (NativeKind::Map, JsonValue::Object(map)) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), deserialize(item)))
                .collect::<Object>(),
        ),
        _ => Value::Undefined,
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "JSON integers beyond 2^53 have no exact f64 form"
)]
fn deserialize_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Number(i as f64)
    } else if let Some(u) = n.as_u64() {
        Value::Number(u as f64)
    } else {
        n.as_f64().map_or(Value::Undefined, Value::Number)
    }
}
