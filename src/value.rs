//! Platform-neutral values exchanged with application code.
//!
//! [`Value`] is the only payload vocabulary the application sees. Each
//! platform marshaler converts it to and from its native container world:
//!
//! ```text
//!                 ┌──────────── json::marshal ───────────┐
//! Value (neutral) ┤                                      ├── native containers
//!                 └──────────── lua::marshal ────────────┘
//! ```
//!
//! # Lossy corners
//!
//! - `Date` serializes to its JSON string form and comes back as a `String`.
//! - `Undefined` serializes to native null and comes back as `Null`.
//! - Numbers are IEEE-754 doubles; integers and floats are not distinguished.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SocketError;
use crate::json::marshal as json_marshal;

/// Mapping from string key to neutral value.
pub type Object = BTreeMap<String, Value>;

/// A platform-neutral value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Not a marshaled value; produced by `deserialize` for unrecognized
    /// native values. Serializes like `Null`.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Double-precision number.
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp, sent as its JSON string form and never reconstructed.
    Date(DateTime<Utc>),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// Keyed mapping with unique keys.
    Object(Object),
}

impl Value {
    /// Build a neutral value from any serializable application type.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, SocketError> {
        let json = serde_json::to_value(value)?;
        Ok(json_marshal::deserialize(&json))
    }

    /// Convert this value into an application type.
    ///
    /// `Date` values are seen by the target type as their JSON string form.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, SocketError> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    /// JSON view of this value (same mapping as the json platform marshaler).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json_marshal::serialize(self)
    }

    /// `true` for `Null` and `Undefined`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    /// `true` only for `Undefined`.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Borrow the string, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number, if this is a `Number`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the elements, if this is an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the entries, if this is an `Object`.
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up `key` in an `Object`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }
}

/// JSON string form of a date: UTC, millisecond precision, `Z` suffix.
#[must_use]
pub fn date_to_json(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::String(s) => serializer.serialize_str(s),
            Self::Date(d) => serializer.serialize_str(&date_to_json(d)),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(|json| json_marshal::deserialize(&json))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        json_marshal::deserialize(&json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    #[allow(
        clippy::cast_precision_loss,
        reason = "integers beyond 2^53 have no exact f64 form"
    )]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Self::Object(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Object(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_date_json_form_has_millis_and_z() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(date_to_json(&date), "2024-03-09T07:05:01.000Z");
    }

    #[test]
    fn test_from_serialize_struct() {
        #[derive(Serialize)]
        struct Message {
            text: String,
            count: u32,
        }

        let value = Value::from_serialize(&Message {
            text: "hi".into(),
            count: 2,
        })
        .unwrap();

        assert_eq!(value.get("text"), Some(&Value::from("hi")));
        assert_eq!(value.get("count"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_deserialize_into_struct() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Reply {
            ok: bool,
            items: Vec<i64>,
        }

        let value = Value::from(json!({ "ok": true, "items": [1, 2, 3] }));
        let reply: Reply = value.deserialize_into().unwrap();
        assert_eq!(
            reply,
            Reply {
                ok: true,
                items: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn test_serde_roundtrip_through_json_text() {
        let value: Value = [("name", Value::from("bot")), ("tags", Value::from(vec!["a", "b"]))]
            .into_iter()
            .collect();

        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_option_none_is_null() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert!(Value::Undefined.is_null());
        assert!(!Value::Null.is_undefined());
    }

    #[test]
    fn test_display_uses_json_form() {
        let value = Value::from(json!({ "a": [1, "x", null] }));
        assert_eq!(value.to_string(), r#"{"a":[1,"x",null]}"#);
        assert_eq!(Value::Undefined.to_string(), "undefined");
    }
}
