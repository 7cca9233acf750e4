//! Marshaler contract implemented once per platform.
//!
//! A marshaler converts between [`Value`] and one native container world.
//! Both directions are total: serialize falls back to native null, and
//! deserialize reports anything it cannot classify as `Value::Undefined`.
//!
//! Deserialization never inspects type names. Each platform maps a native
//! value onto the closed [`NativeKind`] enumeration first and then decodes
//! per kind.

use crate::value::Value;

/// Closed set of native value kinds a marshaler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    /// Native null representation.
    Null,
    /// Native boolean.
    Bool,
    /// Any native numeric representation.
    Number,
    /// Native string.
    String,
    /// Ordered container.
    Array,
    /// Keyed container.
    Map,
}

/// Serialize/deserialize pair for one native container world.
pub trait Marshal {
    /// Native value type.
    type Native;

    /// Classify a native value, `None` when it is not a marshaled value.
    fn kind_of(&self, native: &Self::Native) -> Option<NativeKind>;

    /// Convert a neutral value into a native value.
    fn serialize(&self, value: &Value) -> Self::Native;

    /// Convert a native value back into a neutral value.
    fn deserialize(&self, native: &Self::Native) -> Value;

    /// Serialize every element, preserving order.
    fn serialize_all(&self, values: &[Value]) -> Vec<Self::Native> {
        values.iter().map(|v| self.serialize(v)).collect()
    }

    /// Deserialize every element, preserving order.
    fn deserialize_all(&self, natives: &[Self::Native]) -> Vec<Value> {
        natives.iter().map(|n| self.deserialize(n)).collect()
    }
}
