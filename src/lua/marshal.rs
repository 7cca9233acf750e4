//! Value marshaler for the lua platform.
//!
//! Native containers live inside an embedded Lua state:
//!
//! | Neutral | Native |
//! |---|---|
//! | `Null`, `Undefined` | `NULL` light userdata sentinel |
//! | `Bool` | boolean |
//! | `Number` | number |
//! | `String`, `Date` | string (dates in JSON date form) |
//! | `Array` | sequence table tagged with the array metatable |
//! | `Object` | table keyed by strings |
//!
//! The `NULL` sentinel is used instead of `nil` so that nulls inside arrays
//! do not punch holes into sequences. Both `nil` and `NULL` read back as
//! `Null`.
//!
//! # Array Detection
//!
//! A table is an ordered container when it carries mlua's array metatable,
//! or when its keys are exactly `1..=n` for some `n > 0`. Every other table
//! is a keyed container. Integer and float keys of keyed containers become
//! their decimal string; other key types are dropped. A table that
//! contains itself reads back as `Undefined` where the cycle closes.

use std::collections::HashSet;
use std::ffi::c_void;
use std::fmt;

use mlua::{Lua, LuaSerdeExt, Table, Value as LuaValue};

use crate::marshal::{Marshal, NativeKind};
use crate::value::{date_to_json, Object, Value};

/// Marshaler bound to one Lua state.
#[derive(Clone)]
pub struct LuaMarshal {
    lua: Lua,
}

impl LuaMarshal {
    /// Marshaler creating native values inside `lua`.
    #[must_use]
    pub fn new(lua: Lua) -> Self {
        Self { lua }
    }

    /// The Lua state values are created in.
    #[must_use]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    fn try_serialize(&self, value: &Value) -> mlua::Result<LuaValue> {
        Ok(match value {
            Value::Undefined | Value::Null => LuaValue::NULL,
            Value::Bool(b) => LuaValue::Boolean(*b),
            Value::Number(n) => LuaValue::Number(*n),
            Value::String(s) => LuaValue::String(self.lua.create_string(s)?),
            Value::Date(d) => LuaValue::String(self.lua.create_string(date_to_json(d))?),
            Value::Array(items) => {
                let table = self.lua.create_table()?;
                for (i, item) in items.iter().enumerate() {
                    table.raw_set(i + 1, self.try_serialize(item)?)?;
                }
                table.set_metatable(Some(self.lua.array_metatable()));
                LuaValue::Table(table)
            }
            Value::Object(entries) => {
                let table = self.lua.create_table()?;
                for (key, item) in entries {
                    table.raw_set(self.lua.create_string(key)?, self.try_serialize(item)?)?;
                }
                LuaValue::Table(table)
            }
        })
    }

    fn is_array(&self, table: &Table) -> bool {
        if let Some(metatable) = table.metatable() {
            if metatable.to_pointer() == self.lua.array_metatable().to_pointer() {
                return true;
            }
        }

        let len = table.raw_len();
        if len == 0 {
            return false;
        }

        let mut keys = 0usize;
        for pair in table.pairs::<LuaValue, LuaValue>() {
            match pair {
                Ok((LuaValue::Integer(i), _)) if i >= 1 && usize::try_from(i).is_ok_and(|i| i <= len) => {
                    keys += 1;
                }
                _ => return false,
            }
        }
        keys == len
    }

    /// Deserialize while tracking the tables on the current path, so that a
    /// table reachable from itself reads back as `Undefined` at the point
    /// where it repeats.
    fn deserialize_in(&self, native: &LuaValue, path: &mut Vec<*const c_void>) -> Value {
        match (self.kind_of(native), native) {
            (Some(NativeKind::Null), _) => Value::Null,
            (Some(NativeKind::Bool), LuaValue::Boolean(b)) => Value::Bool(*b),
            (Some(NativeKind::Number), LuaValue::Integer(i)) => integer_to_value(*i),
            (Some(NativeKind::Number), LuaValue::Number(n)) => Value::Number(*n),
            (Some(NativeKind::String), LuaValue::String(s)) => {
                Value::String(s.to_string_lossy().to_string())
            }
            (Some(kind @ (NativeKind::Array | NativeKind::Map)), LuaValue::Table(table)) => {
                let pointer = table.to_pointer();
                if path.contains(&pointer) {
                    log::trace!("Table contains itself, reading the repeat as undefined");
                    return Value::Undefined;
                }
                path.push(pointer);
                let value = if kind == NativeKind::Array {
                    self.deserialize_array(table, path)
                } else {
                    self.deserialize_map(table, path)
                };
                path.pop();
                value
            }
            (_, other) => {
                log::trace!("{} is not a marshaled value", other.type_name());
                Value::Undefined
            }
        }
    }

    fn deserialize_array(&self, table: &Table, path: &mut Vec<*const c_void>) -> Value {
        let items = (1..=table.raw_len())
            .map(|i| {
                table
                    .raw_get::<LuaValue>(i)
                    .map_or(Value::Undefined, |item| self.deserialize_in(&item, path))
            })
            .collect();
        Value::Array(items)
    }

    /// String keys win over numeric keys with the same decimal form.
    fn deserialize_map(&self, table: &Table, path: &mut Vec<*const c_void>) -> Value {
        let mut entries = Object::new();
        let mut string_keys = HashSet::new();
        for pair in table.pairs::<LuaValue, LuaValue>() {
            let Ok((key, item)) = pair else {
                continue;
            };
            let (key, is_string) = match key {
                LuaValue::String(s) => (s.to_string_lossy().to_string(), true),
                LuaValue::Integer(i) => (i.to_string(), false),
                LuaValue::Number(n) => (n.to_string(), false),
                other => {
                    log::trace!("Dropping table entry with {} key", other.type_name());
                    continue;
                }
            };
            if is_string {
                if entries.contains_key(&key) {
                    log::trace!("String key '{}' replaces a numeric key of the same name", key);
                }
                string_keys.insert(key.clone());
            } else if string_keys.contains(&key) {
                log::trace!("Dropping numeric key {}, a string key has the same name", key);
                continue;
            }
            let value = self.deserialize_in(&item, path);
            entries.insert(key, value);
        }
        Value::Object(entries)
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "Lua integers beyond 2^53 have no exact neutral form"
)]
fn integer_to_value(i: i64) -> Value {
    Value::Number(i as f64)
}

impl fmt::Debug for LuaMarshal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaMarshal").finish_non_exhaustive()
    }
}

impl Marshal for LuaMarshal {
    type Native = LuaValue;

    fn kind_of(&self, native: &LuaValue) -> Option<NativeKind> {
        match native {
            LuaValue::Nil => Some(NativeKind::Null),
            LuaValue::LightUserData(ud) if ud.0.is_null() => Some(NativeKind::Null),
            LuaValue::Boolean(_) => Some(NativeKind::Bool),
            LuaValue::Integer(_) | LuaValue::Number(_) => Some(NativeKind::Number),
            LuaValue::String(_) => Some(NativeKind::String),
            LuaValue::Table(table) if self.is_array(table) => Some(NativeKind::Array),
            LuaValue::Table(_) => Some(NativeKind::Map),
            _ => None,
        }
    }

    fn serialize(&self, value: &Value) -> LuaValue {
        self.try_serialize(value).unwrap_or_else(|e| {
            log::warn!("Failed to build Lua value, sending null: {e}");
            LuaValue::NULL
        })
    }

    fn deserialize(&self, native: &LuaValue) -> Value {
        self.deserialize_in(native, &mut Vec::new())
    }
}
