// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Host value types
//!
//! [`HostValue`] is the caller-facing value type on both sides of a filter run.
//! It keeps the integer/float distinction and allows any hashable key in
//! objects, so that values built by the caller can be checked by the bridge
//! instead of being silently coerced.

use crate::error::{JqError, Result};
use indexmap::IndexMap;
use std::fmt;

/// Key of a host object
///
/// Only [`MapKey::String`] keys can be passed to a filter; the other variants
/// exist so that such values can be represented and rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// Null key
    Null,
    /// Boolean key
    Bool(bool),
    /// Integer key
    Integer(i64),
    /// String key
    String(String),
}

impl MapKey {
    /// Get string key if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapKey::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Null => f.write_str("null"),
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Integer(i) => write!(f, "{i}"),
            MapKey::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::String(value.to_string())
    }
}

impl From<String> for MapKey {
    fn from(value: String) -> Self {
        MapKey::String(value)
    }
}

impl From<i64> for MapKey {
    fn from(value: i64) -> Self {
        MapKey::Integer(value)
    }
}

impl From<bool> for MapKey {
    fn from(value: bool) -> Self {
        MapKey::Bool(value)
    }
}

/// Object representation of host values
pub type HostMap = IndexMap<MapKey, HostValue>;

/// Caller-facing value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (64-bit signed)
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Ordered sequence of values
    Array(Vec<HostValue>),
    /// Mapping in insertion order
    Object(HostMap),
}

impl HostValue {
    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Integer(_) | HostValue::Float(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
        }
    }

    /// Build an object from string-keyed entries
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<HostValue>,
    {
        HostValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (MapKey::String(k.into()), v.into()))
                .collect(),
        )
    }

    /// Check whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// Get string value if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get integer value if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get numeric value of integers and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Integer(i) => Some(*i as f64),
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get array elements if this is an array
    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get object entries if this is an object
    pub fn as_object(&self) -> Option<&HostMap> {
        match self {
            HostValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a string key in an object
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.as_object()
            .and_then(|map| map.get(&MapKey::String(key.to_string())))
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Integer(i) => write!(f, "{i}"),
            HostValue::Float(x) => write!(f, "{x}"),
            HostValue::String(s) => write!(f, "{s:?}"),
            HostValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            HostValue::Object(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Integer(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Integer(i64::from(value))
    }
}

impl From<u32> for HostValue {
    fn from(value: u32) -> Self {
        HostValue::Integer(i64::from(value))
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(value: Vec<HostValue>) -> Self {
        HostValue::Array(value)
    }
}

impl From<HostMap> for HostValue {
    fn from(value: HostMap) -> Self {
        HostValue::Object(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Null, Into::into)
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => HostValue::Null,
            serde_json::Value::Bool(b) => HostValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => HostValue::Integer(i),
                None => HostValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => HostValue::String(s),
            serde_json::Value::Array(items) => {
                HostValue::Array(items.into_iter().map(HostValue::from).collect())
            }
            serde_json::Value::Object(map) => HostValue::Object(
                map.into_iter()
                    .map(|(k, v)| (MapKey::String(k), HostValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<HostValue> for serde_json::Value {
    type Error = JqError;

    fn try_from(value: HostValue) -> Result<Self> {
        Ok(match value {
            HostValue::Null => serde_json::Value::Null,
            HostValue::Bool(b) => serde_json::Value::Bool(b),
            HostValue::Integer(i) => serde_json::Value::from(i),
            // JSON has no representation for NaN or infinities
            HostValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            HostValue::String(s) => serde_json::Value::String(s),
            HostValue::Array(items) => serde_json::Value::Array(
                items
                    .into_iter()
                    .map(serde_json::Value::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            HostValue::Object(map) => {
                let mut object = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    let MapKey::String(key) = key else {
                        return Err(non_string_key(&key));
                    };
                    object.insert(key, serde_json::Value::try_from(value)?);
                }
                serde_json::Value::Object(object)
            }
        })
    }
}

pub(crate) fn non_string_key(key: &MapKey) -> JqError {
    JqError::type_error(format!("Object keys must be strings, found key {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_integer_distinction() {
        let value = HostValue::from(json!({"a": 1, "b": 1.5, "c": [null, true]}));
        assert_eq!(value.get("a"), Some(&HostValue::Integer(1)));
        assert_eq!(value.get("b"), Some(&HostValue::Float(1.5)));
        assert_eq!(
            value.get("c"),
            Some(&HostValue::Array(vec![HostValue::Null, HostValue::Bool(true)]))
        );
    }

    #[test]
    fn test_object_order_is_preserved() {
        let value = HostValue::from(json!({"z": 1, "a": 2, "m": 3}));
        let keys: Vec<_> = value
            .as_object()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_non_string_key_cannot_become_json() {
        let mut map = HostMap::new();
        map.insert(MapKey::Integer(1), HostValue::from("one"));
        let err = serde_json::Value::try_from(HostValue::Object(map)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Type);
    }

    #[test]
    fn test_display_is_compact_json_like() {
        let value = HostValue::object([(
            "a",
            HostValue::Array(vec![HostValue::Integer(1), HostValue::from("x")]),
        )]);
        assert_eq!(value.to_string(), r#"{"a":[1,"x"]}"#);
    }
}
