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

//! Engine-native values
//!
//! An [`EngineValue`] is a reference-counted handle. Cloning takes a new
//! reference, dropping releases it; the underlying value is freed when the last
//! reference goes away. Numbers are always stored as `f64`.

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Object representation inside the engine
pub type EngineMap = IndexMap<String, EngineValue>;

/// Kind of an engine value, in jq's ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    /// `null`
    Null,
    /// `false`
    False,
    /// `true`
    True,
    /// Any number
    Number,
    /// Any string
    String,
    /// Any array
    Array,
    /// Any object
    Object,
}

impl ValueKind {
    /// The name jq uses for this kind (`type` builtin)
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::False | ValueKind::True => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

pub(crate) enum Repr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<EngineValue>),
    Object(EngineMap),
}

/// Reference-counted engine value handle
#[derive(Clone)]
pub struct EngineValue(Rc<Repr>);

impl EngineValue {
    fn wrap(repr: Repr) -> Self {
        EngineValue(Rc::new(repr))
    }

    /// `null`
    pub fn null() -> Self {
        Self::wrap(Repr::Null)
    }

    /// `true` or `false`
    pub fn bool(value: bool) -> Self {
        Self::wrap(Repr::Bool(value))
    }

    /// A number
    pub fn number(value: f64) -> Self {
        Self::wrap(Repr::Number(value))
    }

    /// A string
    pub fn string(value: impl Into<String>) -> Self {
        Self::wrap(Repr::String(value.into()))
    }

    /// An array of the given elements
    pub fn array(items: Vec<EngineValue>) -> Self {
        Self::wrap(Repr::Array(items))
    }

    /// An object of the given entries, later duplicates replace earlier ones
    pub fn object(entries: impl IntoIterator<Item = (String, EngineValue)>) -> Self {
        Self::wrap(Repr::Object(entries.into_iter().collect()))
    }

    pub(crate) fn from_map(map: EngineMap) -> Self {
        Self::wrap(Repr::Object(map))
    }

    pub(crate) fn repr(&self) -> &Repr {
        &self.0
    }

    /// Kind of this value
    pub fn kind(&self) -> ValueKind {
        match self.repr() {
            Repr::Null => ValueKind::Null,
            Repr::Bool(false) => ValueKind::False,
            Repr::Bool(true) => ValueKind::True,
            Repr::Number(_) => ValueKind::Number,
            Repr::String(_) => ValueKind::String,
            Repr::Array(_) => ValueKind::Array,
            Repr::Object(_) => ValueKind::Object,
        }
    }

    /// The jq type name of this value
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Everything except `null` and `false` is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self.repr(), Repr::Null | Repr::Bool(false))
    }

    /// Check whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(self.repr(), Repr::Null)
    }

    /// Get boolean value if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self.repr() {
            Repr::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get numeric value if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self.repr() {
            Repr::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get string value if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self.repr() {
            Repr::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get elements if this is an array
    pub fn as_array(&self) -> Option<&[EngineValue]> {
        match self.repr() {
            Repr::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get entries if this is an object
    pub fn as_object(&self) -> Option<&EngineMap> {
        match self.repr() {
            Repr::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Number of live references to this value
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Compact JSON text of this value, as jq prints it
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out);
        out
    }

    fn dump_into(&self, out: &mut String) {
        match self.repr() {
            Repr::Null => out.push_str("null"),
            Repr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Repr::Number(n) => out.push_str(&format_number(*n)),
            Repr::String(s) => out.push_str(&quote(s)),
            Repr::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.dump_into(out);
                }
                out.push(']');
            }
            Repr::Object(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&quote(key));
                    out.push(':');
                    value.dump_into(out);
                }
                out.push('}');
            }
        }
    }

    /// Total order used by jq for sorting and comparisons
    pub fn compare(&self, other: &EngineValue) -> Ordering {
        let by_kind = self.kind().cmp(&other.kind());
        if by_kind != Ordering::Equal {
            return by_kind;
        }
        match (self.repr(), other.repr()) {
            (Repr::Number(a), Repr::Number(b)) => compare_numbers(*a, *b),
            (Repr::String(a), Repr::String(b)) => a.cmp(b),
            (Repr::Array(a), Repr::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Repr::Object(a), Repr::Object(b)) => {
                let mut keys_a: Vec<&String> = a.keys().collect();
                let mut keys_b: Vec<&String> = b.keys().collect();
                keys_a.sort();
                keys_b.sort();
                let by_keys = keys_a.cmp(&keys_b);
                if by_keys != Ordering::Equal {
                    return by_keys;
                }
                for key in keys_a {
                    let ord = a[key].compare(&b[key]);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }
            _ => Ordering::Equal,
        }
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    // nan sorts below every other number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Format a number the way jq prints it
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "null".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "1.7976931348623157e+308".to_string()
        } else {
            "-1.7976931348623157e+308".to_string()
        }
    } else if n.fract() == 0.0 && n.abs() < 1e17 {
        format!("{}", n as i64)
    } else if n.abs() >= 1e17 || n.abs() < 1e-5 {
        format!("{n:e}")
    } else {
        format!("{n}")
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

impl PartialEq for EngineValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl fmt::Debug for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

impl fmt::Display for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

impl From<bool> for EngineValue {
    fn from(value: bool) -> Self {
        EngineValue::bool(value)
    }
}

impl From<f64> for EngineValue {
    fn from(value: f64) -> Self {
        EngineValue::number(value)
    }
}

impl From<&str> for EngineValue {
    fn from(value: &str) -> Self {
        EngineValue::string(value)
    }
}

impl From<String> for EngineValue {
    fn from(value: String) -> Self {
        EngineValue::string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ordering_matches_jq() {
        let values = [
            EngineValue::null(),
            EngineValue::bool(false),
            EngineValue::bool(true),
            EngineValue::number(-3.0),
            EngineValue::string("a"),
            EngineValue::array(vec![]),
            EngineValue::object([]),
        ];
        for pair in values.windows(2) {
            assert_eq!(pair[0].compare(&pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn test_object_equality_ignores_order() {
        let a = EngineValue::object([
            ("x".to_string(), EngineValue::number(1.0)),
            ("y".to_string(), EngineValue::number(2.0)),
        ]);
        let b = EngineValue::object([
            ("y".to_string(), EngineValue::number(2.0)),
            ("x".to_string(), EngineValue::number(1.0)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_dump() {
        let value = EngineValue::object([
            ("a".to_string(), EngineValue::number(1.0)),
            ("b".to_string(), EngineValue::number(1.5)),
            (
                "c".to_string(),
                EngineValue::array(vec![EngineValue::string("x\"y"), EngineValue::null()]),
            ),
        ]);
        assert_eq!(value.dump(), r#"{"a":1,"b":1.5,"c":["x\"y",null]}"#);
        assert_eq!(EngineValue::number(f64::NAN).dump(), "null");
    }

    #[test]
    fn test_clone_shares_storage() {
        let a = EngineValue::string("shared");
        let b = a.clone();
        assert_eq!(a.ref_count(), 2);
        drop(b);
        assert_eq!(a.ref_count(), 1);
    }
}
