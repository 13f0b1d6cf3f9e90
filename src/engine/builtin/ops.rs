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

//! Operators, indexing and slicing over engine values

use super::ast::BinaryOp;
use super::interpreter::Outcome;
use crate::engine::value::Repr;
use crate::engine::{EngineMap, EngineValue};
use std::cmp::Ordering;

const DUMP_LIMIT: usize = 11;

/// Build an error value from a message
pub(crate) fn error_value(message: impl Into<String>) -> EngineValue {
    EngineValue::string(message.into())
}

/// `type (value)` with the value dump truncated
pub(crate) fn describe(value: &EngineValue) -> String {
    let dump = value.dump();
    let shown = if dump.len() > DUMP_LIMIT {
        let mut end = DUMP_LIMIT - 1;
        while !dump.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &dump[..end])
    } else {
        dump
    };
    format!("{} ({shown})", value.type_name())
}

fn binary_error(lhs: &EngineValue, rhs: &EngineValue, what: &str) -> EngineValue {
    error_value(format!("{} and {} {what}", describe(lhs), describe(rhs)))
}

pub(crate) fn apply(op: BinaryOp, lhs: &EngineValue, rhs: &EngineValue) -> Outcome {
    match op {
        BinaryOp::Add => add(lhs, rhs),
        BinaryOp::Subtract => subtract(lhs, rhs),
        BinaryOp::Multiply => multiply(lhs, rhs),
        BinaryOp::Divide => divide(lhs, rhs),
        BinaryOp::Modulo => modulo(lhs, rhs),
        BinaryOp::Equal => Ok(EngineValue::bool(lhs.compare(rhs) == Ordering::Equal)),
        BinaryOp::NotEqual => Ok(EngineValue::bool(lhs.compare(rhs) != Ordering::Equal)),
        BinaryOp::Less => Ok(EngineValue::bool(lhs.compare(rhs) == Ordering::Less)),
        BinaryOp::LessEqual => Ok(EngineValue::bool(lhs.compare(rhs) != Ordering::Greater)),
        BinaryOp::Greater => Ok(EngineValue::bool(lhs.compare(rhs) == Ordering::Greater)),
        BinaryOp::GreaterEqual => Ok(EngineValue::bool(lhs.compare(rhs) != Ordering::Less)),
    }
}

pub(crate) fn add(lhs: &EngineValue, rhs: &EngineValue) -> Outcome {
    match (lhs.repr(), rhs.repr()) {
        (Repr::Null, _) => Ok(rhs.clone()),
        (_, Repr::Null) => Ok(lhs.clone()),
        (Repr::Number(a), Repr::Number(b)) => Ok(EngineValue::number(a + b)),
        (Repr::String(a), Repr::String(b)) => Ok(EngineValue::string(format!("{a}{b}"))),
        (Repr::Array(a), Repr::Array(b)) => {
            Ok(EngineValue::array(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Repr::Object(a), Repr::Object(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                merged.insert(key.clone(), value.clone());
            }
            Ok(EngineValue::from_map(merged))
        }
        _ => Err(binary_error(lhs, rhs, "cannot be added")),
    }
}

pub(crate) fn subtract(lhs: &EngineValue, rhs: &EngineValue) -> Outcome {
    match (lhs.repr(), rhs.repr()) {
        (Repr::Number(a), Repr::Number(b)) => Ok(EngineValue::number(a - b)),
        (Repr::Array(a), Repr::Array(b)) => Ok(EngineValue::array(
            a.iter()
                .filter(|item| !b.iter().any(|removed| removed == *item))
                .cloned()
                .collect(),
        )),
        _ => Err(binary_error(lhs, rhs, "cannot be subtracted")),
    }
}

pub(crate) fn multiply(lhs: &EngineValue, rhs: &EngineValue) -> Outcome {
    match (lhs.repr(), rhs.repr()) {
        (Repr::Number(a), Repr::Number(b)) => Ok(EngineValue::number(a * b)),
        (Repr::String(s), Repr::Number(n)) | (Repr::Number(n), Repr::String(s)) => {
            repeat(s, *n)
        }
        (Repr::Object(a), Repr::Object(b)) => Ok(EngineValue::from_map(deep_merge(a, b))),
        _ => Err(binary_error(lhs, rhs, "cannot be multiplied")),
    }
}

/// Longest string `string * number` may build, in bytes
const MAX_REPEAT_LEN: usize = i32::MAX as usize;

fn repeat(s: &str, n: f64) -> Outcome {
    if n <= 0.0 || n.is_nan() {
        return Ok(EngineValue::null());
    }
    let times = if n < 1.0 { 1 } else { n as usize };
    match s.len().checked_mul(times) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(EngineValue::string(s.repeat(times))),
        _ => Err(error_value("Repeat string result too long")),
    }
}

fn deep_merge(a: &EngineMap, b: &EngineMap) -> EngineMap {
    let mut merged = a.clone();
    for (key, value) in b {
        let combined = match (merged.get(key).map(|v| v.repr()), value.repr()) {
            (Some(Repr::Object(inner_a)), Repr::Object(inner_b)) => {
                EngineValue::from_map(deep_merge(inner_a, inner_b))
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

pub(crate) fn divide(lhs: &EngineValue, rhs: &EngineValue) -> Outcome {
    match (lhs.repr(), rhs.repr()) {
        (Repr::Number(_), Repr::Number(b)) if *b == 0.0 => Err(binary_error(
            lhs,
            rhs,
            "cannot be divided because the divisor is zero",
        )),
        (Repr::Number(a), Repr::Number(b)) => Ok(EngineValue::number(a / b)),
        (Repr::String(a), Repr::String(b)) => Ok(split(a, b)),
        _ => Err(binary_error(lhs, rhs, "cannot be divided")),
    }
}

pub(crate) fn modulo(lhs: &EngineValue, rhs: &EngineValue) -> Outcome {
    match (lhs.repr(), rhs.repr()) {
        (Repr::Number(a), Repr::Number(b)) => {
            let divisor = *b as i64;
            if divisor == 0 {
                return Err(binary_error(
                    lhs,
                    rhs,
                    "cannot be divided because the divisor is zero",
                ));
            }
            let dividend = *a as i64;
            Ok(EngineValue::number(
                dividend.wrapping_rem(divisor.wrapping_abs()) as f64,
            ))
        }
        _ => Err(binary_error(lhs, rhs, "cannot be divided")),
    }
}

pub(crate) fn negate(value: &EngineValue) -> Outcome {
    match value.repr() {
        Repr::Number(n) => Ok(EngineValue::number(-n)),
        _ => Err(error_value(format!("{} cannot be negated", describe(value)))),
    }
}

/// Split a string on a separator; an empty input yields an empty array
pub(crate) fn split(input: &str, separator: &str) -> EngineValue {
    if input.is_empty() {
        return EngineValue::array(Vec::new());
    }
    let parts = if separator.is_empty() {
        input.chars().map(|c| EngineValue::string(c.to_string())).collect()
    } else {
        input.split(separator).map(EngineValue::string).collect()
    };
    EngineValue::array(parts)
}

/// `target[key]`
pub(crate) fn index(target: &EngineValue, key: &EngineValue) -> Outcome {
    match (target.repr(), key.repr()) {
        (Repr::Null, Repr::String(_) | Repr::Number(_) | Repr::Null) => Ok(EngineValue::null()),
        (Repr::Object(map), Repr::String(k)) => {
            Ok(map.get(k).cloned().unwrap_or_else(EngineValue::null))
        }
        (Repr::Array(items), Repr::Number(n)) => Ok(array_at(items, *n)),
        (Repr::Array(items), Repr::Array(needle)) => Ok(indices(items, needle)),
        (_, Repr::String(k)) => Err(error_value(format!(
            "Cannot index {} with \"{k}\"",
            target.type_name()
        ))),
        _ => Err(error_value(format!(
            "Cannot index {} with {}",
            target.type_name(),
            key.type_name()
        ))),
    }
}

fn array_at(items: &[EngineValue], n: f64) -> EngineValue {
    if n.is_nan() {
        return EngineValue::null();
    }
    let len = items.len() as i64;
    let mut i = n.floor() as i64;
    if i < 0 {
        i += len;
    }
    if (0..len).contains(&i) {
        items[i as usize].clone()
    } else {
        EngineValue::null()
    }
}

fn indices(items: &[EngineValue], needle: &[EngineValue]) -> EngineValue {
    if needle.is_empty() {
        return EngineValue::null();
    }
    let found = items
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(i, _)| EngineValue::number(i as f64))
        .collect();
    EngineValue::array(found)
}

/// `target[from:to]`, with `null` bounds meaning open ends
pub(crate) fn slice(target: &EngineValue, from: &EngineValue, to: &EngineValue) -> Outcome {
    let bound = |value: &EngineValue| -> Result<Option<f64>, EngineValue> {
        match value.repr() {
            Repr::Null => Ok(None),
            Repr::Number(n) => Ok(Some(*n)),
            _ => Err(error_value(
                "Start and end indices of an array slice must be numbers",
            )),
        }
    };
    let (from, to) = (bound(from)?, bound(to)?);
    match target.repr() {
        Repr::Null => Ok(EngineValue::null()),
        Repr::Array(items) => {
            let (start, end) = slice_range(items.len(), from, to);
            Ok(EngineValue::array(items[start..end].to_vec()))
        }
        Repr::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_range(chars.len(), from, to);
            Ok(EngineValue::string(chars[start..end].iter().collect::<String>()))
        }
        _ => Err(error_value(format!(
            "Cannot index {} with object",
            target.type_name()
        ))),
    }
}

fn slice_range(len: usize, from: Option<f64>, to: Option<f64>) -> (usize, usize) {
    let len_f = len as f64;
    let resolve = |n: f64| {
        let n = if n < 0.0 { n + len_f } else { n };
        n.clamp(0.0, len_f)
    };
    let start = resolve(from.unwrap_or(0.0).floor()) as usize;
    let end = resolve(to.unwrap_or(len_f).ceil()) as usize;
    (start, end.max(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn n(value: f64) -> EngineValue {
        EngineValue::number(value)
    }

    fn s(value: &str) -> EngineValue {
        EngineValue::string(value)
    }

    fn message(outcome: Outcome) -> String {
        outcome.unwrap_err().as_str().unwrap().to_string()
    }

    #[test]
    fn test_add_variants() {
        assert_eq!(add(&n(1.0), &n(2.0)).unwrap(), n(3.0));
        assert_eq!(add(&EngineValue::null(), &s("x")).unwrap(), s("x"));
        assert_eq!(add(&s("a"), &s("b")).unwrap(), s("ab"));
        assert_eq!(
            message(add(&n(1.0), &s("a"))),
            "number (1) and string (\"a\") cannot be added"
        );
    }

    #[test]
    fn test_long_values_are_truncated_in_messages() {
        let long = s("abcdefghijklmnop");
        assert_eq!(describe(&long), "string (\"abcdefghi...)");
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            message(divide(&n(1.0), &n(0.0))),
            "number (1) and number (0) cannot be divided because the divisor is zero"
        );
        assert_eq!(
            divide(&s("a,b"), &s(",")).unwrap().dump(),
            r#"["a","b"]"#
        );
    }

    #[test]
    fn test_modulo_truncates() {
        assert_eq!(modulo(&n(5.5), &n(2.0)).unwrap(), n(1.0));
        assert_eq!(modulo(&n(-5.0), &n(3.0)).unwrap(), n(-2.0));
    }

    #[test]
    fn test_string_repetition() {
        assert_eq!(multiply(&s("ab"), &n(3.0)).unwrap(), s("ababab"));
        assert_eq!(multiply(&n(0.5), &s("ab")).unwrap(), s("ab"));
        assert_eq!(multiply(&s("ab"), &n(0.0)).unwrap(), EngineValue::null());
        assert_eq!(
            message(multiply(&s("ab"), &n(1e18))),
            "Repeat string result too long"
        );
        assert_eq!(
            message(multiply(&n(f64::INFINITY), &s("x"))),
            "Repeat string result too long"
        );
    }

    #[test]
    fn test_object_multiplication_merges_deeply() {
        let a = EngineValue::object([(
            "k".to_string(),
            EngineValue::object([("a".to_string(), n(1.0))]),
        )]);
        let b = EngineValue::object([(
            "k".to_string(),
            EngineValue::object([("b".to_string(), n(2.0))]),
        )]);
        assert_eq!(multiply(&a, &b).unwrap().dump(), r#"{"k":{"a":1,"b":2}}"#);
    }

    #[test]
    fn test_index_and_slice() {
        let array = EngineValue::array(vec![n(1.0), n(2.0), n(3.0)]);
        assert_eq!(index(&array, &n(-1.0)).unwrap(), n(3.0));
        assert_eq!(index(&array, &n(7.0)).unwrap(), EngineValue::null());
        assert_eq!(
            message(index(&n(1.0), &s("a"))),
            "Cannot index number with \"a\""
        );
        assert_eq!(
            slice(&array, &n(1.0), &EngineValue::null()).unwrap().dump(),
            "[2,3]"
        );
        assert_eq!(
            slice(&s("héllo"), &n(1.0), &n(3.0)).unwrap(),
            s("él")
        );
    }
}
