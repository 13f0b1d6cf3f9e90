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

//! Builtin function registry
//!
//! Functions are resolved by name and arity when a program is parsed. Each
//! entry is one of four shapes:
//!
//! - [`Native::Value`]: maps the input to exactly one outcome
//! - [`Native::Select`]: passes the input through or drops it
//! - [`Native::Binary`]: one argument, evaluated against the input, combined
//!   with the input for every argument output
//! - [`Native::Filter`]: full access to argument filters and the scope

use super::ast::FilterRef;
use super::interpreter::{
    Env, Outcome, Stream, collect, deferred, empty, eval, iterate, map_ok, once, recurse_values,
    then_each,
};
use super::ops::{self, describe, error_value};
use crate::engine::value::Repr;
use crate::engine::{EngineMap, EngineValue, ValueKind};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fmt;

/// Native implementation of a builtin
#[derive(Clone, Copy)]
pub(crate) enum Native {
    Value(fn(&EngineValue) -> Outcome),
    Select(fn(&EngineValue) -> bool),
    Binary(fn(&EngineValue, &EngineValue) -> Outcome),
    Filter(fn(&[FilterRef], &Env, EngineValue) -> Stream),
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Native::Value(_) => "Value",
            Native::Select(_) => "Select",
            Native::Binary(_) => "Binary",
            Native::Filter(_) => "Filter",
        };
        write!(f, "Native::{shape}")
    }
}

type Registry = FxHashMap<&'static str, Vec<(usize, Native)>>;

static BUILTINS: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    register_values(&mut registry);
    register_selectors(&mut registry);
    register_binaries(&mut registry);
    register_filters(&mut registry);
    registry
});

/// Find the builtin `name/arity`
pub(crate) fn lookup(name: &str, arity: usize) -> Option<Native> {
    BUILTINS
        .get(name)?
        .iter()
        .find(|(n, _)| *n == arity)
        .map(|(_, native)| *native)
}

fn register(registry: &mut Registry, name: &'static str, arity: usize, native: Native) {
    registry.entry(name).or_default().push((arity, native));
}

/// Convert parsed JSON into an engine value
pub(crate) fn from_json(value: serde_json::Value) -> EngineValue {
    match value {
        serde_json::Value::Null => EngineValue::null(),
        serde_json::Value::Bool(b) => EngineValue::bool(b),
        serde_json::Value::Number(n) => EngineValue::number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => EngineValue::string(s),
        serde_json::Value::Array(items) => {
            EngineValue::array(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => {
            EngineValue::object(map.into_iter().map(|(k, v)| (k, from_json(v))))
        }
    }
}

fn fail_with(message: impl Into<String>) -> Outcome {
    Err(error_value(message))
}

fn number_of(value: &EngineValue) -> Result<f64, EngineValue> {
    value
        .as_number()
        .ok_or_else(|| error_value(format!("{} number required", describe(value))))
}

fn math(value: &EngineValue, op: fn(f64) -> f64) -> Outcome {
    Ok(EngineValue::number(op(number_of(value)?)))
}

fn array_of<'v>(value: &'v EngineValue, what: &str) -> Result<&'v [EngineValue], EngineValue> {
    value.as_array().ok_or_else(|| {
        error_value(format!(
            "{} cannot be {what}, as it is not an array",
            describe(value)
        ))
    })
}

/// Values of an array or object, in order
fn members(value: &EngineValue) -> Result<Vec<EngineValue>, EngineValue> {
    collect(iterate(value.clone()))
}

fn register_values(registry: &mut Registry) {
    let values: &[(&'static str, fn(&EngineValue) -> Outcome)] = &[
        ("not", |v| Ok(EngineValue::bool(!v.is_truthy()))),
        ("length", length),
        ("utf8bytelength", |v| match v.as_str() {
            Some(s) => Ok(EngineValue::number(s.len() as f64)),
            None => fail_with(format!(
                "{} only strings have UTF-8 byte length",
                describe(v)
            )),
        }),
        ("keys", |v| keys(v, true)),
        ("keys_unsorted", |v| keys(v, false)),
        ("add", |v| {
            members(v)?
                .iter()
                .try_fold(EngineValue::null(), |acc, item| ops::add(&acc, item))
        }),
        ("type", |v| Ok(EngineValue::string(v.type_name()))),
        ("tostring", |v| match v.as_str() {
            Some(_) => Ok(v.clone()),
            None => Ok(EngineValue::string(v.dump())),
        }),
        ("tonumber", tonumber),
        ("tojson", |v| Ok(EngineValue::string(v.dump()))),
        ("fromjson", fromjson),
        ("ascii_downcase", |v| match v.as_str() {
            Some(s) => Ok(EngineValue::string(s.to_ascii_lowercase())),
            None => fail_with("ascii_downcase input must be a string"),
        }),
        ("ascii_upcase", |v| match v.as_str() {
            Some(s) => Ok(EngineValue::string(s.to_ascii_uppercase())),
            None => fail_with("ascii_upcase input must be a string"),
        }),
        ("floor", |v| math(v, f64::floor)),
        ("ceil", |v| math(v, f64::ceil)),
        ("round", |v| math(v, f64::round)),
        ("sqrt", |v| math(v, f64::sqrt)),
        ("fabs", |v| math(v, f64::abs)),
        ("sort", |v| {
            let mut items = array_of(v, "sorted")?.to_vec();
            items.sort_by(|a, b| a.compare(b));
            Ok(EngineValue::array(items))
        }),
        ("reverse", reverse),
        ("unique", |v| {
            let mut items = array_of(v, "sorted")?.to_vec();
            items.sort_by(|a, b| a.compare(b));
            items.dedup_by(|a, b| a.compare(b) == Ordering::Equal);
            Ok(EngineValue::array(items))
        }),
        ("min", |v| {
            let items = array_of(v, "compared")?;
            Ok(items
                .iter()
                .min_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or_else(EngineValue::null))
        }),
        ("max", |v| {
            let items = array_of(v, "compared")?;
            Ok(items
                .iter()
                .max_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or_else(EngineValue::null))
        }),
        ("to_entries", to_entries),
        ("from_entries", from_entries),
        ("flatten", |v| flatten(v, f64::INFINITY)),
        ("any", |v| {
            Ok(EngineValue::bool(
                members(v)?.iter().any(EngineValue::is_truthy),
            ))
        }),
        ("all", |v| {
            Ok(EngineValue::bool(
                members(v)?.iter().all(EngineValue::is_truthy),
            ))
        }),
        ("explode", |v| match v.as_str() {
            Some(s) => Ok(EngineValue::array(
                s.chars()
                    .map(|c| EngineValue::number(u32::from(c) as f64))
                    .collect(),
            )),
            None => fail_with(format!("{} cannot be exploded", describe(v))),
        }),
        ("implode", implode),
        ("isnan", |v| Ok(EngineValue::bool(number_of(v)?.is_nan()))),
        ("isinfinite", |v| {
            Ok(EngineValue::bool(number_of(v)?.is_infinite()))
        }),
        ("isnormal", |v| Ok(EngineValue::bool(number_of(v)?.is_normal()))),
        ("infinite", |_| Ok(EngineValue::number(f64::INFINITY))),
        ("nan", |_| Ok(EngineValue::number(f64::NAN))),
        ("first", |v| ops::index(v, &EngineValue::number(0.0))),
        ("last", |v| ops::index(v, &EngineValue::number(-1.0))),
        ("error", |v| Err(v.clone())),
        ("debug", |v| {
            log::debug!("[\"DEBUG:\",{}]", v.dump());
            Ok(v.clone())
        }),
    ];
    for &(name, f) in values {
        register(registry, name, 0, Native::Value(f));
    }
}

fn register_selectors(registry: &mut Registry) {
    let selectors: &[(&'static str, fn(&EngineValue) -> bool)] = &[
        ("values", |v| !v.is_null()),
        ("nulls", EngineValue::is_null),
        ("booleans", |v| matches!(v.kind(), ValueKind::True | ValueKind::False)),
        ("numbers", |v| v.kind() == ValueKind::Number),
        ("strings", |v| v.kind() == ValueKind::String),
        ("arrays", |v| v.kind() == ValueKind::Array),
        ("objects", |v| v.kind() == ValueKind::Object),
        ("iterables", |v| {
            matches!(v.kind(), ValueKind::Array | ValueKind::Object)
        }),
        ("scalars", |v| {
            !matches!(v.kind(), ValueKind::Array | ValueKind::Object)
        }),
    ];
    for &(name, keep) in selectors {
        register(registry, name, 0, Native::Select(keep));
    }
}

fn register_binaries(registry: &mut Registry) {
    let binaries: &[(&'static str, fn(&EngineValue, &EngineValue) -> Outcome)] = &[
        ("has", has),
        ("in", |input, container| has(container, input)),
        ("contains", |input, other| {
            Ok(EngineValue::bool(contains(input, other)?))
        }),
        ("inside", |input, other| {
            Ok(EngineValue::bool(contains(other, input)?))
        }),
        ("startswith", |input, prefix| match (input.as_str(), prefix.as_str()) {
            (Some(s), Some(p)) => Ok(EngineValue::bool(s.starts_with(p))),
            _ => fail_with("startswith() requires string inputs"),
        }),
        ("endswith", |input, suffix| match (input.as_str(), suffix.as_str()) {
            (Some(s), Some(p)) => Ok(EngineValue::bool(s.ends_with(p))),
            _ => fail_with("endswith() requires string inputs"),
        }),
        ("ltrimstr", |input, prefix| match (input.as_str(), prefix.as_str()) {
            (Some(s), Some(p)) => Ok(s
                .strip_prefix(p)
                .map(EngineValue::string)
                .unwrap_or_else(|| input.clone())),
            _ => Ok(input.clone()),
        }),
        ("rtrimstr", |input, suffix| match (input.as_str(), suffix.as_str()) {
            (Some(s), Some(p)) => Ok(s
                .strip_suffix(p)
                .map(EngineValue::string)
                .unwrap_or_else(|| input.clone())),
            _ => Ok(input.clone()),
        }),
        ("split", |input, separator| match (input.as_str(), separator.as_str()) {
            (Some(s), Some(sep)) => Ok(ops::split(s, sep)),
            _ => fail_with("split input and separator must be strings"),
        }),
        ("join", join),
        ("test", |input, pattern| regex_test(input, pattern, &EngineValue::null())),
        ("getpath", getpath),
        ("flatten", |input, depth| {
            let depth = number_of(depth)?;
            if depth < 0.0 {
                return fail_with("flatten depth must not be negative");
            }
            flatten(input, depth)
        }),
        ("error", |_, message| Err(message.clone())),
    ];
    for &(name, f) in binaries {
        register(registry, name, 1, Native::Binary(f));
    }
}

fn register_filters(registry: &mut Registry) {
    let filters: &[(&'static str, usize, fn(&[FilterRef], &Env, EngineValue) -> Stream)] = &[
        ("empty", 0, |_, _, _| empty()),
        ("recurse", 0, |_, _, input| recurse_values(input)),
        ("recurse", 1, |args, env, input| {
            recurse_with(args[0].clone(), env.clone(), input)
        }),
        ("repeat", 1, |args, env, input| {
            recurse_with(args[0].clone(), env.clone(), input)
        }),
        ("select", 1, |args, env, input| {
            let keep = input.clone();
            then_each(eval(&args[0], env, input), move |c| {
                if c.is_truthy() {
                    once(Ok(keep.clone()))
                } else {
                    empty()
                }
            })
        }),
        ("map", 1, |args, env, input| {
            let (f, env) = (args[0].clone(), env.clone());
            deferred(move || {
                let outputs = then_each(iterate(input), move |item| eval(&f, &env, item));
                once(collect(outputs).map(EngineValue::array))
            })
        }),
        ("map_values", 1, |args, env, input| once(map_values(&args[0], env, &input))),
        ("with_entries", 1, |args, env, input| {
            let (f, env) = (args[0].clone(), env.clone());
            deferred(move || {
                once(to_entries(&input).and_then(|entries| {
                    let mapped = then_each(iterate(entries), move |e| eval(&f, &env, e));
                    from_entries(&EngineValue::array(collect(mapped)?))
                }))
            })
        }),
        ("sort_by", 1, |args, env, input| {
            once(sorted_by(&args[0], env, &input).map(|pairs| {
                EngineValue::array(pairs.into_iter().map(|(_, item)| item).collect())
            }))
        }),
        ("group_by", 1, |args, env, input| {
            once(sorted_by(&args[0], env, &input).map(|pairs| {
                EngineValue::array(
                    grouped(pairs)
                        .into_iter()
                        .map(EngineValue::array)
                        .collect(),
                )
            }))
        }),
        ("unique_by", 1, |args, env, input| {
            once(sorted_by(&args[0], env, &input).map(|pairs| {
                EngineValue::array(
                    grouped(pairs)
                        .into_iter()
                        .filter_map(|group| group.into_iter().next())
                        .collect(),
                )
            }))
        }),
        ("min_by", 1, |args, env, input| {
            once(keyed(&args[0], env, &input).map(|pairs| {
                pairs
                    .into_iter()
                    .min_by(|a, b| a.0.compare(&b.0))
                    .map(|(_, item)| item)
                    .unwrap_or_else(EngineValue::null)
            }))
        }),
        ("max_by", 1, |args, env, input| {
            once(keyed(&args[0], env, &input).map(|pairs| {
                pairs
                    .into_iter()
                    .max_by(|a, b| a.0.compare(&b.0))
                    .map(|(_, item)| item)
                    .unwrap_or_else(EngineValue::null)
            }))
        }),
        ("limit", 2, |args, env, input| {
            let (f, env_inner) = (args[1].clone(), env.clone());
            then_each(eval(&args[0], env, input.clone()), move |n| {
                match number_of(&n) {
                    Ok(n) if n > 0.0 => {
                        Box::new(eval(&f, &env_inner, input.clone()).take(n.ceil() as usize))
                            as Stream
                    }
                    Ok(_) => empty(),
                    Err(err) => once(Err(err)),
                }
            })
        }),
        ("first", 1, |args, env, input| {
            Box::new(eval(&args[0], env, input).take(1)) as Stream
        }),
        ("last", 1, |args, env, input| {
            let (f, env) = (args[0].clone(), env.clone());
            deferred(move || {
                let mut last = None;
                for outcome in eval(&f, &env, input) {
                    match outcome {
                        Ok(value) => last = Some(value),
                        Err(err) => return once(Err(err)),
                    }
                }
                match last {
                    Some(value) => once(Ok(value)),
                    None => empty(),
                }
            })
        }),
        ("isempty", 1, |args, env, input| {
            let (f, env) = (args[0].clone(), env.clone());
            deferred(move || match eval(&f, &env, input).next() {
                None => once(Ok(EngineValue::bool(true))),
                Some(Ok(_)) => once(Ok(EngineValue::bool(false))),
                Some(Err(err)) => once(Err(err)),
            })
        }),
        ("range", 1, |args, env, input| {
            then_each(eval(&args[0], env, input), |upto| match number_of(&upto) {
                Ok(upto) => range(0.0, upto),
                Err(err) => once(Err(err)),
            })
        }),
        ("range", 2, |args, env, input| {
            let (upto, env_inner) = (args[1].clone(), env.clone());
            then_each(eval(&args[0], env, input.clone()), move |from| {
                then_each(eval(&upto, &env_inner, input.clone()), move |upto| {
                    match (number_of(&from), number_of(&upto)) {
                        (Ok(from), Ok(upto)) => range(from, upto),
                        (Err(err), _) | (_, Err(err)) => once(Err(err)),
                    }
                })
            })
        }),
        ("any", 1, |args, env, input| {
            let (f, env) = (args[0].clone(), env.clone());
            deferred(move || {
                let outputs = then_each(iterate(input), move |item| eval(&f, &env, item));
                once(short_circuit(outputs, true))
            })
        }),
        ("all", 1, |args, env, input| {
            let (f, env) = (args[0].clone(), env.clone());
            deferred(move || {
                let outputs = then_each(iterate(input), move |item| eval(&f, &env, item));
                once(short_circuit(outputs, false))
            })
        }),
        ("test", 2, |args, env, input| {
            let (flags, env_inner) = (args[1].clone(), env.clone());
            then_each(eval(&args[0], env, input.clone()), move |pattern| {
                let input = input.clone();
                map_ok(eval(&flags, &env_inner, input.clone()), move |flags| {
                    regex_test(&input, &pattern, &flags)
                })
            })
        }),
    ];
    for &(name, arity, f) in filters {
        register(registry, name, arity, Native::Filter(f));
    }
}

fn length(value: &EngineValue) -> Outcome {
    let n = match value.repr() {
        Repr::Null => 0.0,
        Repr::Bool(_) => return fail_with(format!("{} has no length", describe(value))),
        Repr::Number(n) => n.abs(),
        Repr::String(s) => s.chars().count() as f64,
        Repr::Array(items) => items.len() as f64,
        Repr::Object(map) => map.len() as f64,
    };
    Ok(EngineValue::number(n))
}

fn keys(value: &EngineValue, sorted: bool) -> Outcome {
    match value.repr() {
        Repr::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            if sorted {
                keys.sort();
            }
            Ok(EngineValue::array(
                keys.into_iter().map(|k| EngineValue::string(k.as_str())).collect(),
            ))
        }
        Repr::Array(items) => Ok(EngineValue::array(
            (0..items.len())
                .map(|i| EngineValue::number(i as f64))
                .collect(),
        )),
        _ => fail_with(format!("{} has no keys", describe(value))),
    }
}

fn tonumber(value: &EngineValue) -> Outcome {
    match value.repr() {
        Repr::Number(_) => Ok(value.clone()),
        Repr::String(s) => s
            .trim()
            .parse::<f64>()
            .map(EngineValue::number)
            .map_err(|_| error_value(format!("Cannot parse '{s}' as JSON"))),
        _ => fail_with(format!("{} cannot be parsed as a number", describe(value))),
    }
}

fn fromjson(value: &EngineValue) -> Outcome {
    let Some(text) = value.as_str() else {
        return fail_with(format!("{} cannot be parsed as JSON", describe(value)));
    };
    serde_json::from_str::<serde_json::Value>(text)
        .map(from_json)
        .map_err(|err| error_value(format!("{err} (while parsing '{text}')")))
}

fn reverse(value: &EngineValue) -> Outcome {
    match value.repr() {
        Repr::Null => Ok(EngineValue::array(Vec::new())),
        Repr::String(s) => Ok(EngineValue::string(s.chars().rev().collect::<String>())),
        Repr::Array(items) => Ok(EngineValue::array(items.iter().rev().cloned().collect())),
        _ => fail_with(format!("Cannot reverse {}", describe(value))),
    }
}

fn to_entries(value: &EngineValue) -> Outcome {
    let Some(map) = value.as_object() else {
        return fail_with(format!("{} has no keys", describe(value)));
    };
    Ok(EngineValue::array(
        map.iter()
            .map(|(key, value)| {
                EngineValue::object([
                    ("key".to_string(), EngineValue::string(key.as_str())),
                    ("value".to_string(), value.clone()),
                ])
            })
            .collect(),
    ))
}

fn from_entries(value: &EngineValue) -> Outcome {
    let mut object = EngineMap::new();
    for entry in members(value)? {
        let Some(fields) = entry.as_object() else {
            return fail_with(format!("Cannot index {} with \"key\"", entry.type_name()));
        };
        let key = ["key", "k", "name", "Name", "K", "Key"]
            .iter()
            .filter_map(|name| fields.get(*name))
            .find(|key| key.is_truthy())
            .cloned()
            .unwrap_or_else(EngineValue::null);
        let key = match key.as_str() {
            Some(s) => s.to_string(),
            None => key.dump(),
        };
        let value = if fields.contains_key("value") {
            fields.get("value")
        } else {
            fields.get("v")
        };
        object.insert(key, value.cloned().unwrap_or_else(EngineValue::null));
    }
    Ok(EngineValue::from_map(object))
}

fn flatten(value: &EngineValue, depth: f64) -> Outcome {
    let items = array_of(value, "flattened")?;
    let mut out = Vec::with_capacity(items.len());
    flatten_into(items, depth, &mut out);
    Ok(EngineValue::array(out))
}

fn flatten_into(items: &[EngineValue], depth: f64, out: &mut Vec<EngineValue>) {
    for item in items {
        match item.as_array() {
            Some(inner) if depth > 0.0 => flatten_into(inner, depth - 1.0, out),
            _ => out.push(item.clone()),
        }
    }
}

fn implode(value: &EngineValue) -> Outcome {
    let items = value
        .as_array()
        .ok_or_else(|| error_value("Implode input must be an array"))?;
    let mut out = String::with_capacity(items.len());
    for item in items {
        let code = number_of(item)?;
        let c = char::from_u32(code as u32)
            .ok_or_else(|| error_value(format!("Invalid codepoint literal {code}")))?;
        out.push(c);
    }
    Ok(EngineValue::string(out))
}

fn has(container: &EngineValue, key: &EngineValue) -> Outcome {
    match (container.repr(), key.repr()) {
        (Repr::Object(map), Repr::String(k)) => Ok(EngineValue::bool(map.contains_key(k))),
        (Repr::Array(items), Repr::Number(n)) => {
            Ok(EngineValue::bool(*n >= 0.0 && *n < items.len() as f64))
        }
        _ => fail_with(format!(
            "Cannot check whether {} has a {} key",
            container.type_name(),
            key.type_name()
        )),
    }
}

fn contains(a: &EngineValue, b: &EngineValue) -> Result<bool, EngineValue> {
    match (a.repr(), b.repr()) {
        (Repr::Object(a_map), Repr::Object(b_map)) => {
            for (key, b_value) in b_map {
                match a_map.get(key) {
                    Some(a_value) if contains(a_value, b_value)? => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        (Repr::Array(a_items), Repr::Array(b_items)) => {
            for b_item in b_items {
                let mut found = false;
                for a_item in a_items {
                    if contains(a_item, b_item)? {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Repr::String(a_str), Repr::String(b_str)) => Ok(a_str.contains(b_str.as_str())),
        _ if a.type_name() == b.type_name() => Ok(a == b),
        _ => Err(error_value(format!(
            "{} and {} cannot have their containment checked",
            describe(a),
            describe(b)
        ))),
    }
}

fn join(input: &EngineValue, separator: &EngineValue) -> Outcome {
    let Some(separator) = separator.as_str() else {
        return fail_with(format!("{} is not a valid separator", describe(separator)));
    };
    let mut out = String::new();
    for (i, item) in members(input)?.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        match item.repr() {
            Repr::Null => {}
            Repr::String(s) => out.push_str(s),
            Repr::Bool(_) | Repr::Number(_) => out.push_str(&item.dump()),
            _ => return fail_with(format!("Cannot join with {}", item.type_name())),
        }
    }
    Ok(EngineValue::string(out))
}

fn regex_test(input: &EngineValue, pattern: &EngineValue, flags: &EngineValue) -> Outcome {
    let Some(text) = input.as_str() else {
        return fail_with(format!(
            "{} cannot be matched, as it is not a string",
            describe(input)
        ));
    };
    let Some(pattern) = pattern.as_str() else {
        return fail_with(format!("{} is not a string", describe(pattern)));
    };
    let flags = match flags.repr() {
        Repr::Null => "",
        Repr::String(s) => s.as_str(),
        _ => return fail_with(format!("{} is not a string", describe(flags))),
    };
    if let Some(bad) = flags.chars().find(|c| !"gimnpsxl".contains(*c)) {
        return fail_with(format!("{flags} is not a valid modifier string ({bad})"));
    }
    let regex = regex::RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .ignore_whitespace(flags.contains('x'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|err| error_value(format!("{pattern} (at offset 0) is not a valid regex: {err}")))?;
    Ok(EngineValue::bool(regex.is_match(text)))
}

fn getpath(input: &EngineValue, path: &EngineValue) -> Outcome {
    let Some(path) = path.as_array() else {
        return fail_with("Path must be specified as an array");
    };
    let mut current = input.clone();
    for key in path {
        if current.is_null() {
            return Ok(current);
        }
        current = ops::index(&current, key)?;
    }
    Ok(current)
}

/// `def recurse(f): def r: ., (f | r); r;`
///
/// Pending child streams live on an explicit stack, so deep recursion costs
/// heap rather than call frames.
struct RecurseWith {
    f: FilterRef,
    env: Env,
    start: Option<EngineValue>,
    pending: Vec<Stream>,
}

impl RecurseWith {
    fn emit(&mut self, value: EngineValue) -> Option<Outcome> {
        self.pending.push(eval(&self.f, &self.env, value.clone()));
        Some(Ok(value))
    }
}

impl Iterator for RecurseWith {
    type Item = Outcome;

    fn next(&mut self) -> Option<Outcome> {
        if let Some(value) = self.start.take() {
            return self.emit(value);
        }
        loop {
            let top = self.pending.last_mut()?;
            match top.next() {
                Some(Ok(child)) => return self.emit(child),
                Some(Err(err)) => return Some(Err(err)),
                None => {
                    self.pending.pop();
                }
            }
        }
    }
}

fn recurse_with(f: FilterRef, env: Env, value: EngineValue) -> Stream {
    Box::new(RecurseWith {
        f,
        env,
        start: Some(value),
        pending: Vec::new(),
    })
}

fn map_values(f: &FilterRef, env: &Env, input: &EngineValue) -> Outcome {
    let first = |value: &EngineValue| eval(f, env, value.clone()).next().transpose();
    match input.repr() {
        Repr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(mapped) = first(item)? {
                    out.push(mapped);
                }
            }
            Ok(EngineValue::array(out))
        }
        Repr::Object(map) => {
            let mut out = EngineMap::with_capacity(map.len());
            for (key, item) in map {
                if let Some(mapped) = first(item)? {
                    out.insert(key.clone(), mapped);
                }
            }
            Ok(EngineValue::from_map(out))
        }
        _ => Err(error_value(format!(
            "Cannot iterate over {}",
            describe(input)
        ))),
    }
}

type Keyed = Vec<(EngineValue, EngineValue)>;

/// Pair every array element with `[f]` evaluated against it
fn keyed(f: &FilterRef, env: &Env, input: &EngineValue) -> Result<Keyed, EngineValue> {
    let Some(items) = input.as_array() else {
        return Err(error_value(format!(
            "Cannot index {} with number",
            input.type_name()
        )));
    };
    items
        .iter()
        .map(|item| {
            let key = collect(eval(f, env, item.clone()))?;
            Ok((EngineValue::array(key), item.clone()))
        })
        .collect()
}

fn sorted_by(f: &FilterRef, env: &Env, input: &EngineValue) -> Result<Keyed, EngineValue> {
    let mut pairs = keyed(f, env, input)?;
    pairs.sort_by(|a, b| a.0.compare(&b.0));
    Ok(pairs)
}

/// Split sorted pairs into runs of equal keys
fn grouped(pairs: Keyed) -> Vec<Vec<EngineValue>> {
    let mut groups: Vec<Vec<EngineValue>> = Vec::new();
    let mut last_key: Option<EngineValue> = None;
    for (key, item) in pairs {
        match (&last_key, groups.last_mut()) {
            (Some(previous), Some(group)) if previous.compare(&key) == Ordering::Equal => {
                group.push(item);
            }
            _ => groups.push(vec![item]),
        }
        last_key = Some(key);
    }
    groups
}

fn range(from: f64, upto: f64) -> Stream {
    let mut next = from;
    Box::new(std::iter::from_fn(move || {
        if next < upto {
            let value = next;
            next += 1.0;
            Some(Ok(EngineValue::number(value)))
        } else {
            None
        }
    }))
}

/// Stop at the first output whose truthiness equals `target`
fn short_circuit(outputs: Stream, target: bool) -> Outcome {
    for outcome in outputs {
        if outcome?.is_truthy() == target {
            return Ok(EngineValue::bool(target));
        }
    }
    Ok(EngineValue::bool(!target))
}
