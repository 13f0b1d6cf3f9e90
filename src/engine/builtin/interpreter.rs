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

//! Lazy, pull-based filter evaluation
//!
//! Every filter evaluates to a [`Stream`] of outcomes. Nothing past the
//! output a caller asked for is computed: pipes, commas and generators hand
//! out one value per pull.

use super::ast::{Filter, FilterRef, InterpPart};
use super::functions::Native;
use super::ops::{self, error_value};
use crate::engine::value::Repr;
use crate::engine::{EngineMap, EngineValue};
use std::rc::Rc;

/// One output or the error value that ended evaluation
pub(crate) type Outcome = Result<EngineValue, EngineValue>;

/// Lazy sequence of outcomes
pub(crate) type Stream = Box<dyn Iterator<Item = Outcome>>;

/// Variable scope, innermost binding first
#[derive(Clone, Default)]
pub(crate) struct Env(Option<Rc<Frame>>);

struct Frame {
    name: String,
    value: EngineValue,
    parent: Env,
}

impl Env {
    pub(crate) fn bind(&self, name: impl Into<String>, value: EngineValue) -> Env {
        Env(Some(Rc::new(Frame {
            name: name.into(),
            value,
            parent: self.clone(),
        })))
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<EngineValue> {
        let mut current = self.0.as_ref();
        while let Some(frame) = current {
            if frame.name == name {
                return Some(frame.value.clone());
            }
            current = frame.parent.0.as_ref();
        }
        None
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = self.0.as_ref();
        while let Some(frame) = current {
            names.push(frame.name.clone());
            current = frame.parent.0.as_ref();
        }
        names
    }
}

pub(crate) fn once(outcome: Outcome) -> Stream {
    Box::new(std::iter::once(outcome))
}

pub(crate) fn empty() -> Stream {
    Box::new(std::iter::empty())
}

pub(crate) fn fail(message: impl Into<String>) -> Stream {
    once(Err(error_value(message)))
}

/// Feed every value of `source` into `f`, passing errors through
pub(crate) fn then_each(
    source: Stream,
    mut f: impl FnMut(EngineValue) -> Stream + 'static,
) -> Stream {
    Box::new(source.flat_map(move |outcome| match outcome {
        Ok(value) => f(value),
        Err(err) => once(Err(err)),
    }))
}

/// Map every value of `source` through a fallible function
pub(crate) fn map_ok(
    source: Stream,
    mut f: impl FnMut(EngineValue) -> Outcome + 'static,
) -> Stream {
    Box::new(source.map(move |outcome| outcome.and_then(&mut f)))
}

/// Stream built on first pull
struct Deferred {
    pending: Option<Box<dyn FnOnce() -> Stream>>,
    stream: Option<Stream>,
}

impl Iterator for Deferred {
    type Item = Outcome;

    fn next(&mut self) -> Option<Outcome> {
        if let Some(build) = self.pending.take() {
            self.stream = Some(build());
        }
        self.stream.as_mut()?.next()
    }
}

pub(crate) fn deferred(build: impl FnOnce() -> Stream + 'static) -> Stream {
    Box::new(Deferred {
        pending: Some(Box::new(build)),
        stream: None,
    })
}

/// Collect every output, stopping at the first error
pub(crate) fn collect(stream: Stream) -> Result<Vec<EngineValue>, EngineValue> {
    stream.collect()
}

/// Evaluate `filter` against `input`
pub(crate) fn eval(filter: &FilterRef, env: &Env, input: EngineValue) -> Stream {
    match &**filter {
        Filter::Identity => once(Ok(input)),
        Filter::Recurse => recurse_values(input),
        Filter::Literal(value) => once(Ok(value.clone())),
        Filter::Interpolated(parts) => {
            interpolate(Rc::new(parts.clone()), 0, env.clone(), input, String::new())
        }
        Filter::Variable { name, .. } => match env.lookup(name) {
            Some(value) => once(Ok(value)),
            None => fail(format!("${name} is not defined")),
        },
        Filter::Index { target, key } => {
            let (key, env_inner) = (key.clone(), env.clone());
            then_each(eval(target, env, input.clone()), move |container| {
                map_ok(eval(&key, &env_inner, input.clone()), move |k| {
                    ops::index(&container, &k)
                })
            })
        }
        Filter::Slice { target, from, to } => {
            let (from, to, env_inner) = (from.clone(), to.clone(), env.clone());
            then_each(eval(target, env, input.clone()), move |container| {
                let bounds = optional_eval(&to, &env_inner, &input);
                let (from, env_from, input_from) = (from.clone(), env_inner.clone(), input.clone());
                then_each(bounds, move |end| {
                    let container = container.clone();
                    map_ok(optional_eval(&from, &env_from, &input_from), move |start| {
                        ops::slice(&container, &start, &end)
                    })
                })
            })
        }
        Filter::Iterate(target) => then_each(eval(target, env, input), iterate),
        Filter::Pipe(lhs, rhs) => {
            let (rhs, env) = (rhs.clone(), env.clone());
            then_each(eval(lhs, &env, input), move |value| eval(&rhs, &env, value))
        }
        Filter::Comma(lhs, rhs) => {
            let (rhs, env_rhs, input_rhs) = (rhs.clone(), env.clone(), input.clone());
            Box::new(
                eval(lhs, env, input)
                    .chain(deferred(move || eval(&rhs, &env_rhs, input_rhs))),
            )
        }
        Filter::Negate(operand) => map_ok(eval(operand, env, input), |v| ops::negate(&v)),
        Filter::Binary { op, lhs, rhs } => {
            let (op, lhs, env_inner) = (*op, lhs.clone(), env.clone());
            then_each(eval(rhs, env, input.clone()), move |right| {
                map_ok(eval(&lhs, &env_inner, input.clone()), move |left| {
                    ops::apply(op, &left, &right)
                })
            })
        }
        Filter::And(lhs, rhs) => {
            let (rhs, env_inner) = (rhs.clone(), env.clone());
            then_each(eval(lhs, env, input.clone()), move |left| {
                if !left.is_truthy() {
                    return once(Ok(EngineValue::bool(false)));
                }
                map_ok(eval(&rhs, &env_inner, input.clone()), |right| {
                    Ok(EngineValue::bool(right.is_truthy()))
                })
            })
        }
        Filter::Or(lhs, rhs) => {
            let (rhs, env_inner) = (rhs.clone(), env.clone());
            then_each(eval(lhs, env, input.clone()), move |left| {
                if left.is_truthy() {
                    return once(Ok(EngineValue::bool(true)));
                }
                map_ok(eval(&rhs, &env_inner, input.clone()), |right| {
                    Ok(EngineValue::bool(right.is_truthy()))
                })
            })
        }
        Filter::Alternative(lhs, rhs) => Box::new(Alternative {
            lhs: Some(eval(lhs, env, input.clone())),
            rhs: Some((rhs.clone(), env.clone(), input)),
            fallback: None,
        }),
        Filter::Array(None) => once(Ok(EngineValue::array(Vec::new()))),
        Filter::Array(Some(body)) => {
            let (body, env) = (body.clone(), env.clone());
            deferred(move || once(collect(eval(&body, &env, input)).map(EngineValue::array)))
        }
        Filter::Object(entries) => {
            let (entries, env) = (entries.clone(), env.clone());
            deferred(move || -> Stream {
                match build_objects(&entries, &env, &input) {
                    Ok(objects) => Box::new(objects.into_iter().map(Ok)),
                    Err(err) => once(Err(err)),
                }
            })
        }
        Filter::If {
            cond,
            then,
            otherwise,
        } => {
            let (then, otherwise, env_inner) = (then.clone(), otherwise.clone(), env.clone());
            then_each(eval(cond, env, input.clone()), move |c| {
                let branch = if c.is_truthy() { &then } else { &otherwise };
                eval(branch, &env_inner, input.clone())
            })
        }
        Filter::Try { body, handler } => Box::new(Try {
            body: Some(eval(body, env, input)),
            handler: handler.clone().map(|h| (h, env.clone())),
            caught: None,
        }),
        Filter::Reduce {
            source,
            name,
            init,
            update,
        } => {
            let (source, name, update, env_inner) =
                (source.clone(), name.clone(), update.clone(), env.clone());
            then_each(eval(init, env, input.clone()), move |start| {
                let (source, name, update, env) =
                    (source.clone(), name.clone(), update.clone(), env_inner.clone());
                let input = input.clone();
                deferred(move || once(reduce(&source, &name, &update, &env, input, start)))
            })
        }
        Filter::Bind { source, name, body } => {
            let (name, body, env_inner) = (name.clone(), body.clone(), env.clone());
            then_each(eval(source, env, input.clone()), move |value| {
                eval(&body, &env_inner.bind(name.as_str(), value), input.clone())
            })
        }
        Filter::Call {
            name, args, native, ..
        } => match native {
            Some(Native::Value(f)) => once(f(&input)),
            Some(Native::Select(keep)) => {
                if keep(&input) {
                    once(Ok(input))
                } else {
                    empty()
                }
            }
            Some(Native::Binary(f)) => {
                let (f, receiver) = (*f, input.clone());
                map_ok(eval(&args[0], env, input), move |arg| f(&receiver, &arg))
            }
            Some(Native::Filter(f)) => f(args, env, input),
            None => fail(format!("{name}/{} is not defined", args.len())),
        },
    }
}

/// Evaluate an optional bound, treating a missing one as `null`
fn optional_eval(filter: &Option<FilterRef>, env: &Env, input: &EngineValue) -> Stream {
    match filter {
        Some(filter) => eval(filter, env, input.clone()),
        None => once(Ok(EngineValue::null())),
    }
}

/// `.[]` over one value
pub(crate) fn iterate(value: EngineValue) -> Stream {
    match value.repr() {
        Repr::Array(items) => Box::new(items.clone().into_iter().map(Ok)),
        Repr::Object(map) => Box::new(map.values().cloned().collect::<Vec<_>>().into_iter().map(Ok)),
        Repr::Null => fail("Cannot iterate over null"),
        _ => fail(format!("Cannot iterate over {}", ops::describe(&value))),
    }
}

/// Children of a value, or nothing for scalars
fn children(value: &EngineValue) -> Vec<EngineValue> {
    match value.repr() {
        Repr::Array(items) => items.clone(),
        Repr::Object(map) => map.values().cloned().collect(),
        _ => Vec::new(),
    }
}

/// `..`: pre-order walk of every value
pub(crate) fn recurse_values(input: EngineValue) -> Stream {
    let mut stack = vec![input];
    Box::new(std::iter::from_fn(move || {
        let value = stack.pop()?;
        stack.extend(children(&value).into_iter().rev());
        Some(Ok(value))
    }))
}

fn interpolate(
    parts: Rc<Vec<InterpPart>>,
    at: usize,
    env: Env,
    input: EngineValue,
    prefix: String,
) -> Stream {
    let Some(part) = parts.get(at) else {
        return once(Ok(EngineValue::string(prefix)));
    };
    match part {
        InterpPart::Text(text) => {
            let prefix = format!("{prefix}{text}");
            interpolate(parts.clone(), at + 1, env, input, prefix)
        }
        InterpPart::Expr(expr) => {
            let expr = expr.clone();
            then_each(eval(&expr, &env, input.clone()), move |value| {
                let piece = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.dump(),
                };
                interpolate(
                    parts.clone(),
                    at + 1,
                    env.clone(),
                    input.clone(),
                    format!("{prefix}{piece}"),
                )
            })
        }
    }
}

fn build_objects(
    entries: &[(FilterRef, FilterRef)],
    env: &Env,
    input: &EngineValue,
) -> Result<Vec<EngineValue>, EngineValue> {
    let mut partials = vec![EngineMap::new()];
    for (key_filter, value_filter) in entries {
        let keys = collect(eval(key_filter, env, input.clone()))?;
        let values = collect(eval(value_filter, env, input.clone()))?;
        let mut next = Vec::with_capacity(partials.len() * keys.len() * values.len());
        for partial in &partials {
            for key in &keys {
                let Some(key) = key.as_str() else {
                    return Err(error_value(format!(
                        "Object keys must be strings, not {}",
                        key.type_name()
                    )));
                };
                for value in &values {
                    let mut object = partial.clone();
                    object.insert(key.to_string(), value.clone());
                    next.push(object);
                }
            }
        }
        partials = next;
    }
    Ok(partials.into_iter().map(EngineValue::from_map).collect())
}

fn reduce(
    source: &FilterRef,
    name: &str,
    update: &FilterRef,
    env: &Env,
    input: EngineValue,
    start: EngineValue,
) -> Outcome {
    let mut acc = start;
    for item in eval(source, env, input) {
        let scope = env.bind(name, item?);
        let mut last = EngineValue::null();
        for output in eval(update, &scope, acc) {
            last = output?;
        }
        acc = last;
    }
    Ok(acc)
}

/// `lhs // rhs`: truthy outputs of `lhs`, else the outputs of `rhs`
struct Alternative {
    lhs: Option<Stream>,
    rhs: Option<(FilterRef, Env, EngineValue)>,
    fallback: Option<Stream>,
}

impl Iterator for Alternative {
    type Item = Outcome;

    fn next(&mut self) -> Option<Outcome> {
        if let Some(lhs) = self.lhs.as_mut() {
            for outcome in lhs.by_ref() {
                if let Ok(value) = outcome
                    && value.is_truthy()
                {
                    self.rhs = None;
                    return Some(Ok(value));
                }
            }
            self.lhs = None;
            if let Some((rhs, env, input)) = self.rhs.take() {
                self.fallback = Some(eval(&rhs, &env, input));
            }
        }
        self.fallback.as_mut()?.next()
    }
}

/// `try body catch handler`: outputs of `body` up to its first error
struct Try {
    body: Option<Stream>,
    handler: Option<(FilterRef, Env)>,
    caught: Option<Stream>,
}

impl Iterator for Try {
    type Item = Outcome;

    fn next(&mut self) -> Option<Outcome> {
        if let Some(body) = self.body.as_mut() {
            match body.next() {
                Some(Ok(value)) => return Some(Ok(value)),
                Some(Err(err)) => {
                    self.body = None;
                    if let Some((handler, env)) = self.handler.take() {
                        self.caught = Some(eval(&handler, &env, err));
                    }
                }
                None => self.body = None,
            }
        }
        self.caught.as_mut()?.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::builtin::parser::parse_program;
    use pretty_assertions::assert_eq;

    fn run(source: &str, input: &str) -> Vec<String> {
        let filter = parse_program(source).unwrap();
        let input = super::super::functions::from_json(serde_json::from_str(input).unwrap());
        eval(&filter, &Env::default(), input)
            .map(|outcome| match outcome {
                Ok(value) => value.dump(),
                Err(err) => format!("error: {}", err.dump()),
            })
            .collect()
    }

    #[test]
    fn test_paths_and_iteration() {
        assert_eq!(run(".a.b", r#"{"a":{"b":3}}"#), vec!["3"]);
        assert_eq!(run(".[]", "[1,2,3]"), vec!["1", "2", "3"]);
        assert_eq!(run(".[1:]", "[1,2,3]"), vec!["[2,3]"]);
        assert_eq!(run(r#"."a-b""#, r#"{"a-b":1}"#), vec!["1"]);
    }

    #[test]
    fn test_binary_operands_vary_lhs_fastest() {
        assert_eq!(
            run("(1,2) + (10,20)", "null"),
            vec!["11", "12", "21", "22"]
        );
    }

    #[test]
    fn test_alternative_and_try() {
        assert_eq!(run(".a // 5", "{}"), vec!["5"]);
        assert_eq!(run("(false, 1, null, 2) // 5", "null"), vec!["1", "2"]);
        assert_eq!(run("try error(\"x\") catch .", "null"), vec![r#""x""#]);
        assert_eq!(run(".[]?", "1"), Vec::<String>::new());
        assert_eq!(run("(1, error(\"x\"), 2)?", "null"), vec!["1"]);
    }

    #[test]
    fn test_object_construction_is_cartesian() {
        assert_eq!(
            run("{a: (1,2), b: (3,4)}", "null"),
            vec![
                r#"{"a":1,"b":3}"#,
                r#"{"a":1,"b":4}"#,
                r#"{"a":2,"b":3}"#,
                r#"{"a":2,"b":4}"#
            ]
        );
        assert_eq!(run("{a, \"b\"}", r#"{"a":1,"b":2}"#), vec![r#"{"a":1,"b":2}"#]);
    }

    #[test]
    fn test_reduce_and_bind() {
        assert_eq!(run("reduce .[] as $x (0; . + $x)", "[1,2,3]"), vec!["6"]);
        assert_eq!(run(". as $x | [$x, .]", "1"), vec!["[1,1]"]);
    }

    #[test]
    fn test_interpolation_and_recursion() {
        assert_eq!(run(r#""v=\(.a)""#, r#"{"a":[1]}"#), vec![r#""v=[1]""#]);
        assert_eq!(run("[..]", "[[1]]"), vec!["[[[1]],[1],1]"]);
    }

    #[test]
    fn test_generators_are_lazy() {
        assert_eq!(run("first(range(1e18))", "null"), vec!["0"]);
        assert_eq!(run("limit(2; repeat(1))", "null").len(), 2);
    }

    #[test]
    fn test_errors_surface_as_outcomes() {
        assert_eq!(
            run(".a", "1"),
            vec![r#"error: "Cannot index number with \"a\"""#]
        );
    }
}
