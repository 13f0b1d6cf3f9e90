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

//! Bundled jq evaluator
//!
//! Implements the core of the jq language: paths, iteration, pipes and
//! commas, arithmetic and comparison, `//`, `and`/`or`, array and object
//! construction, string interpolation, `if`, `try`/`catch`, `?`, `reduce`,
//! `as` bindings and a library of builtins. Function definitions, modules,
//! path assignment, `label`/`break` and `@format` strings are not supported
//! and fail to compile.
//!
//! Diagnostics follow jq's wording, for example:
//!
//! ```text
//! error: syntax error, unexpected '*', expecting $end
//! **
//! ```

mod ast;
mod functions;
mod interpreter;
mod lexer;
mod ops;
mod parser;
mod resolve;

use super::{Engine, EngineValue, Pull};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use ast::FilterRef;
use interpreter::{Env, Stream};
use std::fmt;

/// Positioned compile problem
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxError {
    pub(crate) message: String,
    pub(crate) offset: usize,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// The source line containing byte `offset`
fn line_at(source: &str, offset: usize) -> &str {
    let offset = offset.min(source.len());
    let start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i);
    &source[start..end]
}

fn report(sink: &mut dyn DiagnosticSink, source: &str, problem: SyntaxError) {
    sink.report(Diagnostic::error(format!(
        "error: {}\n{}",
        problem.message,
        line_at(source, problem.offset)
    )));
}

/// Interpreter for the jq language shipped with this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEngine;

impl BuiltinEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Compiled filter with its external bindings
pub struct BuiltinProgram {
    filter: FilterRef,
    env: Env,
}

impl fmt::Debug for BuiltinProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinProgram")
            .field("bindings", &self.env.names())
            .finish_non_exhaustive()
    }
}

/// One execution of a [`BuiltinProgram`]
pub struct BuiltinRun {
    stream: Stream,
}

impl fmt::Debug for BuiltinRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRun").finish_non_exhaustive()
    }
}

impl Engine for BuiltinEngine {
    type Program = BuiltinProgram;
    type Run = BuiltinRun;

    fn compile(
        &self,
        source: &str,
        bindings: &[(String, EngineValue)],
        sink: &mut dyn DiagnosticSink,
    ) -> Option<BuiltinProgram> {
        let filter = match parser::parse_program(source) {
            Ok(filter) => filter,
            Err(problem) => {
                report(sink, source, problem);
                return None;
            }
        };

        let globals: Vec<String> = bindings.iter().map(|(name, _)| name.clone()).collect();
        let problems = resolve::resolve(&filter, &globals);
        if !problems.is_empty() {
            for problem in problems {
                report(sink, source, problem);
            }
            return None;
        }

        let env = bindings
            .iter()
            .fold(Env::default(), |env, (name, value)| {
                env.bind(name.as_str(), value.clone())
            });
        log::trace!("compiled program with {} binding(s)", bindings.len());
        Some(BuiltinProgram { filter, env })
    }

    fn begin_run(&self, program: &BuiltinProgram, input: EngineValue) -> BuiltinRun {
        BuiltinRun {
            stream: interpreter::eval(&program.filter, &program.env, input),
        }
    }

    fn pull(&self, run: &mut BuiltinRun) -> Pull {
        match run.stream.next() {
            Some(Ok(value)) => Pull::Value(value),
            Some(Err(err)) => Pull::Error(err),
            None => Pull::Done,
        }
    }
}
