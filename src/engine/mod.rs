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

//! Evaluator capability
//!
//! The binding layer never evaluates filters itself. It drives an [`Engine`]
//! through a handle-based protocol: compile once, begin a run per input, pull
//! outputs one at a time, release every handle it obtained. [`BuiltinEngine`]
//! is the evaluator shipped with the crate; other engines plug in through the
//! same trait.

pub mod builtin;
pub mod value;

pub use builtin::BuiltinEngine;
pub use value::{EngineMap, EngineValue, ValueKind};

use crate::diagnostics::DiagnosticSink;

/// Result of pulling once from a run
#[derive(Debug, Clone)]
pub enum Pull {
    /// The next output
    Value(EngineValue),
    /// The run produced all of its outputs
    Done,
    /// The run failed; the payload is the engine's error value
    Error(EngineValue),
}

/// External evaluator
///
/// Handles returned by [`Engine::compile`] and [`Engine::begin_run`] are owned
/// by the caller and handed back exactly once through the matching release
/// method.
pub trait Engine {
    /// Compiled program state
    type Program;
    /// State of one execution against one input
    type Run;

    /// Compile `source` with named external bindings
    ///
    /// Diagnostics are written to `sink`. `None` means compilation failed and
    /// at least one error diagnostic should have been reported.
    fn compile(
        &self,
        source: &str,
        bindings: &[(String, EngineValue)],
        sink: &mut dyn DiagnosticSink,
    ) -> Option<Self::Program>;

    /// Start executing `program` against `input`
    fn begin_run(&self, program: &Self::Program, input: EngineValue) -> Self::Run;

    /// Produce the next output of a run
    fn pull(&self, run: &mut Self::Run) -> Pull;

    /// Release a compiled program
    fn release_program(&self, program: Self::Program) {
        drop(program);
    }

    /// Release a run, finished or not
    fn release_run(&self, run: Self::Run) {
        drop(run);
    }
}
