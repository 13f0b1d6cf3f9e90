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

//! Program compilation
//!
//! A [`Jq`] handle owns the engine and configuration. Compiling a filter
//! yields a [`CompiledProgram`] that can be run against any number of inputs
//! and releases its engine program when dropped.

use crate::config::JqConfig;
use crate::diagnostics::DiagnosticsCollector;
use crate::engine::{BuiltinEngine, Engine};
use crate::error::{JqError, Result};
use crate::value::HostValue;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Named values made available to a filter as `$name`
pub type Bindings = IndexMap<String, HostValue>;

/// Entry point for compiling jq filters
///
/// # Examples
///
/// ```
/// use octofhir_jq::{Bindings, HostValue, Jq};
///
/// let jq = Jq::new();
/// let program = jq.compile(".a + 1", &Bindings::new()).unwrap();
/// let input = HostValue::from(serde_json::json!({"a": 41}));
/// assert_eq!(program.one(&input).unwrap(), HostValue::Integer(42));
/// ```
pub struct Jq<E: Engine = BuiltinEngine> {
    engine: Rc<E>,
    config: JqConfig,
}

impl Jq<BuiltinEngine> {
    /// Create a handle over the bundled engine with default settings
    pub fn new() -> Self {
        Self::with_config(JqConfig::default())
    }

    /// Create a handle over the bundled engine
    pub fn with_config(config: JqConfig) -> Self {
        Self::with_engine(BuiltinEngine::new(), config)
    }
}

impl Default for Jq<BuiltinEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> Clone for Jq<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Rc::clone(&self.engine),
            config: self.config,
        }
    }
}

impl<E: Engine> fmt::Debug for Jq<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jq")
            .field("engine", &std::any::type_name::<E>())
            .field("config", &self.config)
            .finish()
    }
}

impl<E: Engine> Jq<E> {
    /// Create a handle over a custom engine
    pub fn with_engine(engine: E, config: JqConfig) -> Self {
        Self {
            engine: Rc::new(engine),
            config,
        }
    }

    /// Settings applied to every program compiled by this handle
    pub fn config(&self) -> &JqConfig {
        &self.config
    }

    /// The underlying engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Compile `source` with external `bindings`
    ///
    /// Binding names must be identifiers; each value is converted to an engine
    /// value before the engine sees the program. Every diagnostic the engine
    /// reports ends up in the returned [`crate::CompileError`].
    pub fn compile(&self, source: &str, bindings: &Bindings) -> Result<CompiledProgram<E>> {
        let bridge = self.config.bridge();
        let mut converted = Vec::with_capacity(bindings.len());
        for (name, value) in bindings {
            validate_binding_name(name)?;
            converted.push((name.clone(), bridge.to_engine(value)?));
        }

        log::debug!(
            "compiling jq program {source:?} with {} binding(s)",
            converted.len()
        );
        let mut collector = DiagnosticsCollector::new();
        let compiled = self.engine.compile(source, &converted, &mut collector);

        match compiled {
            Some(program) if !collector.has_errors() => Ok(CompiledProgram {
                engine: Rc::clone(&self.engine),
                program: Some(program),
                source: source.to_string(),
                binding_names: bindings.keys().cloned().collect(),
                config: self.config,
            }),
            compiled => {
                if let Some(program) = compiled {
                    self.engine.release_program(program);
                }
                let err = collector.into_compile_error(source);
                log::debug!("jq compile failed with {} error(s)", err.error_count);
                Err(err.into())
            }
        }
    }
}

fn validate_binding_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(JqError::type_error(format!(
            "Binding name {name:?} is not a valid identifier"
        )))
    }
}

/// A compiled filter ready to run
///
/// The engine program is released exactly once, when this value is dropped.
pub struct CompiledProgram<E: Engine = BuiltinEngine> {
    engine: Rc<E>,
    program: Option<E::Program>,
    source: String,
    binding_names: Vec<String>,
    config: JqConfig,
}

impl<E: Engine> CompiledProgram<E> {
    /// The filter source this program was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the external bindings, in the order given
    pub fn binding_names(&self) -> &[String] {
        &self.binding_names
    }

    /// Settings inherited from the compiling [`Jq`]
    pub fn config(&self) -> &JqConfig {
        &self.config
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) fn handle(&self) -> &E::Program {
        match &self.program {
            Some(program) => program,
            None => unreachable!("program handle is only taken on drop"),
        }
    }
}

impl<E: Engine> Drop for CompiledProgram<E> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            log::trace!("releasing jq program {:?}", self.source);
            self.engine.release_program(program);
        }
    }
}

impl<E: Engine> fmt::Debug for CompiledProgram<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("source", &self.source)
            .field("binding_names", &self.binding_names)
            .finish_non_exhaustive()
    }
}
