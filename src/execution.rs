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

//! Lazy execution of a compiled program against one input

use crate::bridge::ValueBridge;
use crate::engine::{BuiltinEngine, Engine, EngineValue, Pull};
use crate::error::{Result, RuntimeError};
use crate::program::CompiledProgram;
use crate::value::HostValue;
use std::fmt;
use std::iter::FusedIterator;

impl<E: Engine> CompiledProgram<E> {
    /// Start running this program against `input`
    ///
    /// The input is converted once, up front, so a value that cannot cross
    /// the bridge fails here rather than on the first pull.
    pub fn run(&self, input: &HostValue) -> Result<Execution<'_, E>> {
        let bridge = self.config().bridge();
        let input = bridge.to_engine(input)?;
        let run = self.engine().begin_run(self.handle(), input.clone());
        log::debug!("started jq run of {:?}", self.source());
        Ok(Execution {
            program: self,
            run: Some(run),
            input,
            bridge,
        })
    }
}

/// Iterator over the outputs of one run
///
/// Each call to `next` pulls once from the engine. After a runtime error or
/// the last output the run is released and the iterator stays exhausted.
/// Dropping it early releases the run too.
pub struct Execution<'p, E: Engine = BuiltinEngine> {
    program: &'p CompiledProgram<E>,
    run: Option<E::Run>,
    input: EngineValue,
    bridge: ValueBridge,
}

impl<E: Engine> Execution<'_, E> {
    /// Whether the run has finished, failed or been released
    pub fn is_finished(&self) -> bool {
        self.run.is_none()
    }

    fn finish(&mut self) {
        if let Some(run) = self.run.take() {
            log::trace!("releasing jq run of {:?}", self.program.source());
            self.program.engine().release_run(run);
        }
    }
}

/// Engine error payloads are usually strings; anything else is shown as JSON
fn error_message(error: &EngineValue) -> String {
    match error.as_str() {
        Some(message) => message.to_string(),
        None => format!("{} (not a string)", error.dump()),
    }
}

impl<E: Engine> Iterator for Execution<'_, E> {
    type Item = Result<HostValue>;

    fn next(&mut self) -> Option<Self::Item> {
        let engine = self.program.engine();
        let run = self.run.as_mut()?;
        match engine.pull(run) {
            Pull::Value(value) => Some(Ok(self.bridge.to_host(&value))),
            Pull::Done => {
                self.finish();
                None
            }
            Pull::Error(error) => {
                self.finish();
                let message = error_message(&error);
                log::debug!("jq run of {:?} failed: {message}", self.program.source());
                Some(Err(RuntimeError {
                    message,
                    input: Some(self.bridge.to_host(&self.input)),
                }
                .into()))
            }
        }
    }
}

impl<E: Engine> FusedIterator for Execution<'_, E> {}

impl<E: Engine> Drop for Execution<'_, E> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<E: Engine> fmt::Debug for Execution<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("program", &self.program.source())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Bindings;
    use crate::{ErrorKind, JqError, Jq};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_outputs_are_pulled_lazily() {
        let program = Jq::new().compile(".[]", &Bindings::new()).unwrap();
        let input = HostValue::from(json!([1, 2, 3]));
        let mut execution = program.run(&input).unwrap();
        assert_eq!(execution.next().unwrap().unwrap(), HostValue::Integer(1));
        assert!(!execution.is_finished());
        let rest: Vec<_> = execution.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(rest, vec![HostValue::Integer(2), HostValue::Integer(3)]);
        assert!(execution.is_finished());
        assert!(execution.next().is_none());
    }

    #[test]
    fn test_runtime_error_ends_the_run() {
        let program = Jq::new().compile(".[] | 1 / .", &Bindings::new()).unwrap();
        let input = HostValue::from(json!([1, 0, 2]));
        let outputs: Vec<_> = program.run(&input).unwrap().collect();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0], Ok(HostValue::Integer(1)));
        let Err(JqError::Runtime(err)) = &outputs[1] else {
            panic!("expected a runtime error");
        };
        assert_eq!(
            err.message,
            "number (1) and number (0) cannot be divided because the divisor is zero"
        );
        assert_eq!(err.input, Some(input));
    }

    #[test]
    fn test_non_string_error_payload_is_rendered_as_json() {
        let program = Jq::new().compile("error({a: 1})", &Bindings::new()).unwrap();
        let err = program.run(&HostValue::Null).unwrap().next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(err.to_string(), r#"{"a":1} (not a string)"#);
    }

    #[test]
    fn test_program_runs_independently_many_times() {
        let program = Jq::new().compile(". * 2", &Bindings::new()).unwrap();
        for i in 0..5i64 {
            let mut outputs = program.run(&HostValue::Integer(i)).unwrap();
            assert_eq!(outputs.next().unwrap().unwrap(), HostValue::Integer(i * 2));
        }
    }
}
