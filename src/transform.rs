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

//! Text-oriented streaming mode
//!
//! [`TransformOptions`] selects between structured and text input, structured
//! and text output, and first-output versus all-outputs behavior.

use crate::codec;
use crate::engine::Engine;
use crate::error::{JqError, Result};
use crate::program::{Bindings, CompiledProgram, Jq};
use crate::value::HostValue;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Switches for [`CompiledProgram::transform`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Input is JSON text holding one or more whitespace-separated records
    pub raw_input: bool,
    /// Outputs are printed as JSON text and joined with newlines
    pub raw_output: bool,
    /// Every output of every record is returned, not just the first
    pub multiple_output: bool,
}

impl TransformOptions {
    /// Structured input, first output only, structured result
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the input as JSON text holding whitespace-separated records
    pub fn with_raw_input(mut self, enabled: bool) -> Self {
        self.raw_input = enabled;
        self
    }

    /// Print outputs as JSON text instead of returning values
    pub fn with_raw_output(mut self, enabled: bool) -> Self {
        self.raw_output = enabled;
        self
    }

    /// Return every output of every record
    pub fn with_multiple_output(mut self, enabled: bool) -> Self {
        self.multiple_output = enabled;
        self
    }
}

/// Result of a transform
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutput {
    /// First output, structured
    Value(HostValue),
    /// All outputs, structured
    Values(Vec<HostValue>),
    /// Printed output, newline-joined when there are several
    Text(String),
}

impl TransformOutput {
    /// The single structured value, if this is one
    pub fn into_value(self) -> Option<HostValue> {
        match self {
            TransformOutput::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Every structured value; a single value becomes a one-element list
    pub fn into_values(self) -> Option<Vec<HostValue>> {
        match self {
            TransformOutput::Value(value) => Some(vec![value]),
            TransformOutput::Values(values) => Some(values),
            TransformOutput::Text(_) => None,
        }
    }

    /// The printed text, if output was raw
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TransformOutput::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl<E: Engine> CompiledProgram<E> {
    /// Run in streaming mode
    ///
    /// With `raw_input` every record is parsed before any of them runs, so a
    /// malformed record fails the whole call. Without `multiple_output`
    /// records after the one producing the first output are never run.
    pub fn transform(
        &self,
        input: &HostValue,
        options: &TransformOptions,
    ) -> Result<TransformOutput> {
        let records: Cow<'_, [HostValue]> = if options.raw_input {
            let Some(text) = input.as_str() else {
                return Err(JqError::type_error(format!(
                    "raw input must be a string, found {}",
                    input.type_name()
                )));
            };
            Cow::Owned(codec::parse_records(text)?)
        } else {
            Cow::Borrowed(std::slice::from_ref(input))
        };
        log::debug!(
            "transforming {} record(s) with {:?}",
            records.len(),
            options
        );

        if options.multiple_output {
            let mut outputs = Vec::new();
            for record in records.iter() {
                for output in self.run(record)? {
                    outputs.push(output?);
                }
            }
            return if options.raw_output {
                Ok(TransformOutput::Text(self.print_all(&outputs)?))
            } else {
                Ok(TransformOutput::Values(outputs))
            };
        }

        for record in records.iter() {
            if let Some(output) = self.run(record)?.next() {
                let value = output?;
                return if options.raw_output {
                    Ok(TransformOutput::Text(codec::print(&value, &self.config().print)?))
                } else {
                    Ok(TransformOutput::Value(value))
                };
            }
        }
        Err(JqError::EmptyResult)
    }

    fn print_all(&self, values: &[HostValue]) -> Result<String> {
        let printed = values
            .iter()
            .map(|value| codec::print(value, &self.config().print))
            .collect::<Result<Vec<_>>>()?;
        Ok(printed.join("\n"))
    }
}

impl<E: Engine> Jq<E> {
    /// Compile `source` without bindings and run it in streaming mode
    pub fn transform(
        &self,
        source: &str,
        input: &HostValue,
        options: &TransformOptions,
    ) -> Result<TransformOutput> {
        self.compile(source, &Bindings::new())?
            .transform(input, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn run(source: &str, input: HostValue, options: TransformOptions) -> Result<TransformOutput> {
        Jq::new().transform(source, &input, &options)
    }

    #[rstest]
    #[case(false, false, TransformOutput::Value(HostValue::Integer(2)))]
    #[case(false, true, TransformOutput::Text("2".to_string()))]
    #[case(true, false, TransformOutput::Values(vec![HostValue::Integer(2), HostValue::Integer(3), HostValue::Integer(4)]))]
    #[case(true, true, TransformOutput::Text("2\n3\n4".to_string()))]
    fn test_output_modes(
        #[case] multiple_output: bool,
        #[case] raw_output: bool,
        #[case] expected: TransformOutput,
    ) {
        let options = TransformOptions::new()
            .with_raw_input(true)
            .with_raw_output(raw_output)
            .with_multiple_output(multiple_output);
        let output = run(".[] | . + 1", "[1, 2, 3]".into(), options).unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_raw_input_requires_a_string() {
        let options = TransformOptions::new().with_raw_input(true);
        let err = run(".", HostValue::Integer(1), options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_malformed_record_aborts_before_running() {
        let options = TransformOptions::new()
            .with_raw_input(true)
            .with_multiple_output(true);
        let err = run("error(\"ran\")", "1 {".into(), options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_first_output_skips_later_records() {
        let options = TransformOptions::new().with_raw_input(true);
        let output = run("if . == 1 then empty else . end", "1 2 3".into(), options).unwrap();
        assert_eq!(output.into_value(), Some(HostValue::Integer(2)));

        let err = run("empty", "1 2".into(), options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
    }

    #[test]
    fn test_raw_output_uses_configured_print_options() {
        let jq = Jq::with_config(crate::JqConfig::builder().with_sorted_keys(true).build());
        let options = TransformOptions::new().with_raw_output(true);
        let input = HostValue::from(serde_json::json!({"b": 1, "a": 2}));
        let output = jq.transform(".", &input, &options).unwrap();
        assert_eq!(output.as_text(), Some(r#"{"a":2,"b":1}"#));
    }
}
