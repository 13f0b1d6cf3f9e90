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

//! Convenience functions for common jq operations
//!
//! `apply` collects every output, `first` keeps only the first one and `one`
//! insists on exactly one. The free functions compile with the bundled engine
//! and default settings on every call; keep a [`CompiledProgram`] around when
//! the same filter runs repeatedly.

use crate::engine::{BuiltinEngine, Engine};
use crate::error::{JqError, Result};
use crate::program::{Bindings, CompiledProgram, Jq};
use crate::transform::{TransformOptions, TransformOutput};
use crate::value::HostValue;

impl<E: Engine> CompiledProgram<E> {
    /// Collect every output of running against `input`
    pub fn apply(&self, input: &HostValue) -> Result<Vec<HostValue>> {
        self.run(input)?.collect()
    }

    /// The first output; later outputs are never computed
    pub fn first(&self, input: &HostValue) -> Result<HostValue> {
        self.run(input)?.next().unwrap_or(Err(JqError::EmptyResult))
    }

    /// The only output
    ///
    /// Pulls at most twice: once for the value, once to make sure nothing
    /// follows it.
    pub fn one(&self, input: &HostValue) -> Result<HostValue> {
        let mut outputs = self.run(input)?;
        let value = outputs.next().unwrap_or(Err(JqError::EmptyResult))?;
        match outputs.next() {
            None => Ok(value),
            Some(Ok(_)) => Err(JqError::MultipleResults),
            Some(Err(err)) => Err(err),
        }
    }
}

impl<E: Engine> Jq<E> {
    /// Compile `source` and collect every output
    pub fn apply(
        &self,
        source: &str,
        input: &HostValue,
        bindings: &Bindings,
    ) -> Result<Vec<HostValue>> {
        self.compile(source, bindings)?.apply(input)
    }

    /// Compile `source` and return its first output
    pub fn first(&self, source: &str, input: &HostValue, bindings: &Bindings) -> Result<HostValue> {
        self.compile(source, bindings)?.first(input)
    }

    /// Compile `source` and return its only output
    pub fn one(&self, source: &str, input: &HostValue, bindings: &Bindings) -> Result<HostValue> {
        self.compile(source, bindings)?.one(input)
    }
}

/// Compile `source` with the bundled engine
pub fn compile(source: &str, bindings: &Bindings) -> Result<CompiledProgram<BuiltinEngine>> {
    Jq::new().compile(source, bindings)
}

/// Evaluate `source` against `input` and collect every output
///
/// # Example
/// ```
/// use octofhir_jq::{Bindings, HostValue, apply};
/// use serde_json::json;
///
/// let input = HostValue::from(json!([1, 2, 3]));
/// let outputs = apply(".[] | . * 10", &input, &Bindings::new()).unwrap();
/// assert_eq!(
///     outputs,
///     vec![HostValue::Integer(10), HostValue::Integer(20), HostValue::Integer(30)]
/// );
/// ```
pub fn apply(source: &str, input: &HostValue, bindings: &Bindings) -> Result<Vec<HostValue>> {
    Jq::new().apply(source, input, bindings)
}

/// Evaluate `source` against `input` and return the first output
///
/// # Example
/// ```
/// use octofhir_jq::{Bindings, HostValue, first};
///
/// let mut bindings = Bindings::new();
/// bindings.insert("foo".to_string(), HostValue::from("bar"));
/// let value = first(r#". + $foo + "1", . + $foo + "2""#, &"val".into(), &bindings).unwrap();
/// assert_eq!(value, HostValue::from("valbar1"));
/// ```
pub fn first(source: &str, input: &HostValue, bindings: &Bindings) -> Result<HostValue> {
    Jq::new().first(source, input, bindings)
}

/// Evaluate `source` against `input` and return its only output
pub fn one(source: &str, input: &HostValue, bindings: &Bindings) -> Result<HostValue> {
    Jq::new().one(source, input, bindings)
}

/// Evaluate `source` in the streaming mode of [`TransformOptions`]
pub fn transform(
    source: &str,
    input: &HostValue,
    options: &TransformOptions,
) -> Result<TransformOutput> {
    Jq::new().transform(source, input, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::value::HostMap;
    use pretty_assertions::assert_eq;

    fn bindings(pairs: &[(&str, HostValue)]) -> Bindings {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_one_requires_exactly_one_output() {
        let foo = bindings(&[("foo", "bar".into())]);
        let empty_object = HostValue::Object(HostMap::new());
        assert_eq!(one("$foo", &empty_object, &foo).unwrap(), HostValue::from("bar"));
        assert_eq!(
            one("$foo, $foo", &empty_object, &foo).unwrap_err().kind(),
            ErrorKind::MultipleResults
        );
        assert_eq!(
            one("empty", &HostValue::Null, &Bindings::new())
                .unwrap_err()
                .kind(),
            ErrorKind::EmptyResult
        );
    }

    #[test]
    fn test_first_does_not_evaluate_past_the_first_output() {
        let value = first("1, error(\"unreached\")", &HostValue::Null, &Bindings::new()).unwrap();
        assert_eq!(value, HostValue::Integer(1));
        assert_eq!(
            first("empty", &HostValue::Null, &Bindings::new())
                .unwrap_err()
                .kind(),
            ErrorKind::EmptyResult
        );
    }

    #[test]
    fn test_one_propagates_error_on_second_pull() {
        let err = one("1, error(\"late\")", &HostValue::Null, &Bindings::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(err.to_string(), "late");
    }

    #[test]
    fn test_apply_propagates_the_first_error() {
        let err = apply("1, error(\"x\"), 2", &HostValue::Null, &Bindings::new()).unwrap_err();
        assert_eq!(err.to_string(), "x");
    }
}
