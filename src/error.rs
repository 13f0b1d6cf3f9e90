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

//! Error types for jq compilation and execution
//!
//! Every failure crossing the public boundary is a [`JqError`]. Callers that
//! only care about the category can match on [`JqError::kind`].

use crate::value::HostValue;
use std::fmt;
use thiserror::Error;

/// Result type alias for jq operations
pub type Result<T> = std::result::Result<T, JqError>;

/// Failure categories of the binding layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed filter source
    Compile,
    /// Evaluator fault while producing an output
    Runtime,
    /// No output where at least one was required
    EmptyResult,
    /// More than one output where exactly one was required
    MultipleResults,
    /// Malformed JSON text in raw-input mode
    Parse,
    /// A host value violates the structural contract of the bridge
    Type,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Compile => "compile",
            ErrorKind::Runtime => "runtime",
            ErrorKind::EmptyResult => "empty result",
            ErrorKind::MultipleResults => "multiple results",
            ErrorKind::Parse => "parse",
            ErrorKind::Type => "type",
        };
        f.write_str(name)
    }
}

/// Aggregated diagnostics of a failed compile
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    /// The filter source that failed to compile
    pub source: String,
    /// Diagnostic lines followed by the `<N> compile error(s)` summary
    pub message: String,
    /// Number of distinct errors reported by the engine
    pub error_count: usize,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CompileError {}

/// Runtime fault reported by the engine for one input
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// Engine-provided error text
    pub message: String,
    /// The input the failing run was started with
    pub input: Option<HostValue>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Errors produced by the binding layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JqError {
    /// Filter source failed to compile
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The engine failed while producing an output
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The filter produced no output
    #[error("No results")]
    EmptyResult,

    /// The filter produced more than one output
    #[error("More than one result")]
    MultipleResults,

    /// Raw input text is not valid JSON
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        /// Human-readable parse error message
        message: String,
        /// Line of the offending input (1-based)
        line: usize,
        /// Column of the offending input (1-based)
        column: usize,
    },

    /// A host value cannot cross the bridge
    #[error("Type error: {message}")]
    Type {
        /// Human-readable type error message
        message: String,
    },
}

impl JqError {
    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        JqError::Type {
            message: message.into(),
        }
    }

    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            JqError::Compile(_) => ErrorKind::Compile,
            JqError::Runtime(_) => ErrorKind::Runtime,
            JqError::EmptyResult => ErrorKind::EmptyResult,
            JqError::MultipleResults => ErrorKind::MultipleResults,
            JqError::Parse { .. } => ErrorKind::Parse,
            JqError::Type { .. } => ErrorKind::Type,
        }
    }
}

impl From<serde_json::Error> for JqError {
    fn from(err: serde_json::Error) -> Self {
        JqError::Parse {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_displays_message_verbatim() {
        let err = JqError::from(CompileError {
            source: "**".to_string(),
            message: "error: boom\n**\n1 compile error".to_string(),
            error_count: 1,
        });
        assert_eq!(err.to_string(), "error: boom\n**\n1 compile error");
        assert_eq!(err.kind(), ErrorKind::Compile);
    }

    #[test]
    fn test_json_error_becomes_parse_error() {
        let err: JqError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Parse);
        if let JqError::Parse { line, .. } = err {
            assert_eq!(line, 1);
        }
    }
}
