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

//! Compile diagnostics
//!
//! The engine reports errors and warnings through a [`DiagnosticSink`] while it
//! compiles. A [`DiagnosticsCollector`] is created for each compile call, so
//! diagnostics never leak from one compile into another.

use crate::error::CompileError;
use std::fmt;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    /// May indicate a problem but doesn't prevent compilation
    Warning,
    /// Prevents successful compilation
    #[default]
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A diagnostic message emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the diagnostic
    pub severity: Severity,
    /// Engine text, possibly spanning several lines
    pub message: String,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Create a warning diagnostic
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receiver of engine diagnostics during a compile
pub trait DiagnosticSink {
    /// Record one diagnostic
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Collects the diagnostics of a single compile attempt
#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics in the order they were reported
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of error diagnostics
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Check whether any error was reported
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Turn the collected diagnostics into a compile error for `source`
    ///
    /// The message is every diagnostic line followed by the summary
    /// `<N> compile error` or `<N> compile errors`.
    pub fn into_compile_error(mut self, source: &str) -> CompileError {
        if !self.has_errors() {
            self.report(Diagnostic::error("error: compilation failed"));
        }
        let error_count = self.error_count();
        let mut message = String::new();
        for diagnostic in &self.diagnostics {
            message.push_str(&diagnostic.message);
            message.push('\n');
        }
        message.push_str(&format!(
            "{error_count} compile {}",
            if error_count == 1 { "error" } else { "errors" }
        ));
        CompileError {
            source: source.to_string(),
            message,
            error_count,
        }
    }
}

impl DiagnosticSink for DiagnosticsCollector {
    fn report(&mut self, diagnostic: Diagnostic) {
        log::debug!("jq {}: {}", diagnostic.severity, diagnostic.message);
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_error_summary_is_singular() {
        let mut collector = DiagnosticsCollector::new();
        collector.report(Diagnostic::error("error: bad\n**"));
        let err = collector.into_compile_error("**");
        assert_eq!(err.message, "error: bad\n**\n1 compile error");
        assert_eq!(err.error_count, 1);
    }

    #[test]
    fn test_warnings_are_listed_but_not_counted() {
        let mut collector = DiagnosticsCollector::new();
        collector.report(Diagnostic::error("error: $a is not defined"));
        collector.report(Diagnostic::warning("warning: odd"));
        collector.report(Diagnostic::error("error: $b is not defined"));
        let err = collector.into_compile_error("$a + $b");
        assert_eq!(
            err.message,
            "error: $a is not defined\nwarning: odd\nerror: $b is not defined\n2 compile errors"
        );
        assert_eq!(err.error_count, 2);
    }

    #[test]
    fn test_silent_failure_still_counts_one_error() {
        let err = DiagnosticsCollector::new().into_compile_error("x");
        assert_eq!(err.message, "error: compilation failed\n1 compile error");
    }
}
