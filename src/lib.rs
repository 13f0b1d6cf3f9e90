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

//! jq filters for Rust values
//!
//! Compile a jq filter once with [`Jq::compile`], then run the resulting
//! [`CompiledProgram`] against any number of [`HostValue`] inputs. Outputs
//! are produced lazily by [`Execution`]; [`apply`], [`first`] and [`one`]
//! cover the common ways of consuming them, and [`transform`] offers a
//! text-in/text-out mode.
//!
//! Filters run on a pluggable [`Engine`]. The bundled [`BuiltinEngine`] is a
//! lazy interpreter for the core jq language.
//!
//! ```
//! use octofhir_jq::{Bindings, HostValue, Jq};
//!
//! let program = Jq::new().compile("[.[] | select(. > 1)]", &Bindings::new()).unwrap();
//! let input = HostValue::from(serde_json::json!([1, 2, 3]));
//! assert_eq!(
//!     program.one(&input).unwrap(),
//!     HostValue::from(serde_json::json!([2, 3]))
//! );
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod convenience;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod execution;
pub mod program;
pub mod transform;
pub mod value;

pub use bridge::ValueBridge;
pub use codec::PrintOptions;
pub use config::{JqConfig, JqConfigBuilder};
pub use convenience::{apply, compile, first, one, transform};
pub use diagnostics::{Diagnostic, DiagnosticSink, DiagnosticsCollector, Severity};
pub use engine::{BuiltinEngine, Engine, EngineValue, Pull};
pub use error::{CompileError, ErrorKind, JqError, Result, RuntimeError};
pub use execution::Execution;
pub use program::{Bindings, CompiledProgram, Jq};
pub use transform::{TransformOptions, TransformOutput};
pub use value::{HostMap, HostValue, MapKey};
