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

//! Conversion between host values and engine values
//!
//! The engine stores every number as an `f64`. Integers whose magnitude exceeds
//! 2^53 are rounded to the nearest representable double on the way in, and an
//! integral engine number comes back as [`HostValue::Integer`] whenever it fits
//! in an `i64`. An integral float such as `1.0` therefore returns as `1`.

use crate::engine::{EngineMap, EngineValue, ValueKind};
use crate::error::Result;
use crate::value::{HostValue, MapKey, non_string_key};

/// Largest integer magnitude a double represents exactly
pub const MAX_EXACT_INTEGER: i64 = 1 << 53;

/// Converts values across the host/engine boundary
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueBridge {
    precision_warnings: bool,
}

impl ValueBridge {
    /// Create a bridge
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a warning whenever an integer loses precision on the way in
    pub fn with_precision_warnings(mut self, enabled: bool) -> Self {
        self.precision_warnings = enabled;
        self
    }

    /// Convert a host value into an engine value
    ///
    /// Fails with a type error on the first object key that is not a string.
    pub fn to_engine(&self, value: &HostValue) -> Result<EngineValue> {
        Ok(match value {
            HostValue::Null => EngineValue::null(),
            HostValue::Bool(b) => EngineValue::bool(*b),
            HostValue::Integer(i) => {
                if self.precision_warnings && i.unsigned_abs() > MAX_EXACT_INTEGER as u64 {
                    log::warn!("integer {i} is outside the exact double range and will be rounded");
                }
                EngineValue::number(*i as f64)
            }
            HostValue::Float(f) => EngineValue::number(*f),
            HostValue::String(s) => EngineValue::string(s.as_str()),
            HostValue::Array(items) => EngineValue::array(
                items
                    .iter()
                    .map(|item| self.to_engine(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            HostValue::Object(map) => {
                let mut object = EngineMap::with_capacity(map.len());
                for (key, item) in map {
                    let MapKey::String(key) = key else {
                        return Err(non_string_key(key));
                    };
                    object.insert(key.clone(), self.to_engine(item)?);
                }
                EngineValue::from_map(object)
            }
        })
    }

    /// Convert an engine value into a host value
    pub fn to_host(&self, value: &EngineValue) -> HostValue {
        match value.kind() {
            ValueKind::Null => HostValue::Null,
            ValueKind::False => HostValue::Bool(false),
            ValueKind::True => HostValue::Bool(true),
            ValueKind::Number => number_to_host(value.as_number().unwrap_or(f64::NAN)),
            ValueKind::String => HostValue::String(value.as_str().unwrap_or_default().to_string()),
            ValueKind::Array => HostValue::Array(
                value
                    .as_array()
                    .unwrap_or_default()
                    .iter()
                    .map(|item| self.to_host(item))
                    .collect(),
            ),
            ValueKind::Object => HostValue::Object(
                value
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .map(|(k, v)| (MapKey::String(k.clone()), self.to_host(v)))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
        }
    }
}

fn number_to_host(n: f64) -> HostValue {
    // 2^63 itself is the first double past i64::MAX
    if n.is_finite()
        && n.fract() == 0.0
        && n >= -9_223_372_036_854_775_808.0
        && n < 9_223_372_036_854_775_808.0
    {
        HostValue::Integer(n as i64)
    } else {
        HostValue::Float(n)
    }
}

/// Convert a host value with the default bridge
pub fn to_engine(value: &HostValue) -> Result<EngineValue> {
    ValueBridge::new().to_engine(value)
}

/// Convert an engine value with the default bridge
pub fn to_host(value: &EngineValue) -> HostValue {
    ValueBridge::new().to_host(value)
}
