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

//! Configuration for jq handles

use crate::bridge::ValueBridge;
use crate::codec::PrintOptions;
use serde::{Deserialize, Serialize};

/// Settings shared by every program compiled through one [`crate::Jq`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JqConfig {
    /// Log a warning when an integer input exceeds the exact double range
    pub precision_warnings: bool,
    /// Formatting used for raw output
    pub print: PrintOptions,
}

impl JqConfig {
    /// Start building a configuration
    pub fn builder() -> JqConfigBuilder {
        JqConfigBuilder::new()
    }

    /// The value bridge these settings describe
    pub fn bridge(&self) -> ValueBridge {
        ValueBridge::new().with_precision_warnings(self.precision_warnings)
    }
}

/// Builder for [`JqConfig`] with fluent API
pub struct JqConfigBuilder {
    config: JqConfig,
}

impl JqConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: JqConfig::default(),
        }
    }

    /// Enable or disable precision-loss warnings
    pub fn with_precision_warnings(mut self, enabled: bool) -> Self {
        self.config.precision_warnings = enabled;
        self
    }

    /// Enable or disable pretty raw output
    pub fn with_pretty_output(mut self, enabled: bool) -> Self {
        self.config.print.pretty = enabled;
        self
    }

    /// Enable or disable sorted object keys in raw output
    pub fn with_sorted_keys(mut self, enabled: bool) -> Self {
        self.config.print.sort_keys = enabled;
        self
    }

    /// Replace all print options at once
    pub fn with_print_options(mut self, options: PrintOptions) -> Self {
        self.config.print = options;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> JqConfig {
        self.config
    }
}

impl Default for JqConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JqConfig::default();
        assert!(!config.precision_warnings);
        assert!(!config.print.pretty);
        assert!(!config.print.sort_keys);
    }

    #[test]
    fn test_builder_sets_every_field() {
        let config = JqConfig::builder()
            .with_precision_warnings(true)
            .with_pretty_output(true)
            .with_sorted_keys(true)
            .build();
        assert!(config.precision_warnings);
        assert_eq!(
            config.print,
            PrintOptions {
                pretty: true,
                sort_keys: true
            }
        );
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = JqConfig::builder().with_sorted_keys(true).build();
        let json = serde_json::to_string(&config).unwrap();
        let back: JqConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
