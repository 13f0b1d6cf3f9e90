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

//! JSON text codec
//!
//! Raw input is a sequence of JSON records separated by optional whitespace,
//! the format `jq` itself reads: `1 2 3`, one document per line, or
//! `{"a":1}{"b":2}` all parse as multiple records.

use crate::error::{JqError, Result};
use crate::value::HostValue;
use serde::{Deserialize, Serialize};

/// How values are rendered to JSON text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOptions {
    /// Indented multi-line output instead of compact
    pub pretty: bool,
    /// Emit object keys in sorted order instead of insertion order
    pub sort_keys: bool,
}

impl PrintOptions {
    /// Compact output in insertion order
    pub fn compact() -> Self {
        Self::default()
    }

    /// Indented output in insertion order
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            ..Self::default()
        }
    }
}

/// Parse every JSON record in `text`
///
/// Fails on the first malformed record; nothing is returned for the records
/// that preceded it.
pub fn parse_records(text: &str) -> Result<Vec<HostValue>> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<serde_json::Value>()
        .map(|record| record.map(HostValue::from).map_err(JqError::from))
        .collect()
}

/// Render `value` as JSON text
pub fn print(value: &HostValue, options: &PrintOptions) -> Result<String> {
    let mut json = serde_json::Value::try_from(value.clone())?;
    if options.sort_keys {
        json = sort_keys(json);
    }
    let text = if options.pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    Ok(text)
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_whitespace_separated_records() {
        let records = parse_records("1 [2]\n{\"a\":3}{\"b\":4}").unwrap();
        assert_eq!(
            records,
            vec![
                HostValue::from(json!(1)),
                HostValue::from(json!([2])),
                HostValue::from(json!({"a": 3})),
                HostValue::from(json!({"b": 4})),
            ]
        );
        assert!(parse_records("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_record_carries_position() {
        let err = parse_records("1\n{oops").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        let JqError::Parse { line, .. } = err else {
            panic!("expected a parse error");
        };
        assert_eq!(line, 2);
    }

    #[test]
    fn test_print_modes() {
        let value = HostValue::from(json!({"b": [1, 2], "a": "x"}));
        assert_eq!(
            print(&value, &PrintOptions::compact()).unwrap(),
            r#"{"b":[1,2],"a":"x"}"#
        );
        let sorted = PrintOptions {
            sort_keys: true,
            ..PrintOptions::default()
        };
        assert_eq!(print(&value, &sorted).unwrap(), r#"{"a":"x","b":[1,2]}"#);
        assert_eq!(
            print(&HostValue::from(json!([1])), &PrintOptions::pretty()).unwrap(),
            "[\n  1\n]"
        );
    }

    #[test]
    fn test_unicode_is_printed_verbatim() {
        assert_eq!(
            print(&HostValue::from("héllo ✓"), &PrintOptions::compact()).unwrap(),
            "\"héllo ✓\""
        );
    }
}
