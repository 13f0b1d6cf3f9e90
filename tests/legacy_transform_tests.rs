//! Text-mode transform behavior: raw input, raw output and first-output selection

use octofhir_jq::{ErrorKind, HostValue, TransformOptions, TransformOutput, transform};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn raw_in() -> TransformOptions {
    TransformOptions::new().with_raw_input(true)
}

#[test]
fn test_identity_on_a_string() {
    let output = transform(".", &HostValue::from("42"), &TransformOptions::new()).unwrap();
    assert_eq!(output, TransformOutput::Value(HostValue::from("42")));
}

#[test]
fn test_structured_array_input() {
    let input = HostValue::from(json!([1, 2, 3]));
    let output = transform("[.[]+1]", &input, &TransformOptions::new()).unwrap();
    assert_eq!(output.into_value(), Some(HostValue::from(json!([2, 3, 4]))));
}

#[test]
fn test_raw_input_parses_json_text() {
    let output = transform(".", &HostValue::from("42"), &raw_in()).unwrap();
    assert_eq!(output, TransformOutput::Value(HostValue::Integer(42)));
}

#[test]
fn test_raw_output_prints_json_text() {
    let options = TransformOptions::new().with_raw_output(true);
    let output = transform(".", &HostValue::from("42"), &options).unwrap();
    assert_eq!(output.as_text(), Some("\"42\""));
}

#[test]
fn test_raw_output_joins_every_output_with_newlines() {
    let options = raw_in().with_raw_output(true).with_multiple_output(true);
    let output = transform(".[]", &HostValue::from("[1, 2, 3]"), &options).unwrap();
    assert_eq!(output.as_text(), Some("1\n2\n3"));
}

#[test]
fn test_without_multiple_output_only_the_first_output_is_returned() {
    let output = transform(".[] + 1", &HostValue::from("[1, 2, 3]"), &raw_in()).unwrap();
    assert_eq!(output.into_value(), Some(HostValue::Integer(2)));
}

#[rstest]
#[case("1\n2\n3")]
#[case("1 2 3")]
#[case("1\n\n2\t3\n")]
fn test_multiple_records(#[case] text: &str) {
    let options = raw_in().with_multiple_output(true);
    let output = transform(".+1", &HostValue::from(text), &options).unwrap();
    assert_eq!(
        output,
        TransformOutput::Values(vec![
            HostValue::Integer(2),
            HostValue::Integer(3),
            HostValue::Integer(4)
        ])
    );
}

#[test]
fn test_bang_is_a_compile_error() {
    let err = transform("!", &HostValue::from("42"), &TransformOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
}

#[test]
fn test_unicode_program_and_input() {
    let options = raw_in().with_raw_output(true);
    let output = transform(
        ". + \"✓\"",
        &HostValue::from("\"Préfixe ünïcødé \""),
        &options,
    )
    .unwrap();
    assert_eq!(output.as_text(), Some("\"Préfixe ünïcødé ✓\""));
}

#[test]
fn test_runtime_error_surfaces() {
    let options = raw_in().with_multiple_output(true);
    let err = transform(".a", &HostValue::from("{} 1"), &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(err.to_string(), "Cannot index number with \"a\"");
}
