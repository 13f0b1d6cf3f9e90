//! Integration tests for the compile/run/convenience surface

use octofhir_jq::bridge::{MAX_EXACT_INTEGER, to_engine, to_host};
use octofhir_jq::{Bindings, ErrorKind, HostMap, HostValue, Jq, JqError, MapKey, apply, first, one};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn foo_bar() -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert("foo".to_string(), HostValue::from("bar"));
    bindings
}

fn nested() -> HostValue {
    HostValue::from(json!({
        "name": "ünïcødé",
        "list": [1, -2.5, null, true, false, "x", [], {}],
        "nested": {"z": 1, "a": {"deep": [{"k": "v"}]}}
    }))
}

#[rstest]
#[case(HostValue::Null)]
#[case(HostValue::Bool(true))]
#[case(HostValue::Integer(-42))]
#[case(HostValue::Integer(MAX_EXACT_INTEGER))]
#[case(HostValue::Float(0.125))]
#[case(HostValue::from("héllo ✓"))]
#[case(HostValue::Array(vec![]))]
#[case(HostValue::Object(HostMap::new()))]
#[case(nested())]
fn test_round_trip_through_engine(#[case] value: HostValue) {
    assert_eq!(to_host(&to_engine(&value).unwrap()), value);
}

#[test]
fn test_large_integers_round_to_nearest_double() {
    let value = HostValue::Integer(MAX_EXACT_INTEGER + 1);
    assert_eq!(
        to_host(&to_engine(&value).unwrap()),
        HostValue::Integer(MAX_EXACT_INTEGER)
    );
}

#[test]
fn test_integral_floats_come_back_as_integers() {
    assert_eq!(
        to_host(&to_engine(&HostValue::Float(3.0)).unwrap()),
        HostValue::Integer(3)
    );
}

#[test]
fn test_non_string_keys_are_rejected() {
    let mut map = HostMap::new();
    map.insert(MapKey::Integer(1), HostValue::Null);
    let err = to_engine(&HostValue::Object(map)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[rstest]
#[case(HostValue::Null)]
#[case(HostValue::Integer(7))]
#[case(HostValue::from("s"))]
#[case(nested())]
fn test_identity_yields_exactly_the_input(#[case] value: HostValue) {
    let outputs = apply(".", &value, &Bindings::new()).unwrap();
    assert_eq!(outputs, vec![value]);
}

#[test]
fn test_compile_error_text() {
    let err = Jq::new().compile("**", &Bindings::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compile);
    assert_eq!(
        err.to_string(),
        "error: syntax error, unexpected '*', expecting $end\n**\n1 compile error"
    );
}

#[test]
fn test_every_compile_problem_is_reported() {
    let err = Jq::new()
        .compile("$a + nosuchfn(1)", &Bindings::new())
        .unwrap_err();
    let JqError::Compile(compile) = err else {
        panic!("expected a compile error");
    };
    assert_eq!(compile.error_count, 2);
    assert!(compile.message.ends_with("2 compile errors"));
    assert!(compile.message.contains("$a is not defined"));
    assert!(compile.message.contains("nosuchfn/1 is not defined"));
}

#[test]
fn test_one_with_bindings() {
    let empty = HostValue::Object(HostMap::new());
    assert_eq!(one("$foo", &empty, &foo_bar()).unwrap(), HostValue::from("bar"));
    assert_eq!(
        one("$foo, $foo", &empty, &foo_bar()).unwrap_err().kind(),
        ErrorKind::MultipleResults
    );
}

#[test]
fn test_apply_with_bindings() {
    let outputs = apply(". + $foo", &HostValue::from("val"), &foo_bar()).unwrap();
    assert_eq!(outputs, vec![HostValue::from("valbar")]);
}

#[test]
fn test_first_with_bindings() {
    let value = first(
        r#". + $foo + "1", . + $foo + "2""#,
        &HostValue::from("val"),
        &foo_bar(),
    )
    .unwrap();
    assert_eq!(value, HostValue::from("valbar1"));
}

#[test]
fn test_running_twice_is_idempotent() {
    let program = Jq::new()
        .compile(
            "[.list[] | numbers] , (.nested | keys) , (.name | length)",
            &Bindings::new(),
        )
        .unwrap();
    let input = nested();
    let once = program.apply(&input).unwrap();
    let twice = program.apply(&input).unwrap();
    assert_eq!(once, twice);
    assert_eq!(
        once,
        vec![
            HostValue::from(json!([1, -2.5])),
            HostValue::from(json!(["a", "z"])),
            HostValue::Integer(7),
        ]
    );
}

#[test]
fn test_bindings_are_fixed_at_compile_time() {
    let mut bindings = foo_bar();
    let program = Jq::new().compile("$foo", &bindings).unwrap();
    bindings.insert("foo".to_string(), HostValue::from("changed"));
    assert_eq!(program.one(&HostValue::Null).unwrap(), HostValue::from("bar"));
}

#[test]
fn test_abandoning_an_infinite_run() {
    let program = Jq::new().compile("repeat(. + 1)", &Bindings::new()).unwrap();
    let taken: Vec<_> = program
        .run(&HostValue::Integer(0))
        .unwrap()
        .take(3)
        .collect::<octofhir_jq::Result<_>>()
        .unwrap();
    assert_eq!(taken.len(), 3);
    assert_eq!(taken[0], HostValue::Integer(0));
}

#[test]
fn test_long_infinite_run_can_be_pulled_and_abandoned() {
    let program = Jq::new().compile("repeat(. + 1)", &Bindings::new()).unwrap();
    let mut outputs = program.run(&HostValue::Integer(0)).unwrap();
    let last = outputs.by_ref().take(100_000).last().unwrap().unwrap();
    assert_eq!(last, HostValue::Integer(99_999));
    drop(outputs);
    assert_eq!(
        program.first(&HostValue::Integer(7)).unwrap(),
        HostValue::Integer(7)
    );
}

#[rstest]
#[case("[.[] | select(. > 1)]", json!([1, 2, 3]), json!([2, 3]))]
#[case("map(. * 2) | add", json!([1, 2, 3]), json!(12))]
#[case("to_entries | map(.key)", json!({"b": 1, "a": 2}), json!(["b", "a"]))]
#[case("reduce .[] as $x (0; . + $x)", json!([1, 2, 3, 4]), json!(10))]
#[case("if . then \"yes\" else \"no\" end", json!(false), json!("no"))]
#[case(".a // \"default\"", json!({}), json!("default"))]
#[case("try error(\"boom\") catch .", json!(null), json!("boom"))]
#[case("[.[] as $x | $x * $x]", json!([2, 3]), json!([4, 9]))]
#[case("\"n=\\(.n)\"", json!({"n": 5}), json!("n=5"))]
#[case("group_by(.k) | map(length)", json!([{"k": 1}, {"k": 2}, {"k": 1}]), json!([2, 1]))]
#[case("[.[] | test(\"^a\")]", json!(["ab", "ba"]), json!([true, false]))]
fn test_filters(#[case] filter: &str, #[case] input: serde_json::Value, #[case] expected: serde_json::Value) {
    let output = one(filter, &HostValue::from(input), &Bindings::new()).unwrap();
    assert_eq!(output, HostValue::from(expected));
}
