//! Unit tests for feature declarations and schema validation.

use rstest::{fixture, rstest};
use time::macros::datetime;

use super::*;

#[fixture]
fn schema() -> FeatureSchema {
    FeatureSchema::with_base(vec![
        Feature::unspecified("example_unspec", "accepts anything"),
        Feature::new("example_string", "text only", FeatureKind::String),
        Feature::new("example_int", "integers only", FeatureKind::Integer),
        Feature::new("example_path", "paths or uris", FeatureKind::Filepath),
        Feature::new("example_uri", "uris or paths", FeatureKind::Uri),
    ])
}

#[test]
fn base_schema_declares_filename_first() {
    let base = FeatureSchema::base();
    assert_eq!(base.features()[0].name(), FILENAME_FEATURE);
    assert_eq!(base.len(), BASE_FEATURES.len());
}

#[test]
fn merge_replaces_in_place_and_appends_new() {
    let parent = FeatureSchema::with_base(vec![
        Feature::unspecified("first", "one"),
        Feature::unspecified("second", "two"),
    ]);
    let child = parent.merge(vec![
        Feature::new("first", "now text", FeatureKind::String),
        Feature::unspecified("third", "three"),
    ]);

    let names: Vec<&str> = child.features().iter().map(Feature::name).collect();
    let base_len = BASE_FEATURES.len();
    assert_eq!(&names[base_len..], ["first", "second", "third"]);
    assert_eq!(
        child.get("first").map(Feature::kind),
        Some(FeatureKind::String)
    );
    assert_eq!(
        parent.get("first").map(Feature::kind),
        Some(FeatureKind::Unspecified),
        "merging must not mutate the parent"
    );
}

#[rstest]
#[case::unspecified_takes_int("example_unspec", FeatureValue::from(5))]
#[case::unspecified_takes_bytes("example_unspec", FeatureValue::from(b"raw".as_slice()))]
#[case::string("example_string", FeatureValue::from("text"))]
#[case::integer("example_int", FeatureValue::from(7_i64))]
#[case::path_as_path("example_path", FeatureValue::new(Value::filepath("/tmp/a")))]
#[case::path_as_uri("example_path", FeatureValue::new(Value::uri("file:///tmp/a")))]
#[case::uri_as_path("example_uri", FeatureValue::new(Value::filepath("/tmp/b")))]
fn validate_accepts_matching_kinds(
    schema: FeatureSchema,
    #[case] name: &str,
    #[case] value: FeatureValue,
) {
    let accepted = schema.validate(name, value).expect("value accepted");
    assert!(schema.get(name).is_some_and(|f| f.kind().accepts(accepted.value())));
}

#[rstest]
#[case::int_for_string("example_string", FeatureValue::from(1), FeatureKind::Integer)]
#[case::string_for_int("example_int", FeatureValue::from("1"), FeatureKind::String)]
#[case::date_for_uri(
    "example_uri",
    FeatureValue::from(datetime!(2024-01-02 03:04:05 UTC)),
    FeatureKind::Datetime
)]
fn validate_rejects_mismatched_kinds(
    schema: FeatureSchema,
    #[case] name: &str,
    #[case] value: FeatureValue,
    #[case] found_kind: FeatureKind,
) {
    let err = schema
        .validate(name, value)
        .expect_err("kind mismatch");
    match err {
        JobError::TypeMismatch { feature, found, .. } => {
            assert_eq!(feature, name);
            assert_eq!(found, found_kind);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn validate_rejects_undeclared_names(schema: FeatureSchema) {
    let err = schema
        .validate("not_declared", FeatureValue::from("x"))
        .expect_err("undeclared");
    assert!(err.is_validation());
    assert!(err.to_string().contains("not_declared"));
}

#[rstest]
fn validate_rejects_whole_batch_on_one_bad_value(schema: FeatureSchema) {
    let result = schema.validate_all(
        "example_int",
        vec![FeatureValue::from(1), FeatureValue::from("two")],
    );
    assert!(result.is_err());
}

#[rstest]
fn validate_folds_filepaths_into_uris(schema: FeatureSchema) {
    let accepted = schema
        .validate(
            "example_path",
            FeatureValue::labelled(Value::filepath("/bin/sh"), "exe"),
        )
        .expect("path accepted");
    assert_eq!(accepted.value(), &Value::uri("/bin/sh"));
    assert_eq!(accepted.label(), Some("exe"));
}

#[test]
fn kind_displays_in_snake_case() {
    assert_eq!(FeatureKind::Datetime.to_string(), "datetime");
    assert_eq!(FeatureKind::Unspecified.to_string(), "unspecified");
}

#[test]
fn values_order_by_variant_then_content() {
    let mut values = vec![
        Value::from(3),
        Value::from("b"),
        Value::from(1),
        Value::from("a"),
    ];
    values.sort();
    assert_eq!(
        values,
        vec![
            Value::from("a"),
            Value::from("b"),
            Value::from(1),
            Value::from(3)
        ]
    );
}

#[test]
fn value_serialises_with_type_tag() {
    let json = serde_json::to_value(Value::from(42)).expect("serialise");
    assert_eq!(json, serde_json::json!({"type": "integer", "value": 42}));
}
