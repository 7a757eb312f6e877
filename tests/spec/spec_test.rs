use std::fs;

use rowmap::spec::{AsType, LoadMode, MappingSpec, RuleSource, SpecError, SpecFormat, Transform};
use rowmap::value::Value;

const MEASURE_YAML: &str = r#"
_generated_by: build_measures
table: measure
mode: upsert
key: [metric_id, subject_id]
pre_dedupe_on: [metric_id, subject_id]
columns:
  subject_id: { from: student_id, as_type: int }
  value: { from: score, as_type: float }
  label: { expr: "row['first'].strip() + ' ' + row.get('last', '')", transform: [title] }
  metric_id:
    lookup:
      table: metric
      get: id
      match:
        name: { const: Accuracy }
        type_spec: { const: null }
      create_if_missing: true
      defaults:
        description: { const: auto }
"#;

#[test]
fn test_load_yaml_spec_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("measure.yaml");
    fs::write(&path, MEASURE_YAML).unwrap();

    let spec = MappingSpec::load(&path).unwrap();
    assert_eq!(spec.table, "measure");
    assert_eq!(spec.key(), ["metric_id", "subject_id"]);
    assert_eq!(spec.pre_dedupe_on, vec!["metric_id", "subject_id"]);
    assert_eq!(
        spec.column_names(),
        vec!["subject_id", "value", "label", "metric_id"]
    );

    let subject = &spec.column("subject_id").unwrap().rule;
    assert_eq!(subject.source, RuleSource::Field("student_id".into()));
    assert_eq!(subject.as_type, Some(AsType::Int));

    let label = &spec.column("label").unwrap().rule;
    assert!(matches!(label.source, RuleSource::Expr(_)));
    assert_eq!(label.transforms, vec![Transform::Title]);

    let (column, lookup) = spec.lookups().next().unwrap();
    assert_eq!(column, "metric_id");
    assert_eq!(lookup.table, "metric");
    assert!(lookup.create_if_missing);
    assert_eq!(
        lookup.matches["type_spec"].source,
        RuleSource::Const(Value::Null)
    );
}

#[test]
fn test_input_fields_cover_every_rule_kind() {
    let spec = MappingSpec::parse(MEASURE_YAML, SpecFormat::Yaml).unwrap();
    assert_eq!(
        spec.input_fields(),
        vec!["student_id", "score", "first", "last"]
    );
    // Only `from` fields are required in the header.
    assert_eq!(spec.direct_fields(), vec!["student_id", "score"]);
}

#[test]
fn test_json_and_toml_specs_are_equivalent() {
    let json = r#"{
        "table": "score",
        "mode": "upsert",
        "key": ["subject"],
        "columns": {
            "subject": {"from": "name", "transform": "strip|lower"},
            "value": {"from": "score", "as_type": "float"}
        }
    }"#;
    let toml = r#"
table = "score"
mode = "upsert"
key = ["subject"]

[columns.subject]
from = "name"
transform = ["strip", "lower"]

[columns.value]
from = "score"
as_type = "float"
"#;
    let from_json = MappingSpec::parse(json, SpecFormat::Json).unwrap();
    let from_toml = MappingSpec::parse(toml, SpecFormat::Toml).unwrap();
    assert_eq!(from_json, from_toml);
    assert_eq!(
        from_json.mode,
        LoadMode::Upsert {
            key: vec!["subject".into()]
        }
    );
}

#[test]
fn test_format_follows_extension() {
    let dir = tempfile::tempdir().unwrap();

    let json = dir.path().join("spec.json");
    fs::write(&json, r#"{"table": "t", "columns": {"a": {"const": 1}}}"#).unwrap();
    assert_eq!(MappingSpec::load(&json).unwrap().table, "t");

    // Unknown extensions are read as YAML, which also accepts JSON.
    let other = dir.path().join("spec.mapping");
    fs::write(&other, "table: u\ncolumns:\n  a: { const: 1 }\n").unwrap();
    assert_eq!(MappingSpec::load(&other).unwrap().table, "u");
}

#[test]
fn test_missing_file() {
    let err = MappingSpec::load(std::path::Path::new("/nonexistent/spec.yaml")).unwrap_err();
    assert!(matches!(err, SpecError::Io { .. }));
}

#[test]
fn test_validation_reports_every_problem() {
    let yaml = r#"
mode: upsert
pre_dedupe_on: [nope]
columns:
  a: { from: x, const: 1 }
  b: { from: y, transform: "strip|shout" }
  c: { from: z, as_type: decimal }
  d: { expr: "row['x'] +" }
  e: { lookup: { table: metric } }
"#;
    let err = MappingSpec::parse(yaml, SpecFormat::Yaml).unwrap_err();
    let paths: Vec<&str> = err.issues().iter().map(|i| i.path.as_str()).collect();

    for expected in [
        "table",
        "columns.a",
        "columns.b.transform",
        "columns.c.as_type",
        "columns.d.expr",
        "columns.e.lookup.get",
        "key",
        "pre_dedupe_on",
    ] {
        assert!(paths.contains(&expected), "missing issue for {expected}: {paths:?}");
    }

    let message = err.to_string();
    assert!(message.contains("unknown transform 'shout'"));
}

#[test]
fn test_unknown_function_is_a_spec_error() {
    let yaml = "table: t\ncolumns:\n  a: { expr: \"eval(row['x'])\" }\n";
    let err = MappingSpec::parse(yaml, SpecFormat::Yaml).unwrap_err();
    assert_eq!(err.issues()[0].path, "columns.a.expr");
    assert!(err.to_string().contains("eval"));
}

#[test]
fn test_rendered_spec_reloads_unchanged() {
    let spec = MappingSpec::parse(MEASURE_YAML, SpecFormat::Yaml).unwrap();
    for format in [SpecFormat::Yaml, SpecFormat::Json] {
        let text = spec.render(format).unwrap();
        let reparsed = MappingSpec::parse(&text, format).unwrap();
        assert_eq!(reparsed, spec, "round trip through {}", format.as_str());
    }
}
