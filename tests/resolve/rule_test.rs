use std::path::Path;

use indexmap::IndexMap;
use rowmap::expr::EvalError;
use rowmap::input::{read_csv_from, InputOptions, Record};
use rowmap::resolve::rule::post_process;
use rowmap::resolve::{resolve_rule, LookupError, ResolveError, RowContext};
use rowmap::session::{Session, SessionOptions};
use rowmap::spec::{AsType, MappingSpec, Rule, SpecFormat, Transform};
use rowmap::value::Value;

fn session() -> Session {
    Session::open_in_memory(&SessionOptions::default()).unwrap()
}

fn resolve(record: &Record, siblings: &IndexMap<String, Value>, rule: &Rule) -> Value {
    let ctx = RowContext::new(record, siblings);
    resolve_rule(&mut session(), &ctx, "col", rule).unwrap().value
}

#[test]
fn test_transforms_run_in_order_before_coercion() {
    let record = Record::from_pairs([("name", Value::from("  ADA lovelace "))]);
    let rule = Rule::field("name").with_transforms(vec![Transform::Strip, Transform::Title]);
    assert_eq!(
        resolve(&record, &IndexMap::new(), &rule),
        Value::from("Ada Lovelace")
    );

    let record = Record::from_pairs([("n", Value::from(" 42 "))]);
    let rule = Rule::field("n")
        .with_transforms(vec![Transform::Strip])
        .with_as_type(AsType::Int);
    assert_eq!(resolve(&record, &IndexMap::new(), &rule), Value::Int(42));
}

#[test]
fn test_coercion() {
    let float = post_process(Value::from("3.5"), &[], Some(AsType::Float));
    assert_eq!(float.value, Value::Float(3.5));
    assert!(!float.coercion_failed);

    let bad = post_process(Value::from("n/a"), &[], Some(AsType::Float));
    assert_eq!(bad.value, Value::Null);
    assert!(bad.coercion_failed);

    // Null is not a failure.
    let null = post_process(Value::Null, &[], Some(AsType::Int));
    assert_eq!(null.value, Value::Null);
    assert!(!null.coercion_failed);

    assert_eq!(
        post_process(Value::Null, &[], Some(AsType::Str)).value,
        Value::from("")
    );
    assert_eq!(
        post_process(Value::Float(2.9), &[], Some(AsType::Int)).value,
        Value::Int(2)
    );
    assert_eq!(
        post_process(Value::Int(7), &[], Some(AsType::Str)).value,
        Value::from("7")
    );
}

#[test]
fn test_transform_on_null_yields_empty_text() {
    let resolution = post_process(Value::Null, &[Transform::Upper], None);
    assert_eq!(resolution.value, Value::from(""));
}

#[test]
fn test_expression_sees_earlier_columns() {
    let spec = MappingSpec::parse(
        r#"
table: t
columns:
  subject: { from: name, transform: lower }
  tag: { expr: "subject + '-' + str(row['n'] * 2)" }
"#,
        SpecFormat::Yaml,
    )
    .unwrap();
    let record = Record::from_pairs([("name", Value::from("S1")), ("n", Value::Int(4))]);

    let mut siblings = IndexMap::new();
    let mut s = session();
    for column in &spec.columns {
        let ctx = RowContext::new(&record, &siblings);
        let resolution = resolve_rule(&mut s, &ctx, &column.name, &column.rule).unwrap();
        siblings.insert(column.name.clone(), resolution.value);
    }
    assert_eq!(siblings["tag"], Value::from("s1-8"));
}

#[test]
fn test_errors_carry_line_and_column() {
    let input = read_csv_from(
        "a,b\n1,x\n2,0\n".as_bytes(),
        Path::new("in.csv"),
        &InputOptions::default(),
    )
    .unwrap();
    let rule = Rule::from_source(rowmap::spec::RuleSource::Expr(
        rowmap::expr::parse("row['a'] / int(row['b'])").unwrap(),
    ));

    let siblings = IndexMap::new();
    let mut s = session();
    let record = &input.records()[1];
    let err = resolve_rule(&mut s, &RowContext::new(record, &siblings), "ratio", &rule)
        .unwrap_err();

    match &err {
        ResolveError::Eval {
            column,
            line,
            source,
        } => {
            assert_eq!(column, "ratio");
            assert_eq!(*line, record.line());
            assert_eq!(source, &EvalError::DivisionByZero);
        }
        other => panic!("expected eval error, got {other:?}"),
    }
    assert!(err.to_string().contains("column 'ratio'"));
    assert!(err.as_lookup().is_none());
}

#[test]
fn test_lookup_inside_match_is_rejected() {
    // Specs cannot express this, but rules built in code can.
    let inner = rowmap::spec::LookupRule {
        table: "inner".into(),
        get: "id".into(),
        matches: IndexMap::new(),
        create_if_missing: false,
        defaults: IndexMap::new(),
    };
    let mut matches = IndexMap::new();
    matches.insert(
        "parent".to_string(),
        Rule::from_source(rowmap::spec::RuleSource::Lookup(Box::new(inner))),
    );
    let outer = Rule::from_source(rowmap::spec::RuleSource::Lookup(Box::new(
        rowmap::spec::LookupRule {
            table: "outer".into(),
            get: "id".into(),
            matches,
            create_if_missing: false,
            defaults: IndexMap::new(),
        },
    )));

    let record = Record::from_pairs([("x", Value::Int(1))]);
    let siblings = IndexMap::new();
    let err = resolve_rule(&mut session(), &RowContext::new(&record, &siblings), "fk", &outer)
        .unwrap_err();
    assert!(matches!(
        err.as_lookup(),
        Some(LookupError::Nested { table }) if table == "inner"
    ));
}
