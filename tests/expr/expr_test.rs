use indexmap::IndexMap;
use rowmap::expr::{self, Bindings, EvalError, ExprError};
use rowmap::input::Record;
use rowmap::value::Value;

fn record() -> Record {
    Record::from_pairs([
        ("first", Value::Text("  ada ".into())),
        ("last", Value::Text("lovelace".into())),
        ("score", Value::Int(7)),
        ("ratio", Value::Float(0.5)),
        ("blank", Value::Null),
    ])
}

fn eval_with(source: &str, siblings: &IndexMap<String, Value>) -> Result<Value, EvalError> {
    let record = record();
    let expression = expr::parse(source).unwrap();
    expression.evaluate(&Bindings::new(&record, siblings))
}

fn eval(source: &str) -> Result<Value, EvalError> {
    eval_with(source, &IndexMap::new())
}

#[test]
fn test_arithmetic() {
    assert_eq!(eval("row['score'] * 2 + 1").unwrap(), Value::Int(15));
    assert_eq!(eval("row['score'] / 2").unwrap(), Value::Float(3.5));
    assert_eq!(eval("row['score'] // 2").unwrap(), Value::Int(3));
    assert_eq!(eval("-7 // 2").unwrap(), Value::Int(-4));
    assert_eq!(eval("-7 % 3").unwrap(), Value::Int(2));
    assert_eq!(eval("row['ratio'] * 4").unwrap(), Value::Float(2.0));
    assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Int(9));
}

#[test]
fn test_power() {
    assert_eq!(eval("row['score'] ** 2").unwrap(), Value::Int(49));
    assert_eq!(eval("-2 ** 2").unwrap(), Value::Int(-4));
    assert_eq!(eval("(-2) ** 2").unwrap(), Value::Int(4));
    assert_eq!(eval("2 ** 3 ** 2").unwrap(), Value::Int(512));
    assert_eq!(eval("2 ** -1").unwrap(), Value::Float(0.5));
    assert_eq!(eval("3 * 2 ** 2").unwrap(), Value::Int(12));
    assert_eq!(eval("row['ratio'] ** 2").unwrap(), Value::Float(0.25));
    assert_eq!(eval("row['blank'] ** 2").unwrap(), Value::Null);
}

#[test]
fn test_power_errors() {
    assert_eq!(eval("10 ** 19"), Err(EvalError::Overflow("**")));
    assert_eq!(eval("0 ** -1"), Err(EvalError::DivisionByZero));
    assert_eq!(eval("(-8) ** 0.5"), Err(EvalError::FractionalPower));
    assert!(matches!(
        eval("'a' ** 2"),
        Err(EvalError::TypeMismatch { op: "**", .. })
    ));
}

#[test]
fn test_division_by_zero() {
    assert_eq!(eval("row['score'] / 0"), Err(EvalError::DivisionByZero));
    assert_eq!(eval("1.0 % 0"), Err(EvalError::DivisionByZero));
}

#[test]
fn test_null_propagates_through_arithmetic() {
    assert_eq!(eval("row['blank'] + 1").unwrap(), Value::Null);
    assert_eq!(eval("-row['blank']").unwrap(), Value::Null);
    assert_eq!(eval("row['blank'] == None").unwrap(), Value::Bool(true));
    assert_eq!(eval("row['blank'] != 0").unwrap(), Value::Bool(true));
}

#[test]
fn test_string_methods_and_concatenation() {
    assert_eq!(
        eval("row['first'].strip().title() + ' ' + row['last'].upper()").unwrap(),
        Value::Text("Ada LOVELACE".into())
    );
    assert_eq!(eval("len(row['last'])").unwrap(), Value::Int(8));
    assert_eq!(eval("row['last'][0]").unwrap(), Value::Text("l".into()));
    assert_eq!(eval("row['last'][-1]").unwrap(), Value::Text("e".into()));
    assert_eq!(eval("row.last").unwrap(), Value::Text("lovelace".into()));
}

#[test]
fn test_functions() {
    assert_eq!(eval("str(row['score'])").unwrap(), Value::Text("7".into()));
    assert_eq!(eval("str(row['blank'])").unwrap(), Value::Text(String::new()));
    assert_eq!(eval("int(' 42 ')").unwrap(), Value::Int(42));
    assert_eq!(eval("float('2.5')").unwrap(), Value::Float(2.5));
    assert_eq!(eval("abs(-3)").unwrap(), Value::Int(3));
    assert_eq!(eval("round(2.5)").unwrap(), Value::Int(2));
    assert_eq!(eval("round(1.256, 2)").unwrap(), Value::Float(1.26));
    assert_eq!(eval("max(1, row['score'], 3)").unwrap(), Value::Int(7));
    assert_eq!(eval("min(row['blank'], 4, 2)").unwrap(), Value::Int(2));
    assert_eq!(
        eval("coalesce(row['blank'], 'fallback')").unwrap(),
        Value::Text("fallback".into())
    );
}

#[test]
fn test_conversion_failure_is_an_error() {
    assert_eq!(
        eval("int(row['last'])"),
        Err(EvalError::Conversion {
            value: "lovelace".into(),
            target: "int",
        })
    );
}

#[test]
fn test_conditional_and_boolean_operators() {
    assert_eq!(
        eval("'pass' if row['score'] >= 5 else 'fail'").unwrap(),
        Value::Text("pass".into())
    );
    assert_eq!(eval("row['blank'] or 'n/a'").unwrap(), Value::Text("n/a".into()));
    assert_eq!(eval("row['score'] and row['last']").unwrap(), Value::Text("lovelace".into()));
    assert_eq!(eval("not row['blank']").unwrap(), Value::Bool(true));
}

#[test]
fn test_row_get_with_default() {
    assert_eq!(eval("row.get('missing', 0)").unwrap(), Value::Int(0));
    assert_eq!(eval("row.get('missing')").unwrap(), Value::Null);
    assert_eq!(eval("row.get('score', 0)").unwrap(), Value::Int(7));
    assert_eq!(
        eval("row['missing']"),
        Err(EvalError::MissingField("missing".into()))
    );
}

#[test]
fn test_bare_names_read_resolved_columns() {
    let mut siblings = IndexMap::new();
    siblings.insert("subject".to_string(), Value::Text("s1".into()));

    assert_eq!(
        eval_with("subject + ':' + str(row['score'])", &siblings).unwrap(),
        Value::Text("s1:7".into())
    );
    assert_eq!(
        eval_with("value", &siblings),
        Err(EvalError::UnknownName("value".into()))
    );
}

#[test]
fn test_referenced_fields() {
    let expression = expr::parse("row['a'] + row.get('b', row['c']) + d").unwrap();
    assert_eq!(expression.referenced_fields(), vec!["a", "b", "c"]);
    assert_eq!(expression.referenced_names(), vec!["d"]);
}

#[test]
fn test_parse_errors() {
    assert!(matches!(expr::parse("row['x'] +"), Err(ExprError::Syntax { .. })));
    assert!(matches!(expr::parse("'unterminated"), Err(ExprError::Syntax { .. })));
    assert_eq!(
        expr::parse("open('/etc/passwd')").unwrap_err(),
        ExprError::UnknownFunction {
            source_text: "open('/etc/passwd')".into(),
            name: "open".into(),
        }
    );
}
