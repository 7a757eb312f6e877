use std::fs;
use std::path::{Path, PathBuf};

use rowmap::expr::EvalError;
use rowmap::input::InputError;
use rowmap::resolve::ResolveError;
use rowmap::load::{load, LoadError, LoadOptions, LoadWarning};
use rowmap::resolve::LookupError;
use rowmap::session::SessionError;
use rowmap::spec::SpecError;
use rusqlite::Connection;
use tempfile::TempDir;

const SCHEMA: &str = r#"
CREATE TABLE metric (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);
CREATE TABLE measure (
    metric_id INTEGER NOT NULL REFERENCES metric (id),
    subject TEXT NOT NULL,
    value REAL,
    PRIMARY KEY (metric_id, subject)
);
"#;

const MEASURE_SPEC: &str = r#"
table: measure
mode: upsert
key: [metric_id, subject]
pre_dedupe_on: [metric_id, subject]
columns:
  metric_id:
    lookup:
      table: metric
      get: id
      match: { name: { from: metric } }
      create_if_missing: true
      defaults: { description: { const: auto } }
  subject: { from: student, transform: strip|lower }
  value: { from: score, as_type: float }
"#;

struct Fixture {
    dir: TempDir,
    db: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("results.db");
        Connection::open(&db).unwrap().execute_batch(SCHEMA).unwrap();
        Self { dir, db }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn load(&self, csv: &str, spec: &str) -> Result<rowmap::LoadReport, LoadError> {
        let csv = self.write("input.csv", csv);
        let spec = self.write("spec.yaml", spec);
        load(&self.db, &csv, &spec, &LoadOptions::default())
    }

    fn query<T: rusqlite::types::FromSql>(&self, sql: &str) -> T {
        Connection::open(&self.db)
            .unwrap()
            .query_row(sql, [], |r| r.get(0))
            .unwrap()
    }
}

#[test]
fn test_end_to_end_upsert_with_lookup_creation() {
    let fx = Fixture::new();
    let csv = "metric,student,score\nAccuracy, S1 ,0.5\nAccuracy,s2,n/a\nRecall,s1,0.9\nAccuracy,s1,0.75\n";

    let report = fx.load(csv, MEASURE_SPEC).unwrap();
    assert_eq!(report.table, "measure");
    assert_eq!(report.input_rows, 4);
    assert_eq!(report.deduplicated, 1);
    assert_eq!(report.rows_written, 3);
    assert_eq!(
        report.warnings,
        vec![LoadWarning::CoercionFailures {
            column: "value".into(),
            count: 1
        }]
    );

    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM metric"), 2);
    assert_eq!(
        fx.query::<String>("SELECT description FROM metric WHERE name = 'Recall'"),
        "auto"
    );
    assert_eq!(
        fx.query::<f64>(
            "SELECT value FROM measure m JOIN metric t ON t.id = m.metric_id \
             WHERE t.name = 'Accuracy' AND m.subject = 's1'"
        ),
        0.75
    );
    assert_eq!(
        fx.query::<Option<f64>>("SELECT value FROM measure WHERE subject = 's2'"),
        None
    );

    // Same input again: lookups resolve and upsert leaves the row count alone.
    let again = fx.load(csv, MEASURE_SPEC).unwrap();
    assert_eq!(again.rows_written, 3);
    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM measure"), 3);
    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM metric"), 2);
}

#[test]
fn test_float_coercion_scenarios() {
    let fx = Fixture::new();
    fx.load("x\n1\n", "table: metric\ncolumns:\n  name: { const: Accuracy }\n")
        .unwrap();
    let spec = r#"
table: measure
columns:
  metric_id: { const: 1 }
  subject: { from: subject }
  value: { from: score, as_type: float }
"#;

    fx.load("subject,score\na,3.5\nb,n/a\n", spec).unwrap();
    assert_eq!(fx.query::<f64>("SELECT value FROM measure WHERE subject = 'a'"), 3.5);
    assert_eq!(
        fx.query::<Option<f64>>("SELECT value FROM measure WHERE subject = 'b'"),
        None
    );
}

#[test]
fn test_lookup_without_create_leaves_null() {
    let fx = Fixture::new();
    let spec = r#"
table: measure
columns:
  metric_id:
    lookup:
      table: metric
      get: id
      match: { name: { const: Accuracy } }
  subject: { from: subject }
"#;
    // metric_id is NOT NULL, so the unresolved lookup reaches SQLite as a
    // constraint violation and nothing is written.
    let err = fx.load("subject\na\n", spec).unwrap_err();
    assert!(matches!(err, LoadError::Persist(_)));
    assert!(err.to_string().contains("NOT NULL constraint failed"));
    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM metric"), 0);
    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM measure"), 0);
}

#[test]
fn test_ambiguous_lookup_aborts_before_persist() {
    let fx = Fixture::new();
    Connection::open(&fx.db)
        .unwrap()
        .execute_batch("INSERT INTO metric (name, description) VALUES ('a', 'x'), ('b', 'x');")
        .unwrap();
    let spec = r#"
table: measure
columns:
  metric_id:
    lookup: { table: metric, get: id, match: { description: { const: x } } }
  subject: { from: subject }
"#;
    let err = fx.load("subject\ns1\n", spec).unwrap_err();
    match &err {
        LoadError::Resolve(e) => {
            assert!(matches!(e.as_lookup(), Some(LookupError::Ambiguous { count: 2, .. })))
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM measure"), 0);
}

#[test]
fn test_failed_record_keeps_created_lookup_rows_only() {
    let fx = Fixture::new();
    let spec = r#"
table: measure
columns:
  metric_id:
    lookup:
      table: metric
      get: id
      match: { name: { from: metric } }
      create_if_missing: true
  subject: { from: student }
  value: { expr: "int(row['n']) / int(row['d'])" }
"#;
    let csv = "metric,student,n,d\nA,s1,1,1\nA,s2,1,0\n";

    let err = fx.load(csv, spec).unwrap_err();
    match &err {
        LoadError::Resolve(ResolveError::Eval {
            column,
            line,
            source,
        }) => {
            assert_eq!(column, "value");
            assert_eq!(*line, 3);
            assert_eq!(*source, EvalError::DivisionByZero);
        }
        other => panic!("expected an evaluation error, got {other:?}"),
    }

    // Lookup rows commit as they are created; the target table sees nothing.
    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM metric"), 1);
    assert_eq!(fx.query::<String>("SELECT name FROM metric"), "A");
    assert_eq!(fx.query::<i64>("SELECT COUNT(*) FROM measure"), 0);
}

#[test]
fn test_missing_database_is_not_created() {
    let fx = Fixture::new();
    let csv = fx.write("input.csv", "metric,student,score\nAccuracy,s1,1\n");
    let spec = fx.write("spec.yaml", MEASURE_SPEC);
    let missing = fx.dir.path().join("missing.db");

    let err = load(&missing, &csv, &spec, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::Session(SessionError::NotFound(_))));
    assert!(!missing.exists());
}

#[test]
fn test_spec_and_input_errors_precede_database_access() {
    let fx = Fixture::new();
    let missing_db = Path::new("/nonexistent/results.db");

    let csv = fx.write("input.csv", "student,score\ns1,1\n");
    let bad_spec = fx.write("bad.yaml", "columns:\n  a: { from: x }\n");
    let err = load(missing_db, &csv, &bad_spec, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::Spec(SpecError::Invalid(_))));

    // `metric` is read by a lookup match with `from`, so it must be in the header.
    let spec = fx.write("spec.yaml", MEASURE_SPEC);
    let err = load(missing_db, &csv, &spec, &LoadOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Input(InputError::MissingFields { ref missing, .. }) if missing == &["metric"]
    ));
}

#[test]
fn test_missing_target_table_is_fatal() {
    let fx = Fixture::new();
    let err = fx
        .load("a\n1\n", "table: nowhere\ncolumns:\n  a: { from: a }\n")
        .unwrap_err();
    assert!(matches!(err, LoadError::Schema(_)));
    assert!(err.to_string().contains("nowhere"));
}
