use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use rowmap::input::Record;
use rowmap::resolve::{resolve_lookup, LookupError, LookupOutcome, RowContext};
use rowmap::session::{Session, SessionOptions};
use rowmap::spec::{LookupRule, Rule};
use rowmap::value::Value;
use rusqlite::{Connection, TransactionBehavior};

fn session() -> Session {
    let session = Session::open_in_memory(&SessionOptions::default()).unwrap();
    session
        .conn()
        .execute_batch(
            r#"
            CREATE TABLE metric (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                UNIQUE (name)
            );
            INSERT INTO metric (name, description) VALUES ('Precision', 'seeded');
            CREATE TABLE tag (id INTEGER PRIMARY KEY, label TEXT);
            INSERT INTO tag (label) VALUES ('dup'), ('dup');
            CREATE TABLE unit (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                system TEXT
            );
            INSERT INTO unit (code, system) VALUES ('kg', 'si');
            "#,
        )
        .unwrap();
    session
}

fn metric_lookup(create: bool) -> LookupRule {
    let mut matches = IndexMap::new();
    matches.insert("name".to_string(), Rule::field("metric"));
    let mut defaults = IndexMap::new();
    defaults.insert("description".to_string(), Rule::constant("auto"));
    LookupRule {
        table: "metric".into(),
        get: "id".into(),
        matches,
        create_if_missing: create,
        defaults,
    }
}

fn lookup(
    s: &mut Session,
    metric: &str,
    rule: &LookupRule,
) -> Result<LookupOutcome, rowmap::resolve::ResolveError> {
    let record = Record::from_pairs([("metric", Value::from(metric))]);
    let siblings = IndexMap::new();
    resolve_lookup(s, &RowContext::new(&record, &siblings), "metric_id", rule)
}

fn count(s: &Session, sql: &str) -> i64 {
    s.conn().query_row(sql, [], |r| r.get(0)).unwrap()
}

#[test]
fn test_existing_row_is_resolved() {
    let mut s = session();
    let outcome = lookup(&mut s, "Precision", &metric_lookup(true)).unwrap();
    assert_eq!(outcome, LookupOutcome::Resolved(Value::Int(1)));
    assert_eq!(count(&s, "SELECT COUNT(*) FROM metric"), 1);
}

#[test]
fn test_missing_row_without_create_is_null() {
    let mut s = session();
    let outcome = lookup(&mut s, "Accuracy", &metric_lookup(false)).unwrap();
    assert_eq!(outcome, LookupOutcome::Unresolved);
    assert_eq!(outcome.into_value(), Value::Null);
    assert_eq!(count(&s, "SELECT COUNT(*) FROM metric"), 1);
}

#[test]
fn test_create_if_missing_creates_exactly_one_row() {
    let mut s = session();
    let rule = metric_lookup(true);

    let first = lookup(&mut s, "Accuracy", &rule).unwrap();
    assert_eq!(first, LookupOutcome::Created(Value::Int(2)));

    // Later records with the same key find the created row.
    for _ in 0..3 {
        let again = lookup(&mut s, "Accuracy", &rule).unwrap();
        assert_eq!(again, LookupOutcome::Resolved(Value::Int(2)));
    }

    assert_eq!(
        count(&s, "SELECT COUNT(*) FROM metric WHERE name = 'Accuracy'"),
        1
    );
    let description: String = s
        .conn()
        .query_row(
            "SELECT description FROM metric WHERE name = 'Accuracy'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(description, "auto");
}

#[test]
fn test_ambiguous_match_is_fatal() {
    let mut s = session();
    let mut matches = IndexMap::new();
    matches.insert("label".to_string(), Rule::constant("dup"));
    let rule = LookupRule {
        table: "tag".into(),
        get: "id".into(),
        matches,
        create_if_missing: true,
        defaults: IndexMap::new(),
    };

    let err = lookup(&mut s, "ignored", &rule).unwrap_err();
    match err.as_lookup() {
        Some(LookupError::Ambiguous {
            table,
            matches,
            count,
        }) => {
            assert_eq!(table, "tag");
            assert_eq!(matches, "{label='dup'}");
            assert_eq!(*count, 2);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert!(err.to_string().contains("line 0, column 'metric_id'"));
}

#[test]
fn test_missing_lookup_table_is_a_query_error() {
    let mut s = session();
    let mut rule = metric_lookup(false);
    rule.table = "nope".into();

    let err = lookup(&mut s, "Accuracy", &rule).unwrap_err();
    assert!(matches!(
        err.as_lookup(),
        Some(LookupError::Query { table, .. }) if table == "nope"
    ));
}

#[test]
fn test_unique_violation_outside_match_is_fatal() {
    let mut matches = IndexMap::new();
    matches.insert("code".to_string(), Rule::constant("kg"));
    matches.insert("system".to_string(), Rule::constant("imperial"));
    let mut rule = LookupRule {
        table: "unit".into(),
        get: "id".into(),
        matches,
        create_if_missing: true,
        defaults: IndexMap::new(),
    };

    for get in ["id", "code"] {
        rule.get = get.into();
        let mut s = session();
        let err = lookup(&mut s, "ignored", &rule).unwrap_err();
        assert!(
            matches!(err.as_lookup(), Some(LookupError::Query { table, .. }) if table == "unit"),
            "get={get}: {err:?}"
        );
        assert!(err.to_string().contains("UNIQUE constraint failed"), "{err}");
        assert_eq!(count(&s, "SELECT COUNT(*) FROM unit"), 1);
    }
}

#[test]
fn test_row_committed_by_another_writer_is_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lookups.db");
    let setup = Connection::open(&path).unwrap();
    let mode: String = setup
        .query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))
        .unwrap();
    assert_eq!(mode, "wal");
    setup
        .execute_batch(
            "CREATE TABLE metric (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, description TEXT);",
        )
        .unwrap();
    drop(setup);

    let mut s = Session::open(&path, &SessionOptions::default()).unwrap();

    // The other writer holds the write lock with its row still uncommitted,
    // so the first query sees nothing and the create path has to wait.
    let (locked, wait_locked) = mpsc::channel();
    let writer_path = path.clone();
    let writer = thread::spawn(move || {
        let mut conn = Connection::open(writer_path).unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        tx.execute(
            "INSERT INTO metric (name, description) VALUES ('Accuracy', 'other writer')",
            [],
        )
        .unwrap();
        locked.send(()).unwrap();
        thread::sleep(Duration::from_millis(300));
        tx.commit().unwrap();
    });
    wait_locked.recv().unwrap();

    let outcome = lookup(&mut s, "Accuracy", &metric_lookup(true)).unwrap();
    writer.join().unwrap();

    assert_eq!(outcome, LookupOutcome::Resolved(Value::Int(1)));
    assert_eq!(
        count(&s, "SELECT COUNT(*) FROM metric WHERE name = 'Accuracy'"),
        1
    );
    let description: String = s
        .conn()
        .query_row("SELECT description FROM metric", [], |r| r.get(0))
        .unwrap();
    assert_eq!(description, "other writer");
}
