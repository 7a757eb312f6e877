use rowmap::materialize::{MappedBatch, MappedRow};
use rowmap::persist::{persist, PersistError};
use rowmap::session::{Session, SessionOptions};
use rowmap::spec::LoadMode;
use rowmap::value::Value;

fn session() -> Session {
    let session = Session::open_in_memory(&SessionOptions::default()).unwrap();
    session
        .conn()
        .execute_batch(
            r#"
            CREATE TABLE measure (
                metric_id INTEGER NOT NULL,
                subject TEXT NOT NULL,
                value REAL,
                PRIMARY KEY (metric_id, subject)
            );
            CREATE TABLE event (id INTEGER PRIMARY KEY, kind TEXT NOT NULL);
            "#,
        )
        .unwrap();
    session
}

fn measures(rows: &[(i64, &str, f64)]) -> MappedBatch {
    MappedBatch {
        columns: vec!["metric_id".into(), "subject".into(), "value".into()],
        rows: rows
            .iter()
            .map(|(metric, subject, value)| {
                let mut row = MappedRow::new();
                row.insert("metric_id".into(), Value::Int(*metric));
                row.insert("subject".into(), Value::from(*subject));
                row.insert("value".into(), Value::Float(*value));
                row
            })
            .collect(),
        coercion_failures: Default::default(),
    }
}

fn events(kinds: &[Value]) -> MappedBatch {
    MappedBatch {
        columns: vec!["kind".into()],
        rows: kinds
            .iter()
            .map(|kind| {
                let mut row = MappedRow::new();
                row.insert("kind".into(), kind.clone());
                row
            })
            .collect(),
        coercion_failures: Default::default(),
    }
}

fn count(s: &Session, table: &str) -> i64 {
    s.conn()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

fn upsert() -> LoadMode {
    LoadMode::Upsert {
        key: vec!["metric_id".into(), "subject".into()],
    }
}

#[test]
fn test_insert_twice_doubles_rows() {
    let mut s = session();
    let batch = events(&[Value::from("start"), Value::from("stop")]);

    assert_eq!(persist(&mut s, &batch, "event", &LoadMode::Insert).unwrap(), 2);
    assert_eq!(persist(&mut s, &batch, "event", &LoadMode::Insert).unwrap(), 2);
    assert_eq!(count(&s, "event"), 4);
}

#[test]
fn test_upsert_twice_keeps_row_count_and_takes_new_values() {
    let mut s = session();
    persist(
        &mut s,
        &measures(&[(1, "s1", 0.5), (1, "s2", 0.25)]),
        "measure",
        &upsert(),
    )
    .unwrap();
    persist(
        &mut s,
        &measures(&[(1, "s1", 0.75), (1, "s2", 0.5)]),
        "measure",
        &upsert(),
    )
    .unwrap();

    assert_eq!(count(&s, "measure"), 2);
    let value: f64 = s
        .conn()
        .query_row(
            "SELECT value FROM measure WHERE metric_id = 1 AND subject = 's1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(value, 0.75);
}

#[test]
fn test_empty_batch_writes_nothing() {
    let mut s = session();
    assert_eq!(persist(&mut s, &measures(&[]), "measure", &upsert()).unwrap(), 0);
    assert_eq!(count(&s, "measure"), 0);
}

#[test]
fn test_failed_row_rolls_back_batch() {
    let mut s = session();
    let batch = events(&[Value::from("start"), Value::Null, Value::from("stop")]);

    let err = persist(&mut s, &batch, "event", &LoadMode::Insert).unwrap_err();
    match err {
        PersistError::Write { table, row, .. } => {
            assert_eq!(table, "event");
            assert_eq!(row, 2);
        }
        other => panic!("expected write error, got {other:?}"),
    }
    assert_eq!(count(&s, "event"), 0);
}

#[test]
fn test_insert_conflict_surfaces_sqlite_message() {
    let mut s = session();
    let batch = measures(&[(1, "s1", 0.5)]);
    persist(&mut s, &batch, "measure", &LoadMode::Insert).unwrap();

    let err = persist(&mut s, &batch, "measure", &LoadMode::Insert).unwrap_err();
    assert!(err.to_string().contains("UNIQUE constraint failed"));
    assert_eq!(count(&s, "measure"), 1);
}
