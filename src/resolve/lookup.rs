//! Foreign-key lookups.
//!
//! A lookup turns the values of its `match` rules into an equality query
//! against another table and returns the `get` column of the single
//! matching row:
//!
//! ```text
//! match rules ──► SELECT get FROM table WHERE ...
//!                   │
//!                   ├── 1 row  ──► Resolved(value)
//!                   ├── 2+ rows ─► Ambiguous (fatal)
//!                   └── 0 rows ─┬► Unresolved (null)
//!                               └► create_if_missing: BEGIN IMMEDIATE,
//!                                  re-query, INSERT ... RETURNING get,
//!                                  COMMIT
//! ```
//!
//! Created rows commit immediately so later records in the same run see
//! them.

use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use thiserror::Error;
use tracing::debug;

use super::rule::{resolve_plain, RowContext};
use super::{ResolveError, ResolveResult};
use crate::session::Session;
use crate::spec::LookupRule;
use crate::sql::{Insert, Select};
use crate::value::Value;

/// Lookup failures. All are fatal for the run.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("lookup in '{table}' for {matches} matched {count} rows")]
    Ambiguous {
        table: String,
        matches: String,
        count: usize,
    },

    #[error("lookup into '{table}' cannot be nested inside another lookup")]
    Nested { table: String },

    #[error("lookup in '{table}' failed: {source}")]
    Query {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// Exactly one existing row matched.
    Resolved(Value),
    /// Nothing matched and creation is off.
    Unresolved,
    /// Nothing matched, so a row was created.
    Created(Value),
}

impl LookupOutcome {
    pub fn into_value(self) -> Value {
        match self {
            LookupOutcome::Resolved(v) | LookupOutcome::Created(v) => v,
            LookupOutcome::Unresolved => Value::Null,
        }
    }
}

/// Resolve one lookup for the current record.
pub fn resolve_lookup(
    session: &mut Session,
    ctx: &RowContext<'_>,
    column: &str,
    lookup: &LookupRule,
) -> ResolveResult<LookupOutcome> {
    let fail = |source: LookupError| ResolveError::Lookup {
        column: column.to_string(),
        line: ctx.record.line(),
        source,
    };
    let query_err = |source: rusqlite::Error| {
        fail(LookupError::Query {
            table: lookup.table.clone(),
            source,
        })
    };

    let mut matches = Vec::with_capacity(lookup.matches.len());
    for (col, rule) in &lookup.matches {
        let resolved = resolve_plain(ctx, &format!("{column}.match.{col}"), rule)?;
        matches.push((col.clone(), resolved.value));
    }
    let probe = Probe::new(lookup, &matches);

    let found = probe.fetch(session.conn()).map_err(query_err)?;
    match found.len() {
        1 => return Ok(LookupOutcome::Resolved(first(found))),
        0 if !lookup.create_if_missing => return Ok(LookupOutcome::Unresolved),
        0 => {}
        count => return Err(fail(probe.ambiguous(count))),
    }

    // Defaults are evaluated before taking the write lock.
    let mut payload = matches.clone();
    for (col, rule) in &lookup.defaults {
        let resolved = resolve_plain(ctx, &format!("{column}.defaults.{col}"), rule)?;
        payload.push((col.clone(), resolved.value));
    }

    let tx = session
        .conn_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(query_err)?;

    // Another writer may have created the row since the first query.
    let found = probe.fetch(&tx).map_err(query_err)?;
    match found.len() {
        0 => {}
        1 => {
            tx.commit().map_err(query_err)?;
            return Ok(LookupOutcome::Resolved(first(found)));
        }
        count => return Err(fail(probe.ambiguous(count))),
    }

    // Under the write lock nothing matches, so any constraint violation
    // is fatal and reported as SQLite words it.
    let value = insert_returning(&tx, lookup, &payload).map_err(query_err)?;
    tx.commit().map_err(query_err)?;

    debug!(
        table = %lookup.table,
        matches = %probe.describe(),
        value = %value,
        "created lookup row"
    );
    Ok(LookupOutcome::Created(value))
}

fn first(mut rows: Vec<Value>) -> Value {
    rows.swap_remove(0)
}

/// The SELECT for one lookup and the values bound to it.
struct Probe<'a> {
    lookup: &'a LookupRule,
    matches: &'a [(String, Value)],
    sql: String,
}

impl<'a> Probe<'a> {
    fn new(lookup: &'a LookupRule, matches: &'a [(String, Value)]) -> Self {
        let select = matches.iter().fold(
            Select::from(lookup.table.as_str()).column(lookup.get.as_str()),
            |select, (col, value)| {
                if value.is_null() {
                    select.filter_is_null(col.as_str())
                } else {
                    select.filter_eq(col.as_str())
                }
            },
        );
        Self {
            lookup,
            matches,
            sql: select.to_sql(),
        }
    }

    /// Null match values are `IS NULL` filters and bind nothing.
    fn params(&self) -> impl Iterator<Item = &Value> {
        self.matches
            .iter()
            .map(|(_, value)| value)
            .filter(|value| !value.is_null())
    }

    fn fetch(&self, conn: &Connection) -> rusqlite::Result<Vec<Value>> {
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let rows = stmt.query_map(params_from_iter(self.params()), |row| row.get(0))?;
        rows.collect()
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self
            .matches
            .iter()
            .map(|(col, value)| match value {
                Value::Null => format!("{col} IS NULL"),
                Value::Text(s) => format!("{col}='{s}'"),
                other => format!("{col}={other}"),
            })
            .collect();
        format!("{{{}}}", parts.join(", "))
    }

    fn ambiguous(&self, count: usize) -> LookupError {
        LookupError::Ambiguous {
            table: self.lookup.table.clone(),
            matches: self.describe(),
            count,
        }
    }
}

/// Insert the new row and read `get` back with RETURNING.
fn insert_returning(
    conn: &Connection,
    lookup: &LookupRule,
    payload: &[(String, Value)],
) -> rusqlite::Result<Value> {
    let sql = Insert::into(lookup.table.as_str())
        .columns(payload.iter().map(|(col, _)| col.as_str()))
        .returning([lookup.get.as_str()])
        .to_sql();
    debug!(sql = %sql, "lookup insert");

    let mut stmt = conn.prepare(&sql)?;
    let values = payload.iter().map(|(_, value)| value);
    let value = stmt.query_row(params_from_iter(values), |row| row.get(0))?;
    Ok(value)
}
