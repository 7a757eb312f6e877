//! Batch persistence.
//!
//! The whole batch is written in one transaction with one prepared
//! statement. Any failure rolls the batch back.

use rusqlite::params_from_iter;
use thiserror::Error;
use tracing::debug;

use crate::materialize::MappedBatch;
use crate::session::Session;
use crate::spec::LoadMode;
use crate::sql::{Insert, OnConflict};

/// Result type for persistence.
pub type PersistResult<T> = Result<T, PersistError>;

/// Persistence failures. SQLite's own message is kept verbatim.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to write to '{table}' (row {row}): {source}")]
    Write {
        table: String,
        /// 1-based index within the batch.
        row: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to write to '{table}': {source}")]
    Transaction {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Build the statement used for every row of a batch.
pub fn batch_statement(table: &str, columns: &[String], mode: &LoadMode) -> Insert {
    let insert = Insert::into(table).columns(columns.iter().cloned());
    match mode {
        LoadMode::Insert => insert,
        LoadMode::Upsert { key } => {
            let set = columns.iter().filter(|c| !key.contains(*c)).cloned();
            insert.on_conflict(OnConflict::do_update(key.iter().cloned(), set))
        }
    }
}

/// Write `batch` to `table`, returning the number of affected rows.
///
/// An empty batch returns 0 without opening a transaction.
pub fn persist(
    session: &mut Session,
    batch: &MappedBatch,
    table: &str,
    mode: &LoadMode,
) -> PersistResult<usize> {
    if batch.is_empty() {
        return Ok(0);
    }

    let tx_err = |source| PersistError::Transaction {
        table: table.to_string(),
        source,
    };

    let sql = batch_statement(table, &batch.columns, mode).to_sql();
    debug!(sql = %sql, rows = batch.len(), mode = mode.name(), "persisting batch");

    let tx = session.conn_mut().transaction().map_err(tx_err)?;
    let mut affected = 0;
    {
        let mut stmt = tx.prepare(&sql).map_err(tx_err)?;
        for (i, row) in batch.rows.iter().enumerate() {
            let values = batch.columns.iter().map(|c| row.get(c));
            affected += stmt
                .execute(params_from_iter(values))
                .map_err(|source| PersistError::Write {
                    table: table.to_string(),
                    row: i + 1,
                    source,
                })?;
        }
    }
    tx.commit().map_err(tx_err)?;
    Ok(affected)
}
