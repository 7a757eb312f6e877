//! SchemaProvider trait and its SQLite implementation.

use std::collections::BTreeMap;

use rusqlite::Connection;
use thiserror::Error;
use tracing::debug;

use super::types::{ColumnInfo, ForeignKeyInfo, TableSchema};
use crate::session::Session;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors from schema introspection.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("table '{0}' does not exist in the target database")]
    TableNotFound(String),

    #[error("failed to introspect table '{table}': {source}")]
    Query {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Source of target table metadata.
///
/// The loader is schema-agnostic: everything it knows about a table comes
/// through this trait.
pub trait SchemaProvider {
    /// Describe `table`, failing with [`SchemaError::TableNotFound`] if it
    /// has no columns.
    fn table_schema(&self, table: &str) -> SchemaResult<TableSchema>;

    /// Whether `table` exists.
    fn table_exists(&self, table: &str) -> SchemaResult<bool> {
        match self.table_schema(table) {
            Ok(_) => Ok(true),
            Err(SchemaError::TableNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl SchemaProvider for Connection {
    fn table_schema(&self, table: &str) -> SchemaResult<TableSchema> {
        let query_err = |source| SchemaError::Query {
            table: table.to_string(),
            source,
        };

        let mut stmt = self
            .prepare(
                "SELECT name, type, \"notnull\", dflt_value IS NOT NULL, pk \
                 FROM pragma_table_info(?1) ORDER BY cid",
            )
            .map_err(query_err)?;
        let columns = stmt
            .query_map([table], |row| {
                let pk: u32 = row.get(4)?;
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    declared_type: row.get(1)?,
                    nullable: !row.get::<_, bool>(2)?,
                    has_default: row.get(3)?,
                    is_primary_key: pk > 0,
                    pk_position: pk,
                })
            })
            .map_err(query_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_err)?;

        if columns.is_empty() {
            return Err(SchemaError::TableNotFound(table.to_string()));
        }

        let mut stmt = self
            .prepare(
                "SELECT id, \"table\", \"from\", \"to\" \
                 FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(query_err)?;

        // Composite keys span several rows sharing one id.
        let mut grouped: BTreeMap<i64, ForeignKeyInfo> = BTreeMap::new();
        for row in rows {
            let (id, references_table, from, to) = row.map_err(query_err)?;
            let fk = grouped.entry(id).or_insert_with(|| ForeignKeyInfo {
                columns: Vec::new(),
                references_table,
                references_columns: Vec::new(),
            });
            fk.columns.push(from);
            fk.references_columns.push(to.unwrap_or_default());
        }

        debug!(
            table,
            columns = columns.len(),
            foreign_keys = grouped.len(),
            "introspected target table"
        );

        Ok(TableSchema {
            name: table.to_string(),
            columns,
            foreign_keys: grouped.into_values().collect(),
        })
    }
}

impl SchemaProvider for Session {
    fn table_schema(&self, table: &str) -> SchemaResult<TableSchema> {
        self.conn().table_schema(table)
    }
}
