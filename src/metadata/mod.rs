//! Target schema introspection.
//!
//! The loader never creates or alters tables. It reads what SQLite reports
//! about the target and uses that only for warnings:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        SchemaProvider        │   table_schema(table) -> TableSchema
//! └──────────────┬───────────────┘
//!                │
//!                ▼
//! ┌──────────────────────────────┐
//! │  Session / rusqlite          │   pragma_table_info
//! │  Connection                  │   pragma_foreign_key_list
//! └──────────────────────────────┘
//! ```

mod provider;
mod types;

pub use provider::{SchemaError, SchemaProvider, SchemaResult};
pub use types::{ColumnInfo, ForeignKeyInfo, TableSchema};
