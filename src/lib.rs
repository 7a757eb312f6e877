//! # rowmap
//!
//! A declarative loader that maps the rows of a CSV file into an existing
//! SQLite table, driven by a mapping spec instead of per-table code.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Mapping spec (YAML / JSON / TOML)              │
//! │   table, mode, key, pre_dedupe_on, column rules         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [spec + expr]
//! ┌─────────────────────────────────────────────────────────┐
//! │   MappingSpec (validated; expressions parsed)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [metadata]
//! ┌─────────────────────────────────────────────────────────┐
//! │   TableSchema of the target (warnings only)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [resolve + materialize]
//! ┌─────────────────────────────────────────────────────────┐
//! │   One mapped row per input record, lookups resolved,    │
//! │   then pre-dedupe (last occurrence wins)                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [persist]
//! ┌─────────────────────────────────────────────────────────┐
//! │   INSERT / INSERT ... ON CONFLICT DO UPDATE, one commit │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod expr;
pub mod input;
pub mod load;
pub mod logging;
pub mod materialize;
pub mod metadata;
pub mod persist;
pub mod resolve;
pub mod session;
pub mod spec;
pub mod sql;
pub mod value;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::input::{read_csv, InputOptions, InputTable, Record};
    pub use crate::load::{load, load_table, LoadError, LoadOptions, LoadReport, LoadWarning};
    pub use crate::metadata::{SchemaProvider, TableSchema};
    pub use crate::session::{Session, SessionOptions};
    pub use crate::spec::{LoadMode, MappingSpec, Rule, SpecFormat};
    pub use crate::value::Value;
}

// Also export at crate root for convenience
pub use load::{load, LoadError, LoadOptions, LoadReport};
pub use spec::MappingSpec;
pub use value::Value;
