//! End-to-end load from a CSV file into a SQLite table.
//!
//! ```text
//! spec ──► CSV ──► preflight ──► open session ──► introspect target
//!                                                      │
//!      persist ◄── pre-dedupe ◄── materialize ◄────────┘
//! ```
//!
//! Everything that can fail without touching the database (spec
//! validation, CSV reading, `from` fields missing from the header) fails
//! before the database is opened.
//!
//! # Example
//!
//! ```ignore
//! use rowmap::load::{load, LoadOptions};
//!
//! let report = load(
//!     Path::new("results.db"),
//!     Path::new("scores.csv"),
//!     Path::new("scores.yaml"),
//!     &LoadOptions::default(),
//! )?;
//! println!("Loaded {} rows into '{}'.", report.rows_written, report.table);
//! ```

use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::input::{read_csv, Header, InputError, InputOptions, InputTable};
use crate::materialize::{dedupe, materialize, MappedBatch};
use crate::metadata::{SchemaError, SchemaProvider, TableSchema};
use crate::persist::{persist, PersistError};
use crate::resolve::ResolveError;
use crate::session::{Session, SessionError, SessionOptions};
use crate::spec::{MappingSpec, SpecError};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort a load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("mapping failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub type LoadResult<T> = Result<T, LoadError>;

// ============================================================================
// Options
// ============================================================================

/// Options for a load.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub input: InputOptions,
    pub session: SessionOptions,
}

impl LoadOptions {
    pub fn with_input(mut self, input: InputOptions) -> Self {
        self.input = input;
        self
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }
}

// ============================================================================
// Warnings and report
// ============================================================================

/// Non-fatal findings. Logged as they occur and returned in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// NOT NULL columns without a default that no rule fills.
    MissingRequired { table: String, columns: Vec<String> },
    /// Mapped columns the target table does not have.
    UnknownTargetColumns { table: String, columns: Vec<String> },
    /// Input columns no rule reads.
    UnusedInputColumns { columns: Vec<String> },
    /// A lookup points at a table that does not exist.
    MissingLookupTable { column: String, table: String },
    /// `as_type` produced null for values it could not convert.
    CoercionFailures { column: String, count: usize },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::MissingRequired { table, columns } => write!(
                f,
                "mapped data for '{table}' is missing NOT NULL columns without defaults: {}",
                columns.join(", ")
            ),
            LoadWarning::UnknownTargetColumns { table, columns } => write!(
                f,
                "mapped columns not present in table '{table}': {}",
                columns.join(", ")
            ),
            LoadWarning::UnusedInputColumns { columns } => write!(
                f,
                "input columns not used by the spec: {}",
                columns.join(", ")
            ),
            LoadWarning::MissingLookupTable { column, table } => write!(
                f,
                "lookup for column '{column}' references missing table '{table}'"
            ),
            LoadWarning::CoercionFailures { column, count } => write!(
                f,
                "column '{column}': {count} value(s) could not be converted and were set to null"
            ),
        }
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub table: String,
    /// Records read from the input file.
    pub input_rows: usize,
    /// Rows removed by pre-dedupe.
    pub deduplicated: usize,
    /// Rows affected as reported by SQLite.
    pub rows_written: usize,
    pub warnings: Vec<LoadWarning>,
}

// ============================================================================
// Entry points
// ============================================================================

/// Load `csv` into the database at `db` as described by the spec file.
pub fn load(db: &Path, csv: &Path, spec: &Path, options: &LoadOptions) -> LoadResult<LoadReport> {
    let spec = MappingSpec::load(spec)?;
    let input = read_csv(csv, &options.input)?;
    preflight(&spec, &input)?;

    let mut session = Session::open(db, &options.session)?;
    let report = load_table(&mut session, &spec, &input)?;
    session.close()?;
    Ok(report)
}

/// Checks that need only the spec and the input.
pub fn preflight(spec: &MappingSpec, input: &InputTable) -> LoadResult<()> {
    input.require_fields(&spec.direct_fields())?;
    Ok(())
}

/// Run a validated spec over already-read input on an open session.
pub fn load_table(
    session: &mut Session,
    spec: &MappingSpec,
    input: &InputTable,
) -> LoadResult<LoadReport> {
    let schema = session.table_schema(&spec.table)?;

    let mut warnings = input_warnings(spec, input.header());
    warnings.extend(target_warnings(spec, &schema));
    for (column, lookup) in spec.lookups() {
        if !session.table_exists(&lookup.table)? {
            warnings.push(LoadWarning::MissingLookupTable {
                column: column.to_string(),
                table: lookup.table.clone(),
            });
        }
    }
    for warning in &warnings {
        warn!("{warning}");
    }

    let MappedBatch {
        columns,
        rows,
        coercion_failures,
    } = materialize(session, spec, input.records())?;
    for (column, count) in coercion_failures {
        let warning = LoadWarning::CoercionFailures { column, count };
        warn!("{warning}");
        warnings.push(warning);
    }

    let mapped = rows.len();
    let batch = MappedBatch {
        columns,
        rows: dedupe(rows, &spec.pre_dedupe_on),
        coercion_failures: Default::default(),
    };
    let deduplicated = mapped - batch.len();

    let rows_written = persist(session, &batch, &spec.table, &spec.mode)?;
    info!(
        table = %spec.table,
        mode = spec.mode.name(),
        input_rows = input.len(),
        deduplicated,
        rows_written,
        "Loaded {rows_written} rows"
    );

    Ok(LoadReport {
        table: spec.table.clone(),
        input_rows: input.len(),
        deduplicated,
        rows_written,
        warnings,
    })
}

/// Input columns that no rule reads.
pub fn input_warnings(spec: &MappingSpec, header: &Header) -> Vec<LoadWarning> {
    let used = spec.input_fields();
    let unused: Vec<String> = header
        .names()
        .iter()
        .filter(|name| !used.contains(*name))
        .cloned()
        .collect();
    if unused.is_empty() {
        Vec::new()
    } else {
        vec![LoadWarning::UnusedInputColumns { columns: unused }]
    }
}

/// Mapped columns compared with the target table.
pub fn target_warnings(spec: &MappingSpec, schema: &TableSchema) -> Vec<LoadWarning> {
    let mut warnings = Vec::new();

    let unknown: Vec<String> = spec
        .columns
        .iter()
        .filter(|c| !schema.has_column(&c.name))
        .map(|c| c.name.clone())
        .collect();
    if !unknown.is_empty() {
        warnings.push(LoadWarning::UnknownTargetColumns {
            table: spec.table.clone(),
            columns: unknown,
        });
    }

    let missing: Vec<String> = schema
        .required_columns()
        .into_iter()
        .filter(|c| spec.column(c).is_none())
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        warnings.push(LoadWarning::MissingRequired {
            table: spec.table.clone(),
            columns: missing,
        });
    }

    warnings
}
