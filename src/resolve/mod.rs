//! Per-record rule resolution.
//!
//! [`rule`] turns a [`Rule`](crate::spec::Rule) into one value for one
//! input record; [`lookup`] handles the foreign-key rules that query (and
//! possibly write to) other tables.

pub mod lookup;
pub mod rule;

use thiserror::Error;

use crate::expr::EvalError;

pub use lookup::{resolve_lookup, LookupError, LookupOutcome};
pub use rule::{resolve_rule, Resolution, RowContext};

/// Result type for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Fatal errors while resolving a record.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("line {line}, column '{column}': {source}")]
    Eval {
        column: String,
        line: u64,
        #[source]
        source: EvalError,
    },

    #[error("line {line}, column '{column}': {source}")]
    Lookup {
        column: String,
        line: u64,
        #[source]
        source: LookupError,
    },
}

impl ResolveError {
    /// The lookup error, if this is one.
    pub fn as_lookup(&self) -> Option<&LookupError> {
        match self {
            ResolveError::Lookup { source, .. } => Some(source),
            ResolveError::Eval { .. } => None,
        }
    }
}
