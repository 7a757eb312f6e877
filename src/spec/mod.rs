//! Mapping specifications.
//!
//! A spec names the target table, the write mode, and one rule per target
//! column:
//!
//! ```yaml
//! table: measure
//! mode: upsert
//! key: [metric_id, subject_id]
//! pre_dedupe_on: [metric_id, subject_id]
//! columns:
//!   subject_id: { from: student_id, as_type: int }
//!   value:      { from: score, as_type: float }
//!   metric_id:
//!     lookup:
//!       table: metric
//!       get: id
//!       match:
//!         name: { const: Accuracy }
//!       create_if_missing: true
//!       defaults:
//!         description: { const: auto }
//! ```

pub mod document;
pub mod model;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub use document::{SpecDocument, SpecFormat};
pub use model::{AsType, ColumnSpec, LoadMode, LookupRule, MappingSpec, Rule, RuleSource, Transform};

/// Result type for spec operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// A single validation problem, located by a dotted path into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SpecIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors loading or validating a spec.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("failed to read spec '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse spec as {format}: {message}")]
    Parse { format: &'static str, message: String },

    #[error("invalid mapping spec ({} problem(s)):\n  {}", .0.len(), join_issues(.0))]
    Invalid(Vec<SpecIssue>),

    #[error("failed to write spec as {format}: {message}")]
    Serialize { format: &'static str, message: String },
}

fn join_issues(issues: &[SpecIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n  ")
}

impl SpecError {
    /// Validation problems, if this is a validation error.
    pub fn issues(&self) -> &[SpecIssue] {
        match self {
            SpecError::Invalid(issues) => issues,
            _ => &[],
        }
    }
}
