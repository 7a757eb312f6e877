//! CSV input records.
//!
//! The whole file is read before mapping begins. Each record shares one
//! header index, so field lookup is a hash probe plus a vector index.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::ReaderBuilder;
use thiserror::Error;
use tracing::debug;

use crate::value::Value;

/// Result type for input operations.
pub type InputResult<T> = Result<T, InputError>;

/// Errors reading input data.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read CSV '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("CSV '{}' has duplicate header '{name}'", .path.display())]
    DuplicateHeader { path: PathBuf, name: String },

    #[error("CSV '{}' has no field(s) {} used by the spec (header: {})", .path.display(), .missing.join(", "), .available.join(", "))]
    MissingFields {
        path: PathBuf,
        missing: Vec<String>,
        available: Vec<String>,
    },
}

/// How to read a CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputOptions {
    pub delimiter: u8,
    /// Type columns whose non-empty cells are all numeric.
    pub infer_types: bool,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            infer_types: true,
        }
    }
}

/// Column names with a name→position index.
#[derive(Debug, PartialEq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    fn new(names: Vec<String>) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(name.clone());
            }
        }
        Ok(Self { names, index })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One input row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    header: Arc<Header>,
    values: Vec<Value>,
    line: u64,
}

impl Record {
    /// Build a standalone record, mainly for tests and callers that do not
    /// read from CSV.
    ///
    /// Later pairs win if a name repeats.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut names = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let mut index = HashMap::new();
        for (name, value) in pairs {
            let name = name.into();
            match index.get(&name) {
                Some(&i) => values[i] = value,
                None => {
                    index.insert(name.clone(), names.len());
                    names.push(name);
                    values.push(value);
                }
            }
        }
        Self {
            header: Arc::new(Header { names, index }),
            values,
            line: 0,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.header.position(field).and_then(|i| self.values.get(i))
    }

    /// Source line in the input file, 0 when not read from a file.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.header
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// A fully read input file.
#[derive(Debug, Clone)]
pub struct InputTable {
    path: PathBuf,
    header: Arc<Header>,
    records: Vec<Record>,
}

impl InputTable {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fail if any of `fields` is not a header column.
    pub fn require_fields(&self, fields: &[String]) -> InputResult<()> {
        let missing: Vec<String> = fields
            .iter()
            .filter(|f| !self.header.contains(f))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(InputError::MissingFields {
            path: self.path.clone(),
            missing,
            available: self.header.names().to_vec(),
        })
    }
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path, options: &InputOptions) -> InputResult<InputTable> {
    let file = std::fs::File::open(path).map_err(|e| InputError::Csv {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    read_csv_from(file, path, options)
}

/// Read CSV data from any reader. `path` is used only in error messages.
pub fn read_csv_from<R: Read>(
    source: R,
    path: &Path,
    options: &InputOptions,
) -> InputResult<InputTable> {
    let csv_error = |source: csv::Error| InputError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(options.delimiter)
        .from_reader(source);

    let names: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let header = Arc::new(Header::new(names).map_err(|name| InputError::DuplicateHeader {
        path: path.to_path_buf(),
        name,
    })?);

    let mut raw_rows: Vec<(u64, Vec<String>)> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map_or(0, |p| p.line());
        raw_rows.push((line, record.iter().map(str::to_string).collect()));
    }

    let kinds = if options.infer_types {
        infer_column_kinds(header.len(), &raw_rows)
    } else {
        vec![ColumnKind::Text; header.len()]
    };

    let records: Vec<Record> = raw_rows
        .into_iter()
        .map(|(line, cells)| Record {
            header: Arc::clone(&header),
            values: cells
                .iter()
                .zip(&kinds)
                .map(|(cell, kind)| kind.convert(cell))
                .collect(),
            line,
        })
        .collect();

    debug!(
        path = %path.display(),
        columns = header.len(),
        rows = records.len(),
        "read CSV input"
    );

    Ok(InputTable {
        path: path.to_path_buf(),
        header,
        records,
    })
}

// ============================================================================
// Type inference
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    fn convert(self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnKind::Int => cell
                .trim()
                .parse::<i64>()
                .map_or_else(|_| Value::from(cell), Value::Int),
            ColumnKind::Float => cell
                .trim()
                .parse::<f64>()
                .map_or_else(|_| Value::from(cell), Value::Float),
            ColumnKind::Text => Value::from(cell),
        }
    }
}

/// A column is Int if every non-empty cell is an integer, Float if every
/// non-empty cell is a finite number, Text otherwise. All-empty columns
/// stay Text (their cells are null either way).
fn infer_column_kinds(width: usize, rows: &[(u64, Vec<String>)]) -> Vec<ColumnKind> {
    (0..width)
        .map(|col| {
            let mut kind: Option<ColumnKind> = None;
            for cell in rows.iter().filter_map(|(_, cells)| cells.get(col)) {
                if cell.is_empty() {
                    continue;
                }
                let text = cell.trim();
                let cell_kind = if text.parse::<i64>().is_ok() {
                    ColumnKind::Int
                } else if text.parse::<f64>().is_ok_and(f64::is_finite) {
                    ColumnKind::Float
                } else {
                    return ColumnKind::Text;
                };
                kind = Some(match (kind, cell_kind) {
                    (Some(ColumnKind::Float), _) | (_, ColumnKind::Float) => ColumnKind::Float,
                    _ => ColumnKind::Int,
                });
            }
            kind.unwrap_or(ColumnKind::Text)
        })
        .collect()
}
