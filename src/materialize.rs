//! Mapping records to rows, then pre-dedupe.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::input::Record;
use crate::resolve::{resolve_rule, ResolveResult, RowContext};
use crate::session::Session;
use crate::spec::MappingSpec;
use crate::value::{DedupeKey, Value};

/// One output row; columns in spec order.
pub type MappedRow = IndexMap<String, Value>;

/// The mapped batch plus per-column coercion failure counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedBatch {
    pub columns: Vec<String>,
    pub rows: Vec<MappedRow>,
    /// Only columns with at least one failure appear.
    pub coercion_failures: IndexMap<String, usize>,
}

impl MappedBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Resolve every column of every record, in input order.
///
/// Columns resolve in declaration order so expressions can read the
/// columns before them. The first fatal error stops the run; lookup rows
/// created up to that point stay committed.
pub fn materialize(
    session: &mut Session,
    spec: &MappingSpec,
    records: &[Record],
) -> ResolveResult<MappedBatch> {
    let mut batch = MappedBatch {
        columns: spec.columns.iter().map(|c| c.name.clone()).collect(),
        rows: Vec::with_capacity(records.len()),
        coercion_failures: IndexMap::new(),
    };

    for record in records {
        let mut row = MappedRow::with_capacity(spec.columns.len());
        for column in &spec.columns {
            let resolution = {
                let ctx = RowContext::new(record, &row);
                resolve_rule(session, &ctx, &column.name, &column.rule)?
            };
            if resolution.coercion_failed {
                *batch
                    .coercion_failures
                    .entry(column.name.clone())
                    .or_default() += 1;
            }
            row.insert(column.name.clone(), resolution.value);
        }
        batch.rows.push(row);
    }

    debug!(rows = batch.rows.len(), "materialized rows");
    Ok(batch)
}

/// Keep the last row for each distinct tuple of `on`.
///
/// Survivors keep the relative order in which they last appeared. Rows are
/// only dropped, never changed. An empty `on` keeps everything.
pub fn dedupe(rows: Vec<MappedRow>, on: &[String]) -> Vec<MappedRow> {
    if on.is_empty() {
        return rows;
    }

    let key_of = |row: &MappedRow| -> Vec<DedupeKey> {
        on.iter()
            .map(|col| row.get(col).map_or(DedupeKey::Null, Value::dedupe_key))
            .collect()
    };

    let mut last: HashMap<Vec<DedupeKey>, usize> = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        last.insert(key_of(row), i);
    }

    let before = rows.len();
    let kept: Vec<MappedRow> = rows
        .into_iter()
        .enumerate()
        .filter(|(i, row)| last.get(&key_of(row)) == Some(i))
        .map(|(_, row)| row)
        .collect();
    debug!(before, after = kept.len(), "pre-dedupe");
    kept
}
