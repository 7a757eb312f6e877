//! DML (Data Manipulation Language) support.
//!
//! Builders for the parameterized INSERT statements the loader runs. Every
//! value is a `?` placeholder bound in column order.
//!
//! # Examples
//!
//! ```ignore
//! use rowmap::sql::{Insert, OnConflict};
//!
//! // Plain append
//! let insert = Insert::into("measure").columns(["subject", "value"]);
//!
//! // Upsert keyed on subject
//! let upsert = Insert::into("measure")
//!     .columns(["subject", "value"])
//!     .on_conflict(OnConflict::do_update(["subject"], ["value"]));
//! ```

use super::token::{Token, TokenStream};

// ============================================================================
// INSERT
// ============================================================================

/// Single-row INSERT statement with placeholder values.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Vec<String>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
        }
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add ON CONFLICT clause.
    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    /// Add RETURNING clause.
    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.returning = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Convert to SQL.
    pub fn to_sql(&self) -> String {
        self.to_tokens().serialize()
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        // INSERT INTO
        ts.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .push(Token::Ident(self.table.clone()));

        // Columns and placeholders. A column-less insert takes all defaults.
        if self.columns.is_empty() {
            ts.space().push(Token::Default).space().push(Token::Values);
        } else {
            ts.space().lparen().ident_list(&self.columns).rparen();
            ts.space().push(Token::Values).space().lparen();
            for i in 0..self.columns.len() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Placeholder);
            }
            ts.rparen();
        }

        // ON CONFLICT
        if let Some(ref conflict) = self.on_conflict {
            ts.space().append(&conflict.to_tokens());
        }

        // RETURNING
        if !self.returning.is_empty() {
            ts.space()
                .push(Token::Returning)
                .space()
                .ident_list(&self.returning);
        }

        ts
    }
}

/// `ON CONFLICT (..) DO UPDATE` clause for INSERT.
///
/// Each `set` column is overwritten with the value from the proposed row
/// (`excluded`). An empty `set` renders as `DO NOTHING`.
#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    pub conflict_columns: Vec<String>,
    pub set: Vec<String>,
}

impl OnConflict {
    /// Create ON CONFLICT (...) DO UPDATE SET col = excluded.col.
    pub fn do_update(
        conflict_columns: impl IntoIterator<Item = impl Into<String>>,
        set: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            conflict_columns: conflict_columns.into_iter().map(|c| c.into()).collect(),
            set: set.into_iter().map(|c| c.into()).collect(),
        }
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::On)
            .space()
            .push(Token::Conflict)
            .space()
            .lparen()
            .ident_list(&self.conflict_columns)
            .rparen()
            .space()
            .push(Token::Do)
            .space();
        if self.set.is_empty() {
            ts.push(Token::Nothing);
            return ts;
        }

        ts.push(Token::Update).space().push(Token::Set).space();
        for (i, col) in self.set.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(col.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .push(Token::Excluded)
                .push(Token::Dot)
                .push(Token::Ident(col.clone()));
        }
        ts
    }
}

// ============================================================================
// Tests
// ============================================================================
