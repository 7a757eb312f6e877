//! SELECT builder for lookups.
//!
//! Lookups only ever need `SELECT <cols> FROM <table> WHERE <conjunction>`
//! where each condition compares a column with a bound value. A null
//! value cannot be compared with `=`, so it becomes `IS NULL` and binds
//! nothing.

use super::token::{Token, TokenStream};

/// One equality condition in a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `"col" = ?`
    Eq(String),
    /// `"col" IS NULL`
    IsNull(String),
}

/// SELECT statement over one table.
#[derive(Debug, Clone)]
#[must_use = "queries have no effect until converted to SQL with to_sql()"]
pub struct Select {
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
}

impl Select {
    /// Create a new SELECT from a table.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Add a projected column.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Add a `"col" = ?` condition.
    pub fn filter_eq(mut self, column: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq(column.into()));
        self
    }

    /// Add a `"col" IS NULL` condition.
    pub fn filter_is_null(mut self, column: impl Into<String>) -> Self {
        self.filters.push(Filter::IsNull(column.into()));
        self
    }

    /// Convert to SQL.
    pub fn to_sql(&self) -> String {
        self.to_tokens().serialize()
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Select)
            .space()
            .ident_list(&self.columns)
            .space()
            .push(Token::From)
            .space()
            .push(Token::Ident(self.table.clone()));

        for (i, filter) in self.filters.iter().enumerate() {
            ts.space()
                .push(if i == 0 { Token::Where } else { Token::And })
                .space();
            match filter {
                Filter::Eq(col) => {
                    ts.push(Token::Ident(col.clone()))
                        .space()
                        .push(Token::Eq)
                        .space()
                        .push(Token::Placeholder);
                }
                Filter::IsNull(col) => {
                    ts.push(Token::Ident(col.clone()))
                        .space()
                        .push(Token::IsNull);
                }
            }
        }

        ts
    }
}
