//! SQL generation module.
//!
//! A small type-safe builder for the SQLite statements the loader runs.
//! It includes:
//!
//! - [`query`] - SELECT builder used by lookups
//! - [`dml`] - INSERT with ON CONFLICT / RETURNING
//! - [`token`] - Token types for SQL generation

pub mod dml;
pub mod query;
pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use dml::{Insert, OnConflict};
pub use query::{Filter, Select};
pub use token::{quote_identifier, Token, TokenStream};
