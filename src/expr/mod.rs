//! Restricted expression language for computed columns.
//!
//! Expressions are lexed and parsed with chumsky into an [`Expr`] tree and
//! evaluated against an input record plus the columns already resolved for
//! the current row.
//!
//! ```ignore
//! use rowmap::expr;
//!
//! let parsed = expr::parse("row['first'].strip() + ' ' + row['last'].strip()")?;
//! assert_eq!(parsed.referenced_fields(), vec!["first", "last"]);
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::fmt;
use std::ops::Range;

use thiserror::Error;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::{evaluate, Bindings, EvalError, EvalResult, FUNCTIONS};

use crate::value::Value;

/// A syntax problem with its byte range in the expression source.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub span: Range<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {:?})", self.message, self.span)
    }
}

/// Errors from parsing expression source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("invalid expression `{source_text}`: {}", join_diagnostics(.diagnostics))]
    Syntax {
        source_text: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("expression `{source_text}` calls unknown function '{name}'")]
    UnknownFunction { source_text: String, name: String },
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A parsed expression together with its source text.
///
/// The source is kept so the expression can be written back out verbatim
/// when a spec is serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluate against the given bindings.
    pub fn evaluate(&self, env: &Bindings<'_>) -> EvalResult<Value> {
        evaluate(&self.ast, env)
    }

    /// Record fields read with a literal key.
    pub fn referenced_fields(&self) -> Vec<String> {
        self.ast.referenced_fields()
    }

    /// Sibling columns read by bare name.
    pub fn referenced_names(&self) -> Vec<String> {
        self.ast.referenced_names()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse expression source.
///
/// Besides syntax, calls are checked against the fixed function table so
/// a typo in a function name fails before any row is processed.
pub fn parse(source: &str) -> Result<Expression, ExprError> {
    use chumsky::error::Rich;
    use chumsky::input::Input;
    use chumsky::span::SimpleSpan;
    use chumsky::span::Span as _;
    use chumsky::Parser as _;

    let syntax_error = |diagnostics| ExprError::Syntax {
        source_text: source.to_string(),
        diagnostics,
    };

    // Step 1: Lexical analysis
    let (tokens, lex_errs) = lexer::lexer().parse(source).into_output_errors();
    let lex_diagnostics: Vec<Diagnostic> = lex_errs
        .into_iter()
        .map(|e: Rich<'_, char>| Diagnostic {
            span: e.span().start()..e.span().end(),
            message: e.to_string(),
        })
        .collect();

    let tokens: Vec<(lexer::Token<'_>, SimpleSpan)> = match tokens {
        Some(t) if lex_diagnostics.is_empty() => t,
        _ => return Err(syntax_error(lex_diagnostics)),
    };

    // Step 2: Parsing
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens.as_slice().map(
        eoi,
        |(tok, span): &(lexer::Token<'_>, SimpleSpan)| (tok, span),
    );

    let (ast, parse_errs) = parser::parser().parse(token_stream).into_output_errors();
    let parse_diagnostics: Vec<Diagnostic> = parse_errs
        .into_iter()
        .map(|e: Rich<'_, lexer::Token<'_>, SimpleSpan>| Diagnostic {
            span: e.span().start()..e.span().end(),
            message: e.to_string(),
        })
        .collect();

    let ast = match ast {
        Some(ast) if parse_diagnostics.is_empty() => ast,
        _ => return Err(syntax_error(parse_diagnostics)),
    };

    if let Some(name) = first_unknown_function(&ast) {
        return Err(ExprError::UnknownFunction {
            source_text: source.to_string(),
            name,
        });
    }

    Ok(Expression {
        source: source.to_string(),
        ast,
    })
}

fn first_unknown_function(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Call { name, args } => {
            if !FUNCTIONS.contains(&name.as_str()) {
                return Some(name.clone());
            }
            args.iter().find_map(first_unknown_function)
        }
        Expr::Field(key) => first_unknown_function(key),
        Expr::FieldOr { key, default } => {
            first_unknown_function(key).or_else(|| first_unknown_function(default))
        }
        Expr::Index { base, index } => {
            first_unknown_function(base).or_else(|| first_unknown_function(index))
        }
        Expr::Unary { operand, .. } => first_unknown_function(operand),
        Expr::Binary { left, right, .. } => {
            first_unknown_function(left).or_else(|| first_unknown_function(right))
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => first_unknown_function(cond)
            .or_else(|| first_unknown_function(then))
            .or_else(|| first_unknown_function(otherwise)),
        Expr::Literal(_) | Expr::Name(_) | Expr::Row => None,
    }
}
