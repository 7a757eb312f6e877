//! Parser for computed-column expressions using chumsky.
//!
//! Precedence, loosest first: conditional (`a if c else b`), `or`, `and`,
//! `not`, comparison (non-chaining), `+ -`, `* / // %`, unary minus,
//! `**` (right-associative, so `-2 ** 2` is `-(2 ** 2)`), postfix (`[..]`,
//! `.name`, `.name(..)`).

use chumsky::input::ValueInput;
use chumsky::prelude::*;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::Token;
use crate::value::Value;

enum Postfix {
    Index(Expr),
    Attr(String),
    Method(String, Vec<Expr>),
}

fn apply_postfix(base: Expr, op: Postfix) -> Expr {
    match (base, op) {
        (Expr::Row, Postfix::Index(key)) => Expr::Field(Box::new(key)),
        (Expr::Row, Postfix::Attr(name)) => {
            Expr::Field(Box::new(Expr::Literal(Value::Text(name))))
        }
        (Expr::Row, Postfix::Method(name, mut args)) if name == "get" && !args.is_empty() => {
            let key = args.remove(0);
            let default = if args.is_empty() {
                Expr::Literal(Value::Null)
            } else {
                args.remove(0)
            };
            Expr::FieldOr {
                key: Box::new(key),
                default: Box::new(default),
            }
        }
        (base, Postfix::Index(index)) => Expr::Index {
            base: Box::new(base),
            index: Box::new(index),
        },
        (base, Postfix::Attr(name)) => Expr::Index {
            base: Box::new(base),
            index: Box::new(Expr::Literal(Value::Text(name))),
        },
        (base, Postfix::Method(name, args)) => {
            let mut all = Vec::with_capacity(args.len() + 1);
            all.push(base);
            all.extend(args);
            Expr::Call { name, args: all }
        }
    }
}

fn parse_number(text: &str, is_float: bool) -> Option<Value> {
    if is_float {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        text.parse::<i64>().ok().map(Value::Int)
    }
}

/// Resolve backslash escapes in a string literal body.
pub(crate) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Create the expression parser.
///
/// Generic over any `ValueInput` producing `Token` values with
/// `SimpleSpan` spans, same as the lexer/parser split elsewhere.
pub fn parser<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    recursive(|expr| {
        let ident = select! {
            Token::Ident(s) => s.to_string(),
        }
        .labelled("identifier");

        let number = select! {
            Token::Int(s) => (s, false),
            Token::Float(s) => (s, true),
        }
        .try_map(|(text, is_float), span| {
            parse_number(text, is_float)
                .map(Expr::Literal)
                .ok_or_else(|| Rich::custom(span, format!("invalid number literal '{}'", text)))
        })
        .labelled("number");

        let literal = select! {
            Token::Str(s) => Expr::Literal(Value::Text(unescape(s))),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
        }
        .labelled("literal");

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let call = ident
            .clone()
            .then(args.clone())
            .map(|(name, args)| Expr::Call { name, args });

        let name = ident.clone().map(|n| {
            if n == "row" {
                Expr::Row
            } else {
                Expr::Name(n)
            }
        });

        let atom = choice((
            number,
            literal,
            call,
            name,
            expr.clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        // ======================================================================
        // Postfix: row["x"], row.x, row.get("x", d), value.strip()
        // ======================================================================

        let postfix_op = choice((
            expr.clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map(Postfix::Index),
            just(Token::Dot)
                .ignore_then(ident.clone())
                .then(args.or_not())
                .map(|(name, args)| match args {
                    Some(args) => Postfix::Method(name, args),
                    None => Postfix::Attr(name),
                }),
        ));

        let postfix = atom.foldl(postfix_op.repeated(), apply_postfix).boxed();

        // ======================================================================
        // Arithmetic
        // ======================================================================

        // The exponent is itself a unary expression: 2 ** -1, 2 ** 3 ** 2.
        let unary = recursive(|unary| {
            let power = postfix
                .clone()
                .then(just(Token::StarStar).ignore_then(unary).or_not())
                .map(|(base, exponent)| match exponent {
                    Some(exponent) => Expr::binary(BinaryOp::Pow, base, exponent),
                    None => base,
                });

            just(Token::Minus)
                .to(UnaryOp::Neg)
                .repeated()
                .foldr(power, Expr::unary)
        })
        .boxed();

        let product_op = choice((
            just(Token::Star).to(BinaryOp::Mul),
            just(Token::SlashSlash).to(BinaryOp::FloorDiv),
            just(Token::Slash).to(BinaryOp::Div),
            just(Token::Percent).to(BinaryOp::Mod),
        ));

        let product = unary
            .clone()
            .foldl(product_op.then(unary).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            });

        let sum_op = choice((
            just(Token::Plus).to(BinaryOp::Add),
            just(Token::Minus).to(BinaryOp::Sub),
        ));

        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), |lhs, (op, rhs)| {
                Expr::binary(op, lhs, rhs)
            });

        // ======================================================================
        // Comparison and boolean logic
        // ======================================================================

        let compare_op = choice((
            just(Token::EqEq).to(BinaryOp::Eq),
            just(Token::NotEq).to(BinaryOp::NotEq),
            just(Token::Lte).to(BinaryOp::Lte),
            just(Token::Gte).to(BinaryOp::Gte),
            just(Token::Lt).to(BinaryOp::Lt),
            just(Token::Gt).to(BinaryOp::Gt),
        ));

        let comparison = sum
            .clone()
            .then(compare_op.then(sum).or_not())
            .map(|(lhs, rest)| match rest {
                Some((op, rhs)) => Expr::binary(op, lhs, rhs),
                None => lhs,
            })
            .boxed();

        let negation = just(Token::Not)
            .to(UnaryOp::Not)
            .repeated()
            .foldr(comparison, Expr::unary);

        let conjunction = negation.clone().foldl(
            just(Token::And).to(BinaryOp::And).then(negation).repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        let disjunction = conjunction.clone().foldl(
            just(Token::Or).to(BinaryOp::Or).then(conjunction).repeated(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        );

        disjunction
            .clone()
            .then(
                just(Token::If)
                    .ignore_then(disjunction)
                    .then_ignore(just(Token::Else))
                    .then(expr)
                    .or_not(),
            )
            .map(|(then, rest)| match rest {
                Some((cond, otherwise)) => Expr::Conditional {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                None => then,
            })
    })
}
