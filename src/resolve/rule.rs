//! Rule resolution: source, then transforms, then type coercion.

use indexmap::IndexMap;
use tracing::trace;

use super::lookup::{resolve_lookup, LookupError};
use super::{ResolveError, ResolveResult};
use crate::expr::{Bindings, EvalError};
use crate::input::Record;
use crate::session::Session;
use crate::spec::{AsType, Rule, RuleSource, Transform};
use crate::value::Value;

/// The record being mapped and the columns resolved for it so far.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub record: &'a Record,
    pub siblings: &'a IndexMap<String, Value>,
}

impl<'a> RowContext<'a> {
    pub fn new(record: &'a Record, siblings: &'a IndexMap<String, Value>) -> Self {
        Self { record, siblings }
    }

    fn bindings(&self) -> Bindings<'a> {
        Bindings::new(self.record, self.siblings)
    }
}

/// A resolved value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Value,
    /// `as_type` could not convert a non-null value and produced null.
    pub coercion_failed: bool,
}

impl Resolution {
    fn ok(value: Value) -> Self {
        Self {
            value,
            coercion_failed: false,
        }
    }
}

/// Resolve `rule` for one record.
///
/// `column` names the rule in error messages. Lookup rules need the
/// session because they query, and may insert into, other tables.
pub fn resolve_rule(
    session: &mut Session,
    ctx: &RowContext<'_>,
    column: &str,
    rule: &Rule,
) -> ResolveResult<Resolution> {
    let resolution = match &rule.source {
        RuleSource::Lookup(lookup) => {
            let value = resolve_lookup(session, ctx, column, lookup)?.into_value();
            post_process(value, &rule.transforms, rule.as_type)
        }
        _ => resolve_plain(ctx, column, rule)?,
    };
    trace!(
        column,
        line = ctx.record.line(),
        value = %resolution.value,
        "resolved"
    );
    Ok(resolution)
}

/// Resolve a rule that cannot contain a lookup, such as a lookup's match
/// and defaults entries.
pub(crate) fn resolve_plain(
    ctx: &RowContext<'_>,
    column: &str,
    rule: &Rule,
) -> ResolveResult<Resolution> {
    let eval_err = |source: EvalError| ResolveError::Eval {
        column: column.to_string(),
        line: ctx.record.line(),
        source,
    };

    let raw = match &rule.source {
        RuleSource::Field(name) => ctx
            .record
            .get(name)
            .cloned()
            .ok_or_else(|| eval_err(EvalError::MissingField(name.clone())))?,
        RuleSource::Const(value) => value.clone(),
        RuleSource::Expr(expr) => expr.evaluate(&ctx.bindings()).map_err(eval_err)?,
        RuleSource::Lookup(lookup) => {
            return Err(ResolveError::Lookup {
                column: column.to_string(),
                line: ctx.record.line(),
                source: LookupError::Nested {
                    table: lookup.table.clone(),
                },
            })
        }
    };
    Ok(post_process(raw, &rule.transforms, rule.as_type))
}

/// Apply the transform chain, then `as_type`.
pub fn post_process(value: Value, transforms: &[Transform], as_type: Option<AsType>) -> Resolution {
    let value = apply_transforms(value, transforms);
    match as_type {
        Some(target) => coerce(value, target),
        None => Resolution::ok(value),
    }
}

/// Transforms work on the rendered string; null renders as empty.
fn apply_transforms(value: Value, transforms: &[Transform]) -> Value {
    if transforms.is_empty() {
        return value;
    }
    let text = transforms
        .iter()
        .fold(value.render(), |acc, t| t.apply(&acc));
    Value::Text(text)
}

/// Best-effort conversion. Null stays null for int and float.
fn coerce(value: Value, target: AsType) -> Resolution {
    if value.is_null() {
        return match target {
            AsType::Str => Resolution::ok(Value::Text(String::new())),
            AsType::Int | AsType::Float => Resolution::ok(Value::Null),
        };
    }
    let converted = match target {
        AsType::Int => value.to_int().map(Value::Int),
        AsType::Float => value.to_float().map(Value::Float),
        AsType::Str => Some(Value::Text(value.render())),
    };
    match converted {
        Some(v) => Resolution::ok(v),
        None => Resolution {
            value: Value::Null,
            coercion_failed: true,
        },
    }
}
