//! Evaluator for computed-column expressions.
//!
//! Expressions see exactly two bindings: the input record (`row`) and the
//! columns already resolved for the current mapped row (bare identifiers).
//! Everything else is a closed function table; there is no way to reach
//! the process, the filesystem, or the database from an expression.

use std::cmp::Ordering;

use indexmap::IndexMap;
use thiserror::Error;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::input::Record;
use crate::spec::Transform;
use crate::value::Value;

/// Result type for expression evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while evaluating an expression against a row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown name '{0}' (bare names refer to columns resolved earlier in the row)")]
    UnknownName(String),

    #[error("row has no field '{0}'")]
    MissingField(String),

    #[error("unsupported operand types for {op}: {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("bad operand type for {op}: {found}")]
    BadOperand { op: &'static str, found: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("negative number cannot be raised to a fractional power")]
    FractionalPower,

    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), got {found}")]
    BadArity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: &'static str },

    #[error("'row' must be indexed, e.g. row[\"field\"]")]
    BareRow,
}

/// Names in the fixed function table.
pub const FUNCTIONS: &[&str] = &[
    "str", "int", "float", "len", "lower", "upper", "strip", "title", "abs", "round", "min",
    "max", "coalesce",
];

/// What an expression can see.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub record: &'a Record,
    pub siblings: &'a IndexMap<String, Value>,
}

impl<'a> Bindings<'a> {
    pub fn new(record: &'a Record, siblings: &'a IndexMap<String, Value>) -> Self {
        Self { record, siblings }
    }
}

/// Evaluate an expression.
pub fn evaluate(expr: &Expr, env: &Bindings<'_>) -> EvalResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Name(name) => env
            .siblings
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownName(name.clone())),
        Expr::Row => Err(EvalError::BareRow),
        Expr::Field(key) => {
            let key = field_key(evaluate(key, env)?)?;
            env.record
                .get(&key)
                .cloned()
                .ok_or(EvalError::MissingField(key))
        }
        Expr::FieldOr { key, default } => {
            let key = field_key(evaluate(key, env)?)?;
            match env.record.get(&key) {
                Some(v) => Ok(v.clone()),
                None => evaluate(default, env),
            }
        }
        Expr::Index { base, index } => {
            let base = evaluate(base, env)?;
            let index = evaluate(index, env)?;
            index_value(&base, &index)
        }
        Expr::Unary { op, operand } => {
            let v = evaluate(operand, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => negate(v),
            }
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let l = evaluate(left, env)?;
                if l.is_truthy() {
                    evaluate(right, env)
                } else {
                    Ok(l)
                }
            }
            BinaryOp::Or => {
                let l = evaluate(left, env)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    evaluate(right, env)
                }
            }
            _ => {
                let l = evaluate(left, env)?;
                let r = evaluate(right, env)?;
                binary(*op, l, r)
            }
        },
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            if evaluate(cond, env)?.is_truthy() {
                evaluate(then, env)
            } else {
                evaluate(otherwise, env)
            }
        }
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|a| evaluate(a, env))
                .collect::<EvalResult<Vec<_>>>()?;
            call(name, args)
        }
    }
}

fn field_key(key: Value) -> EvalResult<String> {
    match key {
        Value::Text(s) => Ok(s),
        other => Err(EvalError::BadOperand {
            op: "row[...]",
            found: other.type_name(),
        }),
    }
}

fn index_value(base: &Value, index: &Value) -> EvalResult<Value> {
    let (Value::Text(s), Value::Int(i)) = (base, index) else {
        return Err(EvalError::TypeMismatch {
            op: "[]",
            left: base.type_name(),
            right: index.type_name(),
        });
    };
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let pos = if *i < 0 { len as i64 + i } else { *i };
    usize::try_from(pos)
        .ok()
        .and_then(|p| chars.get(p))
        .map(|c| Value::Text(c.to_string()))
        .ok_or(EvalError::IndexOutOfRange { index: *i, len })
}

// ============================================================================
// Arithmetic
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(v: &Value) -> Option<Num> {
        match v {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(n) => Some(Num::Int(*n)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }
}

fn negate(v: Value) -> EvalResult<Value> {
    match Num::of(&v) {
        Some(Num::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or(EvalError::Overflow("-")),
        Some(Num::Float(f)) => Ok(Value::Float(-f)),
        None if v.is_null() => Ok(Value::Null),
        None => Err(EvalError::BadOperand {
            op: "unary -",
            found: v.type_name(),
        }),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(&l, &r))),
        BinaryOp::NotEq => return Ok(Value::Bool(!values_equal(&l, &r))),
        _ => {}
    }

    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let ord = compare(op.symbol(), &l, &r)?;
            let result = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Lte => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => {
            if let (Value::Text(a), Value::Text(b)) = (&l, &r) {
                return Ok(Value::Text(format!("{}{}", a, b)));
            }
            arithmetic(op, &l, &r)
        }
        _ => arithmetic(op, &l, &r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> EvalResult<Value> {
    let (Some(a), Some(b)) = (Num::of(l), Num::of(r)) else {
        return Err(EvalError::TypeMismatch {
            op: op.symbol(),
            left: l.type_name(),
            right: r.type_name(),
        });
    };

    if let (Num::Int(a), Num::Int(b)) = (a, b) {
        return int_arithmetic(op, a, b);
    }

    let (a, b) = (a.as_f64(), b.as_f64());
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(EvalError::DivisionByZero)
        }
        BinaryOp::Pow => return float_pow(a, b),
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => {
            let m = a % b;
            if m != 0.0 && (m < 0.0) != (b < 0.0) {
                m + b
            } else {
                m
            }
        }
        _ => unreachable!("non-arithmetic operator {:?}", op),
    };
    Ok(Value::Float(value))
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> EvalResult<Value> {
    let overflow = || EvalError::Overflow(op.symbol());
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Pow if b < 0 => float_pow(a as f64, b as f64),
        BinaryOp::Pow => u32::try_from(b)
            .ok()
            .and_then(|exp| a.checked_pow(exp))
            .map(Value::Int)
            .ok_or_else(overflow),
        _ if b == 0 => Err(EvalError::DivisionByZero),
        BinaryOp::Div => Ok(Value::Float(a as f64 / b as f64)),
        BinaryOp::FloorDiv => {
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let adjust = (a % b != 0) && ((a < 0) != (b < 0));
            Ok(Value::Int(if adjust { q - 1 } else { q }))
        }
        BinaryOp::Mod => {
            let m = a.checked_rem(b).ok_or_else(overflow)?;
            Ok(Value::Int(if m != 0 && (m < 0) != (b < 0) { m + b } else { m }))
        }
        _ => unreachable!("non-arithmetic operator {:?}", op),
    }
}

fn float_pow(a: f64, b: f64) -> EvalResult<Value> {
    if a == 0.0 && b < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    if a < 0.0 && b.is_finite() && b.fract() != 0.0 {
        return Err(EvalError::FractionalPower);
    }
    Ok(Value::Float(a.powf(b)))
}

/// Total equality: numbers compare by value across int/float/bool, other
/// types only equal themselves.
pub fn values_equal(l: &Value, r: &Value) -> bool {
    match (Num::of(l), Num::of(r)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => match (l, r) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        },
    }
}

fn compare(op: &'static str, l: &Value, r: &Value) -> EvalResult<Ordering> {
    match (Num::of(l), Num::of(r)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a.cmp(&b)),
        (Some(a), Some(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .ok_or(EvalError::BadOperand { op, found: "float" }),
        _ => match (l, r) {
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            _ => Err(EvalError::TypeMismatch {
                op,
                left: l.type_name(),
                right: r.type_name(),
            }),
        },
    }
}

// ============================================================================
// Function table
// ============================================================================

fn arity(
    function: &'static str,
    args: &[Value],
    min: usize,
    max: usize,
    expected: &'static str,
) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::BadArity {
            function,
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

fn string_op(function: &'static str, transform: Transform, args: &[Value]) -> EvalResult<Value> {
    arity(function, args, 1, 1, "1")?;
    Ok(Value::Text(transform.apply(&args[0].render())))
}

fn call(name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "str" => {
            arity("str", &args, 1, 1, "1")?;
            Ok(Value::Text(args[0].render()))
        }
        "int" => {
            arity("int", &args, 1, 1, "1")?;
            let v = &args[0];
            if v.is_null() {
                return Ok(Value::Null);
            }
            v.to_int().map(Value::Int).ok_or_else(|| EvalError::Conversion {
                value: v.render(),
                target: "int",
            })
        }
        "float" => {
            arity("float", &args, 1, 1, "1")?;
            let v = &args[0];
            if v.is_null() {
                return Ok(Value::Null);
            }
            v.to_float()
                .map(Value::Float)
                .ok_or_else(|| EvalError::Conversion {
                    value: v.render(),
                    target: "float",
                })
        }
        "len" => {
            arity("len", &args, 1, 1, "1")?;
            match &args[0] {
                Value::Text(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(EvalError::BadOperand {
                    op: "len()",
                    found: other.type_name(),
                }),
            }
        }
        "lower" => string_op("lower", Transform::Lower, &args),
        "upper" => string_op("upper", Transform::Upper, &args),
        "title" => string_op("title", Transform::Title, &args),
        "strip" => {
            arity("strip", &args, 1, 2, "1 or 2")?;
            let text = args[0].render();
            match args.get(1) {
                None | Some(Value::Null) => Ok(Value::Text(Transform::Strip.apply(&text))),
                Some(chars) => {
                    let set: Vec<char> = chars.render().chars().collect();
                    Ok(Value::Text(
                        text.trim_matches(|c| set.contains(&c)).to_string(),
                    ))
                }
            }
        }
        "abs" => {
            arity("abs", &args, 1, 1, "1")?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                v => match Num::of(v) {
                    Some(Num::Int(n)) => n
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or(EvalError::Overflow("abs")),
                    Some(Num::Float(f)) => Ok(Value::Float(f.abs())),
                    None => Err(EvalError::BadOperand {
                        op: "abs()",
                        found: v.type_name(),
                    }),
                },
            }
        }
        "round" => {
            arity("round", &args, 1, 2, "1 or 2")?;
            round(&args[0], args.get(1))
        }
        "min" => extremum("min", args, Ordering::Less),
        "max" => extremum("max", args, Ordering::Greater),
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or_default()),
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

fn round(value: &Value, digits: Option<&Value>) -> EvalResult<Value> {
    let digits = match digits {
        None | Some(Value::Null) => None,
        Some(Value::Int(d)) => Some(*d),
        Some(other) => {
            return Err(EvalError::BadOperand {
                op: "round() digits",
                found: other.type_name(),
            })
        }
    };

    match (Num::of(value), digits) {
        _ if value.is_null() => Ok(Value::Null),
        (Some(Num::Int(n)), _) => Ok(Value::Int(n)),
        (Some(Num::Float(f)), None) => float_round_int(f.round_ties_even()),
        (Some(Num::Float(f)), Some(d)) => {
            let d = i32::try_from(d.clamp(-308, 308)).unwrap_or(0);
            let scale = 10f64.powi(d);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (None, _) => Err(EvalError::BadOperand {
            op: "round()",
            found: value.type_name(),
        }),
    }
}

fn float_round_int(f: f64) -> EvalResult<Value> {
    Value::Float(f)
        .to_int()
        .map(Value::Int)
        .ok_or(EvalError::Overflow("round"))
}

fn extremum(function: &'static str, args: Vec<Value>, keep: Ordering) -> EvalResult<Value> {
    if args.is_empty() {
        return Err(EvalError::BadArity {
            function,
            expected: "at least 1",
            found: 0,
        });
    }
    let mut best: Option<Value> = None;
    for v in args.into_iter().filter(|v| !v.is_null()) {
        best = Some(match best {
            None => v,
            Some(current) => {
                if compare(function, &v, &current)? == keep {
                    v
                } else {
                    current
                }
            }
        });
    }
    Ok(best.unwrap_or_default())
}
