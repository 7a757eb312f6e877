//! Expression syntax tree.

use crate::value::Value;

/// Binary operators, lowest to highest precedence group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Bare identifier: a sibling column of the current mapped row.
    Name(String),
    /// The `row` binding itself. Only valid as the base of a field access.
    Row,
    /// `row[key]` / `row.key`.
    Field(Box<Expr>),
    /// `row.get(key)` / `row.get(key, default)`.
    FieldOr {
        key: Box<Expr>,
        default: Box<Expr>,
    },
    /// Indexing into a non-row value, e.g. `"abc"[0]`.
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `then if cond else otherwise`.
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Call into the fixed function table. Method syntax `x.f(a)` is
    /// lowered to `f(x, a)`.
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Record fields this expression reads with a literal key.
    ///
    /// Used to warn about input columns no rule references; dynamic keys
    /// are not reported.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Expr::Field(key) | Expr::FieldOr { key, .. } => {
                if let Expr::Literal(Value::Text(name)) = key.as_ref() {
                    out.push(name.clone());
                } else {
                    key.collect_fields(out);
                }
                if let Expr::FieldOr { default, .. } = self {
                    default.collect_fields(out);
                }
            }
            Expr::Index { base, index } => {
                base.collect_fields(out);
                index.collect_fields(out);
            }
            Expr::Unary { operand, .. } => operand.collect_fields(out),
            Expr::Binary { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_fields(out);
                then.collect_fields(out);
                otherwise.collect_fields(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_fields(out)),
            Expr::Literal(_) | Expr::Name(_) | Expr::Row => {}
        }
    }

    /// Sibling column names this expression reads.
    pub fn referenced_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names(&self, out: &mut Vec<String>) {
        match self {
            Expr::Name(name) => out.push(name.clone()),
            Expr::Field(key) => key.collect_names(out),
            Expr::FieldOr { key, default } => {
                key.collect_names(out);
                default.collect_names(out);
            }
            Expr::Index { base, index } => {
                base.collect_names(out);
                index.collect_names(out);
            }
            Expr::Unary { operand, .. } => operand.collect_names(out),
            Expr::Binary { left, right, .. } => {
                left.collect_names(out);
                right.collect_names(out);
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_names(out);
                then.collect_names(out);
                otherwise.collect_names(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_names(out)),
            Expr::Literal(_) | Expr::Row => {}
        }
    }
}
