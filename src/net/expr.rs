//! 守卫与速率表达式：对标识求值的纯函数。
//!
//! 表达式只读取标识，不持有状态；调度器只通过 [`Expr::eval`] 及其类型化变体
//! 使用它们，而不关心表达式的文本语法（见 [`crate::net::parse`]）。
use std::fmt;
use std::ops;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ids::PlaceId;
use crate::net::structure::Marking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(f64),
    Bool(bool),
    /// 库所当前托肯数。
    Tokens(PlaceId),
    Neg(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expected a {expected} value, found {found} ({value})")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
        value: Value,
    },
    #[error("place {0:?} is not part of the supplied marking")]
    UnknownPlace(PlaceId),
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn tokens(place: PlaceId) -> Self {
        Expr::Tokens(place)
    }

    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Cmp(op, Box::new(lhs), Box::new(rhs))
    }

    /// `tokens(place) >= n`
    pub fn at_least(place: PlaceId, n: u64) -> Self {
        Expr::cmp(CmpOp::Ge, Expr::Tokens(place), Expr::Const(n as f64))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    /// Conjunction of all `terms`; `true` when empty.
    pub fn all<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = Expr>,
    {
        terms
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or(Expr::Bool(true))
    }

    pub fn eval(&self, marking: &Marking) -> Result<Value, ExprError> {
        Ok(match self {
            Expr::Const(value) => Value::Number(*value),
            Expr::Bool(value) => Value::Bool(*value),
            Expr::Tokens(place) => {
                let tokens = marking
                    .0
                    .get(*place)
                    .ok_or(ExprError::UnknownPlace(*place))?;
                Value::Number(*tokens as f64)
            }
            Expr::Neg(inner) => Value::Number(-inner.eval_number(marking)?),
            Expr::Arith(op, lhs, rhs) => {
                let l = lhs.eval_number(marking)?;
                let r = rhs.eval_number(marking)?;
                Value::Number(match op {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div => l / r,
                })
            }
            Expr::Cmp(op, lhs, rhs) => {
                let l = lhs.eval_number(marking)?;
                let r = rhs.eval_number(marking)?;
                Value::Bool(match op {
                    CmpOp::Lt => l < r,
                    CmpOp::Le => l <= r,
                    CmpOp::Gt => l > r,
                    CmpOp::Ge => l >= r,
                    CmpOp::Eq => l == r,
                    CmpOp::Ne => l != r,
                })
            }
            Expr::Not(inner) => Value::Bool(!inner.eval_bool(marking)?),
            // 短路求值
            Expr::And(lhs, rhs) => Value::Bool(lhs.eval_bool(marking)? && rhs.eval_bool(marking)?),
            Expr::Or(lhs, rhs) => Value::Bool(lhs.eval_bool(marking)? || rhs.eval_bool(marking)?),
        })
    }

    pub fn eval_number(&self, marking: &Marking) -> Result<f64, ExprError> {
        match self.eval(marking)? {
            Value::Number(n) => Ok(n),
            other => Err(ExprError::TypeMismatch {
                expected: "number",
                found: other.kind(),
                value: other,
            }),
        }
    }

    pub fn eval_bool(&self, marking: &Marking) -> Result<bool, ExprError> {
        match self.eval(marking)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::TypeMismatch {
                expected: "boolean",
                found: other.kind(),
                value: other,
            }),
        }
    }

    /// 表达式读取的全部库所（按出现顺序，去重）。
    pub fn places(&self) -> Vec<PlaceId> {
        let mut out = Vec::new();
        self.collect_places(&mut out);
        out
    }

    fn collect_places(&self, out: &mut Vec<PlaceId>) {
        match self {
            Expr::Const(_) | Expr::Bool(_) => {}
            Expr::Tokens(place) => {
                if !out.contains(place) {
                    out.push(*place);
                }
            }
            Expr::Neg(inner) | Expr::Not(inner) => inner.collect_places(out),
            Expr::Arith(_, lhs, rhs)
            | Expr::Cmp(_, lhs, rhs)
            | Expr::And(lhs, rhs)
            | Expr::Or(lhs, rhs) => {
                lhs.collect_places(out);
                rhs.collect_places(out);
            }
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        })
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(value) => write!(f, "{}", value),
            Expr::Bool(value) => write!(f, "{}", value),
            Expr::Tokens(place) => write!(f, "{}", place),
            Expr::Neg(inner) => write!(f, "-({})", inner),
            Expr::Arith(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op, rhs),
            Expr::Cmp(op, lhs, rhs) => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Not(inner) => write!(f, "not ({})", inner),
            Expr::And(lhs, rhs) => write!(f, "({} and {})", lhs, rhs),
            Expr::Or(lhs, rhs) => write!(f, "({} or {})", lhs, rhs),
        }
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::Arith($op, Box::new(self), Box::new(rhs))
            }
        }
    };
}

impl_arith!(Add, add, ArithOp::Add);
impl_arith!(Sub, sub, ArithOp::Sub);
impl_arith!(Mul, mul, ArithOp::Mul);
impl_arith!(Div, div, ArithOp::Div);

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}
