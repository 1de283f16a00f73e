//! Layout combinator tree and the restricted expression language.

use crate::codec::{Encoding, FloatFormat, IntFormat};
use crate::tracked::Tracked;
use crate::value::Value;
use std::fmt;

/// A combinator tree describing how to decode a byte region.
///
/// Leaves are only reachable through [`Layout::Tracked`], so every primitive in a
/// layout records its byte range by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Tracked(Tracked),
    Struct(Vec<Member>),
    Sequence(Vec<Layout>),
    Array { count: Expr, element: Box<Layout> },
    Computed(Expr),
    Conditional { predicate: Expr, inner: Box<Layout> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub layout: Layout,
}

impl Member {
    /// Members whose name starts with `_` are decoded but hidden from flattening.
    pub fn is_internal(&self) -> bool {
        self.name.starts_with('_')
    }
}

/// Primitive (byte-consuming) layouts.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    Int(IntFormat),
    Float(FloatFormat),
    Flag,
    Bytes(Expr),
    GreedyBytes,
    PaddedString { length: Expr, encoding: Encoding },
    PascalString { prefix: IntFormat, encoding: Encoding },
    CString { encoding: Encoding },
    GreedyString { encoding: Encoding },
    Const(Vec<u8>),
}

impl Layout {
    /// Wrap a primitive in offset instrumentation.
    pub fn leaf(leaf: Leaf) -> Layout {
        Layout::Tracked(Tracked::new(leaf))
    }

    pub fn structure<I, S>(members: I) -> Layout
    where
        I: IntoIterator<Item = (S, Layout)>,
        S: Into<String>,
    {
        Layout::Struct(
            members
                .into_iter()
                .map(|(name, layout)| Member {
                    name: name.into(),
                    layout,
                })
                .collect(),
        )
    }

    pub fn sequence(items: Vec<Layout>) -> Layout {
        Layout::Sequence(items)
    }

    pub fn array(count: Expr, element: Layout) -> Layout {
        Layout::Array {
            count,
            element: Box::new(element),
        }
    }

    pub fn computed(expr: Expr) -> Layout {
        Layout::Computed(expr)
    }

    pub fn conditional(predicate: Expr, inner: Layout) -> Layout {
        Layout::Conditional {
            predicate,
            inner: Box::new(inner),
        }
    }

    /// Lower bound on bytes consumed, used to reject impossible array counts early.
    pub fn min_width(&self) -> usize {
        match self {
            Layout::Tracked(t) => t.leaf().min_width(),
            Layout::Struct(members) => members.iter().map(|m| m.layout.min_width()).sum(),
            Layout::Sequence(items) => items.iter().map(Layout::min_width).sum(),
            Layout::Array { count, element } => match count {
                Expr::Literal(v) => v
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .map(|n| n.saturating_mul(element.min_width()))
                    .unwrap_or(0),
                _ => 0,
            },
            Layout::Computed(_) | Layout::Conditional { .. } => 0,
        }
    }
}

// ==================== Expressions ====================

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `this` followed by field/index accessors.
    This(Vec<Access>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Builtin, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    /// `this._`: step out to the enclosing scope.
    Parent,
    Field(String),
    Index(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Integer (floor) division; `/` and `//` both map here.
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Min,
    Max,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        match name {
            "len_" | "len" => Some(Builtin::Len),
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len_",
            Builtin::Min => "min",
            Builtin::Max => "max",
        }
    }
}

impl Expr {
    pub fn int(v: i64) -> Expr {
        Expr::Literal(Value::I64(v))
    }

    /// `this.<path>` where `path` is dot-separated, e.g. `Expr::field("header.len")`.
    pub fn field(path: &str) -> Expr {
        Expr::This(
            path.split('.')
                .map(|seg| match seg {
                    "_" => Access::Parent,
                    name => Access::Field(name.to_string()),
                })
                .collect(),
        )
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }
}

impl BinaryOp {
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "//",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::This(path) => {
                write!(f, "this")?;
                for a in path {
                    match a {
                        Access::Parent => write!(f, "._")?,
                        Access::Field(name) => write!(f, ".{}", name)?,
                        Access::Index(e) => write!(f, "[{}]", e)?,
                    }
                }
                Ok(())
            }
            Expr::Unary(op, e) => match op {
                UnaryOp::Neg => write!(f, "-{}", e),
                UnaryOp::Not => write!(f, "not {}", e),
                UnaryOp::BitNot => write!(f, "~{}", e),
            },
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}
