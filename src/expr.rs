//! Evaluator for size, count, condition and computed-field expressions.
//!
//! Only literals, `this` references, operators and the [`Builtin`] functions exist;
//! there is nothing that can loop, bind names or touch the outside world.

use crate::ast::{Access, BinaryOp, Builtin, Expr, UnaryOp};
use crate::codec::DecodeError;
use crate::context::Context;
use crate::value::Value;
use std::cmp::Ordering;

fn eval_err(msg: impl Into<String>) -> DecodeError {
    DecodeError::TypeEval(msg.into())
}

impl Expr {
    pub fn eval(&self, ctx: &Context<'_>) -> Result<Value, DecodeError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::This(path) => resolve(ctx, path),
            Expr::Unary(op, e) => unary(*op, e.eval(ctx)?),
            Expr::Binary(BinaryOp::And, l, r) => {
                if !l.eval(ctx)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(r.eval(ctx)?.truthy()))
            }
            Expr::Binary(BinaryOp::Or, l, r) => {
                if l.eval(ctx)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(r.eval(ctx)?.truthy()))
            }
            Expr::Binary(op, l, r) => binary(*op, l.eval(ctx)?, r.eval(ctx)?),
            Expr::Call(func, args) => {
                let args = args
                    .iter()
                    .map(|a| a.eval(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, args)
            }
        }
    }
}

fn resolve(ctx: &Context<'_>, path: &[Access]) -> Result<Value, DecodeError> {
    let mut scope = ctx;
    let mut rest = path;
    while let [Access::Parent, tail @ ..] = rest {
        scope = scope
            .outer()
            .ok_or_else(|| eval_err("`this._` used in the outermost scope"))?;
        rest = tail;
    }
    let (first, tail) = match rest.split_first() {
        Some(split) => split,
        None => return Ok(scope.to_value()),
    };
    let mut cur = match first {
        Access::Field(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| eval_err(format!("undefined name `{}`", name)))?,
        Access::Index(key) => {
            let key = key.eval(ctx)?;
            let name = match &key {
                Value::Str(s) => s.clone(),
                other => other
                    .as_i128()
                    .map(|i| i.to_string())
                    .ok_or_else(|| eval_err(format!("cannot index scope with a {}", other.kind())))?,
            };
            scope
                .lookup(&name)
                .cloned()
                .ok_or_else(|| eval_err(format!("undefined name `{}`", name)))?
        }
        Access::Parent => return Err(eval_err("`_` is only valid directly after `this`")),
    };
    for access in tail {
        cur = member(cur, access, ctx)?;
    }
    Ok(cur)
}

fn member(value: Value, access: &Access, ctx: &Context<'_>) -> Result<Value, DecodeError> {
    match access {
        Access::Parent => Err(eval_err("`_` is only valid directly after `this`")),
        Access::Field(name) => value
            .get(name)
            .cloned()
            .ok_or_else(|| eval_err(format!("{} has no member `{}`", value.kind(), name))),
        Access::Index(key) => {
            let key = key.eval(ctx)?;
            if let Value::Str(name) = &key {
                return value
                    .get(name)
                    .cloned()
                    .ok_or_else(|| eval_err(format!("{} has no member `{}`", value.kind(), name)));
            }
            let i = key
                .as_i128()
                .ok_or_else(|| eval_err(format!("index must be an integer, found {}", key.kind())))?;
            let len = match &value {
                Value::List(items) => items.len(),
                Value::Bytes(b) => b.len(),
                other => return Err(eval_err(format!("cannot index a {}", other.kind()))),
            };
            // Negative indices count from the end.
            let idx = if i < 0 { len as i128 + i } else { i };
            if idx < 0 || idx >= len as i128 {
                return Err(eval_err(format!("index {} out of range for length {}", i, len)));
            }
            let idx = idx as usize;
            Ok(match value {
                Value::List(mut items) => items.swap_remove(idx),
                Value::Bytes(b) => Value::U8(b[idx]),
                _ => Value::None,
            })
        }
    }
}

fn unary(op: UnaryOp, v: Value) -> Result<Value, DecodeError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
        UnaryOp::Neg => match v {
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Double(x) => Ok(Value::Double(-x)),
            other => int_result(int_operand(&other, "-")?.checked_neg()),
        },
        UnaryOp::BitNot => int_result(Some(!int_operand(&v, "~")?)),
    }
}

fn int_operand(v: &Value, op: &str) -> Result<i128, DecodeError> {
    v.as_i128()
        .ok_or_else(|| eval_err(format!("operator `{}` needs integers, found {}", op, v.kind())))
}

fn int_result(v: Option<i128>) -> Result<Value, DecodeError> {
    v.and_then(Value::from_i128)
        .ok_or_else(|| eval_err("integer overflow"))
}

fn is_float(v: &Value) -> bool {
    matches!(v, Value::Float(_) | Value::Double(_))
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    if is_float(l) || is_float(r) {
        return l.as_f64()?.partial_cmp(&r.as_f64()?);
    }
    if let (Some(a), Some(b)) = (l.as_i128(), r.as_i128()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (l.as_bytes(), r.as_bytes()) {
        return Some(a.cmp(b));
    }
    None
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, DecodeError> {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match compare(&l, &r) {
                Some(ord) => ord == Ordering::Equal,
                None => l == r,
            };
            return Ok(Value::Bool(equal == (op == BinaryOp::Eq)));
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&l, &r).ok_or_else(|| {
                eval_err(format!("cannot order {} and {}", l.kind(), r.kind()))
            })?;
            let result = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    if op == BinaryOp::Add {
        match (&l, &r) {
            (Value::Bytes(a), Value::Bytes(b)) => return Ok(Value::Bytes([a.as_slice(), b].concat())),
            (Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
            _ => {}
        }
    }

    if is_float(&l) || is_float(&r) {
        let (a, b) = match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(eval_err(format!("cannot combine {} and {}", l.kind(), r.kind()))),
        };
        let x = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => return Err(eval_err("bitwise operators need integers")),
        };
        return Ok(Value::Double(x));
    }

    let sym = op.symbol();
    let a = int_operand(&l, sym)?;
    let b = int_operand(&r, sym)?;
    let v = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Rem => {
            if b == 0 {
                return Err(eval_err("division by zero"));
            }
            let q = floor_div(a, b);
            if op == BinaryOp::Div {
                Some(q)
            } else {
                Some(a - b * q)
            }
        }
        BinaryOp::Shl | BinaryOp::Shr => {
            if !(0..127).contains(&b) {
                return Err(eval_err(format!("shift amount {} out of range", b)));
            }
            if op == BinaryOp::Shl {
                a.checked_mul(1i128 << b)
            } else {
                Some(a >> b)
            }
        }
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        _ => None,
    };
    int_result(v)
}

fn floor_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn call(func: Builtin, args: Vec<Value>) -> Result<Value, DecodeError> {
    match func {
        Builtin::Len => {
            let [v] = args.as_slice() else {
                return Err(eval_err("len_ takes exactly one argument"));
            };
            let n = match v {
                Value::List(items) => items.len(),
                Value::Bytes(b) => b.len(),
                Value::Str(s) => s.chars().count(),
                Value::Struct(m) => m.len(),
                other => return Err(eval_err(format!("len_ of a {}", other.kind()))),
            };
            Ok(Value::I64(n as i64))
        }
        Builtin::Min | Builtin::Max => {
            if args.len() < 2 {
                return Err(eval_err(format!("{} needs at least two arguments", func.name())));
            }
            let mut best: Option<Value> = None;
            for v in args {
                best = Some(match best {
                    None => v,
                    Some(b) => {
                        let ord = compare(&v, &b).ok_or_else(|| {
                            eval_err(format!("cannot order {} and {}", v.kind(), b.kind()))
                        })?;
                        let take_new = match func {
                            Builtin::Min => ord == Ordering::Less,
                            _ => ord == Ordering::Greater,
                        };
                        if take_new {
                            v
                        } else {
                            b
                        }
                    }
                });
            }
            Ok(best.unwrap_or(Value::None))
        }
    }
}
