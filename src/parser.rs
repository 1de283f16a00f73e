//! Parse layout definition text into a [`Layout`] using PEST.
//!
//! Parsing happens in two passes. The grammar produces a small syntax tree in which
//! type calls and value expressions look alike; lowering then walks it against a
//! [`Registry`], turning arguments in layout position into layouts and arguments in
//! value position into restricted [`Expr`]s.

use crate::ast::{Access, BinaryOp, Builtin, Expr, Layout, Member, UnaryOp};
use crate::codec::{DecodeError, Encoding};
use crate::registry::{Arg, ParamKind, Registry};
use crate::value::Value;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::sync::OnceLock;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct LayoutParser;

/// Parse a layout definition with the given registry.
pub fn parse(source: &str, registry: &Registry) -> Result<Layout, DecodeError> {
    let syn = parse_syntax(source)?;
    lower_layout(&syn, registry)
}

/// Parse a standalone value expression, e.g. `this.len - 2`.
pub fn parse_expr(source: &str) -> Result<Expr, DecodeError> {
    let syn = parse_syntax(source)?;
    lower_expr(&syn)
}

fn parse_syntax(source: &str) -> Result<Syn, DecodeError> {
    let mut pairs = LayoutParser::parse(Rule::layout, source).map_err(|e| {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        DecodeError::MalformedLayout {
            line,
            column,
            message: e.variant.message().into_owned(),
        }
    })?;
    let layout = pairs.next().ok_or_else(|| malformed_at(1, 1, "empty definition"))?;
    let expr = layout
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| malformed_at(1, 1, "empty definition"))?;
    build_expr(expr.into_inner())
}

fn malformed_at(line: usize, column: usize, message: impl Into<String>) -> DecodeError {
    DecodeError::MalformedLayout {
        line,
        column,
        message: message.into(),
    }
}

// ==================== Syntax tree ====================

#[derive(Debug, Clone)]
struct Syn {
    kind: SynKind,
    line: usize,
    column: usize,
}

#[derive(Debug, Clone)]
enum SynKind {
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    None,
    Name(String),
    This,
    Call(String, Vec<Syn>),
    Member(Box<Syn>, String),
    Subscript(Box<Syn>, Box<Syn>),
    Unary(UnaryOp, Box<Syn>),
    Binary(BinaryOp, Box<Syn>, Box<Syn>),
}

impl Syn {
    fn error(&self, message: impl Into<String>) -> DecodeError {
        malformed_at(self.line, self.column, message)
    }

    fn describe(&self) -> String {
        match &self.kind {
            SynKind::Int(v) => v.to_string(),
            SynKind::Float(v) => v.to_string(),
            SynKind::Str(s) => format!("{:?}", s),
            SynKind::Bytes(b) => Value::Bytes(b.clone()).to_string(),
            SynKind::Bool(b) => b.to_string(),
            SynKind::None => "None".to_string(),
            SynKind::Name(n) | SynKind::Call(n, _) => format!("`{}`", n),
            SynKind::This | SynKind::Member(..) | SynKind::Subscript(..) => "a `this` reference".to_string(),
            SynKind::Unary(..) | SynKind::Binary(..) => "an operator expression".to_string(),
        }
    }
}

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::or_op, Assoc::Left))
            .op(Op::infix(Rule::and_op, Assoc::Left))
            .op(Op::prefix(Rule::not_op))
            .op(Op::infix(Rule::eq, Assoc::Left)
                | Op::infix(Rule::ne, Assoc::Left)
                | Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::le, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::ge, Assoc::Left))
            .op(Op::infix(Rule::bit_or, Assoc::Left))
            .op(Op::infix(Rule::bit_xor, Assoc::Left))
            .op(Op::infix(Rule::bit_and, Assoc::Left))
            .op(Op::infix(Rule::shl, Assoc::Left) | Op::infix(Rule::shr, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::floor_div, Assoc::Left)
                | Op::infix(Rule::rem, Assoc::Left))
            .op(Op::prefix(Rule::neg) | Op::prefix(Rule::bit_not))
            .op(Op::postfix(Rule::member) | Op::postfix(Rule::subscript))
    })
}

fn position(pair: &Pair<Rule>) -> (usize, usize) {
    pair.as_span().start_pos().line_col()
}

fn build_expr(pairs: Pairs<Rule>) -> Result<Syn, DecodeError> {
    pratt()
        .map_primary(build_primary)
        .map_prefix(|op, rhs| {
            let (line, column) = position(&op);
            let unary = match op.as_rule() {
                Rule::neg => UnaryOp::Neg,
                Rule::bit_not => UnaryOp::BitNot,
                _ => UnaryOp::Not,
            };
            Ok(Syn {
                kind: SynKind::Unary(unary, Box::new(rhs?)),
                line,
                column,
            })
        })
        .map_postfix(|lhs, op| {
            let lhs = lhs?;
            let (line, column) = (lhs.line, lhs.column);
            let kind = match op.as_rule() {
                Rule::member => {
                    let name = op
                        .into_inner()
                        .next()
                        .map(|p| p.as_str().to_string())
                        .ok_or_else(|| malformed_at(line, column, "member access: name"))?;
                    SynKind::Member(Box::new(lhs), name)
                }
                _ => {
                    let index = op
                        .into_inner()
                        .next()
                        .ok_or_else(|| malformed_at(line, column, "subscript: index"))?;
                    SynKind::Subscript(Box::new(lhs), Box::new(build_expr(index.into_inner())?))
                }
            };
            Ok(Syn { kind, line, column })
        })
        .map_infix(|lhs, op, rhs| {
            let lhs = lhs?;
            let rhs = rhs?;
            let binary = match op.as_rule() {
                Rule::or_op => BinaryOp::Or,
                Rule::and_op => BinaryOp::And,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::bit_or => BinaryOp::BitOr,
                Rule::bit_xor => BinaryOp::BitXor,
                Rule::bit_and => BinaryOp::BitAnd,
                Rule::shl => BinaryOp::Shl,
                Rule::shr => BinaryOp::Shr,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div | Rule::floor_div => BinaryOp::Div,
                Rule::rem => BinaryOp::Rem,
                other => {
                    let (line, column) = position(&op);
                    return Err(malformed_at(line, column, format!("unexpected operator {:?}", other)));
                }
            };
            let (line, column) = (lhs.line, lhs.column);
            Ok(Syn {
                kind: SynKind::Binary(binary, Box::new(lhs), Box::new(rhs)),
                line,
                column,
            })
        })
        .parse(pairs)
}

fn build_primary(pair: Pair<Rule>) -> Result<Syn, DecodeError> {
    let (line, column) = position(&pair);
    let err = |msg: String| malformed_at(line, column, msg);
    let kind = match pair.as_rule() {
        Rule::expr => return build_expr(pair.into_inner()),
        Rule::dec_int => SynKind::Int(parse_int(pair.as_str(), 10).ok_or_else(|| err(format!("integer literal {} too large", pair.as_str())))?),
        Rule::hex_int => SynKind::Int(parse_int(&pair.as_str()[2..], 16).ok_or_else(|| err(format!("integer literal {} too large", pair.as_str())))?),
        Rule::oct_int => SynKind::Int(parse_int(&pair.as_str()[2..], 8).ok_or_else(|| err(format!("integer literal {} too large", pair.as_str())))?),
        Rule::bin_int => SynKind::Int(parse_int(&pair.as_str()[2..], 2).ok_or_else(|| err(format!("integer literal {} too large", pair.as_str())))?),
        Rule::float_lit => SynKind::Float(
            pair.as_str()
                .parse()
                .map_err(|_| err(format!("bad float literal {}", pair.as_str())))?,
        ),
        Rule::true_lit => SynKind::Bool(true),
        Rule::false_lit => SynKind::Bool(false),
        Rule::none_lit => SynKind::None,
        Rule::string_lit => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            SynKind::Str(unescape_str(inner).map_err(err)?)
        }
        Rule::bytes_lit => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            SynKind::Bytes(unescape_bytes(inner).map_err(err)?)
        }
        Rule::this_kw => SynKind::This,
        Rule::name => SynKind::Name(pair.as_str().to_string()),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .map(|p| p.as_str().to_string())
                .ok_or_else(|| err("call: name".to_string()))?;
            let args = inner
                .map(|p| build_expr(p.into_inner()))
                .collect::<Result<Vec<_>, _>>()?;
            SynKind::Call(name, args)
        }
        other => return Err(err(format!("unexpected {:?}", other))),
    };
    Ok(Syn { kind, line, column })
}

fn parse_int(digits: &str, radix: u32) -> Option<i128> {
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    i128::from_str_radix(&cleaned, radix).ok()
}

/// Resolve escapes in the body of a quoted literal into raw bytes.
fn unescape(body: &str, allow_non_ascii: bool) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            if !c.is_ascii() && !allow_non_ascii {
                return Err(format!("non-ASCII character {:?} in byte string", c));
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let esc = chars.next().ok_or("dangling backslash")?;
        match esc {
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            '0' => out.push(0),
            '\\' => out.push(b'\\'),
            '"' => out.push(b'"'),
            '\'' => out.push(b'\''),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = u8::from_str_radix(&hex, 16).map_err(|_| format!("bad escape \\x{}", hex))?;
                out.push(byte);
            }
            other => return Err(format!("unknown escape \\{}", other)),
        }
    }
    Ok(out)
}

fn unescape_bytes(body: &str) -> Result<Vec<u8>, String> {
    unescape(body, false)
}

fn unescape_str(body: &str) -> Result<String, String> {
    let bytes = unescape(body, true)?;
    // `\xNN` in a text literal names a code point, as in Python.
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => Ok(e.into_bytes().iter().map(|&b| b as char).collect()),
    }
}

// ==================== Lowering ====================

fn lower_layout(syn: &Syn, registry: &Registry) -> Result<Layout, DecodeError> {
    match &syn.kind {
        SynKind::Name(name) => registry
            .construct(name, Vec::new())
            .map_err(|e| syn.error(e)),
        SynKind::Call(name, args) => {
            let ctor = registry
                .lookup(name)
                .ok_or_else(|| syn.error(format!("unknown type `{}`", name)))?;
            let mut lowered: Vec<Arg> = Vec::new();
            for (i, arg) in args.iter().enumerate() {
                let kind = ctor
                    .param_at(i)
                    .ok_or_else(|| arg.error(format!("{} takes at most {} argument(s)", name, ctor.params().len())))?;
                match kind {
                    ParamKind::Expr => lowered.push(Arg::Expr(lower_expr(arg)?)),
                    ParamKind::Layout => lowered.push(Arg::Layout(lower_layout(arg, registry)?)),
                    ParamKind::Encoding => lowered.push(Arg::Encoding(lower_encoding(arg)?)),
                    ParamKind::Members => {
                        let member = lower_member(arg, registry)?;
                        match lowered.last_mut() {
                            Some(Arg::Members(members)) => members.push(member),
                            _ => lowered.push(Arg::Members(vec![member])),
                        }
                    }
                    ParamKind::Layouts => {
                        let item = lower_layout(arg, registry)?;
                        match lowered.last_mut() {
                            Some(Arg::Layouts(items)) => items.push(item),
                            _ => lowered.push(Arg::Layouts(vec![item])),
                        }
                    }
                }
            }
            ctor.call(lowered).map_err(|e| syn.error(format!("{}: {}", name, e)))
        }
        // `Int8ub[this.count]` is shorthand for `Array(this.count, Int8ub)`.
        SynKind::Subscript(element, count) => Ok(Layout::array(
            lower_expr(count)?,
            lower_layout(element, registry)?,
        )),
        SynKind::Binary(BinaryOp::Div, lhs, _) if member_name(lhs).is_some() => {
            Err(syn.error("named member outside of a Struct"))
        }
        _ => Err(syn.error(format!("expected a type, found {}", syn.describe()))),
    }
}

fn member_name(syn: &Syn) -> Option<&str> {
    match &syn.kind {
        SynKind::Str(s) | SynKind::Name(s) => Some(s),
        _ => None,
    }
}

fn lower_member(syn: &Syn, registry: &Registry) -> Result<Member, DecodeError> {
    match &syn.kind {
        SynKind::Binary(BinaryOp::Div, lhs, rhs) => {
            let name = member_name(lhs)
                .ok_or_else(|| lhs.error(format!("member name must be a string, found {}", lhs.describe())))?;
            Ok(Member {
                name: name.to_string(),
                layout: lower_layout(rhs, registry)?,
            })
        }
        _ => Err(syn.error(format!("expected `\"name\" / Type`, found {}", syn.describe()))),
    }
}

fn lower_encoding(syn: &Syn) -> Result<Encoding, DecodeError> {
    match &syn.kind {
        SynKind::Str(name) => {
            Encoding::from_name(name).ok_or_else(|| syn.error(format!("unknown encoding {:?}", name)))
        }
        _ => Err(syn.error(format!("expected an encoding name, found {}", syn.describe()))),
    }
}

fn lower_expr(syn: &Syn) -> Result<Expr, DecodeError> {
    Ok(match &syn.kind {
        SynKind::Int(v) => Expr::Literal(
            Value::from_i128(*v).ok_or_else(|| syn.error(format!("integer literal {} too large", v)))?,
        ),
        SynKind::Float(v) => Expr::Literal(Value::Double(*v)),
        SynKind::Str(s) => Expr::Literal(Value::Str(s.clone())),
        SynKind::Bytes(b) => Expr::Literal(Value::Bytes(b.clone())),
        SynKind::Bool(b) => Expr::Literal(Value::Bool(*b)),
        SynKind::None => Expr::Literal(Value::None),
        SynKind::This => Expr::This(Vec::new()),
        SynKind::Member(base, name) => {
            let mut path = this_path(base)?;
            path.push(if name == "_" {
                Access::Parent
            } else {
                Access::Field(name.clone())
            });
            Expr::This(path)
        }
        SynKind::Subscript(base, index) => {
            let mut path = this_path(base)?;
            path.push(Access::Index(lower_expr(index)?));
            Expr::This(path)
        }
        SynKind::Unary(op, e) => Expr::Unary(*op, Box::new(lower_expr(e)?)),
        SynKind::Binary(op, l, r) => Expr::binary(*op, lower_expr(l)?, lower_expr(r)?),
        SynKind::Call(name, args) => {
            let func = Builtin::from_name(name)
                .ok_or_else(|| syn.error(format!("unknown function `{}`", name)))?;
            Expr::Call(func, args.iter().map(lower_expr).collect::<Result<_, _>>()?)
        }
        SynKind::Name(name) => {
            return Err(syn.error(format!("bare name `{}` in expression (did you mean `this.{}`?)", name, name)))
        }
    })
}

fn this_path(base: &Syn) -> Result<Vec<Access>, DecodeError> {
    match lower_expr(base)? {
        Expr::This(path) => Ok(path),
        _ => Err(base.error("member and index access are only supported on `this`")),
    }
}
