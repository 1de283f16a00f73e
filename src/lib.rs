//! # bintv: declarative binary layout engine
//!
//! Describe a binary format with construct-style combinators, decode a buffer into a
//! tree where every value knows the exact byte range it came from, flatten the tree
//! into addressable fields, and patch single fields in place.
//!
//! ## Layout language
//!
//! A layout is one type expression:
//!
//! ```text
//! Struct(
//!     "magic"   / Const(b"AB"),
//!     "len"     / Int16ul,
//!     "payload" / Bytes(this.len),
//!     "flags"   / Int8ub,
//!     "extra"   / If(this.flags & 0x01, Int32ub),
//!     "items"   / Array(2, Struct("tag" / Byte, "value" / Int16ub)),
//! )
//! ```
//!
//! - Integers `Int{8,16,32,64}{u,s}{b,l}`, `Byte`, floats `Float{32,64}{b,l}`, `Flag`
//! - `Bytes(n)`, `GreedyBytes`, `PaddedString(n, enc)`, `PascalString(Int8ub, enc)`,
//!   `CString(enc)`, `GreedyString(enc)`, `Const(b"..")`
//! - `Struct`, `Sequence`, `Array(count, T)` (or `T[count]`), `Computed(expr)`,
//!   `If(pred, T)`
//! - Expressions reference earlier fields through `this` (`this.hdr.len`, `this._.n`)
//!
//! ## Usage
//!
//! ```no_run
//! use bintv::{decode, flatten, parse, patch, Registry, Value};
//!
//! let layout = parse(r#"Struct("len" / Int8ub, "data" / Bytes(this.len))"#, &Registry::standard())?;
//! let mut buf = vec![3, b'a', b'b', b'c'];
//! let fields = flatten(&decode(&layout, &buf)?);
//! let data = bintv::find(&fields, "data").ok_or("missing")?;
//! patch(&mut buf, data, &Value::Bytes(b"xyz".to_vec()))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
pub mod codec;
pub mod config;
pub mod context;
pub mod decode;
pub mod dump;
pub mod expr;
pub mod flatten;
pub mod node;
pub mod parser;
pub mod patch;
pub mod registry;
pub mod session;
pub mod tracked;
pub mod value;

pub use ast::{Access, BinaryOp, Builtin, Expr, Layout, Leaf, Member, UnaryOp};
pub use codec::{DecodeError, EncodeError, Encoding, Endianness, FloatFormat, IntFormat, TypeTag};
pub use config::EngineConfig;
pub use context::Context;
pub use decode::{decode, decode_with};
pub use flatten::{field_at, find, flatten, FieldIndex, FieldRecord};
pub use node::{NodeKind, ParsedNode, Span};
pub use parser::{parse, parse_expr};
pub use patch::{apply, parse_edit, patch, patch_path, patch_with, PatchError, PatchPolicy, PatchRequest};
pub use registry::{Arg, Constructor, ParamKind, Registry};
pub use session::{Observer, Session, SessionError, Snapshot, Update};
pub use tracked::Tracked;
pub use value::Value;
