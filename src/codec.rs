//! Primitive codecs: fixed-width integers and floats, flags, byte blocks, strings and
//! constants.
//!
//! Every primitive decodes from `(buffer, offset)` and reports how many bytes it
//! consumed. Fixed-width primitives encode to exactly their width, which is what makes
//! same-length patching possible. Variable-length primitives take their length from an
//! expression evaluated against the current [`Context`](crate::context::Context).

use crate::ast::{Expr, Leaf};
use crate::context::Context;
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Big,
    Little,
}

/// Errors raised while decoding a buffer or compiling a layout.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("buffer exhausted at offset {offset}: need {needed} byte(s), {available} available")]
    BufferExhausted {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("constant mismatch at offset {offset}: expected {expected:02x?}, found {found:02x?}")]
    ConstMismatch {
        offset: usize,
        expected: Vec<u8>,
        found: Vec<u8>,
    },
    #[error("expression error: {0}")]
    TypeEval(String),
    #[error("malformed layout at {line}:{column}: {message}")]
    MalformedLayout {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("invalid {encoding} text at offset {offset}")]
    BadEncoding { offset: usize, encoding: Encoding },
}

/// Errors raised while encoding a value for a field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("{value} does not fit in {tag}")]
    OutOfRange { value: String, tag: String },
    #[error("{tag} cannot encode a {found} value")]
    TypeMismatch { tag: String, found: &'static str },
    #[error("text is not representable in {0}")]
    Unrepresentable(Encoding),
    #[error("{0} fields cannot be encoded")]
    NotEncodable(String),
    #[error("{0}")]
    Invalid(String),
}

/// Borrow `n` bytes at `offset`, or report how short the buffer is.
pub fn take(buf: &[u8], offset: usize, n: usize) -> Result<&[u8], DecodeError> {
    let available = buf.len().saturating_sub(offset);
    if n > available {
        return Err(DecodeError::BufferExhausted {
            offset,
            needed: n,
            available,
        });
    }
    let start = offset.min(buf.len());
    Ok(&buf[start..start + n])
}

// ==================== Integers and floats ====================

/// Fixed-width integer format: width in bytes (1, 2, 4 or 8), signedness, byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntFormat {
    pub width: u8,
    pub signed: bool,
    pub endianness: Endianness,
}

impl IntFormat {
    pub const fn new(width: u8, signed: bool, endianness: Endianness) -> Self {
        IntFormat {
            width,
            signed,
            endianness,
        }
    }

    fn bounds(&self) -> (i128, i128) {
        let bits = self.width as u32 * 8;
        if self.signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    pub fn decode(&self, buf: &[u8], offset: usize) -> Result<(Value, usize), DecodeError> {
        let n = self.width as usize;
        let bytes = take(buf, offset, n)?;
        let value = if self.signed {
            let raw = match self.endianness {
                Endianness::Big => BigEndian::read_int(bytes, n),
                Endianness::Little => LittleEndian::read_int(bytes, n),
            };
            match self.width {
                1 => Value::I8(raw as i8),
                2 => Value::I16(raw as i16),
                4 => Value::I32(raw as i32),
                _ => Value::I64(raw),
            }
        } else {
            let raw = match self.endianness {
                Endianness::Big => BigEndian::read_uint(bytes, n),
                Endianness::Little => LittleEndian::read_uint(bytes, n),
            };
            match self.width {
                1 => Value::U8(raw as u8),
                2 => Value::U16(raw as u16),
                4 => Value::U32(raw as u32),
                _ => Value::U64(raw),
            }
        };
        Ok((value, n))
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let v = value.as_i128().ok_or_else(|| EncodeError::TypeMismatch {
            tag: self.to_string(),
            found: value.kind(),
        })?;
        let (min, max) = self.bounds();
        if v < min || v > max {
            return Err(EncodeError::OutOfRange {
                value: v.to_string(),
                tag: self.to_string(),
            });
        }
        let n = self.width as usize;
        let mut out = vec![0u8; n];
        match (self.signed, self.endianness) {
            (true, Endianness::Big) => BigEndian::write_int(&mut out, v as i64, n),
            (true, Endianness::Little) => LittleEndian::write_int(&mut out, v as i64, n),
            (false, Endianness::Big) => BigEndian::write_uint(&mut out, v as u64, n),
            (false, Endianness::Little) => LittleEndian::write_uint(&mut out, v as u64, n),
        }
        Ok(out)
    }
}

impl fmt::Display for IntFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Int{}{}{}",
            self.width as u32 * 8,
            if self.signed { 's' } else { 'u' },
            match self.endianness {
                Endianness::Big => 'b',
                Endianness::Little => 'l',
            }
        )
    }
}

/// IEEE 754 float format: width 4 or 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatFormat {
    pub width: u8,
    pub endianness: Endianness,
}

impl FloatFormat {
    pub const fn new(width: u8, endianness: Endianness) -> Self {
        FloatFormat { width, endianness }
    }

    pub fn decode(&self, buf: &[u8], offset: usize) -> Result<(Value, usize), DecodeError> {
        let n = self.width as usize;
        let bytes = take(buf, offset, n)?;
        let value = match (self.width, self.endianness) {
            (4, Endianness::Big) => Value::Float(BigEndian::read_f32(bytes)),
            (4, Endianness::Little) => Value::Float(LittleEndian::read_f32(bytes)),
            (_, Endianness::Big) => Value::Double(BigEndian::read_f64(bytes)),
            (_, Endianness::Little) => Value::Double(LittleEndian::read_f64(bytes)),
        };
        Ok((value, n))
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let mismatch = || EncodeError::TypeMismatch {
            tag: self.to_string(),
            found: value.kind(),
        };
        let mut out = vec![0u8; self.width as usize];
        if self.width == 4 {
            // Keep the exact bits of an f32 so re-encoding a decoded value is lossless.
            let x = match value {
                Value::Float(x) => *x,
                other => other.as_f64().ok_or_else(mismatch)? as f32,
            };
            match self.endianness {
                Endianness::Big => BigEndian::write_f32(&mut out, x),
                Endianness::Little => LittleEndian::write_f32(&mut out, x),
            }
        } else {
            let x = value.as_f64().ok_or_else(mismatch)?;
            match self.endianness {
                Endianness::Big => BigEndian::write_f64(&mut out, x),
                Endianness::Little => LittleEndian::write_f64(&mut out, x),
            }
        }
        Ok(out)
    }
}

impl fmt::Display for FloatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Float{}{}",
            self.width as u32 * 8,
            match self.endianness {
                Endianness::Big => 'b',
                Endianness::Little => 'l',
            }
        )
    }
}

// ==================== Text encodings ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl Encoding {
    pub fn from_name(name: &str) -> Option<Encoding> {
        match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "utf8" => Some(Encoding::Utf8),
            "ascii" | "usascii" => Some(Encoding::Ascii),
            "latin1" | "iso88591" => Some(Encoding::Latin1),
            _ => None,
        }
    }

    pub fn decode_text(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Encoding::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| b as char).collect()),
            Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn encode_text(&self, text: &str) -> Result<Vec<u8>, EncodeError> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Ascii if text.is_ascii() => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(c as u32).map_err(|_| EncodeError::Unrepresentable(*self)))
                .collect(),
            _ => Err(EncodeError::Unrepresentable(*self)),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Encoding::Utf8 => "utf8",
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "latin1",
        })
    }
}

fn text_value(
    bytes: &[u8],
    offset: usize,
    encoding: Encoding,
) -> Result<Value, DecodeError> {
    encoding
        .decode_text(bytes)
        .map(Value::Str)
        .ok_or(DecodeError::BadEncoding { offset, encoding })
}

// ==================== Type tags ====================

/// Declared type of a decoded node, with everything needed to re-encode a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeTag {
    Int(IntFormat),
    Float(FloatFormat),
    Flag,
    Bytes,
    GreedyBytes,
    PaddedString { length: usize, encoding: Encoding },
    PascalString { prefix: IntFormat, encoding: Encoding },
    CString { encoding: Encoding },
    GreedyString { encoding: Encoding },
    Const(Vec<u8>),
    Computed,
    /// A conditional whose predicate was false.
    Absent,
    Struct,
    Sequence,
    Array,
}

impl TypeTag {
    pub fn is_container(&self) -> bool {
        matches!(self, TypeTag::Struct | TypeTag::Sequence | TypeTag::Array)
    }

    /// Whether a zero-padded or truncated encoding still decodes to the same length.
    /// Only these tags are eligible for [`PatchPolicy::PadTruncate`](crate::patch::PatchPolicy).
    pub fn is_resizable(&self) -> bool {
        matches!(
            self,
            TypeTag::Bytes
                | TypeTag::GreedyBytes
                | TypeTag::PaddedString { .. }
                | TypeTag::GreedyString { .. }
        )
    }

    /// Encode `value` with the primitive encoder for this tag.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let mismatch = || EncodeError::TypeMismatch {
            tag: self.to_string(),
            found: value.kind(),
        };
        match self {
            TypeTag::Int(fmt) => fmt.encode(value),
            TypeTag::Float(fmt) => fmt.encode(value),
            TypeTag::Flag => match value {
                Value::Bool(b) => Ok(vec![*b as u8]),
                other => match other.as_i128() {
                    Some(0) => Ok(vec![0]),
                    Some(1) => Ok(vec![1]),
                    Some(v) => Err(EncodeError::OutOfRange {
                        value: v.to_string(),
                        tag: self.to_string(),
                    }),
                    None => Err(mismatch()),
                },
            },
            TypeTag::Bytes | TypeTag::GreedyBytes => {
                value.as_bytes().map(<[u8]>::to_vec).ok_or_else(mismatch)
            }
            TypeTag::PaddedString { length, encoding } => {
                let mut out = encode_text_value(value, *encoding, self)?;
                if out.len() > *length {
                    return Err(EncodeError::OutOfRange {
                        value: format!("{}-byte text", out.len()),
                        tag: self.to_string(),
                    });
                }
                out.resize(*length, 0);
                Ok(out)
            }
            TypeTag::PascalString { prefix, encoding } => {
                let text = encode_text_value(value, *encoding, self)?;
                let mut out = prefix
                    .encode(&Value::U64(text.len() as u64))
                    .map_err(|_| EncodeError::OutOfRange {
                        value: format!("{}-byte text", text.len()),
                        tag: self.to_string(),
                    })?;
                out.extend_from_slice(&text);
                Ok(out)
            }
            TypeTag::CString { encoding } => {
                let mut out = encode_text_value(value, *encoding, self)?;
                if out.contains(&0) {
                    return Err(EncodeError::Invalid(
                        "CString text cannot contain a NUL byte".to_string(),
                    ));
                }
                out.push(0);
                Ok(out)
            }
            TypeTag::GreedyString { encoding } => encode_text_value(value, *encoding, self),
            TypeTag::Const(expected) => {
                let bytes = value.as_bytes().ok_or_else(mismatch)?;
                if bytes != expected.as_slice() {
                    return Err(EncodeError::Invalid(format!(
                        "constant field only holds {}",
                        Value::Bytes(expected.clone())
                    )));
                }
                Ok(expected.clone())
            }
            TypeTag::Computed
            | TypeTag::Absent
            | TypeTag::Struct
            | TypeTag::Sequence
            | TypeTag::Array => Err(EncodeError::NotEncodable(self.to_string())),
        }
    }
}

fn encode_text_value(value: &Value, encoding: Encoding, tag: &TypeTag) -> Result<Vec<u8>, EncodeError> {
    match value {
        Value::Str(s) => encoding.encode_text(s),
        // Raw bytes are accepted when they are valid text in the declared encoding.
        Value::Bytes(b) => match encoding.decode_text(b) {
            Some(_) => Ok(b.clone()),
            None => Err(EncodeError::Unrepresentable(encoding)),
        },
        other => Err(EncodeError::TypeMismatch {
            tag: tag.to_string(),
            found: other.kind(),
        }),
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Int(fmt) => write!(f, "{}", fmt),
            TypeTag::Float(fmt) => write!(f, "{}", fmt),
            TypeTag::Flag => write!(f, "Flag"),
            TypeTag::Bytes => write!(f, "Bytes"),
            TypeTag::GreedyBytes => write!(f, "GreedyBytes"),
            TypeTag::PaddedString { length, encoding } => {
                write!(f, "PaddedString({}, {})", length, encoding)
            }
            TypeTag::PascalString { prefix, encoding } => {
                write!(f, "PascalString({}, {})", prefix, encoding)
            }
            TypeTag::CString { encoding } => write!(f, "CString({})", encoding),
            TypeTag::GreedyString { encoding } => write!(f, "GreedyString({})", encoding),
            TypeTag::Const(bytes) => write!(f, "Const({})", Value::Bytes(bytes.clone())),
            TypeTag::Computed => write!(f, "Computed"),
            TypeTag::Absent => write!(f, "Absent"),
            TypeTag::Struct => write!(f, "Struct"),
            TypeTag::Sequence => write!(f, "Sequence"),
            TypeTag::Array => write!(f, "Array"),
        }
    }
}

// ==================== Leaf decoding ====================

/// Output of a leaf decode before offset instrumentation is attached.
#[derive(Debug)]
pub struct LeafDecoded {
    pub value: Value,
    pub consumed: usize,
    pub tag: TypeTag,
}

/// Evaluate a length expression to a byte count.
pub(crate) fn eval_len(expr: &Expr, ctx: &Context<'_>, what: &str) -> Result<usize, DecodeError> {
    let v = expr.eval(ctx)?;
    let n = v.as_i128().ok_or_else(|| {
        DecodeError::TypeEval(format!("{} `{}` is a {}, not an integer", what, expr, v.kind()))
    })?;
    usize::try_from(n)
        .map_err(|_| DecodeError::TypeEval(format!("{} `{}` evaluated to {}", what, expr, n)))
}

impl Leaf {
    /// Decode this primitive at `offset`. Lengths are evaluated against `ctx`.
    pub fn decode(&self, buf: &[u8], offset: usize, ctx: &Context<'_>) -> Result<LeafDecoded, DecodeError> {
        let (value, consumed, tag) = match self {
            Leaf::Int(fmt) => {
                let (v, n) = fmt.decode(buf, offset)?;
                (v, n, TypeTag::Int(*fmt))
            }
            Leaf::Float(fmt) => {
                let (v, n) = fmt.decode(buf, offset)?;
                (v, n, TypeTag::Float(*fmt))
            }
            Leaf::Flag => {
                let b = take(buf, offset, 1)?;
                (Value::Bool(b[0] != 0), 1, TypeTag::Flag)
            }
            Leaf::Bytes(len) => {
                let n = eval_len(len, ctx, "byte length")?;
                let b = take(buf, offset, n)?;
                (Value::Bytes(b.to_vec()), n, TypeTag::Bytes)
            }
            Leaf::GreedyBytes => {
                let n = buf.len().saturating_sub(offset);
                let b = take(buf, offset, n)?;
                (Value::Bytes(b.to_vec()), n, TypeTag::GreedyBytes)
            }
            Leaf::PaddedString { length, encoding } => {
                let n = eval_len(length, ctx, "string length")?;
                let b = take(buf, offset, n)?;
                let end = b.iter().rposition(|&c| c != 0).map(|i| i + 1).unwrap_or(0);
                let v = text_value(&b[..end], offset, *encoding)?;
                (v, n, TypeTag::PaddedString { length: n, encoding: *encoding })
            }
            Leaf::PascalString { prefix, encoding } => {
                let (len, p) = prefix.decode(buf, offset)?;
                let n = len
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| DecodeError::TypeEval(format!("negative string length {}", len)))?;
                let b = take(buf, offset + p, n)?;
                let v = text_value(b, offset + p, *encoding)?;
                (v, p + n, TypeTag::PascalString { prefix: *prefix, encoding: *encoding })
            }
            Leaf::CString { encoding } => {
                let rest = &buf[offset.min(buf.len())..];
                let nul = rest.iter().position(|&c| c == 0).ok_or(DecodeError::BufferExhausted {
                    offset: offset + rest.len(),
                    needed: 1,
                    available: 0,
                })?;
                let v = text_value(&rest[..nul], offset, *encoding)?;
                (v, nul + 1, TypeTag::CString { encoding: *encoding })
            }
            Leaf::GreedyString { encoding } => {
                let rest = &buf[offset.min(buf.len())..];
                let v = text_value(rest, offset, *encoding)?;
                (v, rest.len(), TypeTag::GreedyString { encoding: *encoding })
            }
            Leaf::Const(expected) => {
                let found = take(buf, offset, expected.len())?;
                if found != expected.as_slice() {
                    return Err(DecodeError::ConstMismatch {
                        offset,
                        expected: expected.clone(),
                        found: found.to_vec(),
                    });
                }
                (Value::Bytes(expected.clone()), expected.len(), TypeTag::Const(expected.clone()))
            }
        };
        Ok(LeafDecoded { value, consumed, tag })
    }

    /// Minimum number of bytes this leaf can consume (0 when it depends on context).
    pub fn min_width(&self) -> usize {
        match self {
            Leaf::Int(fmt) => fmt.width as usize,
            Leaf::Float(fmt) => fmt.width as usize,
            Leaf::Flag => 1,
            Leaf::PascalString { prefix, .. } => prefix.width as usize,
            Leaf::CString { .. } => 1,
            Leaf::Const(b) => b.len(),
            Leaf::Bytes(_) | Leaf::GreedyBytes | Leaf::PaddedString { .. } | Leaf::GreedyString { .. } => 0,
        }
    }
}
