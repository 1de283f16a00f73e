//! In-place, fixed-length field edits.
//!
//! A patch encodes a new value with the primitive encoder for the field's type tag and
//! overwrites exactly `buffer[start..end]`. The buffer is a `&mut [u8]`, so a patch can
//! never grow or shrink it. Every check runs before the first byte is written; on any
//! error the buffer is unchanged. Re-decoding afterwards is the caller's job.

use crate::codec::{EncodeError, TypeTag};
use crate::flatten::{find, FieldRecord};
use crate::value::Value;
use tracing::{debug, info};

/// What to do when an encoded value is not exactly the field's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchPolicy {
    /// Reject with [`PatchError::SizeMismatch`].
    #[default]
    Strict,
    /// Zero-pad or truncate, for tags whose decoded length does not depend on content
    /// (see [`TypeTag::is_resizable`]). Other tags still fail with `SizeMismatch`.
    PadTruncate,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("no field at path {0:?}")]
    FieldNotFound(String),
    #[error("field {0:?} has no byte range")]
    NoOffsetInfo(String),
    #[error("field {path:?} is {expected} byte(s) but the new value encodes to {actual}")]
    SizeMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("cannot encode value for {path:?}: {source}")]
    Encode {
        path: String,
        #[source]
        source: EncodeError,
    },
}

/// A tree-view edit: target path, new value and the type the editor believed it had.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub path: String,
    pub value: Value,
    pub type_tag: TypeTag,
}

/// Overwrite `field` in `buf` with `value` under [`PatchPolicy::Strict`].
pub fn patch(buf: &mut [u8], field: &FieldRecord, value: &Value) -> Result<(), PatchError> {
    patch_with(buf, field, value, PatchPolicy::Strict)
}

pub fn patch_with(
    buf: &mut [u8],
    field: &FieldRecord,
    value: &Value,
    policy: PatchPolicy,
) -> Result<(), PatchError> {
    let span = field
        .span()
        .ok_or_else(|| PatchError::NoOffsetInfo(field.path.clone()))?;
    if span.end > buf.len() {
        // The record belongs to a different (longer) buffer.
        return Err(PatchError::FieldNotFound(field.path.clone()));
    }
    // A field's own value goes back as the bytes it was read from. Lossy decodes
    // (a Flag of 0x02) would otherwise come back canonicalised.
    match field.raw.as_deref() {
        Some(raw) if *value == field.value && raw.len() == span.len() => {
            buf[span.start..span.end].copy_from_slice(raw);
        }
        _ => {
            let bytes = encode_for(field, value, policy, span.len())?;
            buf[span.start..span.end].copy_from_slice(&bytes);
        }
    }
    debug!(path = %field.path, start = span.start, end = span.end, "patched field");
    Ok(())
}

fn encode_for(
    field: &FieldRecord,
    value: &Value,
    policy: PatchPolicy,
    expected: usize,
) -> Result<Vec<u8>, PatchError> {
    let encode_err = |source| PatchError::Encode {
        path: field.path.clone(),
        source,
    };
    let resizable = policy == PatchPolicy::PadTruncate && field.type_tag.is_resizable();
    let mut bytes = match (&field.type_tag, resizable) {
        // Encode without padding so an over-long text can be truncated below.
        (TypeTag::PaddedString { encoding, .. }, true) => {
            TypeTag::GreedyString { encoding: *encoding }.encode(value)
        }
        (tag, _) => tag.encode(value),
    }
    .map_err(encode_err)?;

    if bytes.len() == expected {
        return Ok(bytes);
    }
    if !resizable {
        return Err(PatchError::SizeMismatch {
            path: field.path.clone(),
            expected,
            actual: bytes.len(),
        });
    }
    let actual = bytes.len();
    bytes.truncate(expected);
    if let TypeTag::PaddedString { encoding, .. } | TypeTag::GreedyString { encoding } = &field.type_tag {
        // Never cut a multi-byte character in half.
        while !bytes.is_empty() && encoding.decode_text(&bytes).is_none() {
            bytes.pop();
        }
    }
    bytes.resize(expected, 0);
    info!(path = %field.path, expected, actual, "resized patch value");
    Ok(bytes)
}

/// Patch the record at `path`.
pub fn patch_path(
    buf: &mut [u8],
    records: &[FieldRecord],
    path: &str,
    value: &Value,
    policy: PatchPolicy,
) -> Result<(), PatchError> {
    let field = find(records, path).ok_or_else(|| PatchError::FieldNotFound(path.to_string()))?;
    patch_with(buf, field, value, policy)
}

/// Apply a tree-view request, rejecting it when the field's type changed underneath it.
pub fn apply(
    buf: &mut [u8],
    records: &[FieldRecord],
    request: &PatchRequest,
    policy: PatchPolicy,
) -> Result<(), PatchError> {
    let field = find(records, &request.path)
        .ok_or_else(|| PatchError::FieldNotFound(request.path.clone()))?;
    if field.type_tag != request.type_tag {
        return Err(PatchError::Encode {
            path: request.path.clone(),
            source: EncodeError::Invalid(format!(
                "request is for a {} field but the field is {}",
                request.type_tag, field.type_tag
            )),
        });
    }
    patch_with(buf, field, &request.value, policy)
}

// ==================== Edit parsing ====================

/// Turn user-typed text into a value suitable for `tag`.
///
/// Integers accept decimal or `0x`/`0o`/`0b` with an optional sign; flags accept
/// `true`/`false`/`1`/`0`; byte fields accept hex (`0x6162`, `61 62`, `61:62`) or a
/// quoted string; text fields take the text as typed, minus surrounding quotes.
pub fn parse_edit(tag: &TypeTag, text: &str) -> Result<Value, EncodeError> {
    let s = text.trim();
    match tag {
        TypeTag::Int(_) => parse_int(s)
            .and_then(Value::from_i128)
            .ok_or_else(|| EncodeError::Invalid(format!("{:?} is not an integer", s))),
        TypeTag::Float(fmt) => {
            let x: f64 = s
                .parse()
                .map_err(|_| EncodeError::Invalid(format!("{:?} is not a number", s)))?;
            Ok(if fmt.width == 4 {
                Value::Float(x as f32)
            } else {
                Value::Double(x)
            })
        }
        TypeTag::Flag => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(EncodeError::Invalid(format!("{:?} is not a flag value", s))),
        },
        TypeTag::Bytes | TypeTag::GreedyBytes | TypeTag::Const(_) => {
            if let Some(inner) = unquote(s) {
                return Ok(Value::Bytes(inner.as_bytes().to_vec()));
            }
            parse_hex(s).map(Value::Bytes)
        }
        TypeTag::PaddedString { .. }
        | TypeTag::PascalString { .. }
        | TypeTag::CString { .. }
        | TypeTag::GreedyString { .. } => Ok(Value::Str(unquote(s).unwrap_or(s).to_string())),
        other => Err(EncodeError::NotEncodable(other.to_string())),
    }
}

fn unquote(s: &str) -> Option<&str> {
    ['"', '\'']
        .iter()
        .find_map(|q| s.strip_prefix(*q).and_then(|rest| rest.strip_suffix(*q)))
}

fn parse_int(s: &str) -> Option<i128> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let lower = body.to_ascii_lowercase();
    let (radix, digits) = if let Some(d) = lower.strip_prefix("0x") {
        (16, d)
    } else if let Some(d) = lower.strip_prefix("0o") {
        (8, d)
    } else if let Some(d) = lower.strip_prefix("0b") {
        (2, d)
    } else {
        (10, lower.as_str())
    };
    let digits = digits.replace('_', "");
    if digits.is_empty() {
        return None;
    }
    let magnitude = i128::from_str_radix(&digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_hex(s: &str) -> Result<Vec<u8>, EncodeError> {
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let hex: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if hex.len() % 2 != 0 {
        return Err(EncodeError::Invalid("hex input must have an even number of digits".to_string()));
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .ok_or_else(|| EncodeError::Invalid(format!("invalid hex input {:?}", s)))
        })
        .collect()
}
