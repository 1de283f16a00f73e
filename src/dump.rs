//! Format decoded values, field records and trees as text (dump output, tree labels).

use crate::flatten::FieldRecord;
use crate::node::{NodeKind, ParsedNode, Span};
use crate::value::Value;

/// Bytes shown in full up to this length, otherwise as a preview.
const BYTES_INLINE_MAX: usize = 16;
const BYTES_PREVIEW: usize = 8;
const STR_INLINE_MAX: usize = 32;

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Display class of a value: `null`, `bool`, `byte`/`word`/`dword`/`int` by magnitude,
/// `float`, `bytes`, `str`, `struct` or `array`.
pub fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::None => "null",
        Value::Bool(_) => "bool",
        Value::Float(_) | Value::Double(_) => "float",
        Value::Bytes(_) => "bytes",
        Value::Str(_) => "str",
        Value::Struct(_) => "struct",
        Value::List(_) => "array",
        other => match other.as_i128() {
            Some(n) if (-128..=255).contains(&n) => "byte",
            Some(n) if (-32768..=65535).contains(&n) => "word",
            Some(n) if (-2147483648..=4294967295).contains(&n) => "dword",
            _ => "int",
        },
    }
}

fn hex_suffix(n: i128) -> String {
    let digits = match n {
        -128..=255 => 2,
        -32768..=65535 => 4,
        -2147483648..=4294967295 => 8,
        _ => 0,
    };
    let sign = if n < 0 { "-" } else { "" };
    format!("{}0x{:0width$X}", sign, n.unsigned_abs(), width = digits)
}

/// One-line display of a value.
pub fn format_value(v: &Value) -> String {
    match v {
        Value::None => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Double(x) => x.to_string(),
        Value::Bytes(b) if b.is_empty() => "(empty)".to_string(),
        Value::Bytes(b) if b.len() <= BYTES_INLINE_MAX => hex_string(b),
        Value::Bytes(b) => format!("{}... ({} bytes)", hex_string(&b[..BYTES_PREVIEW]), b.len()),
        Value::Str(s) if s.chars().count() > STR_INLINE_MAX => {
            let head: String = s.chars().take(STR_INLINE_MAX - 3).collect();
            format!("\"{}...\"", head)
        }
        Value::Str(s) => format!("\"{}\"", s),
        Value::Struct(_) => "{...}".to_string(),
        Value::List(items) => format!("[{} items]", items.len()),
        other => match other.as_i128() {
            Some(n) => format!("{} ({})", n, hex_suffix(n)),
            None => other.to_string(),
        },
    }
}

fn range_text(span: Option<Span>) -> String {
    match span {
        Some(s) => format!("{:04x}..{:04x}", s.start, s.end),
        None => format!("{:>4}  {:>4}", "-", "-"),
    }
}

fn label(path: &str) -> &str {
    if path.is_empty() {
        return "<root>";
    }
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rfind('[') {
        Some(i) if i > 0 => &last[i..],
        _ => last,
    }
}

/// One line per record: byte range, indented name, type tag and value.
pub fn format_records(records: &[FieldRecord]) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&format!(
            "{}  {}{} ({}): {}\n",
            range_text(r.span()),
            "  ".repeat(r.depth()),
            label(&r.path),
            r.type_tag,
            format_value(&r.value)
        ));
    }
    out
}

/// Indented tree, hiding internal members.
pub fn format_tree(node: &ParsedNode) -> String {
    let mut lines = Vec::new();
    tree_lines(node, "<root>", 0, &mut lines);
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn tree_lines(node: &ParsedNode, name: &str, indent: usize, lines: &mut Vec<String>) {
    if node.internal {
        return;
    }
    let pad = "  ".repeat(indent);
    match &node.kind {
        NodeKind::Leaf(v) => lines.push(format!("{}{} ({}): {}", pad, name, value_kind(v), format_value(v))),
        NodeKind::Struct(members) => {
            lines.push(format!("{}{} (struct)", pad, name));
            for (k, child) in members {
                tree_lines(child, k, indent + 1, lines);
            }
        }
        NodeKind::List(items) => {
            lines.push(format!("{}{} (array) [{} items]", pad, name, items.len()));
            for (i, child) in items.iter().enumerate() {
                tree_lines(child, &format!("[{}]", i), indent + 1, lines);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_get_hex_suffix_by_magnitude() {
        assert_eq!(format_value(&Value::U8(5)), "5 (0x05)");
        assert_eq!(format_value(&Value::U16(0x1234)), "4660 (0x1234)");
        assert_eq!(format_value(&Value::U32(70000)), "70000 (0x00011170)");
        assert_eq!(format_value(&Value::U64(1 << 40)), "1099511627776 (0x10000000000)");
        assert_eq!(format_value(&Value::I8(-1)), "-1 (-0x01)");
    }

    #[test]
    fn bytes_and_strings_are_previewed() {
        assert_eq!(format_value(&Value::Bytes(b"abc".to_vec())), "61 62 63");
        let long = Value::Bytes(vec![0xaa; 20]);
        assert_eq!(format_value(&long), "aa aa aa aa aa aa aa aa... (20 bytes)");
        let text = Value::Str("x".repeat(40));
        assert_eq!(format_value(&text), format!("\"{}...\"", "x".repeat(29)));
        assert_eq!(format_value(&Value::None), "null");
    }

    #[test]
    fn value_kind_classes() {
        assert_eq!(value_kind(&Value::U16(200)), "byte");
        assert_eq!(value_kind(&Value::U16(300)), "word");
        assert_eq!(value_kind(&Value::List(vec![])), "array");
    }

    #[test]
    fn labels_use_last_path_segment() {
        assert_eq!(label(""), "<root>");
        assert_eq!(label("header/flags"), "flags");
        assert_eq!(label("items[2]"), "[2]");
        assert_eq!(label("items[2]/len"), "len");
    }
}
