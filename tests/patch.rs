//! Patch engine: encoding, size policy, failure atomicity and edit parsing.

use bintv::{
    apply, decode, find, flatten, parse, parse_edit, patch, patch_path, patch_with, EncodeError, Encoding,
    FieldRecord, PatchError, PatchPolicy, PatchRequest, Registry, TypeTag, Value,
};

fn records(src: &str, buf: &[u8]) -> Vec<FieldRecord> {
    let layout = parse(src, &Registry::standard()).expect("parse");
    flatten(&decode(&layout, buf).expect("decode"))
}

fn field<'a>(records: &'a [FieldRecord], path: &str) -> &'a FieldRecord {
    find(records, path).unwrap_or_else(|| panic!("no field {}", path))
}

// --- Encoding ---

#[test]
fn test_patch_integers_in_declared_byte_order() {
    let src = r#"Struct("a" / Int16sl, "b" / Int32ub, "c" / Int8ub)"#;
    let mut buf = vec![0u8; 7];
    let recs = records(src, &buf);
    patch(&mut buf, field(&recs, "a"), &Value::I64(-2)).expect("a");
    patch(&mut buf, field(&recs, "b"), &Value::U32(0x0102_0304)).expect("b");
    patch(&mut buf, field(&recs, "c"), &Value::Bool(true)).expect("c");
    assert_eq!(buf, vec![0xfe, 0xff, 0x01, 0x02, 0x03, 0x04, 0x01]);
}

#[test]
fn test_patch_floats() {
    let src = r#"Struct("f" / Float64b, "g" / Float32l)"#;
    let mut buf = vec![0u8; 12];
    let recs = records(src, &buf);
    patch(&mut buf, field(&recs, "f"), &Value::Double(-0.5)).expect("f");
    patch(&mut buf, field(&recs, "g"), &Value::I64(3)).expect("g");
    assert_eq!(&buf[..8], &(-0.5f64).to_be_bytes());
    assert_eq!(&buf[8..], &3.0f32.to_le_bytes());
}

#[test]
fn test_integer_out_of_range_is_encode_error() {
    let mut buf = vec![0u8];
    let recs = records("Struct(\"x\" / Int8ub)", &buf);
    let err = patch(&mut buf, field(&recs, "x"), &Value::I64(300)).unwrap_err();
    assert_eq!(
        err,
        PatchError::Encode {
            path: "x".to_string(),
            source: EncodeError::OutOfRange {
                value: "300".to_string(),
                tag: "Int8ub".to_string(),
            },
        }
    );
    let err = patch(&mut buf, field(&recs, "x"), &Value::I64(-1)).unwrap_err();
    assert!(matches!(err, PatchError::Encode { source: EncodeError::OutOfRange { .. }, .. }));
    assert_eq!(buf, vec![0]);
}

#[test]
fn test_wrong_value_type_is_encode_error() {
    let mut buf = vec![0u8];
    let recs = records("Struct(\"x\" / Int8ub)", &buf);
    let err = patch(&mut buf, field(&recs, "x"), &Value::Bytes(vec![1])).unwrap_err();
    assert!(
        matches!(err, PatchError::Encode { source: EncodeError::TypeMismatch { found: "bytes", .. }, .. }),
        "{:?}",
        err
    );
}

#[test]
fn test_constant_only_accepts_its_bytes() {
    let mut buf = b"AB".to_vec();
    let recs = records("Struct(\"m\" / Const(b\"AB\"))", &buf);
    patch(&mut buf, field(&recs, "m"), &Value::Bytes(b"AB".to_vec())).expect("same bytes");
    let err = patch(&mut buf, field(&recs, "m"), &Value::Bytes(b"AC".to_vec())).unwrap_err();
    assert!(matches!(err, PatchError::Encode { source: EncodeError::Invalid(_), .. }));
    assert_eq!(buf, b"AB".to_vec());
}

#[test]
fn test_flag_keeps_its_byte_unless_the_value_changes() {
    let mut buf = vec![0x02];
    let recs = records("Struct(\"f\" / Flag)", &buf);
    assert_eq!(field(&recs, "f").value, Value::Bool(true));
    patch(&mut buf, field(&recs, "f"), &Value::Bool(true)).expect("same value");
    assert_eq!(buf, vec![0x02]);
    patch(&mut buf, field(&recs, "f"), &Value::Bool(false)).expect("false");
    assert_eq!(buf, vec![0x00]);
    let err = patch(&mut buf, field(&recs, "f"), &Value::I64(2)).unwrap_err();
    assert!(matches!(err, PatchError::Encode { source: EncodeError::OutOfRange { .. }, .. }));
}

#[test]
fn test_string_fields_encode_with_their_framing() {
    let src = r#"Struct("p" / PascalString(Int8ub), "c" / CString, "s" / PaddedString(4, "ascii"))"#;
    let mut buf = b"\x02hiok\0ab\0\0".to_vec();
    let recs = records(src, &buf);
    patch(&mut buf, field(&recs, "p"), &Value::Str("yo".into())).expect("p");
    patch(&mut buf, field(&recs, "c"), &Value::Str("no".into())).expect("c");
    patch(&mut buf, field(&recs, "s"), &Value::Str("xyz".into())).expect("s");
    assert_eq!(buf, b"\x02yono\0xyz\0".to_vec());

    // Different-length text would move the terminator or the prefix.
    let err = patch(&mut buf, field(&recs, "c"), &Value::Str("n".into())).unwrap_err();
    assert!(matches!(err, PatchError::SizeMismatch { expected: 3, actual: 2, .. }));
    let err = patch(&mut buf, field(&recs, "c"), &Value::Str("a\0".into())).unwrap_err();
    assert!(matches!(err, PatchError::Encode { source: EncodeError::Invalid(_), .. }));
    let err = patch(&mut buf, field(&recs, "s"), &Value::Str("é".into())).unwrap_err();
    assert!(matches!(
        err,
        PatchError::Encode {
            source: EncodeError::Unrepresentable(Encoding::Ascii),
            ..
        }
    ));
}

// --- Size policy ---

#[test]
fn test_strict_policy_rejects_other_lengths() {
    let mut buf = b"abcd".to_vec();
    let recs = records("Struct(\"d\" / Bytes(4))", &buf);
    let err = patch(&mut buf, field(&recs, "d"), &Value::Bytes(b"ab".to_vec())).unwrap_err();
    assert_eq!(
        err,
        PatchError::SizeMismatch {
            path: "d".to_string(),
            expected: 4,
            actual: 2,
        }
    );
    assert_eq!(buf, b"abcd".to_vec());
}

#[test]
fn test_pad_truncate_resizes_byte_fields() {
    let mut buf = b"abcd".to_vec();
    let recs = records("Struct(\"d\" / Bytes(4))", &buf);
    let d = field(&recs, "d");
    patch_with(&mut buf, d, &Value::Bytes(b"xy".to_vec()), PatchPolicy::PadTruncate).expect("pad");
    assert_eq!(buf, b"xy\0\0".to_vec());
    patch_with(&mut buf, d, &Value::Bytes(b"123456".to_vec()), PatchPolicy::PadTruncate).expect("truncate");
    assert_eq!(buf, b"1234".to_vec());
}

#[test]
fn test_pad_truncate_shortens_padded_strings_on_character_boundaries() {
    let mut buf = b"ab\0\0".to_vec();
    let recs = records("Struct(\"s\" / PaddedString(4, \"utf8\"))", &buf);
    let s = field(&recs, "s");

    let err = patch(&mut buf, s, &Value::Str("abcdef".into())).unwrap_err();
    assert!(matches!(err, PatchError::Encode { source: EncodeError::OutOfRange { .. }, .. }));

    patch_with(&mut buf, s, &Value::Str("abcdef".into()), PatchPolicy::PadTruncate).expect("truncate");
    assert_eq!(buf, b"abcd".to_vec());
    patch_with(&mut buf, s, &Value::Str("abcé".into()), PatchPolicy::PadTruncate).expect("boundary");
    assert_eq!(buf, b"abc\0".to_vec());

    let after = records("Struct(\"s\" / PaddedString(4, \"utf8\"))", &buf);
    assert_eq!(field(&after, "s").value, Value::Str("abc".into()));
}

#[test]
fn test_pad_truncate_does_not_apply_to_self_delimiting_fields() {
    let mut buf = b"\x02hi\0".to_vec();
    let recs = records(r#"Struct("p" / PascalString(Int8ub), "c" / CString)"#, &buf);
    let err = patch_with(&mut buf, field(&recs, "p"), &Value::Str("hey".into()), PatchPolicy::PadTruncate)
        .unwrap_err();
    assert!(matches!(err, PatchError::SizeMismatch { expected: 3, actual: 4, .. }));
    let err = patch_with(&mut buf, field(&recs, "c"), &Value::Str("x".into()), PatchPolicy::PadTruncate)
        .unwrap_err();
    assert!(matches!(err, PatchError::SizeMismatch { expected: 1, actual: 2, .. }));
    assert_eq!(buf, b"\x02hi\0".to_vec());
}

// --- Addressing ---

#[test]
fn test_patch_by_path() {
    let mut buf = vec![1, 2];
    let recs = records(r#"Struct("hdr" / Struct("a" / Int8ub), "b" / Int8ub)"#, &buf);
    patch_path(&mut buf, &recs, "hdr/a", &Value::U8(9), PatchPolicy::Strict).expect("patch");
    assert_eq!(buf, vec![9, 2]);
    let err = patch_path(&mut buf, &recs, "hdr/zz", &Value::U8(1), PatchPolicy::Strict).unwrap_err();
    assert_eq!(err, PatchError::FieldNotFound("hdr/zz".to_string()));
}

#[test]
fn test_record_outside_buffer_is_not_found() {
    let recs = records("Struct(\"a\" / Int8ub, \"b\" / Int8ub)", &[1, 2]);
    let mut short = vec![0u8];
    let err = patch(&mut short, field(&recs, "b"), &Value::U8(5)).unwrap_err();
    assert_eq!(err, PatchError::FieldNotFound("b".to_string()));
    assert_eq!(short, vec![0]);
}

#[test]
fn test_containers_are_not_patchable() {
    let mut buf = vec![1, 2];
    let recs = records(r#"Struct("hdr" / Struct("a" / Int8ub, "b" / Int8ub))"#, &buf);
    let err = patch(&mut buf, field(&recs, "hdr"), &Value::Bytes(vec![0, 0])).unwrap_err();
    assert!(matches!(err, PatchError::Encode { source: EncodeError::NotEncodable(_), .. }));
}

#[test]
fn test_apply_checks_the_declared_type() {
    let mut buf = vec![0u8, 0];
    let recs = records("Struct(\"w\" / Int16ub)", &buf);
    let tag = field(&recs, "w").type_tag.clone();

    let stale = PatchRequest {
        path: "w".to_string(),
        value: Value::U8(1),
        type_tag: TypeTag::Flag,
    };
    let err = apply(&mut buf, &recs, &stale, PatchPolicy::Strict).unwrap_err();
    assert!(matches!(err, PatchError::Encode { source: EncodeError::Invalid(_), .. }));

    let request = PatchRequest {
        path: "w".to_string(),
        value: Value::U16(0xbeef),
        type_tag: tag,
    };
    apply(&mut buf, &recs, &request, PatchPolicy::Strict).expect("apply");
    assert_eq!(buf, vec![0xbe, 0xef]);
}

// --- Edit parsing ---

#[test]
fn test_parse_edit_per_type() {
    let recs = records(
        r#"Struct("i" / Int16ul, "f" / Float32b, "ok" / Flag, "d" / Bytes(2), "s" / CString, "n" / Computed(1))"#,
        b"\0\0\0\0\0\0\0ab\0",
    );
    let tag = |p: &str| field(&recs, p).type_tag.clone();
    assert_eq!(parse_edit(&tag("i"), "0x10").expect("hex"), Value::I64(16));
    assert_eq!(parse_edit(&tag("i"), " -5 ").expect("neg"), Value::I64(-5));
    assert_eq!(parse_edit(&tag("i"), "1_000").expect("sep"), Value::I64(1000));
    assert!(parse_edit(&tag("i"), "ten").is_err());
    assert_eq!(parse_edit(&tag("f"), "1.5").expect("float"), Value::Float(1.5));
    assert_eq!(parse_edit(&tag("ok"), "True").expect("flag"), Value::Bool(true));
    assert_eq!(parse_edit(&tag("ok"), "0").expect("flag"), Value::Bool(false));
    assert_eq!(parse_edit(&tag("d"), "61 62").expect("hex"), Value::Bytes(b"ab".to_vec()));
    assert_eq!(parse_edit(&tag("d"), "0x6162").expect("hex"), Value::Bytes(b"ab".to_vec()));
    assert_eq!(parse_edit(&tag("d"), "\"ab\"").expect("quoted"), Value::Bytes(b"ab".to_vec()));
    assert!(parse_edit(&tag("d"), "abc").is_err());
    assert_eq!(parse_edit(&tag("s"), "'hi'").expect("text"), Value::Str("hi".into()));
    assert_eq!(parse_edit(&tag("s"), "plain text").expect("text"), Value::Str("plain text".into()));
    assert!(matches!(parse_edit(&tag("n"), "1"), Err(EncodeError::NotEncodable(_))));
}
