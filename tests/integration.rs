//! Integration tests: parse a layout, decode, flatten, patch and re-decode.

use bintv::{
    decode, field_at, find, flatten, parse, patch, DecodeError, FieldIndex, FieldRecord, PatchError, Registry,
    TypeTag, Value,
};

const SAMPLE_LAYOUT: &str = r#"
# A little container format exercising most combinators.
Struct(
    "magic"   / Const(b"BT"),
    "version" / Int8ub,
    "flags"   / Int8ub,
    "count"   / Int16ub,
    "items"   / Array(this.count, Struct(
        "tag"  / Int8ub,
        "len"  / Int8ub,
        "data" / Bytes(this.len),
    )),
    "name"    / PascalString(Int8ub, "utf8"),
    "label"   / PaddedString(6, "ascii"),
    "note"    / CString("utf8"),
    "ratio"   / Float32l,
    "ok"      / Flag,
    "extra"   / If(this.flags & 0x01, Int32ul),
    "total"   / Computed(this.count * 2),
    "tail"    / GreedyBytes,
)
"#;

fn sample_buffer(flags: u8) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(b"BT");
    b.extend_from_slice(&[1, flags, 0x00, 0x02]);
    b.extend_from_slice(&[0x10, 2, 0xaa, 0xbb]);
    b.extend_from_slice(&[0x11, 1, 0xcc]);
    b.extend_from_slice(&[3, b'f', b'o', b'o']);
    b.extend_from_slice(b"hi\0\0\0\0");
    b.extend_from_slice(b"n\0");
    b.extend_from_slice(&1.5f32.to_le_bytes());
    b.push(1);
    if flags & 0x01 != 0 {
        b.extend_from_slice(&42u32.to_le_bytes());
    }
    b.extend_from_slice(&[0xee, 0xff]);
    b
}

fn sample_records(buf: &[u8]) -> Vec<FieldRecord> {
    let layout = parse(SAMPLE_LAYOUT, &Registry::standard()).expect("parse");
    flatten(&decode(&layout, buf).expect("decode"))
}

fn value_at(records: &[FieldRecord], path: &str) -> Value {
    find(records, path).unwrap_or_else(|| panic!("no field {}", path)).value.clone()
}

#[test]
fn test_context_dependent_sizing() {
    let layout = parse(r#"Struct("count" / Int16ul, "data" / Bytes(this.count))"#, &Registry::standard())
        .expect("parse");
    let buf = [0x03, 0x00, b'a', b'b', b'c'];
    let records = flatten(&decode(&layout, &buf).expect("decode"));

    let count = find(&records, "count").expect("count");
    assert_eq!(count.value, Value::U16(3));
    assert_eq!((count.start, count.end), (Some(0), Some(2)));

    let data = find(&records, "data").expect("data");
    assert_eq!(data.value, Value::Bytes(b"abc".to_vec()));
    assert_eq!((data.start, data.end), (Some(2), Some(5)));
    assert_eq!(data.length(), Some(3));
    assert_eq!(data.raw.as_deref(), Some(&b"abc"[..]));
}

#[test]
fn test_constant_mismatch() {
    let layout = parse(r#"Struct("magic" / Const(b"AB"), "len" / Int8ub)"#, &Registry::standard())
        .expect("parse");
    let err = decode(&layout, b"AC\x01").unwrap_err();
    assert_eq!(
        err,
        DecodeError::ConstMismatch {
            offset: 0,
            expected: b"AB".to_vec(),
            found: b"AC".to_vec(),
        }
    );
}

#[test]
fn test_end_to_end_patch_and_redecode() {
    let layout = parse(
        r#"Struct("magic" / Const(b"AB"), "len" / Int16ul, "payload" / Bytes(this.len))"#,
        &Registry::standard(),
    )
    .expect("parse");
    let mut buf = b"AB\x03\x00xyz".to_vec();
    let records = flatten(&decode(&layout, &buf).expect("decode"));
    let payload = find(&records, "payload").expect("payload");
    assert_eq!(payload.value, Value::Bytes(b"xyz".to_vec()));

    patch(&mut buf, payload, &Value::Bytes(b"XYZ".to_vec())).expect("patch");
    assert_eq!(buf, b"AB\x03\x00XYZ".to_vec());

    let records = flatten(&decode(&layout, &buf).expect("redecode"));
    assert_eq!(value_at(&records, "payload"), Value::Bytes(b"XYZ".to_vec()));
    assert_eq!(value_at(&records, "len"), Value::U16(3));
}

#[test]
fn test_sample_values() {
    let buf = sample_buffer(0x01);
    let records = sample_records(&buf);
    assert_eq!(value_at(&records, "magic"), Value::Bytes(b"BT".to_vec()));
    assert_eq!(value_at(&records, "count"), Value::U16(2));
    assert_eq!(value_at(&records, "items[0]/tag"), Value::U8(0x10));
    assert_eq!(value_at(&records, "items[0]/data"), Value::Bytes(vec![0xaa, 0xbb]));
    assert_eq!(value_at(&records, "items[1]/data"), Value::Bytes(vec![0xcc]));
    assert_eq!(value_at(&records, "name"), Value::Str("foo".to_string()));
    assert_eq!(value_at(&records, "label"), Value::Str("hi".to_string()));
    assert_eq!(value_at(&records, "note"), Value::Str("n".to_string()));
    assert_eq!(value_at(&records, "ratio"), Value::Float(1.5));
    assert_eq!(value_at(&records, "ok"), Value::Bool(true));
    assert_eq!(value_at(&records, "extra"), Value::U32(42));
    assert_eq!(value_at(&records, "total"), Value::I64(4));
    assert_eq!(value_at(&records, "tail"), Value::Bytes(vec![0xee, 0xff]));

    let note = find(&records, "note").expect("note");
    // The terminator belongs to the field.
    assert_eq!(note.raw.as_deref(), Some(&b"n\0"[..]));
}

#[test]
fn test_flatten_order_and_paths() {
    let buf = sample_buffer(0x01);
    let records = sample_records(&buf);
    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "",
            "magic",
            "version",
            "flags",
            "count",
            "items",
            "items[0]",
            "items[0]/tag",
            "items[0]/len",
            "items[0]/data",
            "items[1]",
            "items[1]/tag",
            "items[1]/len",
            "items[1]/data",
            "name",
            "label",
            "note",
            "ratio",
            "ok",
            "extra",
            "total",
            "tail",
        ]
    );
    let items = find(&records, "items").expect("items");
    assert_eq!(items.type_tag, TypeTag::Array);
    assert_eq!((items.start, items.end), (Some(6), Some(13)));
    let root = find(&records, "").expect("root");
    assert_eq!((root.start, root.end), (Some(0), Some(buf.len())));
}

#[test]
fn test_leaf_ranges_cover_every_byte_once() {
    let buf = sample_buffer(0x01);
    let records = sample_records(&buf);
    let mut hits = vec![0u32; buf.len()];
    for r in records.iter().filter(|r| r.is_leaf()) {
        if let Some(span) = r.span() {
            for h in &mut hits[span.start..span.end] {
                *h += 1;
            }
            assert_eq!(r.raw.as_deref(), Some(&buf[span.start..span.end]), "raw bytes of {}", r.path);
        }
    }
    assert!(hits.iter().all(|&h| h == 1), "coverage: {:?}", hits);
}

#[test]
fn test_ranges_are_ordered_and_nested() {
    let buf = sample_buffer(0x01);
    let records = sample_records(&buf);

    let starts: Vec<usize> = records.iter().filter_map(|r| r.start).collect();
    assert!(starts.windows(2).all(|w| w[0] <= w[1]), "starts: {:?}", starts);

    for parent in records.iter().filter(|r| !r.is_leaf()) {
        let span = parent.span().expect("containers are only emitted with a range");
        for child in &records {
            let is_descendant = parent.path.is_empty()
                || child.path.starts_with(&format!("{}/", parent.path))
                || child.path.starts_with(&format!("{}[", parent.path));
            if let (true, Some(c)) = (is_descendant, child.span()) {
                assert!(span.covers(&c), "{} not inside {}", child.path, parent.path);
            }
        }
    }
}

#[test]
fn test_computed_fields_have_no_range() {
    let buf = sample_buffer(0x01);
    let records = sample_records(&buf);
    let total = find(&records, "total").expect("total");
    assert_eq!(total.type_tag, TypeTag::Computed);
    assert_eq!((total.start, total.end, total.length()), (None, None, None));
    assert!(total.raw.is_none());
}

#[test]
fn test_absent_conditional() {
    let buf = sample_buffer(0x00);
    let records = sample_records(&buf);
    let extra = find(&records, "extra").expect("extra");
    assert_eq!(extra.type_tag, TypeTag::Absent);
    assert_eq!(extra.value, Value::None);
    assert_eq!(extra.span(), None);
    // Bytes of the absent field are not consumed.
    assert_eq!(value_at(&records, "tail"), Value::Bytes(vec![0xee, 0xff]));

    let mut patched = buf.clone();
    let err = patch(&mut patched, extra, &Value::U32(1)).unwrap_err();
    assert_eq!(err, PatchError::NoOffsetInfo("extra".to_string()));
    assert_eq!(patched, buf);
}

#[test]
fn test_patch_with_own_value_is_identity() {
    let mut buf = sample_buffer(0x01);
    // A non-canonical true flag must survive being written back.
    let ok = find(&sample_records(&buf), "ok").and_then(|r| r.start).expect("ok offset");
    buf[ok] = 0x02;
    let records = sample_records(&buf);
    assert_eq!(find(&records, "ok").map(|r| r.value.clone()), Some(Value::Bool(true)));
    for r in records.iter().filter(|r| r.is_leaf() && r.span().is_some()) {
        let mut copy = buf.clone();
        patch(&mut copy, r, &r.value).unwrap_or_else(|e| panic!("patch {}: {}", r.path, e));
        assert_eq!(copy, buf, "patching {} with its own value changed the buffer", r.path);
    }
}

#[test]
fn test_patch_then_redecode_is_consistent() {
    let mut buf = sample_buffer(0x01);
    let records = sample_records(&buf);
    let edits = [
        ("extra", Value::U32(7)),
        ("label", Value::Str("hey".to_string())),
        ("items[1]/tag", Value::U8(0x99)),
        ("ratio", Value::Float(-2.25)),
        ("name", Value::Str("bar".to_string())),
    ];
    for (path, value) in &edits {
        let field = find(&records, path).expect("field");
        patch(&mut buf, field, value).expect("patch");
    }
    let after = sample_records(&buf);
    for (path, value) in &edits {
        assert_eq!(&value_at(&after, path), value, "{}", path);
    }
    assert_eq!(after.len(), records.len());
}

#[test]
fn test_failed_patch_leaves_buffer_untouched() {
    let mut buf = sample_buffer(0x01);
    let before = buf.clone();
    let records = sample_records(&buf);
    let data = find(&records, "items[0]/data").expect("data");
    let err = patch(&mut buf, data, &Value::Bytes(b"abc".to_vec())).unwrap_err();
    assert_eq!(
        err,
        PatchError::SizeMismatch {
            path: "items[0]/data".to_string(),
            expected: 2,
            actual: 3,
        }
    );
    let total = find(&records, "total").expect("total");
    assert_eq!(
        patch(&mut buf, total, &Value::I64(1)).unwrap_err(),
        PatchError::NoOffsetInfo("total".to_string())
    );
    assert_eq!(buf, before);
}

#[test]
fn test_decode_is_deterministic() {
    let layout = parse(SAMPLE_LAYOUT, &Registry::standard()).expect("parse");
    let buf = sample_buffer(0x01);
    assert_eq!(decode(&layout, &buf).expect("a"), decode(&layout, &buf).expect("b"));
}

#[test]
fn test_reverse_lookup() {
    let buf = sample_buffer(0x01);
    let records = sample_records(&buf);
    let index = FieldIndex::build(&records);
    for (offset, path) in [(0, "magic"), (8, "items[0]/data"), (12, "items[1]/data"), (35, "tail")] {
        assert_eq!(field_at(&records, offset).map(|r| r.path.as_str()), Some(path));
        assert_eq!(index.lookup(offset).map(|i| records[i].path.as_str()), Some(path));
    }
    assert!(field_at(&records, buf.len()).is_none());
    assert!(index.lookup(buf.len()).is_none());
}

#[test]
fn test_truncated_buffer_fails_whole_decode() {
    let buf = sample_buffer(0x01);
    let layout = parse(SAMPLE_LAYOUT, &Registry::standard()).expect("parse");
    let err = decode(&layout, &buf[..11]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::BufferExhausted {
            offset: 11,
            needed: 1,
            available: 0,
        }
    );
}
