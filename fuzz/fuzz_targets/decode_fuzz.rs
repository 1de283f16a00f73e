//! Decode fuzz target: decode arbitrary bytes against a fixed layout, then patch
//! every leaf with its own decoded value. Neither step may panic, and a successful
//! identity patch must leave the buffer unchanged.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const LAYOUT: &str = r#"Struct(
    "n" / Int8ub,
    "items" / Array(this.n, Struct("len" / Int8ub, "data" / Bytes(this.len))),
    "name" / PascalString(Int8ub, "utf8"),
    "note" / CString("latin1"),
    "extra" / If(this.n & 1, Int16sl),
    "tail" / GreedyBytes,
)"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let layout = match bintv::parse(LAYOUT, &bintv::Registry::standard()) {
        Ok(l) => l,
        Err(_) => return,
    };
    let tree = match bintv::decode(&layout, data) {
        Ok(t) => t,
        Err(_) => return,
    };
    let mut buf = data.to_vec();
    for field in bintv::flatten(&tree).iter().filter(|f| f.is_leaf()) {
        let _ = bintv::patch(&mut buf, field, &field.value);
    }
    assert_eq!(buf, data);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
