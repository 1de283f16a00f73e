//! Decode a file against a layout definition, print its fields and optionally patch it.
//!
//! Usage:
//!   bintv-dump --layout LAYOUT --target FILE [OPTIONS]
//!
//! Options:
//!   --set PATH=VALUE   Patch a field (repeatable, applied in order)
//!   --out FILE         Write the (patched) buffer to FILE
//!   --pad-truncate     Zero-pad or truncate resizable fields instead of rejecting
//!   --tree             Print the value tree instead of the field list
//!   --at OFFSET        Report the field containing OFFSET (decimal or 0x hex)
//!
//! Set RUST_LOG to control log output (default `info`, written to stderr).

use anyhow::{bail, Context};
use bintv::dump::{format_records, format_tree, format_value};
use bintv::{parse_edit, EngineConfig, PatchPolicy, Session};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

fn usage() -> ! {
    eprintln!("Usage: bintv-dump --layout LAYOUT --target FILE [--set PATH=VALUE]... [--out FILE] [--pad-truncate] [--tree] [--at OFFSET]");
    std::process::exit(2);
}

/// Remove `flag VALUE` from `args`, returning VALUE.
fn take_value(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.remove(pos);
    if pos < args.len() {
        Some(args.remove(pos))
    } else {
        usage()
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|a| a == flag) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn parse_offset(s: &str) -> anyhow::Result<usize> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("invalid offset {:?}", s))
}

fn main() -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let format_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(format_layer)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if take_flag(&mut args, "--help") || take_flag(&mut args, "-h") {
        usage();
    }
    let layout_path: PathBuf = take_value(&mut args, "--layout").map(PathBuf::from).unwrap_or_else(|| usage());
    let target_path: PathBuf = take_value(&mut args, "--target").map(PathBuf::from).unwrap_or_else(|| usage());
    let out_path: Option<PathBuf> = take_value(&mut args, "--out").map(PathBuf::from);
    let at: Option<usize> = take_value(&mut args, "--at").map(|s| parse_offset(&s)).transpose()?;
    let pad_truncate = take_flag(&mut args, "--pad-truncate");
    let show_tree = take_flag(&mut args, "--tree");
    let mut edits = Vec::new();
    while let Some(edit) = take_value(&mut args, "--set") {
        edits.push(edit);
    }
    if let Some(extra) = args.first() {
        bail!("unexpected argument {:?}", extra);
    }

    let policy = if pad_truncate {
        PatchPolicy::PadTruncate
    } else {
        PatchPolicy::Strict
    };
    let mut session = Session::new(EngineConfig::default().with_patch_policy(policy));
    let layout_text = std::fs::read_to_string(&layout_path)
        .with_context(|| format!("reading layout {}", layout_path.display()))?;
    session
        .set_layout(&layout_text)
        .with_context(|| format!("compiling layout {}", layout_path.display()))?;
    session
        .load_file(&target_path)
        .with_context(|| format!("decoding {}", target_path.display()))?;

    for edit in &edits {
        let (path, text) = edit
            .split_once('=')
            .with_context(|| format!("--set expects PATH=VALUE, got {:?}", edit))?;
        let tag = session
            .snapshot()
            .and_then(|s| s.field(path))
            .map(|f| f.type_tag.clone())
            .with_context(|| format!("no field at path {:?}", path))?;
        let value = parse_edit(&tag, text).with_context(|| format!("parsing value for {:?}", path))?;
        session
            .patch(path, &value)
            .with_context(|| format!("patching {:?}", path))?;
        info!(path, value = %format_value(&value), "applied edit");
    }

    let snapshot = session.snapshot().context("no decode result")?;
    if show_tree {
        print!("{}", format_tree(&snapshot.tree));
    } else {
        print!("{}", format_records(&snapshot.fields));
    }

    if let Some(offset) = at {
        match snapshot.field_at(offset) {
            Some(f) => println!("offset {:#x}: {} ({}) = {}", offset, f.path, f.type_tag, format_value(&f.value)),
            None => println!("offset {:#x}: no field", offset),
        }
    }

    if let Some(out) = out_path {
        session
            .save(&out)
            .with_context(|| format!("writing {}", out.display()))?;
    }
    Ok(())
}
