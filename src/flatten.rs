//! Flatten a [`ParsedNode`] tree into addressable [`FieldRecord`]s.
//!
//! Records come out in pre-order. Paths use `/` between struct members and `[i]` for
//! array or sequence elements; the root container has the empty path:
//!
//! | Node | Path |
//! |------|------|
//! | root struct | `""` |
//! | member `flags` of member `header` | `header/flags` |
//! | field `len` of element 2 of `items` | `items[2]/len` |
//! | first item of a root sequence | `[0]` |

use crate::codec::TypeTag;
use crate::node::{NodeKind, ParsedNode, Span};
use crate::value::Value;
use tracing::debug;

/// One flattened field: where it lives in the buffer and what it decoded to.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub path: String,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub raw: Option<Vec<u8>>,
    pub value: Value,
    pub type_tag: TypeTag,
}

impl FieldRecord {
    pub fn span(&self) -> Option<Span> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(Span::new(start, end)),
            _ => None,
        }
    }

    /// `end - start`, or `None` for computed and absent fields.
    pub fn length(&self) -> Option<usize> {
        self.span().map(|s| s.len())
    }

    pub fn is_leaf(&self) -> bool {
        !self.type_tag.is_container()
    }

    /// Nesting depth derived from the path (root = 0).
    pub fn depth(&self) -> usize {
        if self.path.is_empty() {
            return 0;
        }
        let segments = self.path.split('/').count();
        let extra_indices: usize = self
            .path
            .split('/')
            .map(|seg| {
                let brackets = seg.matches('[').count();
                // A segment that is only an index (`[0]`) is already counted.
                if seg.starts_with('[') {
                    brackets.saturating_sub(1)
                } else {
                    brackets
                }
            })
            .sum();
        segments + extra_indices
    }
}

/// Pre-order flattening. Internal (`_`-prefixed) members are skipped with their subtree.
pub fn flatten(node: &ParsedNode) -> Vec<FieldRecord> {
    let mut out = Vec::new();
    walk(node, String::new(), &mut out);
    debug!(records = out.len(), "flattened tree");
    out
}

fn walk(node: &ParsedNode, path: String, out: &mut Vec<FieldRecord>) {
    if node.internal {
        return;
    }
    match &node.kind {
        NodeKind::Leaf(value) => out.push(FieldRecord {
            path,
            start: node.start(),
            end: node.end(),
            raw: node.raw.clone(),
            value: value.clone(),
            type_tag: node.type_tag.clone(),
        }),
        NodeKind::Struct(members) => {
            if node.span.is_some() {
                out.push(container_record(node, &path));
            }
            for (name, child) in members {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", path, name)
                };
                walk(child, child_path, out);
            }
        }
        NodeKind::List(items) => {
            if node.span.is_some() {
                out.push(container_record(node, &path));
            }
            for (i, child) in items.iter().enumerate() {
                walk(child, format!("{}[{}]", path, i), out);
            }
        }
    }
}

fn container_record(node: &ParsedNode, path: &str) -> FieldRecord {
    FieldRecord {
        path: path.to_string(),
        start: node.start(),
        end: node.end(),
        raw: None,
        value: node.to_value(),
        type_tag: node.type_tag.clone(),
    }
}

/// Record with exactly this path.
pub fn find<'a>(records: &'a [FieldRecord], path: &str) -> Option<&'a FieldRecord> {
    records.iter().find(|r| r.path == path)
}

/// Innermost leaf record whose range contains `offset` (linear scan).
pub fn field_at(records: &[FieldRecord], offset: usize) -> Option<&FieldRecord> {
    records
        .iter()
        .filter(|r| r.is_leaf())
        .find(|r| r.span().map(|s| s.contains(offset)).unwrap_or(false))
}

/// Offset to field lookup over the leaf ranges of a record list.
///
/// Leaf ranges never overlap, so sorting by start allows a binary search.
#[derive(Debug, Clone, Default)]
pub struct FieldIndex {
    /// (span, index into the record list), sorted by start; zero-length ranges omitted.
    ranges: Vec<(Span, usize)>,
}

impl FieldIndex {
    pub fn build(records: &[FieldRecord]) -> Self {
        let mut ranges: Vec<(Span, usize)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_leaf())
            .filter_map(|(i, r)| r.span().filter(|s| !s.is_empty()).map(|s| (s, i)))
            .collect();
        ranges.sort_by_key(|(s, _)| s.start);
        FieldIndex { ranges }
    }

    /// Position in the record list of the leaf containing `offset`.
    pub fn lookup(&self, offset: usize) -> Option<usize> {
        let idx = self.ranges.partition_point(|(s, _)| s.start <= offset);
        let (span, record) = self.ranges.get(idx.checked_sub(1)?)?;
        span.contains(offset).then_some(*record)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
