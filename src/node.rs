//! Decoded value tree with byte-range metadata.

use crate::codec::TypeTag;
use crate::value::Value;

/// Half-open byte range `[start, end)` in the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn covers(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Smallest span covering every ranged item, or `None` when there is none.
    pub fn union<I: IntoIterator<Item = Option<Span>>>(spans: I) -> Option<Span> {
        spans.into_iter().flatten().reduce(|a, b| Span {
            start: a.start.min(b.start),
            end: a.end.max(b.end),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf(Value),
    /// Named members in declaration order.
    Struct(Vec<(String, ParsedNode)>),
    /// Array elements or sequence items.
    List(Vec<ParsedNode>),
}

/// One node of a decode result.
///
/// Leaves produced by a tracked primitive carry both `span` and `raw`; computed and
/// absent leaves carry neither. Containers carry the union of their children's spans
/// and never cache raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNode {
    pub kind: NodeKind,
    pub span: Option<Span>,
    pub raw: Option<Vec<u8>>,
    pub type_tag: TypeTag,
    /// Set on struct members whose name starts with `_`.
    pub internal: bool,
}

impl ParsedNode {
    pub fn leaf(value: Value, span: Option<Span>, raw: Option<Vec<u8>>, type_tag: TypeTag) -> Self {
        ParsedNode {
            kind: NodeKind::Leaf(value),
            span,
            raw,
            type_tag,
            internal: false,
        }
    }

    pub fn computed(value: Value) -> Self {
        ParsedNode::leaf(value, None, None, TypeTag::Computed)
    }

    pub fn absent() -> Self {
        ParsedNode::leaf(Value::None, None, None, TypeTag::Absent)
    }

    pub fn structure(members: Vec<(String, ParsedNode)>) -> Self {
        let span = Span::union(members.iter().map(|(_, n)| n.span));
        ParsedNode {
            kind: NodeKind::Struct(members),
            span,
            raw: None,
            type_tag: TypeTag::Struct,
            internal: false,
        }
    }

    pub fn list(items: Vec<ParsedNode>, type_tag: TypeTag) -> Self {
        let span = Span::union(items.iter().map(|n| n.span));
        ParsedNode {
            kind: NodeKind::List(items),
            span,
            raw: None,
            type_tag,
            internal: false,
        }
    }

    pub fn start(&self) -> Option<usize> {
        self.span.map(|s| s.start)
    }

    pub fn end(&self) -> Option<usize> {
        self.span.map(|s| s.end)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Member of a struct node by name.
    pub fn get(&self, name: &str) -> Option<&ParsedNode> {
        match &self.kind {
            NodeKind::Struct(members) => members.iter().find(|(k, _)| k == name).map(|(_, n)| n),
            _ => None,
        }
    }

    /// Element of an array or sequence node.
    pub fn item(&self, index: usize) -> Option<&ParsedNode> {
        match &self.kind {
            NodeKind::List(items) => items.get(index),
            _ => None,
        }
    }

    /// Plain value view of this subtree (what later expressions see).
    pub fn to_value(&self) -> Value {
        match &self.kind {
            NodeKind::Leaf(v) => v.clone(),
            NodeKind::Struct(members) => Value::Struct(
                members
                    .iter()
                    .map(|(k, n)| (k.clone(), n.to_value()))
                    .collect(),
            ),
            NodeKind::List(items) => Value::List(items.iter().map(ParsedNode::to_value).collect()),
        }
    }

    pub(crate) fn mark_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }
}
