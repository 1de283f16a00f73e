//! Offset instrumentation for primitive layouts.
//!
//! `Tracked` is the only way a [`Leaf`] enters a [`Layout`](crate::ast::Layout). Its
//! decode delegates to the leaf and then stamps the result with the absolute byte
//! range it came from and a copy of those bytes.

use crate::ast::Leaf;
use crate::codec::DecodeError;
use crate::context::Context;
use crate::node::{ParsedNode, Span};

#[derive(Debug, Clone, PartialEq)]
pub struct Tracked {
    leaf: Leaf,
}

impl Tracked {
    pub fn new(leaf: Leaf) -> Self {
        Tracked { leaf }
    }

    pub fn leaf(&self) -> &Leaf {
        &self.leaf
    }

    /// Decode the wrapped primitive at `offset`; returns the node and bytes consumed.
    pub fn decode(
        &self,
        buf: &[u8],
        offset: usize,
        ctx: &Context<'_>,
    ) -> Result<(ParsedNode, usize), DecodeError> {
        let decoded = self.leaf.decode(buf, offset, ctx)?;
        let span = Span::new(offset, offset + decoded.consumed);
        let raw = buf
            .get(span.start..span.end)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        let node = ParsedNode::leaf(decoded.value, Some(span), Some(raw), decoded.tag);
        Ok((node, decoded.consumed))
    }
}
