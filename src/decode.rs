//! Decode a buffer against a layout into a [`ParsedNode`] tree.
//!
//! Decoding is a single pure pass: the same layout and bytes always produce the same
//! tree, and any failure aborts the whole call with no partial result.

use crate::ast::Layout;
use crate::codec::{DecodeError, TypeTag};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::node::ParsedNode;
use tracing::{debug, trace};

/// Decode `buf` from offset 0 with default limits.
pub fn decode(layout: &Layout, buf: &[u8]) -> Result<ParsedNode, DecodeError> {
    decode_with(layout, buf, &EngineConfig::default())
}

/// Decode `buf` from offset 0 with the limits in `config`.
pub fn decode_with(layout: &Layout, buf: &[u8], config: &EngineConfig) -> Result<ParsedNode, DecodeError> {
    let root = Context::root();
    let decoder = Decoder { buf, config };
    match decoder.decode_at(layout, 0, &root) {
        Ok((node, consumed)) => {
            debug!(consumed, len = buf.len(), "decoded buffer");
            Ok(node)
        }
        Err(e) => {
            debug!(error = %e, len = buf.len(), "decode failed");
            Err(e)
        }
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    config: &'a EngineConfig,
}

impl<'a> Decoder<'a> {
    /// Decode `layout` at `offset`; returns the node and the number of bytes consumed.
    fn decode_at(
        &self,
        layout: &Layout,
        offset: usize,
        ctx: &Context<'_>,
    ) -> Result<(ParsedNode, usize), DecodeError> {
        match layout {
            Layout::Tracked(t) => t.decode(self.buf, offset, ctx),
            Layout::Struct(members) => {
                let mut scope = Context::child(ctx);
                let mut nodes = Vec::with_capacity(members.len());
                let mut pos = offset;
                for m in members {
                    let (node, n) = self.decode_at(&m.layout, pos, &scope)?;
                    pos += n;
                    scope.bind(m.name.clone(), node.to_value());
                    nodes.push((m.name.clone(), node.mark_internal(m.is_internal())));
                }
                Ok((ParsedNode::structure(nodes), pos - offset))
            }
            Layout::Sequence(items) => {
                let mut scope = Context::child(ctx);
                let mut nodes = Vec::with_capacity(items.len());
                let mut pos = offset;
                for (i, item) in items.iter().enumerate() {
                    let (node, n) = self.decode_at(item, pos, &scope)?;
                    pos += n;
                    scope.bind(i.to_string(), node.to_value());
                    nodes.push(node);
                }
                Ok((ParsedNode::list(nodes, TypeTag::Sequence), pos - offset))
            }
            Layout::Array { count, element } => {
                let n = self.array_count(count, element, offset, ctx)?;
                trace!(count = n, offset, "decoding array");
                let mut nodes = Vec::with_capacity(n);
                let mut pos = offset;
                for i in 0..n {
                    let scope = Context::element(ctx, i);
                    let (node, used) = self.decode_at(element, pos, &scope)?;
                    pos += used;
                    nodes.push(node);
                }
                Ok((ParsedNode::list(nodes, TypeTag::Array), pos - offset))
            }
            Layout::Computed(expr) => Ok((ParsedNode::computed(expr.eval(ctx)?), 0)),
            Layout::Conditional { predicate, inner } => {
                if predicate.eval(ctx)?.truthy() {
                    self.decode_at(inner, offset, ctx)
                } else {
                    Ok((ParsedNode::absent(), 0))
                }
            }
        }
    }

    fn array_count(
        &self,
        count: &crate::ast::Expr,
        element: &Layout,
        offset: usize,
        ctx: &Context<'_>,
    ) -> Result<usize, DecodeError> {
        let v = count.eval(ctx)?;
        let n = v.as_i128().ok_or_else(|| {
            DecodeError::TypeEval(format!("array count `{}` is a {}, not an integer", count, v.kind()))
        })?;
        if n < 0 {
            return Err(DecodeError::TypeEval(format!("array count `{}` is negative ({})", count, n)));
        }
        // A count the remaining bytes cannot hold is exhaustion, whatever the limit.
        let width = element.min_width();
        let available = self.buf.len().saturating_sub(offset);
        let needed = n.unsigned_abs().saturating_mul(width as u128);
        if needed > available as u128 {
            return Err(DecodeError::BufferExhausted {
                offset,
                needed: usize::try_from(needed).unwrap_or(usize::MAX),
                available,
            });
        }
        let limit = self.config.max_array_elements;
        let n = usize::try_from(n)
            .ok()
            .filter(|n| *n <= limit)
            .ok_or_else(|| {
                DecodeError::TypeEval(format!("array count {} exceeds the limit of {} elements", n, limit))
            })?;
        Ok(n)
    }
}
