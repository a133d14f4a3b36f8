//! The reduce protocol and the generic lowering walk.
//!
//! Boundary nodes (`Generator`, `FinallyFlowControl`, `LightScope`,
//! `LightCall`, short-circuit `Binary`) answer "can you reduce" with yes;
//! [`reduce_node`] produces their reduced form once per node and memoizes
//! it in the [`LowerCtx`]. [`lower`] is the consumer: it walks a tree,
//! reduces whatever it meets, and keeps walking into the reduced form so
//! units nested inside (lambdas, inner generators) lower too.

use tern_ir::{Arena, BinaryOp, CallConv, NodeId, NodeKind, StringInterner, Ty};

use crate::rewrite::{visit, walk_node, Rewriter};
use crate::{flow, generator, light, validate, LowerCtx, LowerError, LowerOptions};

/// Reduce one reducible node, at most once per node.
///
/// Non-reducible nodes come back unchanged.
pub fn reduce_node(cx: &mut LowerCtx<'_>, id: NodeId) -> Result<NodeId, LowerError> {
    if let Some(&reduced) = cx.memo.get(&id) {
        return Ok(reduced);
    }
    let kind = cx.arena.kind(id);
    let reduced = match kind {
        NodeKind::Generator {
            target,
            body,
            shape,
        } => generator::lower_generator(cx, target, body, shape)?,
        NodeKind::FinallyFlowControl { body } => flow::lower_flow(cx, body)?,
        NodeKind::LightScope { body } => light::lower_light_scope(cx, body)?,
        NodeKind::LightCall { func, args } => {
            // Outside a light scope the call keeps throwing.
            let ty = cx.arena.ty(id);
            cx.arena.push(
                NodeKind::Call {
                    func,
                    args,
                    convention: CallConv::Throwing,
                },
                ty,
            )
        }
        NodeKind::Binary {
            op: BinaryOp::AndAlso,
            left,
            right,
        } => {
            let no = cx.arena.bool(false);
            cx.arena.conditional(left, right, no)?
        }
        NodeKind::Binary {
            op: BinaryOp::OrElse,
            left,
            right,
        } => {
            let yes = cx.arena.bool(true);
            cx.arena.conditional(left, yes, right)?
        }
        _ => return Ok(id),
    };
    tracing::trace!(
        node = id.raw(),
        kind = kind.name(),
        reduced = reduced.raw(),
        "reduced"
    );
    cx.memo.insert(id, reduced);
    Ok(reduced)
}

/// The light-convention form of a light-aware node, typed `Object`.
///
/// `None` for nodes with no light form.
pub fn reduce_for_light(cx: &mut LowerCtx<'_>, id: NodeId) -> Option<NodeId> {
    match cx.arena.kind(id) {
        NodeKind::LightCall { func, args } => Some(cx.arena.push(
            NodeKind::Call {
                func,
                args,
                convention: CallConv::Light,
            },
            Ty::Object,
        )),
        _ => None,
    }
}

/// Lower `root` to the backend vocabulary.
pub fn lower(
    arena: &mut Arena,
    interner: &StringInterner,
    root: NodeId,
    options: LowerOptions,
) -> Result<NodeId, LowerError> {
    let mut cx = LowerCtx::new(arena, interner, options);
    lower_in(&mut cx, root)
}

/// Lower `root` with an existing context.
pub fn lower_in(cx: &mut LowerCtx<'_>, root: NodeId) -> Result<NodeId, LowerError> {
    let span = tracing::debug_span!("lower", root = root.raw());
    let _enter = span.enter();

    let nodes_before = cx.arena.len();
    let lowered = visit(&mut Lowerer { cx: &mut *cx }, root)?;
    if cx.options.validate_output {
        validate::validate(cx.arena, lowered)?;
    }

    tracing::debug!(
        reductions = cx.reduced_count(),
        new_nodes = cx.arena.len() - nodes_before,
        "lowered"
    );
    Ok(lowered)
}

/// Generic consumer: reduce everything reducible, everywhere.
struct Lowerer<'c, 'a> {
    cx: &'c mut LowerCtx<'a>,
}

impl<'a> Rewriter<'a> for Lowerer<'_, 'a> {
    fn cx(&mut self) -> &mut LowerCtx<'a> {
        self.cx
    }

    fn rewrite(&mut self, id: NodeId) -> Result<NodeId, LowerError> {
        let kind = self.cx.arena.kind(id);
        if kind.is_reducible() {
            let reduced = reduce_node(self.cx, id)?;
            return visit(self, reduced);
        }
        if let NodeKind::Yield { .. } = kind {
            return Err(LowerError::YieldOutsideGenerator);
        }
        walk_node(self, id)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
