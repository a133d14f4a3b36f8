//! Read-only traversal.
//!
//! [`Visitor`] walks a tree without rebuilding it; the lowering crate's
//! `Rewriter` is the rebuilding counterpart. Children are always produced
//! in evaluation order.

use smallvec::SmallVec;

use crate::{ensure_sufficient_stack, Arena, NodeId, NodeKind};

/// Children of `id`, in evaluation order.
pub fn children(arena: &Arena, id: NodeId) -> SmallVec<[NodeId; 4]> {
    let mut out = SmallVec::new();
    match arena.kind(id) {
        NodeKind::Constant(_) | NodeKind::Default | NodeKind::Var(_) => {}
        NodeKind::Assign { value, .. } => out.push(value),
        NodeKind::Block { body, .. } => out.extend_from_slice(arena.nodes(body)),
        NodeKind::Conditional {
            test,
            then_branch,
            else_branch,
        } => {
            out.push(test);
            out.push(then_branch);
            out.extend(else_branch);
        }
        NodeKind::Loop { body, .. } => out.push(body),
        NodeKind::Switch {
            value,
            cases,
            default,
        } => {
            out.push(value);
            out.extend(arena.cases(cases).iter().map(|case| case.body));
            out.extend(default);
        }
        NodeKind::Binary { left, right, .. } => {
            out.push(left);
            out.push(right);
        }
        NodeKind::Unary { operand, .. }
        | NodeKind::Convert { operand }
        | NodeKind::TypeAs { operand } => out.push(operand),
        NodeKind::Call { args, .. }
        | NodeKind::LightCall { args, .. }
        | NodeKind::Intrinsic { args, .. } => out.extend_from_slice(arena.nodes(args)),
        NodeKind::Invoke { target, args } => {
            out.push(target);
            out.extend_from_slice(arena.nodes(args));
        }
        NodeKind::Lambda { body, .. }
        | NodeKind::Generator { body, .. }
        | NodeKind::FinallyFlowControl { body }
        | NodeKind::LightScope { body } => out.push(body),
        NodeKind::Try {
            body,
            handlers,
            finally,
            fault,
        } => {
            out.push(body);
            for handler in arena.catches(handlers) {
                out.extend(handler.filter);
                out.push(handler.body);
            }
            out.extend(finally);
            out.extend(fault);
        }
        NodeKind::Label { default, .. } => out.extend(default),
        NodeKind::Goto { value, .. } | NodeKind::Yield { value, .. } => out.extend(value),
        NodeKind::Throw { exception } => out.extend(exception),
    }
    out
}

/// Read-only tree visitor.
///
/// Override [`visit_node`](Visitor::visit_node) and call [`walk_node`] to
/// continue into children.
pub trait Visitor {
    fn visit_node(&mut self, arena: &Arena, id: NodeId) {
        walk_node(self, arena, id);
    }
}

/// Visit every child of `id`.
pub fn walk_node<V: Visitor + ?Sized>(visitor: &mut V, arena: &Arena, id: NodeId) {
    for child in children(arena, id) {
        ensure_sufficient_stack(|| visitor.visit_node(arena, child));
    }
}

/// Whether any node under `root` (inclusive) satisfies `pred`.
///
/// Nested lambdas and generators are independent units and are skipped
/// unless `enter_units` is set; the boundary node itself is still tested.
pub fn any_node(
    arena: &Arena,
    root: NodeId,
    enter_units: bool,
    pred: &mut impl FnMut(NodeId, NodeKind) -> bool,
) -> bool {
    let kind = arena.kind(root);
    if pred(root, kind) {
        return true;
    }
    if !enter_units && kind.is_unit_boundary() {
        return false;
    }
    children(arena, root)
        .into_iter()
        .any(|child| ensure_sufficient_stack(|| any_node(arena, child, enter_units, pred)))
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
