//! Stack spilling.
//!
//! A suspend point (or a jump landing) in the middle of an expression must
//! not leave earlier operands pending on the evaluation stack. Spilling
//! evaluates those operands into temporaries first, in their original
//! order, so the operand that suspends starts from an empty stack.

use smallvec::SmallVec;
use tern_ir::{Arena, CatchBlock, NodeId, NodeKind, VarId};

use crate::{LowerCtx, LowerError};

/// Result of [`spill_operands`].
#[derive(Debug, Default)]
pub struct Spilled {
    /// Assignments to run before the rebuilt node.
    pub prelude: SmallVec<[NodeId; 4]>,
    /// Operands to rebuild the node with.
    pub operands: SmallVec<[NodeId; 4]>,
    /// Temporaries introduced; the caller decides where they are declared.
    pub temps: SmallVec<[VarId; 4]>,
}

/// Spill every operand up to and including the last one that suspends.
///
/// Constants are left in place since their value cannot change across a
/// suspension. Operands after the last suspending one stay in place too:
/// nothing after them can observe the stack.
pub fn spill_operands(
    cx: &mut LowerCtx<'_>,
    operands: &[NodeId],
    suspends: &[bool],
    temp_name: &str,
) -> Result<Spilled, LowerError> {
    let mut out = Spilled::default();
    let Some(last) = suspends.iter().rposition(|&s| s) else {
        out.operands.extend_from_slice(operands);
        return Ok(out);
    };

    for (i, &operand) in operands.iter().enumerate() {
        if i > last || matches!(cx.arena.kind(operand), NodeKind::Constant(_)) {
            out.operands.push(operand);
            continue;
        }
        let ty = cx.arena.ty(operand);
        let temp = cx.fresh_var(temp_name, ty);
        out.temps.push(temp);
        out.prelude.push(make_assign(cx.arena, temp, operand)?);
        out.operands.push(cx.arena.var_ref(temp));
    }
    Ok(out)
}

/// `var = value`, with the assignment pushed as far into `value` as it goes.
///
/// A jump can land inside a block, a conditional arm, or a try body, but
/// never inside the right-hand side of an assignment. Pushing the
/// assignment into block tails, both conditional arms, and try bodies and
/// handlers keeps every label in `value` reachable. Arms that never
/// complete need no assignment at all.
pub fn make_assign(arena: &mut Arena, var: VarId, value: NodeId) -> Result<NodeId, LowerError> {
    if !arena.completes(value) {
        return Ok(value);
    }
    let ty = arena.var(var).ty;
    match arena.kind(value) {
        NodeKind::Block { vars, body } if !body.is_empty() => {
            let mut items: SmallVec<[NodeId; 8]> = SmallVec::from_slice(arena.nodes(body));
            if let Some(tail) = items.pop() {
                let assigned = make_assign(arena, var, tail)?;
                items.push(assigned);
            }
            let body = arena.push_nodes(&items);
            Ok(arena.push(NodeKind::Block { vars, body }, ty))
        }
        NodeKind::Conditional {
            test,
            then_branch,
            else_branch: Some(else_branch),
        } => {
            let then_branch = make_assign(arena, var, then_branch)?;
            let else_branch = make_assign(arena, var, else_branch)?;
            Ok(arena.push(
                NodeKind::Conditional {
                    test,
                    then_branch,
                    else_branch: Some(else_branch),
                },
                ty,
            ))
        }
        NodeKind::Try {
            body,
            handlers,
            finally,
            fault,
        } => {
            let body = make_assign(arena, var, body)?;
            let mut assigned: SmallVec<[CatchBlock; 2]> = SmallVec::new();
            for handler in arena.catches(handlers).to_vec() {
                assigned.push(CatchBlock {
                    body: make_assign(arena, var, handler.body)?,
                    ..handler
                });
            }
            let handlers = arena.push_catches(&assigned);
            Ok(arena.push(
                NodeKind::Try {
                    body,
                    handlers,
                    finally,
                    fault,
                },
                ty,
            ))
        }
        _ => Ok(arena.assign(var, value)?),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
