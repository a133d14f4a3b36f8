//! Tree rewriting framework.
//!
//! A [`Rewriter`] folds a tree into a new one. Passes override
//! [`Rewriter::rewrite`], match on the node kinds they care about, and hand
//! everything else to [`walk_node`]. `walk_node` rebuilds a node only when
//! one of its children changed; an untouched subtree comes back as the very
//! same `NodeId`, which is what makes "no yields, no crossing jumps" lower
//! to the identical tree.

use smallvec::SmallVec;
use tern_ir::{ensure_sufficient_stack, CatchBlock, CatchRange, NodeId, NodeKind, NodeRange, SwitchCase};

use crate::{LowerCtx, LowerError};

/// A rebuilding tree fold.
pub trait Rewriter<'a> {
    fn cx(&mut self) -> &mut LowerCtx<'a>;

    /// Rewrite one node. The default rewrites its children.
    fn rewrite(&mut self, id: NodeId) -> Result<NodeId, LowerError> {
        walk_node(self, id)
    }
}

/// Enter a child, growing the stack if needed.
#[inline]
pub fn visit<'a, R: Rewriter<'a> + ?Sized>(r: &mut R, id: NodeId) -> Result<NodeId, LowerError> {
    ensure_sufficient_stack(|| r.rewrite(id))
}

pub fn visit_opt<'a, R: Rewriter<'a> + ?Sized>(
    r: &mut R,
    id: Option<NodeId>,
) -> Result<Option<NodeId>, LowerError> {
    id.map(|id| visit(r, id)).transpose()
}

/// Rewrite a child list. `None` when every child came back unchanged.
pub fn visit_list<'a, R: Rewriter<'a> + ?Sized>(
    r: &mut R,
    range: NodeRange,
) -> Result<Option<NodeRange>, LowerError> {
    let old: SmallVec<[NodeId; 8]> = SmallVec::from_slice(r.cx().arena.nodes(range));
    let mut new: SmallVec<[NodeId; 8]> = SmallVec::with_capacity(old.len());
    for &child in &old {
        new.push(visit(r, child)?);
    }
    if new == old {
        return Ok(None);
    }
    Ok(Some(r.cx().arena.push_nodes(&new)))
}

/// Rewrite filters and bodies of catch clauses, in order.
pub fn visit_handlers<'a, R: Rewriter<'a> + ?Sized>(
    r: &mut R,
    range: CatchRange,
) -> Result<Option<CatchRange>, LowerError> {
    let old: SmallVec<[CatchBlock; 2]> = SmallVec::from_slice(r.cx().arena.catches(range));
    let mut new: SmallVec<[CatchBlock; 2]> = SmallVec::with_capacity(old.len());
    for handler in &old {
        let filter = visit_opt(r, handler.filter)?;
        let body = visit(r, handler.body)?;
        new.push(CatchBlock {
            filter,
            body,
            ..*handler
        });
    }
    if new == old {
        return Ok(None);
    }
    Ok(Some(r.cx().arena.push_catches(&new)))
}

/// Push `kind` with the type of `original`.
pub fn rebuild<'a, R: Rewriter<'a> + ?Sized>(r: &mut R, original: NodeId, kind: NodeKind) -> NodeId {
    let arena = &mut *r.cx().arena;
    let ty = arena.ty(original);
    arena.push(kind, ty)
}

/// Rewrite the children of `id`, rebuilding it only if one changed.
pub fn walk_node<'a, R: Rewriter<'a> + ?Sized>(r: &mut R, id: NodeId) -> Result<NodeId, LowerError> {
    let kind = r.cx().arena.kind(id);
    let new_kind = match kind {
        NodeKind::Constant(_) | NodeKind::Default | NodeKind::Var(_) => return Ok(id),
        NodeKind::Assign { target, value } => {
            let value = visit(r, value)?;
            NodeKind::Assign { target, value }
        }
        NodeKind::Block { vars, body } => match visit_list(r, body)? {
            Some(body) => NodeKind::Block { vars, body },
            None => return Ok(id),
        },
        NodeKind::Conditional {
            test,
            then_branch,
            else_branch,
        } => NodeKind::Conditional {
            test: visit(r, test)?,
            then_branch: visit(r, then_branch)?,
            else_branch: visit_opt(r, else_branch)?,
        },
        NodeKind::Loop {
            body,
            break_label,
            continue_label,
        } => NodeKind::Loop {
            body: visit(r, body)?,
            break_label,
            continue_label,
        },
        NodeKind::Switch {
            value,
            cases,
            default,
        } => {
            let value = visit(r, value)?;
            let old: SmallVec<[SwitchCase; 4]> = SmallVec::from_slice(r.cx().arena.cases(cases));
            let mut new: SmallVec<[SwitchCase; 4]> = SmallVec::with_capacity(old.len());
            for case in &old {
                new.push(SwitchCase {
                    test: case.test,
                    body: visit(r, case.body)?,
                });
            }
            let cases = if new == old {
                cases
            } else {
                r.cx().arena.push_cases(&new)
            };
            NodeKind::Switch {
                value,
                cases,
                default: visit_opt(r, default)?,
            }
        }
        NodeKind::Binary { op, left, right } => NodeKind::Binary {
            op,
            left: visit(r, left)?,
            right: visit(r, right)?,
        },
        NodeKind::Unary { op, operand } => NodeKind::Unary {
            op,
            operand: visit(r, operand)?,
        },
        NodeKind::Convert { operand } => NodeKind::Convert {
            operand: visit(r, operand)?,
        },
        NodeKind::TypeAs { operand } => NodeKind::TypeAs {
            operand: visit(r, operand)?,
        },
        NodeKind::Call {
            func,
            args,
            convention,
        } => match visit_list(r, args)? {
            Some(args) => NodeKind::Call {
                func,
                args,
                convention,
            },
            None => return Ok(id),
        },
        NodeKind::LightCall { func, args } => match visit_list(r, args)? {
            Some(args) => NodeKind::LightCall { func, args },
            None => return Ok(id),
        },
        NodeKind::Intrinsic { op, args } => match visit_list(r, args)? {
            Some(args) => NodeKind::Intrinsic { op, args },
            None => return Ok(id),
        },
        NodeKind::Invoke { target, args } => {
            let target = visit(r, target)?;
            let args = visit_list(r, args)?.unwrap_or(args);
            NodeKind::Invoke { target, args }
        }
        NodeKind::Lambda { name, params, body } => NodeKind::Lambda {
            name,
            params,
            body: visit(r, body)?,
        },
        NodeKind::Try {
            body,
            handlers,
            finally,
            fault,
        } => NodeKind::Try {
            body: visit(r, body)?,
            handlers: visit_handlers(r, handlers)?.unwrap_or(handlers),
            finally: visit_opt(r, finally)?,
            fault: visit_opt(r, fault)?,
        },
        NodeKind::Label { label, default } => NodeKind::Label {
            label,
            default: visit_opt(r, default)?,
        },
        NodeKind::Goto { kind, label, value } => NodeKind::Goto {
            kind,
            label,
            value: visit_opt(r, value)?,
        },
        NodeKind::Throw { exception } => NodeKind::Throw {
            exception: visit_opt(r, exception)?,
        },
        NodeKind::Yield { target, value } => NodeKind::Yield {
            target,
            value: visit_opt(r, value)?,
        },
        NodeKind::Generator {
            target,
            body,
            shape,
        } => NodeKind::Generator {
            target,
            body: visit(r, body)?,
            shape,
        },
        NodeKind::FinallyFlowControl { body } => NodeKind::FinallyFlowControl {
            body: visit(r, body)?,
        },
        NodeKind::LightScope { body } => NodeKind::LightScope {
            body: visit(r, body)?,
        },
    };
    if new_kind == kind {
        return Ok(id);
    }
    Ok(rebuild(r, id, new_kind))
}
