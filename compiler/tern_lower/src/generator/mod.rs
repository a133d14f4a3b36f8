//! Generator lowering.
//!
//! Turns a `Generator` region into a resumable state machine: a resume
//! function `(ref state, ref current)` whose entry switch jumps to the
//! marker of the yield it last suspended at. Every yield becomes "store
//! the value, record the state, leave"; resuming re-enters at the label
//! placed right after the leave.
//!
//! # State encoding
//!
//! | `state` | meaning |
//! |---------|---------|
//! | `-1`    | not started |
//! | `0`     | finished |
//! | `1..=N` | suspended at the N-th yield |
//!
//! `$gotoRouter` mirrors `state` on entry so inner routers can re-enter
//! try bodies and finally blocks. While a yield is leaving through a
//! finally it holds `0` (yielding) so the finally is skipped; after the
//! resume point it is reset to `-1` (none).

use std::ops::Range;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tern_ir::walk::any_node;
use tern_ir::{
    BinaryOp, CatchBlock, CatchRange, GeneratorShape, Intrinsic, LabelId, Name, NodeId, NodeKind,
    NodeRange, SwitchCase, Ty, VarId, VarRange,
};

use crate::reduce::reduce_node;
use crate::rewrite::{rebuild, visit, visit_list, visit_opt, walk_node, Rewriter};
use crate::spill::{make_assign, spill_operands};
use crate::{LowerCtx, LowerError, Unsupported};

/// `$gotoRouter` while a yield is leaving the resume function.
pub const GOTO_ROUTER_YIELDING: i64 = 0;
/// `$gotoRouter` once execution has resumed.
pub const GOTO_ROUTER_NONE: i64 = -1;
/// `state` of a cursor that has not run yet.
pub const NOT_STARTED: i64 = -1;
/// `state` of a cursor that ran to completion.
pub const FINISHED: i64 = 0;

/// Lower a generator region to a cursor (or cursor factory) expression.
pub(crate) fn lower_generator(
    cx: &mut LowerCtx<'_>,
    target: LabelId,
    body: NodeId,
    shape: GeneratorShape,
) -> Result<NodeId, LowerError> {
    let element = cx.arena.label(target);
    let has_yields = any_node(cx.arena, body, false, &mut |_, kind| {
        matches!(kind, NodeKind::Yield { .. })
    });

    let state_name = cx.fresh_name("state");
    let state = cx.arena.new_ref_param(state_name, Ty::Int);
    let current_name = cx.fresh_name("current");
    let current = cx.arena.new_ref_param(current_name, element.ty);
    let goto_router = cx.fresh_var("$gotoRouter", Ty::Int);
    let ret = cx.fresh_label("generatorReturn", Ty::Void);

    let mut lowerer = GeneratorLowerer {
        cx,
        target,
        state,
        current,
        goto_router,
        return_labels: vec![ret],
        in_try_with_finally: false,
        yields: Vec::new(),
        hoisted: Vec::new(),
        hoisted_set: FxHashSet::default(),
        temps: Vec::new(),
        label_temps: FxHashMap::default(),
        rewrite_labels: has_yields,
    };
    let lowered = visit(&mut lowerer, body)?;
    let unit = lowerer.finish(element.name, lowered, shape)?;

    tracing::debug!(
        yields = lowerer.yields.len(),
        hoisted = lowerer.hoisted.len(),
        temps = lowerer.temps.len(),
        label_temps = lowerer.label_temps.len(),
        ?shape,
        "lowered generator"
    );
    Ok(unit)
}

/// A resume point.
#[derive(Clone, Copy, Debug)]
struct YieldMarker {
    /// Where a router for this state jumps. Retargeted to the enclosing
    /// try's start label as routers are built from the inside out.
    label: LabelId,
    state: i64,
}

/// Replacement for a label that carries a value.
#[derive(Clone, Copy, Debug)]
struct LabelTemp {
    label: LabelId,
    temp: VarId,
}

struct GeneratorLowerer<'c, 'a> {
    cx: &'c mut LowerCtx<'a>,
    target: LabelId,
    state: VarId,
    current: VarId,
    goto_router: VarId,
    /// Where a yield leaves to: the unit's exit, or the end of the
    /// innermost finally being rewritten.
    return_labels: Vec<LabelId>,
    in_try_with_finally: bool,
    yields: Vec<YieldMarker>,
    /// Block and catch variables promoted out of the resume function.
    hoisted: Vec<VarId>,
    hoisted_set: FxHashSet<VarId>,
    /// Spill temporaries and saved exceptions; hoisted too.
    temps: Vec<VarId>,
    label_temps: FxHashMap<LabelId, LabelTemp>,
    /// Typed labels and gotos are only rewritten when the body suspends.
    rewrite_labels: bool,
}

impl<'a> Rewriter<'a> for GeneratorLowerer<'_, 'a> {
    fn cx(&mut self) -> &mut LowerCtx<'a> {
        self.cx
    }

    fn rewrite(&mut self, id: NodeId) -> Result<NodeId, LowerError> {
        let kind = self.cx.arena.kind(id);
        match kind {
            NodeKind::Yield { target, value } => self.rewrite_yield(target, value),
            // Independent units lower on their own.
            NodeKind::Lambda { .. } | NodeKind::Generator { .. } => Ok(id),
            _ if kind.is_reducible() => {
                let reduced = reduce_node(self.cx, id)?;
                visit(self, reduced)
            }
            NodeKind::Block { vars, body } => self.rewrite_block(id, vars, body),
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            } => self.rewrite_try(id, body, handlers, finally, fault),
            NodeKind::Label {
                label,
                default: Some(default),
            } if self.is_typed_label(label) => self.rewrite_typed_label(label, default),
            NodeKind::Goto {
                kind: goto_kind,
                label,
                value: Some(value),
            } if self.is_typed_label(label) => {
                let info = self.label_temp(label);
                let value = visit(self, value)?;
                let arena = &mut *self.cx.arena;
                let store = make_assign(arena, info.temp, value)?;
                let jump = arena.jump(goto_kind, info.label, None)?;
                Ok(arena.void_block(&[], &[store, jump]))
            }
            NodeKind::Loop {
                body,
                break_label: Some(break_label),
                continue_label,
            } if self.is_typed_label(break_label) => {
                let info = self.label_temp(break_label);
                let body = visit(self, body)?;
                let arena = &mut *self.cx.arena;
                let looped = arena.loop_node(body, Some(info.label), continue_label);
                let result = arena.var_ref(info.temp);
                Ok(arena.block(&[], &[looped, result]))
            }
            NodeKind::Assign { target, value } => {
                let before = self.yields.len();
                let new_value = visit(self, value)?;
                if new_value == value {
                    return Ok(id);
                }
                if before == self.yields.len() {
                    return Ok(rebuild(self, id, NodeKind::Assign { target, value: new_value }));
                }
                Ok(make_assign(self.cx.arena, target, new_value)?)
            }
            NodeKind::Conditional {
                test,
                then_branch,
                else_branch,
            } => self.rewrite_operands(id, &[test], |r, ops| {
                Ok(NodeKind::Conditional {
                    test: ops[0],
                    then_branch: visit(r, then_branch)?,
                    else_branch: visit_opt(r, else_branch)?,
                })
            }),
            NodeKind::Switch {
                value,
                cases,
                default,
            } => self.rewrite_operands(id, &[value], |r, ops| {
                let old: SmallVec<[SwitchCase; 4]> = SmallVec::from_slice(r.cx.arena.cases(cases));
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
                    r.cx.arena.push_cases(&new)
                };
                Ok(NodeKind::Switch {
                    value: ops[0],
                    cases,
                    default: visit_opt(r, default)?,
                })
            }),
            NodeKind::Binary { op, left, right } => {
                self.rewrite_operands(id, &[left, right], |_, ops| {
                    Ok(NodeKind::Binary {
                        op,
                        left: ops[0],
                        right: ops[1],
                    })
                })
            }
            NodeKind::Unary { op, operand } => self.rewrite_operands(id, &[operand], |_, ops| {
                Ok(NodeKind::Unary {
                    op,
                    operand: ops[0],
                })
            }),
            NodeKind::Convert { operand } => self.rewrite_operands(id, &[operand], |_, ops| {
                Ok(NodeKind::Convert { operand: ops[0] })
            }),
            NodeKind::TypeAs { operand } => self.rewrite_operands(id, &[operand], |_, ops| {
                Ok(NodeKind::TypeAs { operand: ops[0] })
            }),
            NodeKind::Throw {
                exception: Some(exception),
            } => self.rewrite_operands(id, &[exception], |_, ops| {
                Ok(NodeKind::Throw {
                    exception: Some(ops[0]),
                })
            }),
            NodeKind::Call {
                func,
                args,
                convention,
            } => {
                let operands: SmallVec<[NodeId; 4]> = SmallVec::from_slice(self.cx.arena.nodes(args));
                self.rewrite_operands(id, &operands, |r, ops| {
                    Ok(NodeKind::Call {
                        func,
                        args: r.reuse_list(args, ops),
                        convention,
                    })
                })
            }
            NodeKind::Intrinsic { op, args } => {
                let operands: SmallVec<[NodeId; 4]> = SmallVec::from_slice(self.cx.arena.nodes(args));
                self.rewrite_operands(id, &operands, |r, ops| {
                    Ok(NodeKind::Intrinsic {
                        op,
                        args: r.reuse_list(args, ops),
                    })
                })
            }
            NodeKind::Invoke { target, args } => {
                let mut operands: SmallVec<[NodeId; 4]> = SmallVec::new();
                operands.push(target);
                operands.extend_from_slice(self.cx.arena.nodes(args));
                self.rewrite_operands(id, &operands, |r, ops| {
                    Ok(NodeKind::Invoke {
                        target: ops[0],
                        args: r.reuse_list(args, &ops[1..]),
                    })
                })
            }
            _ => walk_node(self, id),
        }
    }
}

impl GeneratorLowerer<'_, '_> {
    fn is_typed_label(&self, label: LabelId) -> bool {
        self.rewrite_labels && !self.cx.arena.label(label).ty.is_void()
    }

    fn label_temp(&mut self, label: LabelId) -> LabelTemp {
        if let Some(&info) = self.label_temps.get(&label) {
            return info;
        }
        let def = self.cx.arena.label(label);
        let info = LabelTemp {
            label: self.cx.arena.new_label(def.name, Ty::Void),
            temp: self.cx.arena.new_var(def.name, def.ty),
        };
        self.label_temps.insert(label, info);
        info
    }

    /// `original` if `ops` is still its contents, otherwise a new list.
    fn reuse_list(&mut self, original: NodeRange, ops: &[NodeId]) -> NodeRange {
        if self.cx.arena.nodes(original) == ops {
            original
        } else {
            self.cx.arena.push_nodes(ops)
        }
    }

    fn hoist(&mut self, var: VarId) {
        if self.hoisted_set.insert(var) {
            self.hoisted.push(var);
        }
    }

    fn assign_int(&mut self, var: VarId, value: i64) -> Result<NodeId, LowerError> {
        let arena = &mut *self.cx.arena;
        let value = arena.int(value);
        Ok(arena.assign(var, value)?)
    }

    // ── Yield ───────────────────────────────────────────────────────

    fn rewrite_yield(&mut self, target: LabelId, value: Option<NodeId>) -> Result<NodeId, LowerError> {
        if target != self.target {
            return Err(LowerError::YieldTargetMismatch {
                expected: self.target,
                found: target,
            });
        }
        let leave_to = self.leave_label();
        let mut items: SmallVec<[NodeId; 8]> = SmallVec::new();

        let Some(value) = value else {
            // yield break: finish, and let enclosing finallys run.
            items.push(self.assign_int(self.state, FINISHED)?);
            if self.in_try_with_finally {
                items.push(self.assign_int(self.goto_router, GOTO_ROUTER_YIELDING)?);
            }
            items.push(self.cx.arena.goto(leave_to, None)?);
            return Ok(self.cx.arena.void_block(&[], &items));
        };

        let value = visit(self, value)?;
        items.push(make_assign(self.cx.arena, self.current, value)?);

        let marker = YieldMarker {
            label: self.cx.fresh_label("yieldMarker", Ty::Void),
            state: i64::try_from(self.yields.len() + 1).unwrap_or(i64::MAX),
        };
        self.yields.push(marker);

        items.push(self.assign_int(self.state, marker.state)?);
        if self.in_try_with_finally {
            items.push(self.assign_int(self.goto_router, GOTO_ROUTER_YIELDING)?);
        }
        items.push(self.cx.arena.goto(leave_to, None)?);
        items.push(self.cx.arena.label_node(marker.label, None)?);
        items.push(self.assign_int(self.goto_router, GOTO_ROUTER_NONE)?);
        items.push(self.cx.arena.unit());
        Ok(self.cx.arena.void_block(&[], &items))
    }

    fn leave_label(&self) -> LabelId {
        // The stack is seeded with the unit's exit and only ever pushed and
        // popped in pairs.
        self.return_labels[self.return_labels.len() - 1]
    }

    // ── Blocks, labels, operands ────────────────────────────────────

    fn rewrite_block(
        &mut self,
        id: NodeId,
        vars: VarRange,
        body: NodeRange,
    ) -> Result<NodeId, LowerError> {
        let before = self.yields.len();
        let Some(new_body) = visit_list(self, body)? else {
            return Ok(id);
        };
        if before == self.yields.len() {
            return Ok(rebuild(self, id, NodeKind::Block { vars, body: new_body }));
        }
        // A resume re-enters this block from the outside, so its locals must
        // live across calls of the resume function.
        let declared: SmallVec<[VarId; 4]> = SmallVec::from_slice(self.cx.arena.vars(vars));
        for var in declared {
            self.hoist(var);
        }
        Ok(rebuild(
            self,
            id,
            NodeKind::Block {
                vars: VarRange::EMPTY,
                body: new_body,
            },
        ))
    }

    /// `{ temp = default; newLabel: temp }`: jumps land on a plain label and
    /// the value is read from the label's temporary.
    fn rewrite_typed_label(&mut self, label: LabelId, default: NodeId) -> Result<NodeId, LowerError> {
        let info = self.label_temp(label);
        let default = visit(self, default)?;
        let arena = &mut *self.cx.arena;
        let store = make_assign(arena, info.temp, default)?;
        let landing = arena.label_node(info.label, None)?;
        let read = arena.var_ref(info.temp);
        Ok(arena.block(&[], &[store, landing, read]))
    }

    /// Visit `operands` in order, spilling the ones evaluated before a
    /// suspension into temporaries, then rebuild with `build`.
    ///
    /// `build` visits any non-operand children itself (conditional arms,
    /// switch cases), after the operands.
    fn rewrite_operands(
        &mut self,
        id: NodeId,
        operands: &[NodeId],
        build: impl FnOnce(&mut Self, &[NodeId]) -> Result<NodeKind, LowerError>,
    ) -> Result<NodeId, LowerError> {
        let mut visited: SmallVec<[NodeId; 4]> = SmallVec::with_capacity(operands.len());
        let mut suspends: SmallVec<[bool; 4]> = SmallVec::with_capacity(operands.len());
        for &operand in operands {
            let before = self.yields.len();
            visited.push(visit(self, operand)?);
            suspends.push(before != self.yields.len());
        }

        if !suspends.contains(&true) {
            let kind = build(self, &visited)?;
            if kind == self.cx.arena.kind(id) {
                return Ok(id);
            }
            return Ok(rebuild(self, id, kind));
        }

        let spilled = spill_operands(self.cx, &visited, &suspends, "generatorTemp")?;
        self.temps.extend_from_slice(&spilled.temps);
        let kind = build(self, &spilled.operands)?;
        let rebuilt = rebuild(self, id, kind);
        let mut items = spilled.prelude;
        items.push(rebuilt);
        Ok(self.cx.arena.block(&[], &items))
    }

    // ── Try ─────────────────────────────────────────────────────────

    fn rewrite_try(
        &mut self,
        id: NodeId,
        body: NodeId,
        handlers: CatchRange,
        finally: Option<NodeId>,
        fault: Option<NodeId>,
    ) -> Result<NodeId, LowerError> {
        let start_yields = self.yields.len();
        let saved_in_try_with_finally = self.in_try_with_finally;
        if finally.is_some() || fault.is_some() {
            self.in_try_with_finally = true;
        }

        let new_body = visit(self, body)?;
        let try_yields = self.yields.len();

        let old_handlers: SmallVec<[CatchBlock; 2]> =
            SmallVec::from_slice(self.cx.arena.catches(handlers));
        let mut new_handlers: SmallVec<[CatchBlock; 2]> = SmallVec::with_capacity(old_handlers.len());
        for handler in &old_handlers {
            let before = self.yields.len();
            let filter = visit_opt(self, handler.filter)?;
            if before != self.yields.len() {
                return Err(Unsupported::YieldInFilter.into());
            }
            let handler_body = visit(self, handler.body)?;
            new_handlers.push(CatchBlock {
                filter,
                body: handler_body,
                ..*handler
            });
        }
        let catch_yields = self.yields.len();

        // A yield inside the finally leaves to the finally's end instead.
        let finally_return = self.cx.fresh_label("finallyReturn", Ty::Void);
        self.return_labels.push(finally_return);
        let new_finally = visit_opt(self, finally)?;
        let new_fault = visit_opt(self, fault)?;
        self.return_labels.pop();
        let finally_yields = self.yields.len();

        self.in_try_with_finally = saved_in_try_with_finally;

        if new_body == body && new_handlers == old_handlers && new_finally == finally && new_fault == fault {
            return Ok(id);
        }
        if start_yields == finally_yields {
            let handlers = if new_handlers == old_handlers {
                handlers
            } else {
                self.cx.arena.push_catches(&new_handlers)
            };
            return Ok(rebuild(
                self,
                id,
                NodeKind::Try {
                    body: new_body,
                    handlers,
                    finally: new_finally,
                    fault: new_fault,
                },
            ));
        }
        if fault.is_some() && finally_yields != catch_yields {
            return Err(Unsupported::YieldInFault.into());
        }
        if !self.cx.arena.ty(id).is_void() && finally_yields != try_yields {
            return Err(Unsupported::NonVoidTryWithYields.into());
        }

        let try_start = self.cx.fresh_label("tryStart", Ty::Void);
        let mut protected = new_body;
        if try_yields != start_yields {
            let router = self.make_yield_router(start_yields..try_yields, try_start)?;
            protected = self.cx.arena.block(&[], &[router, protected]);
        }

        let mut handlers = new_handlers;
        let mut resets: SmallVec<[NodeId; 2]> = SmallVec::new();
        if catch_yields != try_yields {
            protected = self.defer_handlers(
                protected,
                &mut handlers,
                &old_handlers,
                &mut resets,
                try_yields..catch_yields,
                try_start,
            )?;
        }

        let mut finally_out = new_finally;
        if finally_yields != catch_yields {
            if !handlers.is_empty() {
                protected = self.cx.arena.try_catch(protected, &handlers)?;
                handlers.clear();
            }
            protected = self.resumable_finally(
                protected,
                new_finally,
                finally_return,
                &mut resets,
                catch_yields..finally_yields,
                try_start,
            )?;
            finally_out = None;
        } else if let Some(fin) = new_finally {
            // A yield in the try or a handler leaves through this finally.
            let skip = self.skip_finally(finally_return)?;
            let end = self.cx.arena.label_node(finally_return, None)?;
            finally_out = Some(self.cx.arena.void_block(&[], &[skip, fin, end]));
        }

        if !handlers.is_empty() || finally_out.is_some() || new_fault.is_some() {
            protected = self.cx.arena.try_node(protected, &handlers, finally_out, new_fault)?;
        }

        let start = self.cx.arena.label_node(try_start, None)?;
        let mut items = resets;
        items.push(start);
        items.push(protected);
        Ok(self.cx.arena.block(&[], &items))
    }

    /// Rewrite every changed handler into "capture the exception", and run
    /// its real body after the try, where a resume can reach it.
    fn defer_handlers(
        &mut self,
        protected: NodeId,
        handlers: &mut SmallVec<[CatchBlock; 2]>,
        original: &[CatchBlock],
        resets: &mut SmallVec<[NodeId; 2]>,
        catch_yields: Range<usize>,
        try_start: LabelId,
    ) -> Result<NodeId, LowerError> {
        let router = self.make_yield_router(catch_yields, try_start)?;
        let mut deferred_bodies: SmallVec<[NodeId; 2]> = SmallVec::new();

        for (handler, unchanged) in handlers.iter_mut().zip(original) {
            if *handler == *unchanged {
                continue;
            }
            let caught = self.cx.fresh_var("$exception", handler.test);
            let deferred = match handler.variable {
                Some(var) => var,
                None => self.cx.fresh_var("$exception", handler.test),
            };
            self.hoist(deferred);

            let arena = &mut *self.cx.arena;
            let filter = match (handler.filter, handler.variable) {
                (Some(filter), Some(var)) => {
                    let value = arena.var_ref(caught);
                    let bind = arena.assign(var, value)?;
                    Some(arena.block(&[var], &[bind, filter]))
                }
                (filter, _) => filter,
            };
            let value = arena.var_ref(caught);
            let capture = arena.assign(deferred, value)?;
            let capture = arena.void_block(&[], &[capture]);

            let body = visit(
                &mut RethrowRewriter {
                    cx: &mut *self.cx,
                    exception: deferred,
                },
                handler.body,
            )?;

            let arena = &mut *self.cx.arena;
            let seen = arena.var_ref(deferred);
            let none = arena.null(handler.test)?;
            let test = arena.binary(BinaryOp::Ne, seen, none)?;
            deferred_bodies.push(arena.if_then_else(test, body, None)?);

            let none = arena.null(handler.test)?;
            resets.push(arena.assign(deferred, none)?);

            *handler = CatchBlock {
                test: handler.test,
                variable: Some(caught),
                filter,
                body: capture,
            };
        }

        let guarded = self.cx.arena.try_catch(protected, &handlers[..])?;
        handlers.clear();
        let mut items: SmallVec<[NodeId; 4]> = SmallVec::new();
        items.push(router);
        items.push(guarded);
        items.extend(deferred_bodies);
        Ok(self.cx.arena.void_block(&[], &items))
    }

    /// A finally containing yields.
    ///
    /// ```text
    /// saved = null   (among the resets before tryStart)
    /// try { inTryRouter; protected; tryEnd: }
    /// catch (e) { saved = e }
    /// finally { skipFinally; inFinallyRouter; finally; if saved != null throw saved; finallyReturn: }
    /// if gotoRouter == yielding goto return
    /// ```
    fn resumable_finally(
        &mut self,
        protected: NodeId,
        finally: Option<NodeId>,
        finally_return: LabelId,
        resets: &mut SmallVec<[NodeId; 2]>,
        finally_yields: Range<usize>,
        try_start: LabelId,
    ) -> Result<NodeId, LowerError> {
        // Order matters: the first router retargets the finally's markers to
        // `tryEnd`, so the second one routes a resume through the try body
        // into the finally.
        let try_end = self.cx.fresh_label("tryEnd", Ty::Void);
        let in_finally_router = self.make_yield_router(finally_yields.clone(), try_end)?;
        let in_try_router = self.make_yield_router(finally_yields, try_start)?;

        let all = self.cx.fresh_var("$exception", Ty::EXCEPTION);
        let saved = self.cx.fresh_var("$saved", Ty::EXCEPTION);
        self.temps.push(saved);
        let skip = self.skip_finally(finally_return)?;
        let leave_to = self.leave_label();

        let arena = &mut *self.cx.arena;
        // Cleared on every entry but a resume; a jump out of the body skips
        // anything placed at its end.
        let none = arena.null(Ty::EXCEPTION)?;
        resets.push(arena.assign(saved, none)?);
        let end = arena.label_node(try_end, None)?;
        let body = arena.void_block(&[], &[in_try_router, protected, end]);

        let pending = arena.var_ref(saved);
        let none = arena.null(Ty::EXCEPTION)?;
        let test = arena.binary(BinaryOp::Ne, pending, none)?;
        let pending = arena.var_ref(saved);
        let raise = arena.throw(pending)?;
        let rethrow = arena.if_then_else(test, raise, None)?;
        let finally_end = arena.label_node(finally_return, None)?;
        let mut cleanup: SmallVec<[NodeId; 6]> = SmallVec::new();
        cleanup.extend([skip, in_finally_router]);
        cleanup.extend(finally);
        cleanup.extend([rethrow, finally_end]);
        let cleanup = arena.void_block(&[], &cleanup);

        let caught = arena.var_ref(all);
        let stash = arena.assign(saved, caught)?;
        let stash = arena.void_block(&[], &[stash]);
        let catch_all = CatchBlock {
            test: Ty::EXCEPTION,
            variable: Some(all),
            filter: None,
            body: stash,
        };
        let guarded = arena.try_node(body, &[catch_all], Some(cleanup), None)?;

        let router = arena.var_ref(self.goto_router);
        let yielding = arena.int(GOTO_ROUTER_YIELDING);
        let test = arena.binary(BinaryOp::Eq, router, yielding)?;
        let leave = arena.goto(leave_to, None)?;
        let propagate = arena.if_then_else(test, leave, None)?;
        Ok(arena.void_block(&[], &[guarded, propagate]))
    }

    /// `if gotoRouter == yielding && state != finished goto target`.
    ///
    /// A suspend skips the finally; `yield break` still runs it.
    fn skip_finally(&mut self, target: LabelId) -> Result<NodeId, LowerError> {
        let arena = &mut *self.cx.arena;
        let router = arena.var_ref(self.goto_router);
        let yielding = arena.int(GOTO_ROUTER_YIELDING);
        let is_yielding = arena.binary(BinaryOp::Eq, router, yielding)?;
        let state = arena.var_ref(self.state);
        let finished = arena.int(FINISHED);
        let is_running = arena.binary(BinaryOp::Ne, state, finished)?;
        let jump = arena.goto(target, None)?;
        let inner = arena.if_then_else(is_running, jump, None)?;
        Ok(arena.if_then_else(is_yielding, inner, None)?)
    }

    /// Switch on `$gotoRouter` that jumps to the markers of `yields[range]`,
    /// then retarget those markers to `new_target` so routers further out
    /// jump here instead.
    fn make_yield_router(&mut self, range: Range<usize>, new_target: LabelId) -> Result<NodeId, LowerError> {
        let mut cases: SmallVec<[SwitchCase; 4]> = SmallVec::with_capacity(range.len());
        for marker in &mut self.yields[range] {
            cases.push(SwitchCase {
                test: marker.state,
                body: self.cx.arena.goto(marker.label, None)?,
            });
            marker.label = new_target;
        }
        let value = self.cx.arena.var_ref(self.goto_router);
        Ok(self.cx.arena.switch(value, &cases, None, Ty::Void)?)
    }

    // ── Output ──────────────────────────────────────────────────────

    fn finish(&mut self, name: Name, body: NodeId, shape: GeneratorShape) -> Result<NodeId, LowerError> {
        let ret = self.return_labels[0];
        let mut cases: SmallVec<[SwitchCase; 8]> = SmallVec::with_capacity(self.yields.len() + 1);
        for marker in &self.yields {
            cases.push(SwitchCase {
                test: marker.state,
                body: self.cx.arena.goto(marker.label, None)?,
            });
        }
        cases.push(SwitchCase {
            test: FINISHED,
            body: self.cx.arena.goto(ret, None)?,
        });

        let arena = &mut *self.cx.arena;
        let state = arena.var_ref(self.state);
        let entry = arena.assign(self.goto_router, state)?;
        let dispatch = arena.switch(entry, &cases, None, Ty::Void)?;
        let finished = arena.int(FINISHED);
        let finish = arena.assign(self.state, finished)?;
        let exit = arena.label_node(ret, None)?;

        let mut locals: SmallVec<[VarId; 4]> = SmallVec::new();
        locals.push(self.goto_router);
        locals.extend(self.label_temps.values().map(|info| info.temp));
        let resume_body = arena.void_block(&locals, &[dispatch, body, finish, exit]);
        let resume = arena.lambda(name, &[self.state, self.current], resume_body);

        let mut closed: Vec<VarId> = self.hoisted.clone();
        closed.extend_from_slice(&self.temps);
        let unit = arena.block(&closed, &[resume]);

        Ok(match shape {
            GeneratorShape::Cursor => arena.intrinsic(Intrinsic::MakeCursor, &[unit]),
            GeneratorShape::Factory => {
                let factory = arena.lambda(name, &[], unit);
                arena.intrinsic(Intrinsic::MakeFactory, &[factory])
            }
        })
    }
}

/// Rewrites a bare rethrow inside a deferred handler body into a throw of
/// the captured exception; the handler no longer runs inside a catch.
struct RethrowRewriter<'c, 'a> {
    cx: &'c mut LowerCtx<'a>,
    exception: VarId,
}

impl<'a> Rewriter<'a> for RethrowRewriter<'_, 'a> {
    fn cx(&mut self) -> &mut LowerCtx<'a> {
        self.cx
    }

    fn rewrite(&mut self, id: NodeId) -> Result<NodeId, LowerError> {
        match self.cx.arena.kind(id) {
            NodeKind::Throw { exception: None } => {
                let exception = self.cx.arena.var_ref(self.exception);
                Ok(self.cx.arena.throw(exception)?)
            }
            NodeKind::Lambda { .. } | NodeKind::Generator { .. } => Ok(id),
            // A nested handler rethrows its own exception.
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            } => {
                let new_body = visit(self, body)?;
                let new_finally = visit_opt(self, finally)?;
                let new_fault = visit_opt(self, fault)?;
                if new_body == body && new_finally == finally && new_fault == fault {
                    return Ok(id);
                }
                Ok(rebuild(
                    self,
                    id,
                    NodeKind::Try {
                        body: new_body,
                        handlers,
                        finally: new_finally,
                        fault: new_fault,
                    },
                ))
            }
            _ => walk_node(self, id),
        }
    }
}
