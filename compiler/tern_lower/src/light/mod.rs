//! Light-exception propagation.
//!
//! Inside a `LightScope`, light-convertible calls switch to the light
//! calling convention: failure comes back as a marker value instead of a
//! raised exception. Every converted call is followed by a check that
//! branches to the nearest enclosing handler dispatch, or out of the scope
//! with the marker as the scope's value.
//!
//! Each try/catch becomes:
//!
//! ```text
//! try { body } catch (T e) { $lastValue = wrap(e); goto lightEh }
//! goto tryDone
//! lightEh:
//!   if ((h1 = value($lastValue) as T1) != null) handler1
//!   else if ...
//!   else propagate
//! tryDone:
//! ```
//!
//! so a real exception and a light one reach the same handler body.

use smallvec::SmallVec;
use tern_ir::walk::any_node;
use tern_ir::{BinaryOp, CatchBlock, CatchRange, Intrinsic, LabelId, NodeId, NodeKind, Ty, VarId};

use crate::reduce::{reduce_for_light, reduce_node};
use crate::rewrite::{visit, walk_node, Rewriter};
use crate::{LowerCtx, LowerError, Unsupported};

/// Lower the body of a `LightScope` unit to an `Object`-typed expression.
pub(crate) fn lower_light_scope(cx: &mut LowerCtx<'_>, body: NodeId) -> Result<NodeId, LowerError> {
    let last_value = cx.fresh_var("$lastValue", Ty::Object);
    let unwind = cx.fresh_label("ehUnwind", Ty::Object);
    let mut lowerer = LightLowerer {
        cx,
        last_value,
        unwind,
        current_handler: None,
        rethrow: None,
        checks: 0,
        handlers: 0,
    };
    let lowered = visit(&mut lowerer, body)?;
    tracing::debug!(
        checks = lowerer.checks,
        handlers = lowerer.handlers,
        "lowered light exceptions"
    );

    let arena = &mut *lowerer.cx.arena;
    let value = match arena.ty(lowered) {
        Ty::Void => {
            let none = arena.null(Ty::Object)?;
            arena.block(&[], &[lowered, none])
        }
        Ty::Object => lowered,
        _ => arena.convert(lowered, Ty::Object),
    };
    let exit = arena.label_node(unwind, Some(value))?;
    Ok(arena.block(&[last_value], &[exit]))
}

struct LightLowerer<'c, 'a> {
    cx: &'c mut LowerCtx<'a>,
    last_value: VarId,
    /// Scope exit; carries the escaping marker.
    unwind: LabelId,
    /// Dispatch label of the innermost try/catch being rewritten.
    current_handler: Option<LabelId>,
    /// Exception a bare rethrow refers to.
    rethrow: Option<VarId>,
    checks: usize,
    handlers: usize,
}

impl<'a> Rewriter<'a> for LightLowerer<'_, 'a> {
    fn cx(&mut self) -> &mut LowerCtx<'a> {
        self.cx
    }

    fn rewrite(&mut self, id: NodeId) -> Result<NodeId, LowerError> {
        let kind = self.cx.arena.kind(id);
        match kind {
            NodeKind::Lambda { .. } | NodeKind::Generator { .. } => Ok(id),
            NodeKind::LightCall { .. } => {
                let ty = self.cx.arena.ty(id);
                let Some(light) = reduce_for_light(self.cx, id) else {
                    return walk_node(self, id);
                };
                let light = walk_node(self, light)?;
                self.check_expression(light, ty)
            }
            // An inner scope already produces a marker instead of unwinding.
            NodeKind::LightScope { .. } => {
                let reduced = reduce_node(self.cx, id)?;
                self.check_expression(reduced, Ty::Object)
            }
            _ if kind.is_reducible() => {
                let reduced = reduce_node(self.cx, id)?;
                visit(self, reduced)
            }
            NodeKind::Throw { exception } => self.rewrite_throw(id, exception),
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            } => self.rewrite_try(id, body, handlers, finally, fault),
            _ => walk_node(self, id),
        }
    }
}

impl LightLowerer<'_, '_> {
    /// `{ $lastValue = expr; isLight($lastValue) } ? propagate : $lastValue as ty`
    fn check_expression(&mut self, expr: NodeId, ty: Ty) -> Result<NodeId, LowerError> {
        self.checks += 1;
        let propagate = self.propagate()?;
        let arena = &mut *self.cx.arena;
        let store = arena.assign(self.last_value, expr)?;
        let last = arena.var_ref(self.last_value);
        let is_light = arena.intrinsic(Intrinsic::IsLightException, &[last]);
        let test = arena.block(&[], &[store, is_light]);
        let value = match ty {
            Ty::Void => arena.unit(),
            Ty::Object => arena.var_ref(self.last_value),
            _ => {
                let last = arena.var_ref(self.last_value);
                arena.convert(last, ty)
            }
        };
        Ok(arena.conditional(test, propagate, value)?)
    }

    /// Jump to the innermost handler dispatch, or leave the scope with the
    /// marker.
    fn propagate(&mut self) -> Result<NodeId, LowerError> {
        let arena = &mut *self.cx.arena;
        Ok(match self.current_handler {
            Some(handler) => arena.goto(handler, None)?,
            None => {
                let last = arena.var_ref(self.last_value);
                arena.goto(self.unwind, Some(last))?
            }
        })
    }

    /// A throw boxes its exception into a marker and propagates it.
    fn rewrite_throw(&mut self, id: NodeId, exception: Option<NodeId>) -> Result<NodeId, LowerError> {
        let exception = match (exception, self.rethrow) {
            (Some(exception), _) => visit(self, exception)?,
            (None, Some(var)) => self.cx.arena.var_ref(var),
            // Rethrow of an exception caught outside the scope.
            (None, None) => return Ok(id),
        };
        let propagate = self.propagate()?;
        let arena = &mut *self.cx.arena;
        let boxed = arena.intrinsic(Intrinsic::WrapLightException, &[exception]);
        let store = arena.assign(self.last_value, boxed)?;
        Ok(arena.void_block(&[], &[store, propagate]))
    }

    fn rewrite_try(
        &mut self,
        id: NodeId,
        body: NodeId,
        handlers: CatchRange,
        finally: Option<NodeId>,
        fault: Option<NodeId>,
    ) -> Result<NodeId, LowerError> {
        if fault.is_some() {
            return Err(Unsupported::LightExceptionFault.into());
        }
        if let Some(finally) = finally {
            let converts = any_node(self.cx.arena, finally, false, &mut |_, kind| {
                matches!(kind, NodeKind::LightCall { .. } | NodeKind::LightScope { .. })
            });
            if converts {
                return Err(Unsupported::LightExceptionInFinally.into());
            }
        }

        let handlers: SmallVec<[CatchBlock; 2]> = SmallVec::from_slice(self.cx.arena.catches(handlers));
        if handlers.is_empty() {
            let new_body = visit(self, body)?;
            if new_body == body {
                return Ok(id);
            }
            return Ok(self.cx.arena.try_node(new_body, &[], finally, None)?);
        }
        if handlers.iter().any(|handler| handler.filter.is_some()) {
            return Err(Unsupported::LightExceptionFilter.into());
        }
        self.handlers += handlers.len();

        let ty = self.cx.arena.ty(id);
        let dispatch = self.cx.fresh_label("lightEh", Ty::Void);
        let done = self.cx.fresh_label("tryDone", ty);

        let outer_handler = self.current_handler.replace(dispatch);
        let new_body = visit(self, body);
        self.current_handler = outer_handler;
        let new_body = new_body?;

        // Real exceptions join the light path at the dispatch.
        let mut real: SmallVec<[CatchBlock; 2]> = SmallVec::with_capacity(handlers.len());
        for handler in &handlers {
            let caught = self.cx.fresh_var("$exception", handler.test);
            let arena = &mut *self.cx.arena;
            let exception = arena.var_ref(caught);
            let boxed = arena.intrinsic(Intrinsic::WrapLightException, &[exception]);
            let store = arena.assign(self.last_value, boxed)?;
            let jump = arena.goto(dispatch, None)?;
            real.push(CatchBlock {
                test: handler.test,
                variable: Some(caught),
                filter: None,
                body: arena.void_block(&[], &[store, jump]),
            });
        }
        let protected = self.cx.arena.try_catch(new_body, &real)?;

        let cascade = self.light_catch(&handlers, ty)?;
        let arena = &mut *self.cx.arena;
        let landing = arena.label_node(dispatch, None)?;
        let result = if ty.is_void() {
            let skip = arena.goto(done, None)?;
            let end = arena.label_node(done, None)?;
            arena.void_block(&[], &[protected, skip, landing, cascade, end])
        } else {
            let leave = arena.goto(done, Some(protected))?;
            let caught = arena.block(&[], &[landing, cascade]);
            let end = arena.label_node(done, Some(caught))?;
            arena.block(&[], &[leave, end])
        };

        match finally {
            Some(finally) => Ok(self.cx.arena.try_finally(result, finally)?),
            None => Ok(result),
        }
    }

    /// The handler cascade run at the dispatch label, built from the last
    /// handler backwards. Nothing matching propagates the marker further.
    fn light_catch(&mut self, handlers: &[CatchBlock], ty: Ty) -> Result<NodeId, LowerError> {
        let mut rest = self.propagate()?;
        for handler in handlers.iter().rev() {
            let var = match handler.variable {
                Some(var) => var,
                None => self.cx.fresh_var("$exception", handler.test),
            };

            let outer_rethrow = self.rethrow.replace(var);
            let body = visit(self, handler.body);
            self.rethrow = outer_rethrow;
            let body = body?;

            let arena = &mut *self.cx.arena;
            let last = arena.var_ref(self.last_value);
            let exception = arena.intrinsic(Intrinsic::LightExceptionValue, &[last]);
            let matched = arena.type_as(exception, handler.test)?;
            let bind = arena.assign(var, matched)?;
            let none = arena.null(handler.test)?;
            let test = arena.binary(BinaryOp::Ne, bind, none)?;
            let choice = if ty.is_void() {
                arena.if_then_else(test, body, Some(rest))?
            } else {
                arena.conditional(test, body, rest)?
            };
            rest = arena.block(&[var], &[choice]);
        }
        Ok(rest)
    }
}
