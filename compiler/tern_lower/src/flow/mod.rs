//! Non-local jump lowering.
//!
//! The backend forbids jumping out of a finally or fault body. A
//! `FinallyFlowControl` unit lifts that restriction: such a jump instead
//! records which label it wants in `$flow`, jumps to the end of the
//! cleanup body, and a switch placed after the protected construct
//! performs the real jump. When that switch is itself inside another
//! cleanup body, the case forwards again, one level at a time.
//!
//! A routed try snapshots `$flow` on entry. An exception leaving one of
//! its cleanup bodies puts the snapshot back before it propagates, so an
//! abandoned jump never reaches a later dispatch.
//!
//! Jumps that leave no cleanup body are left untouched, so a unit without
//! any comes back as the very same tree.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tern_ir::{BinaryOp, CatchBlock, CatchRange, GotoKind, LabelId, NodeId, NodeKind, SwitchCase, Ty, VarId};

use crate::resolve::{LabelScopes, Part, RegionKey};
use crate::rewrite::{rebuild, visit, visit_opt, walk_node, Rewriter};
use crate::spill::make_assign;
use crate::{LowerCtx, LowerError, Unsupported};

/// `$flow` when no forwarded jump is in flight.
pub const FLOW_NONE: i64 = 0;

/// Lower the body of a `FinallyFlowControl` unit.
pub(crate) fn lower_flow(cx: &mut LowerCtx<'_>, body: NodeId) -> Result<NodeId, LowerError> {
    let scopes = LabelScopes::resolve(cx.arena, body);
    let mut lowerer = FlowLowerer {
        cx,
        scopes,
        regions: vec![Region::new(RegionKey::Root, RegionKind::Root, false)],
        flow: None,
        slots: FxHashMap::default(),
        temps: Vec::new(),
        dispatches: 0,
    };
    let lowered = visit(&mut lowerer, body)?;

    let Some(flow) = lowerer.flow else {
        tracing::debug!("no jumps leave a finally; unit unchanged");
        return Ok(lowered);
    };
    tracing::debug!(
        labels = lowerer.slots.len(),
        dispatches = lowerer.dispatches,
        "lowered finally flow control"
    );

    let arena = &mut *lowerer.cx.arena;
    let none = arena.int(FLOW_NONE);
    let reset = arena.assign(flow, none)?;
    let mut locals: SmallVec<[VarId; 4]> = SmallVec::new();
    locals.push(flow);
    locals.extend_from_slice(&lowerer.temps);
    Ok(arena.block(&locals, &[reset, lowered]))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum RegionKind {
    Root,
    /// A try body, handler, or filter.
    Protected,
    /// A finally or fault body.
    Cleanup,
}

/// One nesting level of the walk.
#[derive(Debug)]
struct Region {
    key: RegionKey,
    kind: RegionKind,
    /// Jumps leaving this protected part go through the dispatch even
    /// though they could jump directly: the finally they cross may itself
    /// redirect control, and only the dispatch sees both.
    routes: bool,
    /// Label at the end of the region that forwarded jumps go to.
    exit: Option<LabelId>,
    /// Labels whose jumps were forwarded out of this region, in order.
    forwarded: SmallVec<[LabelId; 4]>,
}

impl Region {
    fn new(key: RegionKey, kind: RegionKind, routes: bool) -> Self {
        Region {
            key,
            kind,
            routes,
            exit: None,
            forwarded: SmallVec::new(),
        }
    }

    fn forwards(&self) -> bool {
        !self.forwarded.is_empty()
    }
}

/// Dispatch identity of a forwarded label.
#[derive(Copy, Clone, Debug)]
struct LabelSlot {
    id: i64,
    /// Carries the jump's value across the dispatch for typed labels.
    temp: Option<VarId>,
}

enum Route {
    Direct,
    /// Forward through the region at this stack index.
    Forward(usize),
}

struct FlowLowerer<'c, 'a> {
    cx: &'c mut LowerCtx<'a>,
    scopes: LabelScopes,
    regions: Vec<Region>,
    flow: Option<VarId>,
    slots: FxHashMap<LabelId, LabelSlot>,
    temps: Vec<VarId>,
    dispatches: usize,
}

impl<'a> Rewriter<'a> for FlowLowerer<'_, 'a> {
    fn cx(&mut self) -> &mut LowerCtx<'a> {
        self.cx
    }

    fn rewrite(&mut self, id: NodeId) -> Result<NodeId, LowerError> {
        match self.cx.arena.kind(id) {
            NodeKind::Lambda { .. } | NodeKind::Generator { .. } => Ok(id),
            // Already covered by this unit.
            NodeKind::FinallyFlowControl { body } => {
                let lowered = visit(self, body)?;
                Ok(if lowered == body { id } else { lowered })
            }
            NodeKind::Goto { kind, label, value } => self.rewrite_goto(id, kind, label, value),
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

impl FlowLowerer<'_, '_> {
    fn flow_var(&mut self) -> VarId {
        if let Some(flow) = self.flow {
            return flow;
        }
        let flow = self.cx.fresh_var("$flow", Ty::Int);
        self.flow = Some(flow);
        flow
    }

    fn slot(&mut self, label: LabelId) -> LabelSlot {
        if let Some(&slot) = self.slots.get(&label) {
            return slot;
        }
        let def = self.cx.arena.label(label);
        let temp = if def.ty.is_void() {
            None
        } else {
            let temp = self.cx.arena.new_var(def.name, def.ty);
            self.temps.push(temp);
            Some(temp)
        };
        let slot = LabelSlot {
            id: i64::try_from(self.slots.len() + 1).unwrap_or(i64::MAX),
            temp,
        };
        self.slots.insert(label, slot);
        slot
    }

    fn exit_label(&mut self, index: usize) -> LabelId {
        if let Some(exit) = self.regions[index].exit {
            return exit;
        }
        let base = match self.regions[index].kind {
            RegionKind::Cleanup => "finallyEnd",
            RegionKind::Root | RegionKind::Protected => "tryEnd",
        };
        let exit = self.cx.fresh_label(base, Ty::Void);
        self.regions[index].exit = Some(exit);
        exit
    }

    /// Decide how a jump to a label defined in `target` leaves the current
    /// position.
    fn route(&self, target: RegionKey) -> Route {
        for (index, region) in self.regions.iter().enumerate().rev() {
            if region.key == target {
                return Route::Direct;
            }
            if region.kind == RegionKind::Cleanup || region.routes {
                return Route::Forward(index);
            }
        }
        Route::Direct
    }

    /// `{ temp = value; $flow = id; goto exit }` out of `regions[index]`.
    fn forward(&mut self, index: usize, label: LabelId, value: Option<NodeId>) -> Result<NodeId, LowerError> {
        let flow = self.flow_var();
        let slot = self.slot(label);
        let exit = self.exit_label(index);
        let region = &mut self.regions[index];
        if !region.forwarded.contains(&label) {
            region.forwarded.push(label);
        }
        tracing::trace!(label = label.raw(), id = slot.id, depth = index, "forwarded jump");

        let arena = &mut *self.cx.arena;
        let mut items: SmallVec<[NodeId; 3]> = SmallVec::new();
        if let (Some(value), Some(temp)) = (value, slot.temp) {
            items.push(make_assign(arena, temp, value)?);
        }
        let id = arena.int(slot.id);
        items.push(arena.assign(flow, id)?);
        items.push(arena.goto(exit, None)?);
        Ok(arena.void_block(&[], &items))
    }

    fn rewrite_goto(
        &mut self,
        id: NodeId,
        kind: GotoKind,
        label: LabelId,
        value: Option<NodeId>,
    ) -> Result<NodeId, LowerError> {
        let new_value = visit_opt(self, value)?;
        let target = self.scopes.region_of(label)?;
        match self.route(target) {
            Route::Forward(index) => self.forward(index, label, new_value),
            Route::Direct if new_value == value => Ok(id),
            Route::Direct => Ok(rebuild(
                self,
                id,
                NodeKind::Goto {
                    kind,
                    label,
                    value: new_value,
                },
            )),
        }
    }

    /// The case body of a dispatch switch: the real jump, or another hop.
    fn dispatch_jump(&mut self, label: LabelId) -> Result<NodeId, LowerError> {
        let target = self.scopes.region_of(label)?;
        if let Route::Forward(index) = self.route(target) {
            return self.forward(index, label, None);
        }
        let flow = self.flow_var();
        let slot = self.slot(label);
        let arena = &mut *self.cx.arena;
        let none = arena.int(FLOW_NONE);
        let reset = arena.assign(flow, none)?;
        let value = slot.temp.map(|temp| arena.var_ref(temp));
        let jump = arena.goto(label, value)?;
        Ok(arena.void_block(&[], &[reset, jump]))
    }

    fn in_region(&mut self, region: Region, id: NodeId) -> Result<(NodeId, Region), LowerError> {
        self.regions.push(region);
        let result = visit(self, id);
        let region = self
            .regions
            .pop()
            .unwrap_or_else(|| Region::new(RegionKey::Root, RegionKind::Root, false));
        Ok((result?, region))
    }

    /// `node` followed by the region's exit label, if anything jumps there.
    fn close(&mut self, node: NodeId, region: &Region) -> Result<NodeId, LowerError> {
        let Some(exit) = region.exit else {
            return Ok(node);
        };
        let end = self.cx.arena.label_node(exit, None)?;
        Ok(self.cx.arena.void_block(&[], &[node, end]))
    }

    fn rewrite_try(
        &mut self,
        id: NodeId,
        body: NodeId,
        handlers: CatchRange,
        finally: Option<NodeId>,
        fault: Option<NodeId>,
    ) -> Result<NodeId, LowerError> {
        let key = |part| RegionKey::Try { node: id, part };

        // Cleanup bodies first: whether they forward decides how the
        // protected parts must route their own jumps.
        let finally_part = match finally {
            Some(finally) => {
                let region = Region::new(key(Part::Finally), RegionKind::Cleanup, false);
                Some(self.in_region(region, finally)?)
            }
            None => None,
        };
        let fault_part = match fault {
            Some(fault) => {
                let region = Region::new(key(Part::Fault), RegionKind::Cleanup, false);
                Some(self.in_region(region, fault)?)
            }
            None => None,
        };
        let routes = finally_part.iter().chain(&fault_part).any(|(_, region)| region.forwards());

        let body_region = Region::new(key(Part::Body), RegionKind::Protected, routes);
        let (new_body, body_region) = self.in_region(body_region, body)?;

        let old_handlers: SmallVec<[CatchBlock; 2]> =
            SmallVec::from_slice(self.cx.arena.catches(handlers));
        let mut new_handlers: SmallVec<[CatchBlock; 2]> = SmallVec::with_capacity(old_handlers.len());
        let mut handler_regions: SmallVec<[Region; 2]> = SmallVec::with_capacity(old_handlers.len());
        for (index, handler) in old_handlers.iter().enumerate() {
            let part = key(Part::Handler(u16::try_from(index).unwrap_or(u16::MAX)));
            let filter = match handler.filter {
                Some(filter) => {
                    let region = Region::new(part, RegionKind::Protected, false);
                    Some(self.in_region(region, filter)?.0)
                }
                None => None,
            };
            let region = Region::new(part, RegionKind::Protected, routes);
            let (handler_body, region) = self.in_region(region, handler.body)?;
            new_handlers.push(CatchBlock {
                filter,
                body: handler_body,
                ..*handler
            });
            handler_regions.push(region);
        }

        let new_finally = finally_part.as_ref().map(|(node, _)| *node);
        let new_fault = fault_part.as_ref().map(|(node, _)| *node);

        if !routes {
            if new_body == body && new_handlers == old_handlers && new_finally == finally && new_fault == fault {
                return Ok(id);
            }
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
        if !self.cx.arena.ty(id).is_void() {
            return Err(Unsupported::NonVoidTryWithFlow.into());
        }

        let mut forwarded: SmallVec<[LabelId; 4]> = SmallVec::new();
        let regions = finally_part
            .iter()
            .chain(&fault_part)
            .map(|(_, region)| region)
            .chain(std::iter::once(&body_region))
            .chain(&handler_regions);
        for region in regions {
            for &label in &region.forwarded {
                if !forwarded.contains(&label) {
                    forwarded.push(label);
                }
            }
        }

        let mut protected = self.close(new_body, &body_region)?;
        for (handler, region) in new_handlers.iter_mut().zip(&handler_regions) {
            handler.body = self.close(handler.body, region)?;
        }
        if !new_handlers.is_empty() {
            protected = self.cx.arena.try_catch(protected, &new_handlers)?;
        }

        let mut items: SmallVec<[NodeId; 4]> = SmallVec::new();
        let flow = self.flow_var();
        let entry = self.cx.fresh_var("$flowEntry", Ty::Int);
        self.temps.push(entry);
        let current = self.cx.arena.var_ref(flow);
        items.push(self.cx.arena.assign(entry, current)?);

        if let Some((fault, region)) = &fault_part {
            let fault = self.restore_flow_on_throw(*fault, entry)?;
            protected = if region.forwards() {
                self.forwarding_fault(protected, fault, region)?
            } else {
                self.cx.arena.try_fault(protected, fault)?
            };
        }

        if let Some((finally, region)) = &finally_part {
            let finally = self.restore_flow_on_throw(*finally, entry)?;
            if region.forwards() {
                self.forwarding_finally(&mut items, protected, finally, region)?;
            } else {
                items.push(self.cx.arena.try_finally(protected, finally)?);
            }
        } else {
            items.push(protected);
        }

        // Back at the level enclosing the try: route each label onward.
        let mut cases: SmallVec<[SwitchCase; 4]> = SmallVec::with_capacity(forwarded.len());
        for label in forwarded {
            let slot = self.slot(label);
            cases.push(SwitchCase {
                test: slot.id,
                body: self.dispatch_jump(label)?,
            });
        }
        let value = self.cx.arena.var_ref(flow);
        items.push(self.cx.arena.switch(value, &cases, None, Ty::Void)?);
        self.dispatches += 1;
        Ok(self.cx.arena.void_block(&[], &items))
    }

    /// `try { cleanup } catch { $flow = entry; rethrow }`
    ///
    /// An exception leaving a cleanup body abandons the jump it was run
    /// for. `$flow` goes back to what it held when the try was entered,
    /// which keeps a jump still pending in an enclosing finally.
    fn restore_flow_on_throw(&mut self, cleanup: NodeId, entry: VarId) -> Result<NodeId, LowerError> {
        let flow = self.flow_var();
        let arena = &mut *self.cx.arena;
        let body = arena.void_block(&[], &[cleanup]);
        let saved = arena.var_ref(entry);
        let restore = arena.assign(flow, saved)?;
        let rethrow = arena.rethrow();
        let handler = arena.void_block(&[], &[restore, rethrow]);
        let catch_all = CatchBlock {
            test: Ty::EXCEPTION,
            variable: None,
            filter: None,
            body: handler,
        };
        Ok(arena.try_catch(body, &[catch_all])?)
    }

    /// ```text
    /// saved = null
    /// try { protected } catch (e) { saved = e }
    /// finally { finally; if saved != null throw saved; finallyEnd: }
    /// ```
    ///
    /// A forwarded jump lands on `finallyEnd` and drops the stashed
    /// exception, as a jump out of a finally would.
    fn forwarding_finally(
        &mut self,
        items: &mut SmallVec<[NodeId; 4]>,
        protected: NodeId,
        finally: NodeId,
        region: &Region,
    ) -> Result<(), LowerError> {
        let saved = self.cx.fresh_var("$saved", Ty::EXCEPTION);
        self.temps.push(saved);
        let all = self.cx.fresh_var("$exception", Ty::EXCEPTION);

        let arena = &mut *self.cx.arena;
        let none = arena.null(Ty::EXCEPTION)?;
        items.push(arena.assign(saved, none)?);

        let caught = arena.var_ref(all);
        let stash = arena.assign(saved, caught)?;
        let stash = arena.void_block(&[], &[stash]);
        let catch_all = CatchBlock {
            test: Ty::EXCEPTION,
            variable: Some(all),
            filter: None,
            body: stash,
        };

        let pending = arena.var_ref(saved);
        let none = arena.null(Ty::EXCEPTION)?;
        let test = arena.binary(BinaryOp::Ne, pending, none)?;
        let pending = arena.var_ref(saved);
        let raise = arena.throw(pending)?;
        let rethrow = arena.if_then_else(test, raise, None)?;
        let cleanup = arena.void_block(&[], &[finally, rethrow]);
        let cleanup = self.close(cleanup, region)?;

        items.push(self.cx.arena.try_node(protected, &[catch_all], Some(cleanup), None)?);
        Ok(())
    }

    /// `try { protected } catch (e) { fault; rethrow; faultEnd: }`
    fn forwarding_fault(&mut self, protected: NodeId, fault: NodeId, region: &Region) -> Result<NodeId, LowerError> {
        let all = self.cx.fresh_var("$exception", Ty::EXCEPTION);
        let rethrow = self.cx.arena.rethrow();
        let handler = self.cx.arena.void_block(&[], &[fault, rethrow]);
        let handler = self.close(handler, region)?;
        let catch_all = CatchBlock {
            test: Ty::EXCEPTION,
            variable: Some(all),
            filter: None,
            body: handler,
        };
        Ok(self.cx.arena.try_catch(protected, &[catch_all])?)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
