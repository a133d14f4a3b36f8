//! Checked node builders.
//!
//! Every constructor a front-end (or a pass synthesizing fresh nodes)
//! should use. Type rules are enforced here so lowering can assume a
//! well-typed input; violations surface as [`IrError`].

use crate::{
    BinaryOp, CallConv, CatchBlock, GeneratorShape, GotoKind, Intrinsic, IrError, LabelId,
    Literal, Name, NodeId, NodeKind, SwitchCase, Ty, UnaryOp, VarId,
};

use crate::Arena;

impl Arena {
    /// Whether control can fall out of `id` normally.
    ///
    /// A block completes if its last statement does; a two-armed
    /// conditional if either arm does.
    pub fn completes(&self, id: NodeId) -> bool {
        match self.kind(id) {
            NodeKind::Block { body, .. } => self
                .nodes(body)
                .last()
                .map_or(true, |&last| self.completes(last)),
            NodeKind::Conditional {
                then_branch,
                else_branch: Some(else_branch),
                ..
            } => self.completes(then_branch) || self.completes(else_branch),
            kind => kind.completes(),
        }
    }

    /// `value` may stand where `expected` is required: either its type is
    /// assignable or it never completes.
    fn fits(&self, expected: Ty, value: NodeId) -> bool {
        expected.is_assignable_from(self.ty(value)) || !self.completes(value)
    }

    // ── Leaves ──────────────────────────────────────────────────────

    pub fn constant(&mut self, literal: Literal) -> NodeId {
        let ty = match literal {
            Literal::Unit => Ty::Void,
            Literal::Null => Ty::Object,
            Literal::Bool(_) => Ty::Bool,
            Literal::Int(_) => Ty::Int,
            Literal::Str(_) => Ty::Str,
        };
        self.push(NodeKind::Constant(literal), ty)
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.constant(Literal::Int(value))
    }

    pub fn bool(&mut self, value: bool) -> NodeId {
        self.constant(Literal::Bool(value))
    }

    pub fn str(&mut self, value: Name) -> NodeId {
        self.constant(Literal::Str(value))
    }

    /// The empty statement.
    pub fn unit(&mut self) -> NodeId {
        self.constant(Literal::Unit)
    }

    /// A typed null.
    pub fn null(&mut self, ty: Ty) -> Result<NodeId, IrError> {
        if !ty.is_reference() {
            return Err(IrError::NullNotAllowed { ty });
        }
        Ok(self.push(NodeKind::Constant(Literal::Null), ty))
    }

    pub fn default_of(&mut self, ty: Ty) -> NodeId {
        self.push(NodeKind::Default, ty)
    }

    pub fn var_ref(&mut self, var: VarId) -> NodeId {
        let ty = self.var(var).ty;
        self.push(NodeKind::Var(var), ty)
    }

    // ── Statements and expressions ──────────────────────────────────

    pub fn assign(&mut self, target: VarId, value: NodeId) -> Result<NodeId, IrError> {
        let expected = self.var(target).ty;
        let found = self.ty(value);
        if !expected.is_assignable_from(found) {
            return Err(IrError::AssignTypeMismatch {
                var: target,
                expected,
                found,
            });
        }
        Ok(self.push(NodeKind::Assign { target, value }, expected))
    }

    /// Block typed by its last statement.
    pub fn block(&mut self, vars: &[VarId], body: &[NodeId]) -> NodeId {
        let ty = body.last().map_or(Ty::Void, |&last| self.ty(last));
        self.block_typed(vars, body, ty)
    }

    /// Block whose value is discarded.
    pub fn void_block(&mut self, vars: &[VarId], body: &[NodeId]) -> NodeId {
        self.block_typed(vars, body, Ty::Void)
    }

    fn block_typed(&mut self, vars: &[VarId], body: &[NodeId], ty: Ty) -> NodeId {
        let vars = self.push_vars(vars);
        let body = self.push_nodes(body);
        self.push(NodeKind::Block { vars, body }, ty)
    }

    /// Typed conditional. Branches must agree unless one never completes.
    pub fn conditional(
        &mut self,
        test: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
    ) -> Result<NodeId, IrError> {
        self.check_test(test)?;
        let then_ty = self.ty(then_branch);
        let else_ty = self.ty(else_branch);
        let ty = if !self.completes(then_branch) {
            else_ty
        } else if !self.completes(else_branch) || then_ty == else_ty {
            then_ty
        } else {
            return Err(IrError::BranchMismatch { then_ty, else_ty });
        };
        Ok(self.push(
            NodeKind::Conditional {
                test,
                then_branch,
                else_branch: Some(else_branch),
            },
            ty,
        ))
    }

    /// Statement-level conditional; branch values are discarded.
    pub fn if_then_else(
        &mut self,
        test: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    ) -> Result<NodeId, IrError> {
        self.check_test(test)?;
        Ok(self.push(
            NodeKind::Conditional {
                test,
                then_branch,
                else_branch,
            },
            Ty::Void,
        ))
    }

    fn check_test(&self, test: NodeId) -> Result<(), IrError> {
        match self.ty(test) {
            Ty::Bool => Ok(()),
            found => Err(IrError::TestNotBool { found }),
        }
    }

    pub fn loop_node(
        &mut self,
        body: NodeId,
        break_label: Option<LabelId>,
        continue_label: Option<LabelId>,
    ) -> NodeId {
        let ty = break_label.map_or(Ty::Void, |label| self.label(label).ty);
        self.push(
            NodeKind::Loop {
                body,
                break_label,
                continue_label,
            },
            ty,
        )
    }

    pub fn switch(
        &mut self,
        value: NodeId,
        cases: &[SwitchCase],
        default: Option<NodeId>,
        ty: Ty,
    ) -> Result<NodeId, IrError> {
        let found = self.ty(value);
        if found != Ty::Int {
            return Err(IrError::SwitchValueNotInt { found });
        }
        if !ty.is_void() {
            for body in cases.iter().map(|case| case.body).chain(default) {
                if !self.fits(ty, body) {
                    return Err(IrError::CaseTypeMismatch {
                        expected: ty,
                        found: self.ty(body),
                    });
                }
            }
        }
        let cases = self.push_cases(cases);
        Ok(self.push(
            NodeKind::Switch {
                value,
                cases,
                default,
            },
            ty,
        ))
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> Result<NodeId, IrError> {
        let (lt, rt) = (self.ty(left), self.ty(right));
        let ty = match op {
            _ if op.is_arithmetic() && lt == Ty::Int && rt == Ty::Int => Ty::Int,
            _ if op.is_ordering() && lt == Ty::Int && rt == Ty::Int => Ty::Bool,
            BinaryOp::Eq | BinaryOp::Ne if !lt.is_void() && !rt.is_void() => Ty::Bool,
            BinaryOp::AndAlso | BinaryOp::OrElse if lt == Ty::Bool && rt == Ty::Bool => Ty::Bool,
            _ => {
                return Err(IrError::BinaryOperand {
                    op,
                    left: lt,
                    right: rt,
                })
            }
        };
        Ok(self.push(NodeKind::Binary { op, left, right }, ty))
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> Result<NodeId, IrError> {
        let found = self.ty(operand);
        let ty = match (op, found) {
            (UnaryOp::Not, Ty::Bool) => Ty::Bool,
            (UnaryOp::Neg, Ty::Int) => Ty::Int,
            _ => return Err(IrError::UnaryOperand { op, found }),
        };
        Ok(self.push(NodeKind::Unary { op, operand }, ty))
    }

    pub fn convert(&mut self, operand: NodeId, ty: Ty) -> NodeId {
        self.push(NodeKind::Convert { operand }, ty)
    }

    pub fn type_as(&mut self, operand: NodeId, ty: Ty) -> Result<NodeId, IrError> {
        if !ty.is_reference() {
            return Err(IrError::TypeAsValueType { ty });
        }
        Ok(self.push(NodeKind::TypeAs { operand }, ty))
    }

    // ── Calls and units ─────────────────────────────────────────────

    pub fn call(&mut self, func: Name, args: &[NodeId], ty: Ty) -> NodeId {
        self.call_with(func, args, CallConv::Throwing, ty)
    }

    pub fn call_with(&mut self, func: Name, args: &[NodeId], convention: CallConv, ty: Ty) -> NodeId {
        let args = self.push_nodes(args);
        self.push(
            NodeKind::Call {
                func,
                args,
                convention,
            },
            ty,
        )
    }

    /// Host call that may be lowered to the light convention.
    pub fn light_call(&mut self, func: Name, args: &[NodeId], ty: Ty) -> NodeId {
        let args = self.push_nodes(args);
        self.push(NodeKind::LightCall { func, args }, ty)
    }

    pub fn invoke(&mut self, target: NodeId, args: &[NodeId], ty: Ty) -> NodeId {
        let args = self.push_nodes(args);
        self.push(NodeKind::Invoke { target, args }, ty)
    }

    pub fn lambda(&mut self, name: Name, params: &[VarId], body: NodeId) -> NodeId {
        let params = self.push_vars(params);
        self.push(NodeKind::Lambda { name, params, body }, Ty::Function)
    }

    pub fn intrinsic(&mut self, op: Intrinsic, args: &[NodeId]) -> NodeId {
        let args = self.push_nodes(args);
        self.push(NodeKind::Intrinsic { op, args }, op.result_ty())
    }

    // ── Exception handling ──────────────────────────────────────────

    pub fn try_node(
        &mut self,
        body: NodeId,
        handlers: &[CatchBlock],
        finally: Option<NodeId>,
        fault: Option<NodeId>,
    ) -> Result<NodeId, IrError> {
        let ty = self.ty(body);
        for handler in handlers {
            if !matches!(handler.test, Ty::Exception(_)) {
                return Err(IrError::CatchNotException { found: handler.test });
            }
            if let Some(filter) = handler.filter {
                self.check_test(filter)?;
            }
            if !ty.is_void() && !self.fits(ty, handler.body) {
                return Err(IrError::HandlerTypeMismatch {
                    expected: ty,
                    found: self.ty(handler.body),
                });
            }
        }
        let handlers = self.push_catches(handlers);
        Ok(self.push(
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            },
            ty,
        ))
    }

    pub fn try_catch(&mut self, body: NodeId, handlers: &[CatchBlock]) -> Result<NodeId, IrError> {
        self.try_node(body, handlers, None, None)
    }

    pub fn try_finally(&mut self, body: NodeId, finally: NodeId) -> Result<NodeId, IrError> {
        self.try_node(body, &[], Some(finally), None)
    }

    pub fn try_fault(&mut self, body: NodeId, fault: NodeId) -> Result<NodeId, IrError> {
        self.try_node(body, &[], None, Some(fault))
    }

    pub fn throw(&mut self, exception: NodeId) -> Result<NodeId, IrError> {
        let found = self.ty(exception);
        if !matches!(found, Ty::Exception(_)) {
            return Err(IrError::ThrowNotException { found });
        }
        Ok(self.push(
            NodeKind::Throw {
                exception: Some(exception),
            },
            Ty::Void,
        ))
    }

    /// Rethrow the exception currently being handled.
    pub fn rethrow(&mut self) -> NodeId {
        self.push(NodeKind::Throw { exception: None }, Ty::Void)
    }

    // ── Labels and jumps ────────────────────────────────────────────

    /// Define `label`. Typed labels require a default value.
    pub fn label_node(&mut self, label: LabelId, default: Option<NodeId>) -> Result<NodeId, IrError> {
        let expected = self.label(label).ty;
        let fits = match default {
            Some(value) if expected.is_void() => self.ty(value).is_void(),
            Some(value) => self.fits(expected, value),
            None => expected.is_void(),
        };
        if !fits {
            return Err(IrError::LabelTypeMismatch {
                label,
                expected,
                found: default.map_or(Ty::Void, |value| self.ty(value)),
            });
        }
        Ok(self.push(NodeKind::Label { label, default }, expected))
    }

    pub fn goto(&mut self, label: LabelId, value: Option<NodeId>) -> Result<NodeId, IrError> {
        self.jump(GotoKind::Goto, label, value)
    }

    /// Jump to `label`. The carried value must match the label's type.
    pub fn jump(
        &mut self,
        kind: GotoKind,
        label: LabelId,
        value: Option<NodeId>,
    ) -> Result<NodeId, IrError> {
        let expected = self.label(label).ty;
        let found = value.map_or(Ty::Void, |value| self.ty(value));
        let fits = match value {
            Some(_) if expected.is_void() => false,
            Some(value) => self.fits(expected, value),
            None => expected.is_void(),
        };
        if !fits {
            return Err(IrError::LabelTypeMismatch {
                label,
                expected,
                found,
            });
        }
        Ok(self.push(NodeKind::Goto { kind, label, value }, Ty::Void))
    }

    // ── Generators and reducible units ──────────────────────────────

    /// `yield value` to the generator owning `target`.
    pub fn yield_value(&mut self, target: LabelId, value: NodeId) -> Result<NodeId, IrError> {
        let expected = self.label(target).ty;
        let found = self.ty(value);
        if !expected.is_assignable_from(found) {
            return Err(IrError::YieldTypeMismatch { expected, found });
        }
        Ok(self.push(
            NodeKind::Yield {
                target,
                value: Some(value),
            },
            Ty::Void,
        ))
    }

    pub fn yield_break(&mut self, target: LabelId) -> NodeId {
        self.push(
            NodeKind::Yield {
                target,
                value: None,
            },
            Ty::Void,
        )
    }

    /// A generator region. `ty` selects the output shape.
    pub fn generator(&mut self, target: LabelId, body: NodeId, ty: Ty) -> Result<NodeId, IrError> {
        let shape = match ty {
            Ty::Cursor => GeneratorShape::Cursor,
            Ty::Factory => GeneratorShape::Factory,
            _ => return Err(IrError::UnsupportedGeneratorShape { ty }),
        };
        if self.label(target).ty.is_void() {
            return Err(IrError::VoidGeneratorElement);
        }
        Ok(self.push(NodeKind::Generator { target, body, shape }, ty))
    }

    pub fn finally_flow_control(&mut self, body: NodeId) -> NodeId {
        let ty = self.ty(body);
        self.push(NodeKind::FinallyFlowControl { body }, ty)
    }

    pub fn light_scope(&mut self, body: NodeId) -> NodeId {
        self.push(NodeKind::LightScope { body }, Ty::Object)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
