//! Tree-walking evaluation.
//!
//! Jumps and raised exceptions travel outward as `Err(ControlAction)`.
//! A block that can reach a jump's label takes it over and re-enters its
//! items at that label, descending through nested blocks, conditional
//! branches, loop and switch bodies, try bodies, and label defaults.
//! Jumps never enter expression operands.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tern_ir::{
    ensure_sufficient_stack, Arena, BinaryOp, CallConv, CatchRange, Intrinsic, LabelId, Literal,
    Name, NodeId, NodeKind, NodeRange, StringInterner, Ty, UnaryOp, VarRange,
};

use crate::{
    Closure, ControlAction, CursorState, Environment, EvalError, EvalResult, ExceptionValue,
    LocalScope, Scope, Value,
};

/// A host function. `Err` raises, or under the light convention comes
/// back as a marker.
pub type HostFn = Box<dyn Fn(&[Value]) -> Result<Value, ExceptionValue>>;

type Flow<T = Value> = Result<T, ControlAction>;

/// Cursor `state` before the first resume.
const NOT_STARTED: i64 = -1;
/// Cursor `state` once the generator body has run to completion.
const FINISHED: i64 = 0;

/// Counters for one interpreter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Exceptions raised: throws, rethrows, and failing throwing-convention
    /// host calls.
    pub throws: usize,
    pub host_calls: usize,
}

/// A jump being resumed at its label.
struct Seek {
    label: LabelId,
    value: Option<Value>,
}

impl Seek {
    fn into_jump(self) -> ControlAction {
        ControlAction::Jump {
            label: self.label,
            value: self.value,
        }
    }
}

pub struct Interpreter<'a> {
    arena: &'a Arena,
    interner: &'a StringInterner,
    env: Environment,
    hosts: FxHashMap<Name, HostFn>,
    /// Exceptions being handled, innermost last.
    caught: Vec<Rc<ExceptionValue>>,
    stats: EvalStats,
}

impl<'a> Interpreter<'a> {
    pub fn new(arena: &'a Arena, interner: &'a StringInterner) -> Self {
        Interpreter {
            arena,
            interner,
            env: Environment::new(),
            hosts: FxHashMap::default(),
            caught: Vec::new(),
            stats: EvalStats::default(),
        }
    }

    /// Register a host function callable by name.
    pub fn define_host(
        &mut self,
        name: &str,
        host: impl Fn(&[Value]) -> Result<Value, ExceptionValue> + 'static,
    ) {
        let name = self.interner.intern(name);
        self.hosts.insert(name, Box::new(host));
    }

    pub fn stats(&self) -> EvalStats {
        self.stats
    }

    /// Evaluate a lowered tree.
    pub fn eval(&mut self, root: NodeId) -> EvalResult {
        self.eval_node(root).map_err(ControlAction::into_error)
    }

    // ── Cursors ─────────────────────────────────────────────────────

    /// Run a cursor to its next suspension. `false` once it has finished.
    pub fn resume(&mut self, cursor: &Value) -> EvalResult<bool> {
        let Value::Cursor(cell) = cursor else {
            return Err(EvalError::TypeError {
                expected: "cursor",
                found: cursor.type_name(),
            });
        };
        let (resume, state, current) = {
            let cursor = cell.borrow();
            (Rc::clone(&cursor.resume), cursor.state, cursor.current.clone())
        };
        let (_, outs) = self
            .call_closure(&resume, &[Value::Int(state), current])
            .map_err(ControlAction::into_error)?;

        let mut outs = outs.into_iter();
        let (Some(Value::Int(state)), Some(current)) = (outs.next(), outs.next()) else {
            return Err(EvalError::TypeError {
                expected: "(ref int, ref current) resume function",
                found: "function",
            });
        };
        let mut cursor = cell.borrow_mut();
        cursor.state = state;
        cursor.current = current;
        tracing::trace!(state, "resumed cursor");
        Ok(state != FINISHED)
    }

    /// The value a suspended cursor last produced.
    pub fn current(cursor: &Value) -> Option<Value> {
        let Value::Cursor(cell) = cursor else {
            return None;
        };
        let cursor = cell.borrow();
        (cursor.state > FINISHED).then(|| cursor.current.clone())
    }

    /// Resume a cursor until it finishes, collecting every value. A factory
    /// is asked for a fresh cursor first.
    pub fn drain(&mut self, source: &Value) -> EvalResult<Vec<Value>> {
        let cursor = match source {
            Value::Factory(make) => {
                let (cursor, _) = self
                    .call_closure(make, &[])
                    .map_err(ControlAction::into_error)?;
                cursor
            }
            other => other.clone(),
        };
        let mut items = Vec::new();
        while self.resume(&cursor)? {
            items.extend(Self::current(&cursor));
        }
        Ok(items)
    }

    // ── Evaluation ──────────────────────────────────────────────────

    fn eval_node(&mut self, id: NodeId) -> Flow {
        ensure_sufficient_stack(|| self.eval_kind(id))
    }

    fn eval_kind(&mut self, id: NodeId) -> Flow {
        let arena = self.arena;
        match arena.kind(id) {
            NodeKind::Constant(literal) => Ok(match literal {
                Literal::Unit => Value::Unit,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(b),
                Literal::Int(n) => Value::Int(n),
                Literal::Str(s) => Value::Str(s),
            }),
            NodeKind::Default => Ok(Value::default_of(arena.ty(id))),
            NodeKind::Var(var) => self
                .env
                .lookup(var)
                .ok_or(ControlAction::Error(EvalError::UndefinedVariable { var })),
            NodeKind::Assign { target, value } => {
                let value = self.eval_node(value)?;
                if !self.env.assign(target, value.clone()) {
                    return Err(EvalError::UndefinedVariable { var: target }.into());
                }
                Ok(value)
            }
            NodeKind::Block { vars, body } => self.eval_block(vars, body, None),
            NodeKind::Conditional {
                test,
                then_branch,
                else_branch,
            } => {
                if self.eval_test(test)? {
                    self.eval_node(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval_node(else_branch)
                } else {
                    Ok(Value::Unit)
                }
            }
            NodeKind::Loop {
                body,
                break_label,
                continue_label,
            } => self.eval_loop(body, break_label, continue_label, None),
            NodeKind::Switch {
                value,
                cases,
                default,
            } => {
                let value = self.eval_node(value)?;
                let Value::Int(n) = value else {
                    return Err(type_error("int", &value));
                };
                let arm = arena
                    .cases(cases)
                    .iter()
                    .find(|case| case.test == n)
                    .map(|case| case.body)
                    .or(default);
                match arm {
                    Some(arm) => self.eval_node(arm),
                    None => Ok(Value::Unit),
                }
            }
            NodeKind::Binary { op, left, right } => self.eval_binary(op, left, right),
            NodeKind::Unary { op, operand } => {
                let value = self.eval_node(operand)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(n)) => match n.checked_neg() {
                        Some(n) => Ok(Value::Int(n)),
                        None => self.raise("arithmetic overflow"),
                    },
                    (UnaryOp::Not, other) => Err(type_error("bool", &other)),
                    (UnaryOp::Neg, other) => Err(type_error("int", &other)),
                }
            }
            // Values carry their own representation.
            NodeKind::Convert { operand } => self.eval_node(operand),
            NodeKind::TypeAs { operand } => {
                let value = self.eval_node(operand)?;
                Ok(type_as(value, arena.ty(id)))
            }
            NodeKind::Call {
                func,
                args,
                convention,
            } => {
                let args = self.eval_args(args)?;
                self.call_host(func, &args, convention)
            }
            NodeKind::Invoke { target, args } => {
                let target = self.eval_node(target)?;
                let args = self.eval_args(args)?;
                let Value::Closure(closure) = target else {
                    return Err(EvalError::NotCallable {
                        found: target.type_name(),
                    }
                    .into());
                };
                Ok(self.call_closure(&closure, &args)?.0)
            }
            NodeKind::Lambda { name, params, body } => Ok(Value::Closure(Rc::new(Closure {
                name,
                params,
                body,
                env: self.env.capture(),
            }))),
            NodeKind::Intrinsic { op, args } => {
                let args = self.eval_args(args)?;
                eval_intrinsic(op, &args)
            }
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            } => self.eval_try(body, handlers, finally, fault, None),
            NodeKind::Label { default, .. } => match default {
                Some(default) => self.eval_node(default),
                None => Ok(Value::Unit),
            },
            NodeKind::Goto { label, value, .. } => {
                let value = match value {
                    Some(value) => Some(self.eval_node(value)?),
                    None => None,
                };
                Err(ControlAction::Jump { label, value })
            }
            NodeKind::Throw { exception } => self.eval_throw(exception),
            kind @ (NodeKind::Yield { .. }
            | NodeKind::Generator { .. }
            | NodeKind::FinallyFlowControl { .. }
            | NodeKind::LightScope { .. }
            | NodeKind::LightCall { .. }) => Err(EvalError::Unlowered { kind: kind.name() }.into()),
        }
    }

    fn eval_test(&mut self, test: NodeId) -> Flow<bool> {
        match self.eval_node(test)? {
            Value::Bool(b) => Ok(b),
            other => Err(type_error("bool", &other)),
        }
    }

    fn eval_args(&mut self, args: NodeRange) -> Flow<SmallVec<[Value; 4]>> {
        let arena = self.arena;
        let mut values = SmallVec::new();
        for &arg in arena.nodes(args) {
            values.push(self.eval_node(arg)?);
        }
        Ok(values)
    }

    // ── Blocks, labels, and jumps ───────────────────────────────────

    fn eval_block(&mut self, vars: VarRange, body: NodeRange, seek: Option<Seek>) -> Flow {
        let arena = self.arena;
        self.env.push_scope();
        for &var in arena.vars(vars) {
            self.env.define(var, Value::default_of(arena.var(var).ty));
        }
        let result = self.run_items(arena.nodes(body), seek);
        self.env.pop_scope();
        result
    }

    /// Run `items` in order, starting at `seek`'s label if given. Jumps to
    /// labels among the items restart the run there.
    fn run_items(&mut self, items: &[NodeId], seek: Option<Seek>) -> Flow {
        let mut index = 0;
        let mut pending = None;
        if let Some(seek) = seek {
            match self.find(items, seek.label) {
                Some(found) => {
                    index = found;
                    pending = Some(seek);
                }
                None => return Err(seek.into_jump()),
            }
        }

        let mut last = Value::Unit;
        while let Some(&item) = items.get(index) {
            let result = match pending.take() {
                Some(seek) => self.eval_seek(item, seek),
                None => self.eval_node(item),
            };
            match result {
                Ok(value) => {
                    last = value;
                    index += 1;
                }
                Err(ControlAction::Jump { label, value }) => match self.find(items, label) {
                    Some(found) => {
                        index = found;
                        pending = Some(Seek { label, value });
                    }
                    None => return Err(ControlAction::Jump { label, value }),
                },
                Err(other) => return Err(other),
            }
        }
        Ok(last)
    }

    fn find(&self, items: &[NodeId], label: LabelId) -> Option<usize> {
        items.iter().position(|&item| self.reaches(item, label))
    }

    /// Whether a jump to `label` can enter `id`.
    fn reaches(&self, id: NodeId, label: LabelId) -> bool {
        let arena = self.arena;
        ensure_sufficient_stack(|| match arena.kind(id) {
            NodeKind::Label {
                label: defined,
                default,
            } => defined == label || default.is_some_and(|default| self.reaches(default, label)),
            NodeKind::Block { body, .. } => self.find(arena.nodes(body), label).is_some(),
            NodeKind::Conditional {
                then_branch,
                else_branch,
                ..
            } => {
                self.reaches(then_branch, label)
                    || else_branch.is_some_and(|branch| self.reaches(branch, label))
            }
            NodeKind::Loop { body, .. } | NodeKind::Try { body, .. } => self.reaches(body, label),
            NodeKind::Switch { cases, default, .. } => arena
                .cases(cases)
                .iter()
                .map(|case| case.body)
                .chain(default)
                .any(|arm| self.reaches(arm, label)),
            _ => false,
        })
    }

    /// Evaluate `id` entering at `seek`'s label.
    fn eval_seek(&mut self, id: NodeId, seek: Seek) -> Flow {
        let arena = self.arena;
        match arena.kind(id) {
            NodeKind::Label { label, .. } if label == seek.label => {
                Ok(seek.value.unwrap_or_default())
            }
            NodeKind::Label {
                default: Some(default),
                ..
            } => self.eval_seek(default, seek),
            NodeKind::Block { vars, body } => self.eval_block(vars, body, Some(seek)),
            NodeKind::Conditional {
                then_branch,
                else_branch,
                ..
            } => {
                let branch = if self.reaches(then_branch, seek.label) {
                    Some(then_branch)
                } else {
                    else_branch
                };
                match branch {
                    Some(branch) => self.eval_seek(branch, seek),
                    None => Err(seek.into_jump()),
                }
            }
            NodeKind::Loop {
                body,
                break_label,
                continue_label,
            } => self.eval_loop(body, break_label, continue_label, Some(seek)),
            NodeKind::Switch { cases, default, .. } => {
                let arm = arena
                    .cases(cases)
                    .iter()
                    .map(|case| case.body)
                    .chain(default)
                    .find(|&arm| self.reaches(arm, seek.label));
                match arm {
                    Some(arm) => self.eval_seek(arm, seek),
                    None => Err(seek.into_jump()),
                }
            }
            NodeKind::Try {
                body,
                handlers,
                finally,
                fault,
            } => self.eval_try(body, handlers, finally, fault, Some(seek)),
            _ => Err(seek.into_jump()),
        }
    }

    fn eval_loop(
        &mut self,
        body: NodeId,
        break_label: Option<LabelId>,
        continue_label: Option<LabelId>,
        seek: Option<Seek>,
    ) -> Flow {
        let mut pending = seek;
        loop {
            let result = match pending.take() {
                Some(seek) => self.eval_seek(body, seek),
                None => self.eval_node(body),
            };
            match result {
                Ok(_) => {}
                Err(ControlAction::Jump { label, value }) if Some(label) == break_label => {
                    return Ok(value.unwrap_or_default());
                }
                Err(ControlAction::Jump { label, .. }) if Some(label) == continue_label => {}
                Err(other) => return Err(other),
            }
        }
    }

    // ── Exceptions ──────────────────────────────────────────────────

    fn eval_try(
        &mut self,
        body: NodeId,
        handlers: CatchRange,
        finally: Option<NodeId>,
        fault: Option<NodeId>,
        seek: Option<Seek>,
    ) -> Flow {
        let mut result = match seek {
            Some(seek) => self.eval_seek(body, seek),
            None => self.eval_node(body),
        };

        if let Err(ControlAction::Throw(exception)) = &result {
            let exception = Rc::clone(exception);
            if let Some(handled) = self.handle(handlers, &exception) {
                result = handled;
            }
        }
        if let (Err(ControlAction::Throw(_)), Some(fault)) = (&result, fault) {
            if let Err(action) = self.eval_node(fault) {
                result = Err(action);
            }
        }
        // Anything a finally raises or jumps to replaces what was pending.
        if let Some(finally) = finally {
            if !matches!(result, Err(ControlAction::Error(_))) {
                if let Err(action) = self.eval_node(finally) {
                    result = Err(action);
                }
            }
        }
        result
    }

    /// Run the first handler accepting `exception`. `None` if none does.
    fn handle(&mut self, handlers: CatchRange, exception: &Rc<ExceptionValue>) -> Option<Flow> {
        let arena = self.arena;
        for handler in arena.catches(handlers) {
            if !exception.is_instance_of(handler.test) {
                continue;
            }
            self.env.push_scope();
            if let Some(var) = handler.variable {
                self.env.define(var, Value::Exception(Rc::clone(exception)));
            }
            if let Some(filter) = handler.filter {
                match self.eval_test(filter) {
                    Ok(true) => {}
                    Ok(false) => {
                        self.env.pop_scope();
                        continue;
                    }
                    Err(action) => {
                        self.env.pop_scope();
                        return Some(Err(action));
                    }
                }
            }
            tracing::trace!(message = %exception.message, "caught");
            self.caught.push(Rc::clone(exception));
            let result = self.eval_node(handler.body);
            self.caught.pop();
            self.env.pop_scope();
            return Some(result);
        }
        None
    }

    fn eval_throw(&mut self, exception: Option<NodeId>) -> Flow {
        let exception = match exception {
            Some(exception) => match self.eval_node(exception)? {
                Value::Exception(exception) => exception,
                other => return Err(type_error("exception", &other)),
            },
            None => match self.caught.last() {
                Some(exception) => Rc::clone(exception),
                None => {
                    return Err(EvalError::TypeError {
                        expected: "an exception being handled",
                        found: "none",
                    }
                    .into())
                }
            },
        };
        self.stats.throws += 1;
        tracing::trace!(message = %exception.message, "throw");
        Err(ControlAction::Throw(exception))
    }

    fn raise(&mut self, message: &str) -> Flow {
        self.stats.throws += 1;
        Err(ControlAction::Throw(Rc::new(ExceptionValue::new(None, message))))
    }

    // ── Operators and calls ─────────────────────────────────────────

    fn eval_binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> Flow {
        if op.is_short_circuit() {
            return Err(EvalError::Unlowered { kind: "binary" }.into());
        }
        let left = self.eval_node(left)?;
        let right = self.eval_node(right)?;
        let (a, b) = match (op, &left, &right) {
            (BinaryOp::Eq, ..) => return Ok(Value::Bool(left == right)),
            (BinaryOp::Ne, ..) => return Ok(Value::Bool(left != right)),
            (_, Value::Int(a), Value::Int(b)) => (*a, *b),
            (_, Value::Int(_), other) | (_, other, _) => return Err(type_error("int", other)),
        };
        let result = match op {
            BinaryOp::Lt => return Ok(Value::Bool(a < b)),
            BinaryOp::Le => return Ok(Value::Bool(a <= b)),
            BinaryOp::Gt => return Ok(Value::Bool(a > b)),
            BinaryOp::Ge => return Ok(Value::Bool(a >= b)),
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::AndAlso | BinaryOp::OrElse => None,
        };
        match result {
            Some(n) => Ok(Value::Int(n)),
            None if op == BinaryOp::Div && b == 0 => self.raise("division by zero"),
            None => self.raise("arithmetic overflow"),
        }
    }

    fn call_host(&mut self, func: Name, args: &[Value], convention: CallConv) -> Flow {
        let result = match self.hosts.get(&func) {
            Some(host) => host(args),
            None => {
                return Err(EvalError::UnknownFunction {
                    name: self.interner.lookup(func).to_owned(),
                }
                .into())
            }
        };
        self.stats.host_calls += 1;
        match (result, convention) {
            (Ok(value), _) => Ok(value),
            (Err(exception), CallConv::Light) => Ok(Value::Light(Rc::new(exception))),
            (Err(exception), CallConv::Throwing) => {
                self.stats.throws += 1;
                Err(ControlAction::Throw(Rc::new(exception)))
            }
        }
    }

    /// Call `closure`, returning its result and the final values of its
    /// by-reference parameters.
    fn call_closure(
        &mut self,
        closure: &Closure,
        args: &[Value],
    ) -> Flow<(Value, SmallVec<[Value; 2]>)> {
        let arena = self.arena;
        let params = arena.vars(closure.params);
        if params.len() != args.len() {
            return Err(EvalError::ArityMismatch {
                expected: params.len(),
                found: args.len(),
            }
            .into());
        }
        let mut frame = Scope::with_parent(closure.env.clone());
        for (&param, arg) in params.iter().zip(args) {
            frame.define(param, arg.clone());
        }

        let saved = self.env.switch_to(LocalScope::new(frame));
        let result = self.eval_node(closure.body);
        let frame = self.env.switch_to(saved);

        let value = match result {
            Ok(value) => value,
            Err(ControlAction::Jump { label, .. }) => {
                return Err(EvalError::UnresolvedJump { label }.into())
            }
            Err(action) => return Err(action),
        };
        let frame = frame.borrow();
        let outs = params
            .iter()
            .filter(|&&param| arena.var(param).by_ref)
            .map(|&param| frame.lookup(param).unwrap_or_default())
            .collect();
        Ok((value, outs))
    }
}

fn type_error(expected: &'static str, found: &Value) -> ControlAction {
    EvalError::TypeError {
        expected,
        found: found.type_name(),
    }
    .into()
}

/// `value as ty`: the value if it is an instance of `ty`, otherwise null.
fn type_as(value: Value, ty: Ty) -> Value {
    let instance = match (&value, ty) {
        (Value::Null | Value::Unit, _) => false,
        (Value::Exception(exception), Ty::Exception(_)) => exception.is_instance_of(ty),
        (Value::Str(_), Ty::Str)
        | (Value::Closure(_), Ty::Function)
        | (Value::Cursor(_), Ty::Cursor)
        | (Value::Factory(_), Ty::Factory)
        | (_, Ty::Object) => true,
        _ => false,
    };
    if instance {
        value
    } else {
        Value::Null
    }
}

fn eval_intrinsic(op: Intrinsic, args: &[Value]) -> Flow {
    let arg = args.first().cloned().unwrap_or_default();
    match op {
        Intrinsic::IsLightException => Ok(Value::Bool(matches!(arg, Value::Light(_)))),
        Intrinsic::LightExceptionValue => Ok(match arg {
            Value::Light(exception) => Value::Exception(exception),
            _ => Value::Null,
        }),
        Intrinsic::WrapLightException => match arg {
            Value::Exception(exception) => Ok(Value::Light(exception)),
            other => Err(type_error("exception", &other)),
        },
        Intrinsic::MakeCursor => match arg {
            Value::Closure(resume) => Ok(Value::Cursor(Rc::new(RefCell::new(CursorState {
                resume,
                state: NOT_STARTED,
                current: Value::Unit,
            })))),
            other => Err(type_error("function", &other)),
        },
        Intrinsic::MakeFactory => match arg {
            Value::Closure(make) => Ok(Value::Factory(make)),
            other => Err(type_error("function", &other)),
        },
    }
}
