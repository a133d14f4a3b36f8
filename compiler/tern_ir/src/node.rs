//! The closed node vocabulary.
//!
//! Every node is a [`NodeKind`] plus a [`Ty`](crate::Ty) stored in parallel
//! arena columns. Child lists are ranges into flat arena tables, so the
//! whole enum is `Copy` and rewrites never clone subtrees.

use crate::{CaseRange, CatchRange, LabelId, Name, NodeId, NodeRange, Ty, VarId, VarRange};

/// Compile-time constant payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Literal {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Str(Name),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Short-circuit `&&`. Reduces to a `Conditional`.
    AndAlso,
    /// Short-circuit `||`. Reduces to a `Conditional`.
    OrElse,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Source-level flavour of a jump. All kinds lower identically; the kind
/// is kept for readable dumps and diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum GotoKind {
    Goto,
    Break,
    Continue,
    Return,
}

/// How a host call reports failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CallConv {
    /// Failure raises a real exception.
    Throwing,
    /// Failure returns a light-exception marker as the call's `Object` result.
    Light,
}

/// Runtime helpers the lowered code relies on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Intrinsic {
    /// `(object) -> bool`: is the value a light-exception marker?
    IsLightException,
    /// `(object) -> exception`: the exception boxed in a marker, or null.
    LightExceptionValue,
    /// `(exception) -> object`: box an exception into a marker.
    WrapLightException,
    /// `(function) -> cursor`: wrap a resume function into a one-shot cursor.
    MakeCursor,
    /// `(function) -> factory`: wrap a cursor-producing function.
    MakeFactory,
}

impl Intrinsic {
    /// Result type of the intrinsic.
    pub fn result_ty(self) -> Ty {
        match self {
            Intrinsic::IsLightException => Ty::Bool,
            Intrinsic::LightExceptionValue => Ty::EXCEPTION,
            Intrinsic::WrapLightException => Ty::Object,
            Intrinsic::MakeCursor => Ty::Cursor,
            Intrinsic::MakeFactory => Ty::Factory,
        }
    }
}

/// External shape a generator lowers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum GeneratorShape {
    /// Used directly; a single traversal.
    Cursor,
    /// Wrapped so every traversal starts from fresh state.
    Factory,
}

/// One catch clause of a `Try`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct CatchBlock {
    /// Exception class this clause accepts.
    pub test: Ty,
    /// Slot receiving the caught exception.
    pub variable: Option<VarId>,
    /// Guard evaluated before the handler is chosen.
    pub filter: Option<NodeId>,
    pub body: NodeId,
}

/// One case of a `Switch`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SwitchCase {
    pub test: i64,
    pub body: NodeId,
}

/// Label table entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelDef {
    pub name: Name,
    /// Type of the value a jump to this label carries; `Void` for plain labels.
    pub ty: Ty,
}

/// Variable table entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct VarDef {
    pub name: Name,
    pub ty: Ty,
    /// Lambda parameter passed by reference: writes are visible to the caller.
    pub by_ref: bool,
}

/// Node kinds.
///
/// The first group is what a backend accepts directly. `Yield`, `Generator`,
/// `FinallyFlowControl`, `LightScope`, `LightCall`, and short-circuit
/// `Binary` nodes are reducible and never survive lowering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    Constant(Literal),
    /// Default value of the node's type.
    Default,
    Var(VarId),
    /// Stores into `target`; evaluates to the stored value.
    Assign {
        target: VarId,
        value: NodeId,
    },
    /// Scoped locals plus statements; evaluates to the last statement.
    Block {
        vars: VarRange,
        body: NodeRange,
    },
    Conditional {
        test: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    Loop {
        body: NodeId,
        break_label: Option<LabelId>,
        continue_label: Option<LabelId>,
    },
    Switch {
        value: NodeId,
        cases: CaseRange,
        default: Option<NodeId>,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    /// Reinterpret the operand at the node's type.
    Convert {
        operand: NodeId,
    },
    /// The operand if it is an instance of the node's type, otherwise null.
    TypeAs {
        operand: NodeId,
    },
    /// Call to a named host function.
    Call {
        func: Name,
        args: NodeRange,
        convention: CallConv,
    },
    /// Call a function value.
    Invoke {
        target: NodeId,
        args: NodeRange,
    },
    /// Independent unit; lowered separately from its enclosing unit.
    Lambda {
        name: Name,
        params: VarRange,
        body: NodeId,
    },
    Intrinsic {
        op: Intrinsic,
        args: NodeRange,
    },
    Try {
        body: NodeId,
        handlers: CatchRange,
        finally: Option<NodeId>,
        fault: Option<NodeId>,
    },
    /// Defines `label`. Falling into it evaluates `default`; jumping to it
    /// produces the jump's value.
    Label {
        label: LabelId,
        default: Option<NodeId>,
    },
    Goto {
        kind: GotoKind,
        label: LabelId,
        value: Option<NodeId>,
    },
    /// Raise an exception; `None` rethrows the one being handled.
    Throw {
        exception: Option<NodeId>,
    },
    /// Suspend point; `value: None` is `yield break`.
    Yield {
        target: LabelId,
        value: Option<NodeId>,
    },
    /// Suspendable region. `target`'s type is the element type.
    Generator {
        target: LabelId,
        body: NodeId,
        shape: GeneratorShape,
    },
    /// Unit in which jumps may leave finally/fault bodies.
    FinallyFlowControl {
        body: NodeId,
    },
    /// Unit in which light-convertible calls propagate failure as values.
    /// Evaluates to the body's value as `Object`, or the escaping marker.
    LightScope {
        body: NodeId,
    },
    /// Host call convertible to the light convention.
    LightCall {
        func: Name,
        args: NodeRange,
    },
}

impl NodeKind {
    /// Whether the reduce protocol replaces this node.
    pub fn is_reducible(&self) -> bool {
        match self {
            NodeKind::Generator { .. }
            | NodeKind::FinallyFlowControl { .. }
            | NodeKind::LightScope { .. }
            | NodeKind::LightCall { .. } => true,
            NodeKind::Binary { op, .. } => op.is_short_circuit(),
            _ => false,
        }
    }

    /// Whether control can fall out of this node normally.
    ///
    /// Jumps and throws never complete, so their static type does not
    /// constrain the branch they sit in.
    pub fn completes(&self) -> bool {
        !matches!(self, NodeKind::Goto { .. } | NodeKind::Throw { .. })
    }

    /// Whether this node starts an independent lowering unit.
    pub fn is_unit_boundary(&self) -> bool {
        matches!(self, NodeKind::Lambda { .. } | NodeKind::Generator { .. })
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Constant(_) => "constant",
            NodeKind::Default => "default",
            NodeKind::Var(_) => "var",
            NodeKind::Assign { .. } => "assign",
            NodeKind::Block { .. } => "block",
            NodeKind::Conditional { .. } => "conditional",
            NodeKind::Loop { .. } => "loop",
            NodeKind::Switch { .. } => "switch",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Convert { .. } => "convert",
            NodeKind::TypeAs { .. } => "type-as",
            NodeKind::Call { .. } => "call",
            NodeKind::Invoke { .. } => "invoke",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::Intrinsic { .. } => "intrinsic",
            NodeKind::Try { .. } => "try",
            NodeKind::Label { .. } => "label",
            NodeKind::Goto { .. } => "goto",
            NodeKind::Throw { .. } => "throw",
            NodeKind::Yield { .. } => "yield",
            NodeKind::Generator { .. } => "generator",
            NodeKind::FinallyFlowControl { .. } => "finally-flow-control",
            NodeKind::LightScope { .. } => "light-scope",
            NodeKind::LightCall { .. } => "light-call",
        }
    }
}
