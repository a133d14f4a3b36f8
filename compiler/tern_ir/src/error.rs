//! Construction-time errors.
//!
//! Raised by the checked builders in [`build`](crate::build) while a tree
//! is being assembled, before any lowering pass runs.

use crate::{BinaryOp, LabelId, Ty, UnaryOp, VarId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// A goto value or label default does not match the label's type.
    #[error("label {label:?} has type {expected}, but the jump or default carries {found}")]
    LabelTypeMismatch {
        label: LabelId,
        expected: Ty,
        found: Ty,
    },

    #[error("yielded value of type {found} is not assignable to element type {expected}")]
    YieldTypeMismatch { expected: Ty, found: Ty },

    #[error("cannot assign {found} to variable {var:?} of type {expected}")]
    AssignTypeMismatch {
        var: VarId,
        expected: Ty,
        found: Ty,
    },

    #[error("conditional branches disagree: {then_ty} vs {else_ty}")]
    BranchMismatch { then_ty: Ty, else_ty: Ty },

    #[error("handler of type {found} does not match protected body of type {expected}")]
    HandlerTypeMismatch { expected: Ty, found: Ty },

    #[error("switch case of type {found} does not match switch type {expected}")]
    CaseTypeMismatch { expected: Ty, found: Ty },

    #[error("test expression must be bool, found {found}")]
    TestNotBool { found: Ty },

    #[error("switch value must be int, found {found}")]
    SwitchValueNotInt { found: Ty },

    #[error("operator {op:?} cannot take operands {left} and {right}")]
    BinaryOperand { op: BinaryOp, left: Ty, right: Ty },

    #[error("operator {op:?} cannot take operand {found}")]
    UnaryOperand { op: UnaryOp, found: Ty },

    #[error("null is not a value of type {ty}")]
    NullNotAllowed { ty: Ty },

    #[error("type test target must be a reference type, found {ty}")]
    TypeAsValueType { ty: Ty },

    #[error("thrown value must be an exception, found {found}")]
    ThrowNotException { found: Ty },

    #[error("catch clause must test an exception class, found {found}")]
    CatchNotException { found: Ty },

    /// Generator result type is neither a cursor nor a factory.
    #[error("unsupported generator output shape: {ty}")]
    UnsupportedGeneratorShape { ty: Ty },

    #[error("generator element type cannot be void")]
    VoidGeneratorElement,
}
