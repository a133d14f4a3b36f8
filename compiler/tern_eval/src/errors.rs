//! Evaluation errors and in-flight control transfers.

use std::rc::Rc;

use tern_ir::{LabelId, VarId};

use crate::{ExceptionValue, Value};

/// An evaluation failure reported to the caller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("uncaught exception: {message}")]
    UncaughtException { message: String },

    /// A jump whose label no enclosing construct defines.
    #[error("jump to {label:?} has no target")]
    UnresolvedJump { label: LabelId },

    #[error("unknown host function `{name}`")]
    UnknownFunction { name: String },

    #[error("cannot evaluate a {kind} node; lower the tree first")]
    Unlowered { kind: &'static str },

    #[error("expected {expected}, found {found}")]
    TypeError {
        expected: &'static str,
        found: &'static str,
    },

    #[error("variable {var:?} is not in scope")]
    UndefinedVariable { var: VarId },

    #[error("{found} is not callable")]
    NotCallable { found: &'static str },

    #[error("function takes {expected} arguments, {found} given")]
    ArityMismatch { expected: usize, found: usize },
}

pub type EvalResult<T = Value> = Result<T, EvalError>;

/// Why evaluation of a node stopped early.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlAction {
    /// A goto looking for its label.
    Jump { label: LabelId, value: Option<Value> },
    /// A raised exception looking for a handler.
    Throw(Rc<ExceptionValue>),
    Error(EvalError),
}

impl ControlAction {
    /// The caller-facing error for an action that escaped the root.
    pub fn into_error(self) -> EvalError {
        match self {
            ControlAction::Jump { label, .. } => EvalError::UnresolvedJump { label },
            ControlAction::Throw(exception) => EvalError::UncaughtException {
                message: exception.message.clone(),
            },
            ControlAction::Error(error) => error,
        }
    }
}

impl From<EvalError> for ControlAction {
    fn from(error: EvalError) -> Self {
        ControlAction::Error(error)
    }
}
