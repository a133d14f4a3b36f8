//! Lowering-time errors.
//!
//! There is no partial lowering: a pass either produces a complete
//! equivalent tree or fails with one of these.

use tern_ir::{IrError, LabelId};

/// A construct combination a pass refuses to lower.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unsupported {
    YieldInFilter,
    YieldInFault,
    /// A protected region with a value needs forwarded jumps.
    NonVoidTryWithFlow,
    /// A protected region with a value has yields in a handler or finally.
    NonVoidTryWithYields,
    LightExceptionFilter,
    LightExceptionFault,
    /// A light-convertible call inside a finally body.
    LightExceptionInFinally,
}

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Unsupported::YieldInFilter => "yield in a catch filter",
            Unsupported::YieldInFault => "yield in a fault handler",
            Unsupported::NonVoidTryWithFlow => {
                "non-void protected region with jumps out of its finally"
            }
            Unsupported::NonVoidTryWithYields => {
                "non-void protected region with yields in a handler or finally"
            }
            Unsupported::LightExceptionFilter => "light exceptions across a catch filter",
            Unsupported::LightExceptionFault => "light exceptions across a fault handler",
            Unsupported::LightExceptionInFinally => "light-exception call inside a finally",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("not supported: {0}")]
    Unsupported(Unsupported),

    /// A yield names a different label than its enclosing generator.
    #[error("yield targets {found:?}, but the enclosing generator yields to {expected:?}")]
    YieldTargetMismatch { expected: LabelId, found: LabelId },

    #[error("yield outside of any generator")]
    YieldOutsideGenerator,

    /// The same label is defined in two different protected regions.
    #[error("label {label:?} is defined in more than one protected region")]
    AmbiguousLabel { label: LabelId },

    /// Output validation found a node the backend cannot accept.
    #[error("lowered tree still contains a {kind} node")]
    Unlowered { kind: &'static str },

    /// Output validation found a jump leaving a finally or fault body.
    #[error("jump to {label:?} leaves a finally or fault body")]
    JumpOutOfFinally { label: LabelId },

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl From<Unsupported> for LowerError {
    fn from(construct: Unsupported) -> Self {
        LowerError::Unsupported(construct)
    }
}
