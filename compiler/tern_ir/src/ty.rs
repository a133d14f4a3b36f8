//! Static result types carried by every IR node.

use std::fmt;

use crate::Name;

/// Closed set of static types.
///
/// The front-end has already resolved every node's type; the lowering
/// passes only need enough structure to keep synthesized temporaries,
/// labels, and assignments type-correct.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Ty {
    Void,
    Bool,
    Int,
    Str,
    /// Top of the reference hierarchy. Light-exception markers travel as `Object`.
    Object,
    /// An exception class; `None` is the root class every exception derives from.
    Exception(Option<Name>),
    Function,
    /// One-shot resumable state machine.
    Cursor,
    /// Produces a fresh [`Ty::Cursor`] per traversal.
    Factory,
}

impl Ty {
    /// The root exception class.
    pub const EXCEPTION: Ty = Ty::Exception(None);

    #[inline]
    pub fn is_void(self) -> bool {
        matches!(self, Ty::Void)
    }

    /// Types whose values may be `null`.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            Ty::Str | Ty::Object | Ty::Exception(_) | Ty::Function | Ty::Cursor | Ty::Factory
        )
    }

    /// Whether a value of type `other` may be stored where `self` is expected.
    ///
    /// Identity, anything non-void into `Object`, and any exception class
    /// into the root exception class.
    pub fn is_assignable_from(self, other: Ty) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Ty::Object, other) => !other.is_void(),
            (Ty::Exception(None), Ty::Exception(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => f.write_str("void"),
            Ty::Bool => f.write_str("bool"),
            Ty::Int => f.write_str("int"),
            Ty::Str => f.write_str("str"),
            Ty::Object => f.write_str("object"),
            Ty::Exception(None) => f.write_str("exception"),
            Ty::Exception(Some(class)) => write!(f, "exception#{}", class.raw()),
            Ty::Function => f.write_str("function"),
            Ty::Cursor => f.write_str("cursor"),
            Ty::Factory => f.write_str("factory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_accepts_every_value_type() {
        for ty in [Ty::Bool, Ty::Int, Ty::Str, Ty::EXCEPTION, Ty::Cursor] {
            assert!(Ty::Object.is_assignable_from(ty));
        }
        assert!(!Ty::Object.is_assignable_from(Ty::Void));
    }

    #[test]
    fn exception_classes_flow_into_the_root_only() {
        let div = Ty::Exception(Some(Name::from_raw(7)));
        let io = Ty::Exception(Some(Name::from_raw(8)));
        assert!(Ty::EXCEPTION.is_assignable_from(div));
        assert!(!div.is_assignable_from(Ty::EXCEPTION));
        assert!(!div.is_assignable_from(io));
    }

    #[test]
    fn value_types_are_not_nullable() {
        assert!(!Ty::Int.is_reference());
        assert!(!Ty::Bool.is_reference());
        assert!(Ty::Str.is_reference());
    }
}
