//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tern_ir::{Name, NodeId, Ty, VarRange};

use crate::LocalScope;
use crate::Scope;

/// A raised (or boxed) exception.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionValue {
    /// Exception class; `None` is the root class.
    pub class: Option<Name>,
    pub message: String,
}

impl ExceptionValue {
    pub fn new(class: Option<Name>, message: impl Into<String>) -> Self {
        ExceptionValue {
            class,
            message: message.into(),
        }
    }

    /// Whether a handler for `test` accepts this exception.
    pub fn is_instance_of(&self, test: Ty) -> bool {
        match test {
            Ty::Exception(None) => true,
            Ty::Exception(Some(class)) => self.class == Some(class),
            _ => false,
        }
    }
}

/// A function value: a lambda plus the scope it was created in.
pub struct Closure {
    pub name: Name,
    pub params: VarRange,
    pub body: NodeId,
    pub env: LocalScope<Scope>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// State of a one-shot cursor over a lowered generator.
#[derive(Debug)]
pub struct CursorState {
    /// `(ref state, ref current)` resume function.
    pub resume: Rc<Closure>,
    pub state: i64,
    pub current: Value,
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Str(Name),
    Exception(Rc<ExceptionValue>),
    /// Light-exception marker: a failure returned instead of raised.
    Light(Rc<ExceptionValue>),
    Closure(Rc<Closure>),
    Cursor(Rc<RefCell<CursorState>>),
    /// Produces a fresh cursor per traversal.
    Factory(Rc<Closure>),
}

impl Value {
    pub fn exception(class: Option<Name>, message: &str) -> Value {
        Value::Exception(Rc::new(ExceptionValue::new(class, message)))
    }

    /// Default value of a slot of type `ty`.
    pub fn default_of(ty: Ty) -> Value {
        match ty {
            Ty::Void => Value::Unit,
            Ty::Bool => Value::Bool(false),
            Ty::Int => Value::Int(0),
            Ty::Str | Ty::Object | Ty::Exception(_) | Ty::Function | Ty::Cursor | Ty::Factory => {
                Value::Null
            }
        }
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Exception(_) => "exception",
            Value::Light(_) => "light exception",
            Value::Closure(_) => "function",
            Value::Cursor(_) => "cursor",
            Value::Factory(_) => "factory",
        }
    }
}

/// Structural for data, identity for functions and cursors.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) | (Value::Light(a), Value::Light(b)) => {
                Rc::ptr_eq(a, b) || a == b
            }
            (Value::Closure(a), Value::Closure(b)) | (Value::Factory(a), Value::Factory(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Cursor(a), Value::Cursor(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_class_matching() {
        let interner = tern_ir::StringInterner::new();
        let io = interner.intern("Io");
        let other = interner.intern("Other");
        let raised = ExceptionValue::new(Some(io), "disk");

        assert!(raised.is_instance_of(Ty::EXCEPTION));
        assert!(raised.is_instance_of(Ty::Exception(Some(io))));
        assert!(!raised.is_instance_of(Ty::Exception(Some(other))));
        assert!(!raised.is_instance_of(Ty::Object));
    }

    #[test]
    fn equality_is_structural_for_data() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Bool(true));
        assert_eq!(Value::exception(None, "x"), Value::exception(None, "x"));
        assert_ne!(Value::Null, Value::exception(None, "x"));
    }

    #[test]
    fn defaults_follow_the_type() {
        assert_eq!(Value::default_of(Ty::Int), Value::Int(0));
        assert_eq!(Value::default_of(Ty::Bool), Value::Bool(false));
        assert_eq!(Value::default_of(Ty::EXCEPTION), Value::Null);
        assert_eq!(Value::default_of(Ty::Void), Value::Unit);
    }
}
