//! Variable scoping for the interpreter.
//!
//! Scopes form a parent-linked chain. Closures keep the scope they were
//! created in alive, which is how a lowered generator's hoisted locals
//! outlive each call of its resume function.

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tern_ir::VarId;

use crate::Value;

/// A single-threaded shared scope.
///
/// Wraps `Rc<RefCell<T>>` so every scope allocation goes through
/// [`LocalScope::new`].
#[repr(transparent)]
pub struct LocalScope<T>(Rc<RefCell<T>>);

impl<T> LocalScope<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        LocalScope(Rc::new(RefCell::new(value)))
    }
}

impl<T> Clone for LocalScope<T> {
    #[inline]
    fn clone(&self) -> Self {
        LocalScope(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for LocalScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalScope").field(&self.0).finish()
    }
}

impl<T: Default> Default for LocalScope<T> {
    fn default() -> Self {
        LocalScope::new(T::default())
    }
}

impl<T> Deref for LocalScope<T> {
    type Target = RefCell<T>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Bindings of one block, lambda call, or catch clause.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: FxHashMap<VarId, Value>,
    parent: Option<LocalScope<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn with_parent(parent: LocalScope<Scope>) -> Self {
        Scope {
            bindings: FxHashMap::default(),
            parent: Some(parent),
        }
    }

    /// Bind `var` in this scope, shadowing any outer binding.
    #[inline]
    pub fn define(&mut self, var: VarId, value: Value) {
        self.bindings.insert(var, value);
    }

    pub fn lookup(&self, var: VarId) -> Option<Value> {
        if let Some(value) = self.bindings.get(&var) {
            return Some(value.clone());
        }
        self.parent.as_ref()?.borrow().lookup(var)
    }

    /// Store into the innermost binding of `var`. `false` if unbound.
    pub fn assign(&mut self, var: VarId, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(&var) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(var, value),
            None => false,
        }
    }
}

/// The interpreter's current position in the scope chain.
#[derive(Debug, Default)]
pub struct Environment {
    current: LocalScope<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// The current scope, for capture by a closure.
    pub fn capture(&self) -> LocalScope<Scope> {
        self.current.clone()
    }

    /// Enter a child of the current scope.
    pub fn push_scope(&mut self) {
        let child = Scope::with_parent(self.current.clone());
        self.current = LocalScope::new(child);
    }

    /// Leave the current scope. The root scope is never popped.
    pub fn pop_scope(&mut self) {
        let parent = self.current.borrow().parent.clone();
        if let Some(parent) = parent {
            self.current = parent;
        }
    }

    /// Make `scope` current, returning the scope that was.
    pub fn switch_to(&mut self, scope: LocalScope<Scope>) -> LocalScope<Scope> {
        std::mem::replace(&mut self.current, scope)
    }

    #[inline]
    pub fn define(&mut self, var: VarId, value: Value) {
        self.current.borrow_mut().define(var, value);
    }

    #[inline]
    pub fn lookup(&self, var: VarId) -> Option<Value> {
        self.current.borrow().lookup(var)
    }

    #[inline]
    pub fn assign(&mut self, var: VarId, value: Value) -> bool {
        self.current.borrow_mut().assign(var, value)
    }
}
