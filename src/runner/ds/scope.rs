//! Parent-linked scope chain.
//!
//! Lookup walks the parent links; declaration writes only into the scope it
//! targets. A binding is created holding `Uninitialized` before its
//! initializer runs, so a read in between fails the way the temporal dead
//! zone requires. Scopes are shared by reference: closures capture the
//! chain, not a copy.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::runner::ds::error::EngineError;
use crate::runner::ds::value::Value;

struct ScopeData {
    bindings: HashMap<String, Value>,
    parent: Option<Scope>,
}

#[derive(Clone)]
pub struct Scope {
    inner: Rc<RefCell<ScopeData>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope {
            inner: Rc::new(RefCell::new(ScopeData {
                bindings: HashMap::new(),
                parent: None,
            })),
        }
    }

    pub fn child(parent: &Scope) -> Self {
        Scope {
            inner: Rc::new(RefCell::new(ScopeData {
                bindings: HashMap::new(),
                parent: Some(parent.clone()),
            })),
        }
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner.borrow().parent.clone()
    }

    /// Create (or overwrite) a binding in exactly this scope.
    pub fn declare(&self, name: &str, value: Value) {
        self.inner
            .borrow_mut()
            .bindings
            .insert(name.to_string(), value);
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.inner.borrow().bindings.contains_key(name)
    }

    /// Raw chain lookup; exposes the `Uninitialized` sentinel to the caller.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let data = self.inner.borrow();
        if let Some(v) = data.bindings.get(name) {
            return Some(v.clone());
        }
        match &data.parent {
            Some(parent) => parent.lookup(name),
            None => None,
        }
    }

    /// Resolve a name for reading. Missing names and temporal-dead-zone
    /// reads are errors.
    pub fn get(&self, name: &str) -> Result<Value, EngineError> {
        match self.lookup(name) {
            None => Err(EngineError::UndefinedIdentifier(name.to_string())),
            Some(Value::Uninitialized) => Err(EngineError::UninitializedRead(name.to_string())),
            Some(v) => Ok(v),
        }
    }

    /// Write through the chain into the scope that owns the binding.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), EngineError> {
        let mut data = self.inner.borrow_mut();
        if data.bindings.contains_key(name) {
            data.bindings.insert(name.to_string(), value);
            return Ok(());
        }
        match data.parent.clone() {
            Some(parent) => {
                drop(data);
                parent.assign(name, value)
            }
            None => Err(EngineError::UndefinedIdentifier(name.to_string())),
        }
    }

    /// Shallow copy: same parent link, current bindings cloned. Loop bodies
    /// run against a fork of the init scope each iteration, so closures
    /// captured inside the body observe per-iteration bindings.
    pub fn fork(&self) -> Scope {
        let data = self.inner.borrow();
        Scope {
            inner: Rc::new(RefCell::new(ScopeData {
                bindings: data.bindings.clone(),
                parent: data.parent.clone(),
            })),
        }
    }

    /// The `this` binding visible from this scope, if any. Arrow functions
    /// leave it unbound so resolution walks to the enclosing scope.
    pub fn this_value(&self) -> Value {
        self.lookup("this").unwrap_or(Value::Undefined)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parent_chain() {
        let root = Scope::new();
        root.declare("x", Value::Number(1.0));
        let inner = Scope::child(&root);
        assert_eq!(inner.get("x").unwrap(), Value::Number(1.0));
        assert!(matches!(
            inner.get("y"),
            Err(EngineError::UndefinedIdentifier(_))
        ));
    }

    #[test]
    fn test_shadowing_does_not_touch_parent() {
        let root = Scope::new();
        root.declare("x", Value::Number(1.0));
        let inner = Scope::child(&root);
        inner.declare("x", Value::Number(2.0));
        assert_eq!(inner.get("x").unwrap(), Value::Number(2.0));
        assert_eq!(root.get("x").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_assign_targets_owning_scope() {
        let root = Scope::new();
        root.declare("x", Value::Number(1.0));
        let inner = Scope::child(&root);
        inner.assign("x", Value::Number(5.0)).unwrap();
        assert_eq!(root.get("x").unwrap(), Value::Number(5.0));
        assert!(!inner.has_own("x"));
    }

    #[test]
    fn test_uninitialized_read_fails() {
        let scope = Scope::new();
        scope.declare("x", Value::Uninitialized);
        assert!(matches!(
            scope.get("x"),
            Err(EngineError::UninitializedRead(_))
        ));
        scope.declare("x", Value::Number(3.0));
        assert_eq!(scope.get("x").unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_closure_sees_later_writes() {
        let root = Scope::new();
        root.declare("n", Value::Number(1.0));
        let captured = root.clone();
        root.assign("n", Value::Number(9.0)).unwrap();
        assert_eq!(captured.get("n").unwrap(), Value::Number(9.0));
    }
}
