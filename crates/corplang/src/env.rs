//! Lexical environments: a parent-chained scope tree rooted at the builtins.
//!
//! Environments are shared by `Rc` so that every closure capturing a scope
//! sees the same bindings; parent links only ever point outward, which keeps
//! the chain acyclic by construction. `types` holds declared annotations for
//! strict-mode checks.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{ast::TypeExpr, value::Value};

#[derive(Default)]
pub struct Environment {
    pub parent: Option<Rc<Environment>>,
    pub variables: RefCell<IndexMap<Rc<str>, Value>>,
    pub types: RefCell<IndexMap<Rc<str>, TypeExpr>>,
}

// Scope values may reference the scope itself (a class closes over the
// environment it was defined in), so Debug lists binding names only.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Rc<str>> = self.variables.borrow().keys().cloned().collect();
        f.debug_struct("Environment")
            .field("variables", &names)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl Environment {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    #[must_use]
    pub fn child(parent: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(parent.clone()),
            variables: RefCell::new(IndexMap::new()),
            types: RefCell::new(IndexMap::new()),
        })
    }

    /// Defines (or shadows) a variable in this scope.
    pub fn define(&self, name: Rc<str>, value: Value, annotation: Option<TypeExpr>) {
        self.variables.borrow_mut().insert(name.clone(), value);
        if let Some(annotation) = annotation {
            self.types.borrow_mut().insert(name, annotation);
        }
    }

    /// Looks a name up, walking the parent chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.variables.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Updates an existing binding in the nearest scope that defines it.
    /// Returns false when the name is undefined everywhere.
    pub fn set(&self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.variables.borrow_mut().get_mut(name) {
            *slot = value;
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.set(name, value))
    }

    pub fn has(&self, name: &str) -> bool {
        self.variables.borrow().contains_key(name) || self.parent.as_ref().is_some_and(|p| p.has(name))
    }

    /// Removes a binding from the nearest scope that defines it (`delete x`).
    pub fn remove(&self, name: &str) -> bool {
        if self.variables.borrow_mut().shift_remove(name).is_some() {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.remove(name))
    }

    /// The declared annotation for a name, from the nearest scope that has one.
    pub fn declared_type(&self, name: &str) -> Option<TypeExpr> {
        if let Some(annotation) = self.types.borrow().get(name) {
            return Some(annotation.clone());
        }
        self.parent.as_ref().and_then(|p| p.declared_type(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_parent_chain() {
        let root = Environment::new();
        root.define(Rc::from("x"), Value::Int(1), None);
        let child = Environment::child(&root);
        assert!(matches!(child.get("x"), Some(Value::Int(1))));
        assert!(child.get("y").is_none());
    }

    #[test]
    fn set_updates_the_defining_scope() {
        let root = Environment::new();
        root.define(Rc::from("x"), Value::Int(1), None);
        let child = Environment::child(&root);
        assert!(child.set("x", Value::Int(2)));
        assert!(matches!(root.get("x"), Some(Value::Int(2))));
        assert!(!child.set("missing", Value::Null));
    }

    #[test]
    fn shadowing_does_not_leak_outward() {
        let root = Environment::new();
        root.define(Rc::from("x"), Value::Int(1), None);
        let child = Environment::child(&root);
        child.define(Rc::from("x"), Value::Int(10), None);
        assert!(matches!(child.get("x"), Some(Value::Int(10))));
        assert!(matches!(root.get("x"), Some(Value::Int(1))));
    }
}
