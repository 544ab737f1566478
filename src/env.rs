// ABOUTME: Scope frames as a parent-linked chain of Rc<Environment>; each
// ABOUTME: frame carries its own bindings, const set, and type-constraint map
// ABOUTME: so popping a scope (dropping its Rc) cleans those up automatically.

use crate::error::{SourceSpan, ZephyrError};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    consts: RefCell<HashSet<String>>,
    type_constraints: RefCell<HashMap<String, String>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new() -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            consts: RefCell::new(HashSet::new()),
            type_constraints: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn with_parent(parent: Rc<Environment>) -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            consts: RefCell::new(HashSet::new()),
            type_constraints: RefCell::new(HashMap::new()),
            parent: Some(parent),
        })
    }

    pub fn parent(&self) -> Option<&Rc<Environment>> {
        self.parent.as_ref()
    }

    /// Binds `name` in THIS scope only, per spec.md 4.5: declarations always
    /// introduce a binding in the current frame, never walking outward.
    pub fn declare(&self, name: &str, value: Value, is_const: bool, type_name: Option<String>) {
        self.bindings.borrow_mut().insert(name.to_string(), value);
        if is_const {
            self.consts.borrow_mut().insert(name.to_string());
        } else {
            self.consts.borrow_mut().remove(name);
        }
        if let Some(t) = type_name {
            self.type_constraints.borrow_mut().insert(name.to_string(), t);
        } else {
            self.type_constraints.borrow_mut().remove(name);
        }
    }

    /// Looks up `name` in this scope and outward.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.bindings.borrow().get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// Looks up `name` bound in THIS scope only, ignoring outer scopes --
    /// used when grouping function overloads, which only coexist when
    /// declared in the same scope.
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.bindings.borrow().get(name).cloned()
    }

    /// Walks the scope chain outward looking for the innermost binding of
    /// `name` and reassigns it there, per spec.md 4.5's assignment contract.
    /// Returns `Ok(false)` if no binding was found anywhere (callers bind in
    /// the current scope in that case).
    pub fn assign(self: &Rc<Self>, name: &str, value: Value, span: SourceSpan) -> Result<bool, ZephyrError> {
        if self.bindings.borrow().contains_key(name) {
            if self.consts.borrow().contains(name) {
                return Err(ZephyrError::type_error(
                    format!("cannot assign to const '{}'", name),
                    span,
                ));
            }
            self.bindings.borrow_mut().insert(name.to_string(), value);
            return Ok(true);
        }
        if let Some(parent) = &self.parent {
            return parent.assign(name, value, span);
        }
        Ok(false)
    }

    pub fn type_constraint(&self, name: &str) -> Option<String> {
        if let Some(t) = self.type_constraints.borrow().get(name) {
            return Some(t.clone());
        }
        if self.bindings.borrow().contains_key(name) {
            return None;
        }
        self.parent.as_ref().and_then(|p| p.type_constraint(name))
    }

    pub fn is_const(&self, name: &str) -> bool {
        if self.consts.borrow().contains(name) {
            return true;
        }
        if self.bindings.borrow().contains_key(name) {
            return false;
        }
        self.parent.as_ref().map_or(false, |p| p.is_const(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integer::Integer;

    fn int(n: i64) -> Value {
        Value::Int(Integer::default_int(n))
    }

    #[test]
    fn declare_and_get() {
        let env = Environment::new();
        env.declare("x", int(42), false, None);
        assert!(matches!(env.get("x"), Some(Value::Int(_))));
    }

    #[test]
    fn child_shadows_parent() {
        let parent = Environment::new();
        parent.declare("x", int(1), false, None);
        let child = Environment::with_parent(parent);
        child.declare("x", int(2), false, None);
        match child.get("x") {
            Some(Value::Int(i)) => assert_eq!(i.value(), 2),
            _ => panic!("expected int"),
        }
    }

    #[test]
    fn assign_walks_outward_to_innermost_binding() {
        let parent = Environment::new();
        parent.declare("x", int(1), false, None);
        let child = Environment::with_parent(parent.clone());
        let span = SourceSpan::default();
        let found = child.assign("x", int(9), span).unwrap();
        assert!(found);
        match parent.get("x") {
            Some(Value::Int(i)) => assert_eq!(i.value(), 9),
            _ => panic!("expected int"),
        }
    }

    #[test]
    fn assign_to_const_errors() {
        let env = Environment::new();
        env.declare("x", int(1), true, None);
        let err = env.assign("x", int(2), SourceSpan::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn unbound_assign_returns_false() {
        let env = Environment::new();
        let found = env.assign("y", int(1), SourceSpan::default()).unwrap();
        assert!(!found);
    }

    #[test]
    fn type_constraint_lookup_through_parent() {
        let parent = Environment::new();
        parent.declare("x", int(1), false, Some("int".to_string()));
        let child = Environment::with_parent(parent);
        assert_eq!(child.type_constraint("x"), Some("int".to_string()));
    }
}
