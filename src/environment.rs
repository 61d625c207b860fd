use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::object::Object;

pub type Env = Rc<Environment>;

/// One lexical scope: a store of bindings plus a link to the enclosing scope.
///
/// Closures hold an `Rc` to the scope they were created in, so a scope lives
/// as long as the longest-lived call frame or closure that references it.
pub struct Environment {
    store: RefCell<HashMap<String, Object>>,
    outer: Option<Env>,
}

impl Environment {
    pub fn new(outer: Option<Env>) -> Env {
        Rc::new(Self {
            store: RefCell::new(HashMap::new()),
            outer,
        })
    }

    pub fn root() -> Env {
        Self::new(None)
    }

    pub fn enclosed(outer: &Env) -> Env {
        Self::new(Some(Rc::clone(outer)))
    }

    /// Binds in this scope, shadowing any outer binding of the same name.
    pub fn define(&self, name: impl Into<String>, value: Object) {
        self.store.borrow_mut().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        if let Some(value) = self.store.borrow().get(name) {
            Some(value.clone())
        } else if let Some(outer) = &self.outer {
            outer.get(name)
        } else {
            None
        }
    }

    /// Overwrites the nearest existing binding. Returns `false`, binding
    /// nothing, when no scope in the chain holds `name`.
    pub fn update(&self, name: &str, value: Object) -> bool {
        if let Some(slot) = self.store.borrow_mut().get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.outer {
            Some(outer) => outer.update(name, value),
            None => false,
        }
    }

    /// Removes the binding from the nearest scope that holds it. Unknown names are ignored.
    pub fn delete(&self, name: &str) -> bool {
        if self.store.borrow_mut().remove(name).is_some() {
            return true;
        }
        match &self.outer {
            Some(outer) => outer.delete(name),
            None => false,
        }
    }

    /// Bindings of this scope only, sorted by name.
    pub fn local_bindings(&self) -> Vec<(String, Object)> {
        let mut bindings: Vec<(String, Object)> = self
            .store
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }
}
