//! Environment for variable bindings
//!
//! Scopes live in an arena owned by the interpreter and refer to their parent
//! by [`EnvId`]. A function value holds a [`ScopeHandle`] for its defining
//! scope; the arena only keeps a weak reference to it. A call scope whose
//! call has returned stays alive while some handle to it (or to a scope below
//! it) is still held, and is reclaimed by [`Environments::collect`] once
//! nothing outside the finished scopes refers to it any more.

use super::builtins::BUILTINS;
use super::value::Function;
use super::Value;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Finished scopes held back before the first sweep
const MIN_SWEEP: usize = 256;

/// Handle to a scope in [`Environments`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(usize);

/// Keeps a scope, and through `parent` its ancestors, from being reclaimed
#[derive(Debug)]
pub struct ScopeHandle {
    id: EnvId,
    parent: Option<Rc<ScopeHandle>>,
}

impl ScopeHandle {
    pub fn id(&self) -> EnvId {
        self.id
    }
}

#[derive(Debug, Default)]
struct Scope {
    /// Variable bindings in this scope
    bindings: HashMap<String, Value>,
    /// Parent scope for lexical lookup
    parent: Option<EnvId>,
    /// Held by the function values defined here
    handle: Weak<ScopeHandle>,
}

/// Arena of scopes. Slot 0 is the global scope, which lives as long as the
/// arena itself.
#[derive(Debug)]
pub struct Environments {
    scopes: Vec<Option<Scope>>,
    free: Vec<usize>,
    /// Returned call scopes still pinned by a handle
    detached: Vec<EnvId>,
    next_sweep: usize,
}

impl Environments {
    /// A fresh global scope seeded with `NULL`, `TRUE`, `FALSE` and the
    /// built-in functions
    pub fn new() -> Self {
        let mut envs = Self::empty();
        let global = envs.global();
        envs.define(global, "NULL", Value::Int(0));
        envs.define(global, "TRUE", Value::Int(1));
        envs.define(global, "FALSE", Value::Int(0));
        for builtin in BUILTINS.iter() {
            envs.define(global, builtin.name, Value::Builtin(builtin));
        }
        envs
    }

    /// A global scope with no bindings
    pub fn empty() -> Self {
        Environments {
            scopes: vec![Some(Scope::default())],
            free: Vec::new(),
            detached: Vec::new(),
            next_sweep: MIN_SWEEP,
        }
    }

    pub fn global(&self) -> EnvId {
        EnvId(0)
    }

    /// Create a new scope whose parent is `parent`
    pub fn child(&mut self, parent: EnvId) -> EnvId {
        let scope = Scope {
            parent: Some(parent),
            ..Scope::default()
        };
        match self.free.pop() {
            Some(slot) => {
                self.scopes[slot] = Some(scope);
                EnvId(slot)
            }
            None => {
                self.scopes.push(Some(scope));
                EnvId(self.scopes.len() - 1)
            }
        }
    }

    fn scope(&self, id: EnvId) -> Option<&Scope> {
        self.scopes.get(id.0).and_then(Option::as_ref)
    }

    fn scope_mut(&mut self, id: EnvId) -> Option<&mut Scope> {
        self.scopes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Define a new variable in `env`, shadowing any parent binding
    pub fn define(&mut self, env: EnvId, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scope_mut(env) {
            scope.bindings.insert(name.into(), value);
        }
    }

    /// Look up a variable in the scope chain
    pub fn get(&self, env: EnvId, name: &str) -> Option<Value> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.scope(id)?;
            if let Some(value) = scope.bindings.get(name) {
                return Some(value.clone());
            }
            current = scope.parent;
        }
        None
    }

    /// Nearest scope in the chain that binds `name`
    fn owner(&self, env: EnvId, name: &str) -> Option<EnvId> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.scope(id)?;
            if scope.bindings.contains_key(name) {
                return Some(id);
            }
            current = scope.parent;
        }
        None
    }

    /// Update the nearest existing binding of `name`, or define it in `env`
    pub fn set(&mut self, env: EnvId, name: &str, value: Value) {
        let target = self.owner(env, name).unwrap_or(env);
        self.define(target, name, value);
    }

    /// Check if a variable exists in the scope chain
    pub fn contains(&self, env: EnvId, name: &str) -> bool {
        self.owner(env, name).is_some()
    }

    /// Pin `env` and its ancestors for as long as the returned handle lives
    pub fn capture(&mut self, env: EnvId) -> Rc<ScopeHandle> {
        if let Some(handle) = self.scope(env).and_then(|s| s.handle.upgrade()) {
            return handle;
        }
        let parent = self.scope(env).and_then(|s| s.parent);
        let handle = Rc::new(ScopeHandle {
            id: env,
            parent: parent.map(|p| self.capture(p)),
        });
        if let Some(scope) = self.scope_mut(env) {
            scope.handle = Rc::downgrade(&handle);
        }
        handle
    }

    /// End a call scope. It is freed at once unless a handle still pins it,
    /// in which case a later [`collect`](Self::collect) decides.
    pub fn release(&mut self, env: EnvId) {
        if env == self.global() {
            return;
        }
        let Some(scope) = self.scope(env) else {
            return;
        };
        if scope.handle.strong_count() == 0 {
            self.free_slot(env);
            return;
        }
        self.detached.push(env);
        if self.detached.len() >= self.next_sweep {
            self.collect();
        }
    }

    fn free_slot(&mut self, env: EnvId) {
        // Dropping the bindings may drop the last handles to other scopes
        let scope = self.scopes.get_mut(env.0).and_then(Option::take);
        self.free.push(env.0);
        drop(scope);
    }

    /// Reclaim returned call scopes that nothing outside them refers to.
    ///
    /// A scope counts as referenced from outside when its handle has more
    /// strong references than the finished scopes themselves account for:
    /// functions bound directly in those scopes and held nowhere else, and
    /// the parent links of their handles. Everything reachable from such a
    /// scope survives; the rest, self-referencing closures included, is
    /// freed. Functions inside lists are treated as outside references.
    pub fn collect(&mut self) {
        let pending: Vec<EnvId> = std::mem::take(&mut self.detached)
            .into_iter()
            .filter(|id| self.scope(*id).is_some())
            .collect();
        let index: HashMap<EnvId, usize> = pending.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let handles: Vec<Option<Rc<ScopeHandle>>> = pending
            .iter()
            .map(|id| self.scope(*id).and_then(|s| s.handle.upgrade()))
            .collect();

        // The upgrade above is one of the strong references
        let mut outside: Vec<usize> = handles
            .iter()
            .map(|h| h.as_ref().map_or(0, |h| Rc::strong_count(h) - 1))
            .collect();

        let pending_slot = |handle: &Rc<ScopeHandle>| {
            index
                .get(&handle.id)
                .copied()
                .filter(|&i| handles[i].as_ref().is_some_and(|h| Rc::ptr_eq(h, handle)))
        };

        for handle in handles.iter().flatten() {
            if let Some(i) = handle.parent.as_ref().and_then(pending_slot) {
                outside[i] = outside[i].saturating_sub(1);
            }
        }

        let mut bound: HashMap<*const Function, (Rc<Function>, usize)> = HashMap::new();
        for id in &pending {
            for value in self.scope(*id).into_iter().flat_map(|s| s.bindings.values()) {
                if let Value::Function(func) = value {
                    bound.entry(Rc::as_ptr(func)).or_insert_with(|| (Rc::clone(func), 0)).1 += 1;
                }
            }
        }
        for (func, uses) in bound.values() {
            // One extra strong reference is the clone held in `bound`
            if Rc::strong_count(func) - 1 == *uses {
                if let Some(i) = pending_slot(&func.scope) {
                    outside[i] = outside[i].saturating_sub(1);
                }
            }
        }
        drop(bound);

        let mut reachable = vec![false; pending.len()];
        let mut stack: Vec<usize> = (0..pending.len()).filter(|&i| outside[i] > 0).collect();
        while let Some(i) = stack.pop() {
            if std::mem::replace(&mut reachable[i], true) {
                continue;
            }
            let Some(scope) = self.scope(pending[i]) else {
                continue;
            };
            stack.extend(scope.parent.and_then(|p| index.get(&p)));
            for value in scope.bindings.values() {
                if let Value::Function(func) = value {
                    stack.extend(index.get(&func.scope.id()));
                }
            }
        }
        drop(handles);

        for (i, id) in pending.into_iter().enumerate() {
            if reachable[i] {
                self.detached.push(id);
            } else {
                self.free_slot(id);
            }
        }
        self.next_sweep = (self.detached.len() * 2).max(MIN_SWEEP);
        log::trace!("scope sweep kept {} returned scope(s)", self.detached.len());
    }

    /// Number of live scopes, the global one included
    pub fn live(&self) -> usize {
        self.scopes.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for Environments {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let mut envs = Environments::empty();
        let global = envs.global();
        envs.define(global, "x", Value::Int(42));
        assert_eq!(envs.get(global, "x"), Some(Value::Int(42)));
        assert_eq!(envs.get(global, "y"), None);
    }

    #[test]
    fn test_global_is_seeded() {
        let envs = Environments::new();
        let global = envs.global();
        assert_eq!(envs.get(global, "TRUE"), Some(Value::Int(1)));
        assert_eq!(envs.get(global, "NULL"), Some(Value::Int(0)));
        assert!(matches!(envs.get(global, "PRINT"), Some(Value::Builtin(b)) if b.name == "PRINT"));
    }

    #[test]
    fn test_scope_chain() {
        let mut envs = Environments::empty();
        let parent = envs.global();
        envs.define(parent, "x", Value::Int(1));

        let child = envs.child(parent);
        envs.define(child, "y", Value::Int(2));

        // Child can see parent's bindings
        assert_eq!(envs.get(child, "x"), Some(Value::Int(1)));
        assert_eq!(envs.get(child, "y"), Some(Value::Int(2)));

        // Parent cannot see child's bindings
        assert_eq!(envs.get(parent, "y"), None);
    }

    #[test]
    fn test_shadowing() {
        let mut envs = Environments::empty();
        let parent = envs.global();
        envs.define(parent, "x", Value::Int(1));

        let child = envs.child(parent);
        envs.define(child, "x", Value::Int(2));

        assert_eq!(envs.get(child, "x"), Some(Value::Int(2)));
        assert_eq!(envs.get(parent, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_set_in_grandparent() {
        let mut envs = Environments::empty();
        let grandparent = envs.global();
        envs.define(grandparent, "x", Value::Int(1));

        let parent = envs.child(grandparent);
        let child = envs.child(parent);

        envs.set(child, "x", Value::Int(99));
        assert_eq!(envs.get(grandparent, "x"), Some(Value::Int(99)));
        assert!(!envs.scope(child).is_some_and(|s| s.bindings.contains_key("x")));
    }

    #[test]
    fn test_set_unbound_defines_locally() {
        let mut envs = Environments::empty();
        let parent = envs.global();
        let child = envs.child(parent);

        envs.set(child, "x", Value::Int(1));
        assert_eq!(envs.get(child, "x"), Some(Value::Int(1)));
        assert!(!envs.contains(parent, "x"));
    }

    #[test]
    fn test_release_reuses_slot() {
        let mut envs = Environments::empty();
        let global = envs.global();
        let first = envs.child(global);
        envs.define(first, "tmp", Value::Int(1));
        envs.release(first);
        assert_eq!(envs.live(), 1);

        let second = envs.child(global);
        assert_eq!(first, second);
        assert_eq!(envs.get(second, "tmp"), None);
    }

    #[test]
    fn test_captured_scope_survives_release() {
        let mut envs = Environments::empty();
        let global = envs.global();
        let outer = envs.child(global);
        let inner = envs.child(outer);
        envs.define(outer, "n", Value::Int(7));

        let handle = envs.capture(inner);
        envs.release(inner);
        envs.release(outer);
        envs.collect();

        assert_eq!(envs.live(), 3);
        assert_eq!(envs.get(handle.id(), "n"), Some(Value::Int(7)));

        drop(handle);
        envs.collect();
        assert_eq!(envs.live(), 1);
    }

    #[test]
    fn test_capture_reuses_live_handle() {
        let mut envs = Environments::empty();
        let scope = envs.child(envs.global());
        let first = envs.capture(scope);
        let second = envs.capture(scope);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_global_never_released() {
        let mut envs = Environments::empty();
        let global = envs.global();
        envs.release(global);
        envs.collect();
        envs.define(global, "x", Value::Int(1));
        assert!(envs.contains(global, "x"));
    }
}
