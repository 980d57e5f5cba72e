// SPDX-License-Identifier: Apache-2.0 OR MIT
use serde_json::{Map, Value};
use smallvec::SmallVec;

/// A single layer of variable bindings.
pub type Scope = Map<String, Value>;

/// Stack of variable scopes used during rendering.
///
/// Lookups walk from the innermost scope outward and the first match wins.
/// The base scope (index 0) is never popped.
#[derive(Debug, Clone)]
pub struct Context {
    scopes: SmallVec<[Scope; 4]>,
}

impl Default for Context {
    fn default() -> Self {
        Self::empty()
    }
}

impl Context {
    /// Creates a context whose base scope holds the entries of `data`.
    ///
    /// Non-object data yields an empty base scope.
    pub fn new(data: &Value) -> Self {
        let base = match data {
            Value::Object(map) => map.clone(),
            _ => Scope::new(),
        };
        Self::from_scope(base)
    }

    pub fn from_scope(base: Scope) -> Self {
        let mut scopes = SmallVec::new();
        scopes.push(base);
        Self { scopes }
    }

    pub fn empty() -> Self {
        Self::from_scope(Scope::new())
    }

    /// Resolves `name` against the scopes, innermost first.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Pushes a new innermost scope.
    pub fn push(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    /// Pops the innermost scope, leaving the base scope in place.
    pub fn pop(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Runs `f` with `scope` pushed, popping it again before returning.
    ///
    /// The scope is popped whatever `f` returns, including `Err` results, so
    /// callers can propagate with `?` afterwards.
    pub fn with_scope<R>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.scopes.len();
        self.push(scope);
        let result = f(self);
        self.scopes.truncate(depth);
        result
    }

    /// Number of scopes currently on the stack, including the base scope.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(value: Value) -> Scope {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut ctx = Context::new(&json!({"name": "outer", "kept": 1}));
        ctx.push(scope(json!({"name": "inner"})));
        assert_eq!(ctx.lookup("name"), Some(&json!("inner")));
        assert_eq!(ctx.lookup("kept"), Some(&json!(1)));
        ctx.pop();
        assert_eq!(ctx.lookup("name"), Some(&json!("outer")));
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn base_scope_is_never_popped() {
        let mut ctx = Context::new(&json!({"a": 1}));
        assert!(ctx.pop().is_none());
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("a"), Some(&json!(1)));
    }

    #[test]
    fn with_scope_pops_on_error() {
        let mut ctx = Context::empty();
        let result: Result<(), &str> = ctx.with_scope(scope(json!({"x": 1})), |inner| {
            assert_eq!(inner.depth(), 2);
            inner.push(Scope::new());
            Err("failed")
        });
        assert!(result.is_err());
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("x"), None);
    }

    #[test]
    fn non_object_data_gives_empty_base() {
        let ctx = Context::new(&json!([1, 2]));
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("0"), None);
    }

    #[test]
    fn base_data_is_untouched_by_scoped_bindings() {
        let mut ctx = Context::new(&json!({"user": "ada"}));
        ctx.with_scope(scope(json!({"user": "grace"})), |inner| {
            assert_eq!(inner.lookup("user"), Some(&json!("grace")));
        });
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("user"), Some(&json!("ada")));
    }
}
