//! Generic scoped map shared by the semantic analyzer's two namespaces and by
//! the IR generator's variable/function environments.

use hashbrown::HashMap;

/// A stack of lexical scopes, each mapping names to entries. `enter` writes
/// into the innermost scope; `lookup` searches inner to outer.
#[derive(Debug)]
pub struct SymbolTable<T> {
    scopes: Vec<HashMap<String, T>>,
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        // Start with a global scope so built-ins have somewhere to live
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn end_scope(&mut self) {
        assert!(
            self.scopes.len() > 1,
            "attempted to pop the global scope from a symbol table"
        );

        self.scopes.pop();
    }

    /// Adds a binding in the current (innermost) scope, shadowing any outer
    /// binding of the same name.
    pub fn enter(&mut self, name: impl Into<String>, value: T) {
        self.scopes
            .last_mut()
            .expect("symbol table always has a global scope")
            .insert(name.into(), value);
    }

    /// Searches from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// True if the name is bound in the innermost scope only.
    pub fn exists_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .expect("symbol table always has a global scope")
            .contains_key(name)
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_binding_shadows_outer() {
        let mut table = SymbolTable::new();
        table.enter("x", 1);
        table.begin_scope();
        table.enter("x", 2);

        assert_eq!(table.lookup("x"), Some(&2));

        table.end_scope();
        assert_eq!(table.lookup("x"), Some(&1));
    }

    #[test]
    fn lookup_searches_outer_scopes() {
        let mut table = SymbolTable::new();
        table.enter("x", 1);
        table.begin_scope();

        assert_eq!(table.lookup("x"), Some(&1));
        assert!(!table.exists_in_current_scope("x"));
    }

    #[test]
    fn end_scope_drops_bindings() {
        let mut table = SymbolTable::new();
        table.begin_scope();
        table.enter("y", 7);
        table.end_scope();

        assert_eq!(table.lookup("y"), None);
    }
}
