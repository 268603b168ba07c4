//! Lexically scoped symbol environment and flat procedure table.
//!
//! Grounded on `astTypeChecker.py::TypeEnv`/`ProcedureEnv`.

use crate::common::{Id, Map};
use crate::front::types::Type;

/// A stack of scopes, innermost last. Lookup walks from the top down;
/// declaration only ever touches the top scope, so redeclaring a name in an
/// outer scope is shadowing, not an error, while redeclaring within the
/// same scope is rejected by the caller before `define` is invoked.
pub struct TypeEnv {
    scopes: Vec<Map<Id, Type>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv { scopes: vec![Map::new()] }
    }

    pub fn push(&mut self) {
        self.scopes.push(Map::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
        assert!(!self.scopes.is_empty(), "popped the root scope");
    }

    pub fn declared_in_current_scope(&self, name: Id) -> bool {
        self.scopes.last().unwrap().contains_key(&name)
    }

    pub fn define(&mut self, name: Id, ty: Type) {
        self.scopes.last_mut().unwrap().insert(name, ty);
    }

    pub fn lookup(&self, name: Id) -> Option<Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&name).copied())
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A procedure's signature as recorded in the flat, program-wide procedure
/// table: ordered (type, name) parameters and a return type.
#[derive(Clone)]
pub struct ProcEntry {
    pub params: Vec<(Type, Id)>,
    pub ret: Type,
}

/// Flat map from procedure name to signature, populated once in a pre-pass
/// (both hardware procedures and user procedure headers) and never mutated
/// again once checking of procedure bodies begins.
pub struct ProcedureEnv {
    procs: Map<Id, ProcEntry>,
}

impl ProcedureEnv {
    pub fn new() -> Self {
        ProcedureEnv { procs: Map::new() }
    }

    pub fn contains(&self, name: Id) -> bool {
        self.procs.contains_key(&name)
    }

    pub fn define(&mut self, name: Id, entry: ProcEntry) {
        self.procs.insert(name, entry);
    }

    pub fn get(&self, name: Id) -> Option<&ProcEntry> {
        self.procs.get(&name)
    }
}

impl Default for ProcedureEnv {
    fn default() -> Self {
        Self::new()
    }
}
