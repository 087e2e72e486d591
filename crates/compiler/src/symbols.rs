//! Symbols, scopes and the semantic environment (spec.md §3).

use std::collections::HashMap;

use hollow_core::Name;

use crate::diagnostics::FileLocation;
use crate::types::{TypeId, TypeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Module,
    Function,
    ForeignFunction,
    Constant,
    Variable,
    Parameter,
    Struct,
    TypeAlias,
    PrimitiveType,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolFlags: u8 {
        const IS_GLOBAL = 0b0000_0001;
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: Name,
    pub kind: SymbolKind,
    pub ty: TypeId,
    pub location: FileLocation,
    pub flags: SymbolFlags,
    /// Functions carry a linked list of overloads sharing the name
    /// (spec §3). Each entry is an index into the owning scope's
    /// `overloads` arena, not another `Symbol` copy, so mutation of one
    /// overload's type (during return-type inference) is visible to
    /// every holder of the chain.
    pub next_overload: Option<SymbolId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// A mapping Name -> Symbol with a parent pointer (spec §3 "Scope").
/// Function scopes additionally carry a return-type slot and a
/// return-statement counter used by inference (spec §4.4).
pub struct Scope {
    pub parent: Option<ScopeId>,
    names: HashMap<Name, SymbolId>,
    pub return_type: Option<TypeId>,
    pub return_type_infer_location: Option<FileLocation>,
    pub return_statement_count: u32,
    pub is_loop: bool,
}

impl Scope {
    fn new(parent: Option<ScopeId>) -> Self {
        Scope {
            parent,
            names: HashMap::new(),
            return_type: None,
            return_type_infer_location: None,
            return_statement_count: 0,
            is_loop: false,
        }
    }
}

/// Owns the type table, the scope graph, a "current scope" cursor, and
/// a stack of function-scope metadata (spec §3 "Environment").
pub struct Environment {
    pub types: TypeTable,
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    pub current: ScopeId,
    pub global: ScopeId,
    function_stack: Vec<ScopeId>,
}

impl Environment {
    pub fn new() -> Self {
        let mut scopes = Vec::new();
        scopes.push(Scope::new(None));
        let global = ScopeId(0);
        Environment {
            types: TypeTable::new(),
            symbols: Vec::new(),
            scopes,
            current: global,
            global,
            function_stack: Vec::new(),
        }
    }

    pub fn open_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(Some(self.current)));
        self.current = id;
        id
    }

    pub fn close_scope(&mut self) {
        let parent = self.scopes[self.current.0 as usize]
            .parent
            .expect("closed the global scope");
        self.current = parent;
    }

    pub fn open_function_scope(&mut self) -> ScopeId {
        let id = self.open_scope();
        self.function_stack.push(id);
        id
    }

    pub fn close_function_scope(&mut self) {
        self.function_stack.pop();
        self.close_scope();
    }

    pub fn current_function_scope(&self) -> Option<ScopeId> {
        self.function_stack.last().copied()
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Declares `symbol` in `scope`. Returns `Err` (existing symbol id)
    /// on redeclaration, unless both the existing and new symbols are
    /// `Function`/`ForeignFunction` kind, in which case the new symbol
    /// is linked onto the existing overload chain (spec §3 invariant:
    /// "A Name may map to at most one Symbol within a scope, except
    /// that a function Name may head a non-empty overload list").
    pub fn declare(&mut self, scope: ScopeId, mut symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let name = symbol.name.clone();
        if let Some(&existing_id) = self.scopes[scope.0 as usize].names.get(&name) {
            let existing_kind = self.symbols[existing_id.0 as usize].kind;
            let is_overloadable =
                matches!(existing_kind, SymbolKind::Function | SymbolKind::ForeignFunction) && existing_kind == symbol.kind;
            if !is_overloadable {
                return Err(existing_id);
            }
            // Walk to the tail of the overload chain and append.
            let mut tail = existing_id;
            loop {
                let next = self.symbols[tail.0 as usize].next_overload;
                match next {
                    Some(n) => tail = n,
                    None => break,
                }
            }
            let new_id = SymbolId(self.symbols.len() as u32);
            symbol.next_overload = None;
            self.symbols.push(symbol);
            self.symbols[tail.0 as usize].next_overload = Some(new_id);
            return Ok(new_id);
        }
        let id = SymbolId(self.symbols.len() as u32);
        symbol.next_overload = None;
        self.symbols.push(symbol);
        self.scopes[scope.0 as usize].names.insert(name, id);
        Ok(id)
    }

    /// Walks `scope` then its ancestors looking up `name` (spec §3
    /// scope parent chain).
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(&id) = self.scopes[s.0 as usize].names.get(name) {
                return Some(id);
            }
            cur = self.scopes[s.0 as usize].parent;
        }
        None
    }

    /// Looked-up symbol's full overload chain, head first.
    pub fn overloads(&self, head: SymbolId) -> Vec<SymbolId> {
        let mut out = vec![head];
        let mut cur = self.symbols[head.0 as usize].next_overload;
        while let Some(id) = cur {
            out.push(id);
            cur = self.symbols[id.0 as usize].next_overload;
        }
        out
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn loc() -> FileLocation {
        FileLocation::new(
            Rc::new(crate::diagnostics::SourceId { path: PathBuf::from("t.hp") }),
            1,
            1,
            0,
            0,
        )
    }

    fn sym(name: &str, kind: SymbolKind, ty: TypeId) -> Symbol {
        Symbol {
            name: Name::from(name),
            kind,
            ty,
            location: loc(),
            flags: SymbolFlags::empty(),
            next_overload: None,
        }
    }

    #[test]
    fn redeclaration_of_non_function_is_rejected() {
        let mut env = Environment::new();
        let p = env.types.primitives();
        let scope = env.global;
        env.declare(scope, sym("x", SymbolKind::Variable, p.s32)).unwrap();
        let result = env.declare(scope, sym("x", SymbolKind::Variable, p.s32));
        assert!(result.is_err());
    }

    #[test]
    fn functions_with_same_name_form_overload_chain() {
        let mut env = Environment::new();
        let p = env.types.primitives();
        let scope = env.global;
        let f1 = env.declare(scope, sym("f", SymbolKind::Function, p.s32)).unwrap();
        let f2 = env.declare(scope, sym("f", SymbolKind::Function, p.f32)).unwrap();
        let chain = env.overloads(f1);
        assert_eq!(chain, vec![f1, f2]);
    }

    #[test]
    fn lookup_walks_parent_scopes() {
        let mut env = Environment::new();
        let p = env.types.primitives();
        env.declare(env.global, sym("g", SymbolKind::Variable, p.s32)).unwrap();
        let inner = env.open_scope();
        assert!(env.lookup(inner, "g").is_some());
        assert!(env.lookup(inner, "missing").is_none());
    }
}
