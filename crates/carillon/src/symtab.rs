//! The process-wide symbol table and the lexical scope chain.
//!
//! Every named entity in a compilation occupies one row of [`SymTable`],
//! indexed by a dense 32-bit [`SymbolId`] (0 is reserved for "unresolved").
//! Rows are only ever appended; an id handed out during renaming stays valid
//! through machine lowering.
//!
//! The scope chain exists only while the renamer runs. Scopes are kept in a
//! side vector and popping merely moves the cursor, so scope ids written into
//! AST nodes stay dereferenceable for later passes, and the top scope
//! survives as the program's top-level namespace.

use ahash::AHashMap;
use strum::Display;

use crate::{
    ast::{AstId, DeclGroupId},
    diagnostics::SourceLoc,
    intern::{Interner, Symbol},
    machine::ir::MachineRepr,
    ty::Ty,
};

/// Index of a row in the symbol table. `0` means "null / unresolved".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SymbolId(u32);

impl SymbolId {
    pub const NULL: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State classification of a binding's machine node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StateKind {
    /// Untouched by this compiler (runtime-provided).
    Static,
    /// No persistent members and no arguments; a value computed once.
    Constant,
    /// No persistent members but takes arguments; a pure function.
    Pointwise,
    /// Has at least one persistent member; retains state across runs.
    Stateful,
}

/// One row of the symbol table.
///
/// The `ast_node` / `machine_repr` pair is a union-over-stage: renaming and
/// dependency analysis read and write `ast_node`, machine lowering reads and
/// writes `machine_repr`. At any instant only the current stage's field is
/// meaningful.
#[derive(Debug, Clone)]
pub struct SymbolRecord {
    pub name: Symbol,
    pub id: SymbolId,
    pub source_loc: SourceLoc,
    /// Number of parameters for functions, `-1` otherwise.
    pub arity: i32,
    pub is_constructor: bool,
    pub is_enum: bool,
    /// Position of a data constructor within its declaration.
    pub con_num: u32,
    /// The scope that owns this name.
    pub scope: ScopeId,
    pub declaration_group: Option<DeclGroupId>,
    pub optional_type_signature: Option<AstId>,
    /// Resolved type, populated by the external inferencer.
    pub ty: Option<Ty>,
    pub state_kind: StateKind,
    /// Persistent slot assigned by machine lowering pass 2; `0` = unassigned.
    pub persistent_slot: u32,
    pub ast_node: Option<AstId>,
    pub machine_repr: Option<MachineRepr>,
}

impl SymbolRecord {
    #[must_use]
    pub fn new(name: Symbol, source_loc: SourceLoc) -> Self {
        Self {
            name,
            id: SymbolId::NULL,
            source_loc,
            arity: -1,
            is_constructor: false,
            is_enum: false,
            con_num: 0,
            scope: ScopeId::TOP,
            declaration_group: None,
            optional_type_signature: None,
            ty: None,
            state_kind: StateKind::Constant,
            persistent_slot: 0,
            ast_node: None,
            machine_repr: None,
        }
    }
}

/// The flat, append-only symbol table.
///
/// Ids start at 1; row 0 is a sentinel that is never handed out.
#[derive(Debug)]
pub struct SymTable {
    rows: Vec<SymbolRecord>,
}

impl Default for SymTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: vec![SymbolRecord::new(Symbol::NONE, SourceLoc::default())],
        }
    }

    /// Number of real rows (the sentinel does not count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a row and returns its id.
    ///
    /// # Panics
    /// Panics if the table exceeds `u32::MAX` rows.
    pub fn insert(&mut self, mut record: SymbolRecord) -> SymbolId {
        let id = SymbolId(u32::try_from(self.rows.len()).expect("symbol table overflow"));
        record.id = id;
        self.rows.push(record);
        id
    }

    /// # Panics
    /// Panics on the null id or an id from another table.
    #[must_use]
    pub fn get(&self, id: SymbolId) -> &SymbolRecord {
        assert!(!id.is_null(), "null symbol id dereferenced");
        &self.rows[id.index()]
    }

    /// # Panics
    /// Panics on the null id or an id from another table.
    pub fn get_mut(&mut self, id: SymbolId) -> &mut SymbolRecord {
        assert!(!id.is_null(), "null symbol id dereferenced");
        &mut self.rows[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolRecord> {
        self.rows.iter().skip(1)
    }

    /// Renders the table for verbose phase output.
    #[must_use]
    pub fn dump(&self, interner: &Interner) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(out, "SymTable ({} rows)", self.len());
        for row in self.iter() {
            let name = interner.get(row.name).unwrap_or("<none>");
            let _ = writeln!(
                out,
                "  {:>4}  {:<20} arity={:<3} con={} state={} slot={}",
                row.id, name, row.arity, row.is_constructor, row.state_kind, row.persistent_slot
            );
        }
        out
    }
}

/// Index of a scope frame. `TOP` is the program's top-level namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScopeId(u32);

impl ScopeId {
    pub const TOP: Self = Self(0);

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which of the two parallel namespaces a name lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Term,
    Type,
}

/// One lexical frame: a parent link plus per-namespace name maps.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<ScopeId>,
    terms: AHashMap<Symbol, SymbolId>,
    types: AHashMap<Symbol, SymbolId>,
}

impl Scope {
    fn map(&self, ns: Namespace) -> &AHashMap<Symbol, SymbolId> {
        match ns {
            Namespace::Term => &self.terms,
            Namespace::Type => &self.types,
        }
    }
}

/// The symbol table plus the renamer's scope chain.
///
/// Scope frames are created on scope entry and logically discarded on exit;
/// physically every frame is retained so [`ScopeId`]s embedded in the AST
/// stay valid, and so ancestor queries work after renaming completes.
#[derive(Debug)]
pub struct ScopedSymTable {
    pub table: SymTable,
    scopes: Vec<Scope>,
    current: ScopeId,
}

impl Default for ScopedSymTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopedSymTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: SymTable::new(),
            scopes: vec![Scope::default()],
            current: ScopeId::TOP,
        }
    }

    #[must_use]
    pub fn current_scope(&self) -> ScopeId {
        self.current
    }

    /// Pushes an empty child frame and makes it current.
    ///
    /// # Panics
    /// Panics if the scope count exceeds `u32::MAX`.
    pub fn new_scope(&mut self) -> ScopeId {
        let id = ScopeId(u32::try_from(self.scopes.len()).expect("scope overflow"));
        self.scopes.push(Scope {
            parent: Some(self.current),
            ..Scope::default()
        });
        self.current = id;
        id
    }

    /// Drops the top frame. Its entries remain live rows in the symbol table
    /// but are no longer reachable by name.
    ///
    /// # Panics
    /// Panics when called on the top scope.
    pub fn pop_scope(&mut self) {
        let parent = self.scopes[self.current.index()]
            .parent
            .expect("cannot pop the top scope");
        self.current = parent;
    }

    /// Looks a name up in the current scope only (no parent walk).
    #[must_use]
    pub fn lookup_current(&self, name: Symbol, ns: Namespace) -> Option<SymbolId> {
        self.scopes[self.current.index()].map(ns).get(&name).copied()
    }

    /// Walks parent links from the current scope; `SymbolId::NULL` if absent.
    #[must_use]
    pub fn find(&self, name: Symbol, ns: Namespace) -> SymbolId {
        self.find_from(self.current, name, ns)
    }

    /// Walks parent links from an arbitrary scope; `SymbolId::NULL` if absent.
    #[must_use]
    pub fn find_from(&self, scope: ScopeId, name: Symbol, ns: Namespace) -> SymbolId {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let frame = &self.scopes[id.index()];
            if let Some(found) = frame.map(ns).get(&name) {
                return *found;
            }
            cursor = frame.parent;
        }
        SymbolId::NULL
    }

    /// Returns true when `ancestor` is `scope` or one of its parents.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.scopes[id.index()].parent;
        }
        false
    }

    /// Appends a new symbol row and installs its name in the current scope.
    ///
    /// Duplicate detection is the caller's job ([`Self::lookup_current`]):
    /// installing over an existing binding is a renamer bug.
    pub fn new_symbol(&mut self, mut record: SymbolRecord, ns: Namespace) -> SymbolId {
        record.scope = self.current;
        let name = record.name;
        let id = self.table.insert(record);
        let previous = match ns {
            Namespace::Term => self.scopes[self.current.index()].terms.insert(name, id),
            Namespace::Type => self.scopes[self.current.index()].types.insert(name, id),
        };
        debug_assert!(previous.is_none(), "name installed twice in one scope");
        id
    }

    /// Inserts a generated (compiler-internal) symbol row without touching
    /// any scope. Used by machine lowering for register and function names.
    pub fn new_generated(&mut self, name: Symbol) -> SymbolId {
        self.table.insert(SymbolRecord::new(name, SourceLoc::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(interner: &mut Interner, name: &str) -> SymbolRecord {
        SymbolRecord::new(interner.intern(name), SourceLoc::default())
    }

    #[test]
    fn ids_are_dense_and_stable() {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let a = scoped.new_symbol(record(&mut interner, "a"), Namespace::Term);
        let b = scoped.new_symbol(record(&mut interner, "b"), Namespace::Term);
        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 2);
        assert_eq!(scoped.table.get(a).id, a);
        assert_eq!(scoped.table.get(b).id, b);
    }

    #[test]
    fn popped_scopes_keep_rows_but_lose_names() {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let name = interner.intern("x");
        scoped.new_scope();
        let id = scoped.new_symbol(SymbolRecord::new(name, SourceLoc::default()), Namespace::Term);
        assert_eq!(scoped.find(name, Namespace::Term), id);
        scoped.pop_scope();
        assert_eq!(scoped.find(name, Namespace::Term), SymbolId::NULL);
        assert_eq!(scoped.table.get(id).name, name);
    }

    #[test]
    fn inner_scopes_shadow_outer_bindings() {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let name = interner.intern("x");
        let outer = scoped.new_symbol(SymbolRecord::new(name, SourceLoc::default()), Namespace::Term);
        scoped.new_scope();
        let inner = scoped.new_symbol(SymbolRecord::new(name, SourceLoc::default()), Namespace::Term);
        assert_eq!(scoped.find(name, Namespace::Term), inner);
        scoped.pop_scope();
        assert_eq!(scoped.find(name, Namespace::Term), outer);
    }

    #[test]
    fn term_and_type_namespaces_are_disjoint() {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let name = interner.intern("Int");
        let ty = scoped.new_symbol(SymbolRecord::new(name, SourceLoc::default()), Namespace::Type);
        assert_eq!(scoped.find(name, Namespace::Term), SymbolId::NULL);
        assert_eq!(scoped.find(name, Namespace::Type), ty);
    }
}
