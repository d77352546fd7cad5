//! The desugared Core representation consumed by machine lowering.
//!
//! Core conversion itself is an external collaborator: by the time a tree
//! arrives here, pattern matching is explicit `case`, multi-clause
//! definitions are single binds, and every bind carries its inferred type.
//! Top-level declarations are chained through `List` nodes; source-level
//! lists never appear (they were desugared into constructor applications).
//!
//! The arena mirrors the semantic AST's index-linked design. The machine
//! lowering's second pass annotates `App` nodes in place with the persistent
//! slot chosen for stateful call sites.

use crate::{intern::Symbol, symtab::SymbolId, ty::Ty};

/// Index of a node in a [`Core`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreId(u32);

impl CoreId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Literal payloads surviving into Core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoreLit {
    Int(i64),
    Float(f64),
    Char(char),
    String(Symbol),
}

/// One alternative of a Core `case`; a `None` pattern is the wildcard.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreAlt {
    pub pat: Option<CoreId>,
    pub body: CoreId,
}

/// A Core variant.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreKind {
    Lit(CoreLit),
    Var {
        symbol: SymbolId,
    },
    App {
        fun: CoreId,
        arg: CoreId,
        /// Persistent slot of this call site in the enclosing node's struct;
        /// `0` until machine lowering pass 2 assigns one.
        persistent_slot: u32,
    },
    /// `arg` is always a `Var` node binding one parameter.
    Lam {
        arg: CoreId,
        body: CoreId,
    },
    /// `bind` is always a `Bind` node.
    Let {
        bind: CoreId,
        expr: CoreId,
    },
    Bind {
        symbol: SymbolId,
        expr: CoreId,
    },
    Case {
        expr: CoreId,
        alts: Vec<CoreAlt>,
    },
    DataDecl {
        symbol: SymbolId,
        cons: Vec<CoreId>,
    },
    /// `args` are `Type` nodes describing the constructor fields.
    DataCon {
        symbol: SymbolId,
        args: Vec<CoreId>,
    },
    /// Chains top-level declarations; not a language list.
    List {
        expr: Option<CoreId>,
        next: Option<CoreId>,
    },
    Type {
        ty: Ty,
    },
}

#[derive(Debug, Clone)]
pub struct CoreNode {
    pub kind: CoreKind,
    /// Inferred type, populated by the external inferencer where lowering
    /// needs it (binds, lambda parameters, constructor fields).
    pub ty: Option<Ty>,
}

/// A whole Core tree: node arena plus the top-level chain head.
#[derive(Debug, Default)]
pub struct Core {
    nodes: Vec<CoreNode>,
    pub root: Option<CoreId>,
}

impl Core {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    /// Panics if the arena exceeds `u32::MAX` nodes.
    pub fn add(&mut self, kind: CoreKind) -> CoreId {
        let id = CoreId(u32::try_from(self.nodes.len()).expect("core arena overflow"));
        self.nodes.push(CoreNode { kind, ty: None });
        id
    }

    pub fn add_typed(&mut self, kind: CoreKind, ty: Ty) -> CoreId {
        let id = self.add(kind);
        self.nodes[id.index()].ty = Some(ty);
        id
    }

    #[must_use]
    pub fn get(&self, id: CoreId) -> &CoreNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: CoreId) -> &mut CoreNode {
        &mut self.nodes[id.index()]
    }

    pub fn set_ty(&mut self, id: CoreId, ty: Ty) {
        self.nodes[id.index()].ty = Some(ty);
    }

    // ------------------------------------------------------------------
    // Construction helpers for the external converter and for tests.
    // ------------------------------------------------------------------

    pub fn lit_int(&mut self, value: i64) -> CoreId {
        self.add(CoreKind::Lit(CoreLit::Int(value)))
    }

    pub fn lit_float(&mut self, value: f64) -> CoreId {
        self.add(CoreKind::Lit(CoreLit::Float(value)))
    }

    pub fn var(&mut self, symbol: SymbolId) -> CoreId {
        self.add(CoreKind::Var { symbol })
    }

    /// Builds the left-leaning application spine `f a b c`.
    pub fn app(&mut self, fun: CoreId, args: &[CoreId]) -> CoreId {
        let mut acc = fun;
        for arg in args {
            acc = self.add(CoreKind::App {
                fun: acc,
                arg: *arg,
                persistent_slot: 0,
            });
        }
        acc
    }

    pub fn lam(&mut self, arg: CoreId, body: CoreId) -> CoreId {
        self.add(CoreKind::Lam { arg, body })
    }

    pub fn bind(&mut self, symbol: SymbolId, expr: CoreId, ty: Ty) -> CoreId {
        self.add_typed(CoreKind::Bind { symbol, expr }, ty)
    }

    pub fn let_(&mut self, bind: CoreId, expr: CoreId) -> CoreId {
        self.add(CoreKind::Let { bind, expr })
    }

    pub fn case(&mut self, expr: CoreId, alts: Vec<CoreAlt>) -> CoreId {
        self.add(CoreKind::Case { expr, alts })
    }

    pub fn data_con(&mut self, symbol: SymbolId, args: Vec<CoreId>) -> CoreId {
        self.add(CoreKind::DataCon { symbol, args })
    }

    pub fn data_decl(&mut self, symbol: SymbolId, cons: Vec<CoreId>) -> CoreId {
        self.add(CoreKind::DataDecl { symbol, cons })
    }

    pub fn type_node(&mut self, ty: Ty) -> CoreId {
        self.add(CoreKind::Type { ty })
    }

    /// Chains top-level declarations and installs the chain as the root.
    pub fn top_level(&mut self, decls: &[CoreId]) {
        let mut next = None;
        for decl in decls.iter().rev() {
            next = Some(self.add(CoreKind::List {
                expr: Some(*decl),
                next,
            }));
        }
        self.root = next;
    }
}
