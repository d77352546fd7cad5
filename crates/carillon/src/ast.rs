//! The pointer-linked semantic AST, re-architected as an arena with indices.
//!
//! The reifier allocates every node of a tree into one [`Ast`] arena; child
//! links are 32-bit [`AstId`]s instead of raw pointers, which keeps back
//! edges (scopes, declaration groups) trivially safe and makes structural
//! comparison cheap. Lists are threaded through `next` fields exactly like
//! the source language's declaration chains.
//!
//! Declaration groups — the unit the dependency analyzer works on — live in
//! the same arena, as do the per-block SCC group lists the analyzer attaches
//! to declaration blocks.

use crate::{
    diagnostics::SourceLoc,
    intern::{Interner, Symbol},
    parse_ast::{BinOpKind, ConKind, ConstantKind, SequenceKind, SigKind, VarKind},
    symtab::{ScopeId, SymbolId},
    ty::Ty,
};

/// Index of a node in an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AstId(u32);

impl AstId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a declaration group in an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclGroupId(u32);

impl DeclGroupId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an SCC group list attached to a declaration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupListId(u32);

impl GroupListId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A semantic AST variant.
///
/// The shape mirrors the parse AST; the extra fields (`symbol`, `group`,
/// `group_list`) are written by renaming and dependency analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum AstKind {
    Undefined,
    Constant {
        kind: ConstantKind,
    },
    UnaryOp {
        symbol: Symbol,
        expr: AstId,
    },
    BinOp {
        op: BinOpKind,
        /// Operator symbol; rewritten to the canonical method name during
        /// reification for operators that have one.
        symbol: Symbol,
        /// Resolved method symbol, written by the use pass.
        symbol_id: SymbolId,
        lhs: AstId,
        rhs: AstId,
    },
    IfThenElse {
        cond: AstId,
        then_expr: AstId,
        else_expr: AstId,
    },
    TopDecl {
        declaration: AstId,
        next: Option<AstId>,
        group_list: Option<GroupListId>,
    },
    Decl {
        declaration: AstId,
        next: Option<AstId>,
        group_list: Option<GroupListId>,
    },
    SimpleAssignment {
        name: Symbol,
        symbol: SymbolId,
        initializer: Option<AstId>,
        rhs: AstId,
        group: Option<DeclGroupId>,
    },
    ApatsAssignment {
        name: Symbol,
        symbol: SymbolId,
        apats: Option<AstId>,
        rhs: AstId,
        group: Option<DeclGroupId>,
    },
    PatAssignment {
        pat: AstId,
        rhs: AstId,
        group: Option<DeclGroupId>,
    },
    RightHandSide {
        expression: AstId,
        declarations: Option<AstId>,
    },
    LetExpression {
        expression: AstId,
        declarations: Option<AstId>,
    },
    FunctionExpression {
        aexp: AstId,
        next: Option<AstId>,
    },
    Variable {
        name: Symbol,
        kind: VarKind,
        /// Resolved id, written by the renamer passes.
        symbol: SymbolId,
        initializer: Option<AstId>,
    },
    Apats {
        apat: AstId,
        next: Option<AstId>,
    },
    Wildcard,
    Lambda {
        apats: AstId,
        expression: AstId,
    },
    Do {
        statements: Option<AstId>,
    },
    PatternExpression {
        expressions: Option<AstId>,
    },
    ExpressionList {
        expressions: Option<AstId>,
    },
    ExpressionArray {
        expressions: Option<AstId>,
    },
    Tuple {
        expressions: Option<AstId>,
    },
    ListNode {
        item: Option<AstId>,
        next: Option<AstId>,
    },
    BindAssignment {
        name: Symbol,
        symbol: SymbolId,
        expression: AstId,
    },
    PatBindAssignment {
        pat: AstId,
        expression: AstId,
    },
    ArithmeticSequence {
        from: AstId,
        then: Option<AstId>,
        to: Option<AstId>,
        kind: SequenceKind,
    },
    Case {
        expression: AstId,
        alternatives: Option<AstId>,
    },
    CaseAlternative {
        pat: AstId,
        body: AstId,
    },
    ConId {
        name: Symbol,
        kind: ConKind,
        symbol: SymbolId,
    },
    TypeApp {
        ty: AstId,
        next_ty: Option<AstId>,
    },
    BinOpSym {
        left: AstId,
        op: AstId,
        right: AstId,
    },
    OpLeftSection {
        op: BinOpKind,
        symbol: Symbol,
        symbol_id: SymbolId,
        left: AstId,
    },
    OpRightSection {
        op: BinOpKind,
        symbol: Symbol,
        symbol_id: SymbolId,
        right: AstId,
    },
    Constructor {
        conid: AstId,
        arg_list: Option<AstId>,
    },
    SimpleType {
        type_con: AstId,
        type_var_list: Option<AstId>,
    },
    DataDeclaration {
        simple_type: AstId,
        constructor_list: AstId,
        group: Option<DeclGroupId>,
    },
    TypeClassContext {
        conid: AstId,
        varid: AstId,
    },
    TypeClassDeclaration {
        context: Option<AstId>,
        tycls: AstId,
        tyvar: AstId,
        declarations: Option<AstId>,
        group: Option<DeclGroupId>,
    },
    TypeClassInstance {
        context: Option<AstId>,
        qtycls: AstId,
        inst: AstId,
        declarations: Option<AstId>,
        group: Option<DeclGroupId>,
    },
    TypeSignature {
        var: AstId,
        context: Option<AstId>,
        ty: AstId,
        kind: SigKind,
        group: Option<DeclGroupId>,
    },
    FunctionType {
        ty: AstId,
        next_on_arrow: AstId,
    },
}

impl AstKind {
    /// Short variant name for dumps and diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Constant { .. } => "Constant",
            Self::UnaryOp { .. } => "UnaryOp",
            Self::BinOp { .. } => "BinOp",
            Self::IfThenElse { .. } => "IfThenElse",
            Self::TopDecl { .. } => "TopDecl",
            Self::Decl { .. } => "Decl",
            Self::SimpleAssignment { .. } => "SimpleAssignment",
            Self::ApatsAssignment { .. } => "ApatsAssignment",
            Self::PatAssignment { .. } => "PatAssignment",
            Self::RightHandSide { .. } => "RightHandSide",
            Self::LetExpression { .. } => "LetExpression",
            Self::FunctionExpression { .. } => "FunctionExpression",
            Self::Variable { .. } => "Variable",
            Self::Apats { .. } => "Apats",
            Self::Wildcard => "Wildcard",
            Self::Lambda { .. } => "Lambda",
            Self::Do { .. } => "Do",
            Self::PatternExpression { .. } => "PatternExpression",
            Self::ExpressionList { .. } => "ExpressionList",
            Self::ExpressionArray { .. } => "ExpressionArray",
            Self::Tuple { .. } => "Tuple",
            Self::ListNode { .. } => "ListNode",
            Self::BindAssignment { .. } => "BindAssignment",
            Self::PatBindAssignment { .. } => "PatBindAssignment",
            Self::ArithmeticSequence { .. } => "ArithmeticSequence",
            Self::Case { .. } => "Case",
            Self::CaseAlternative { .. } => "CaseAlternative",
            Self::ConId { .. } => "ConId",
            Self::TypeApp { .. } => "TypeApp",
            Self::BinOpSym { .. } => "BinOpSym",
            Self::OpLeftSection { .. } => "OpLeftSection",
            Self::OpRightSection { .. } => "OpRightSection",
            Self::Constructor { .. } => "Constructor",
            Self::SimpleType { .. } => "SimpleType",
            Self::DataDeclaration { .. } => "DataDeclaration",
            Self::TypeClassContext { .. } => "TypeClassContext",
            Self::TypeClassDeclaration { .. } => "TypeClassDeclaration",
            Self::TypeClassInstance { .. } => "TypeClassInstance",
            Self::TypeSignature { .. } => "TypeSignature",
            Self::FunctionType { .. } => "FunctionType",
        }
    }
}

/// One semantic AST node: variant, span, scope back-pointer, type slot.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: AstKind,
    pub loc: SourceLoc,
    /// Scope the node was renamed in; written by the declare pass.
    pub scope: ScopeId,
    /// Resolved type slot, written by the external inferencer.
    pub ty: Option<Ty>,
}

/// One declaration group: the dependency analyzer's vertex.
///
/// `next` threads clauses of the same multi-clause binding. The Tarjan
/// fields start out as `index == -1` / not-on-stack and are only meaningful
/// while the group's block is being analyzed.
#[derive(Debug, Clone)]
pub struct DeclGroup {
    pub declaration: AstId,
    pub next: Option<DeclGroupId>,
    pub index: i32,
    pub low_link: i32,
    pub on_stack: bool,
    /// Which block analysis this group currently belongs to.
    pub info: Option<crate::dependency::InfoId>,
}

impl DeclGroup {
    #[must_use]
    pub fn new(declaration: AstId) -> Self {
        Self {
            declaration,
            next: None,
            index: -1,
            low_link: -1,
            on_stack: false,
            info: None,
        }
    }
}

/// The SCC output of one declaration block, dependencies first.
///
/// If a group in SCC `i` references a name bound in SCC `j` with `i != j`,
/// then `j < i`.
#[derive(Debug, Clone, Default)]
pub struct GroupList {
    pub sccs: Vec<Vec<DeclGroupId>>,
}

/// A whole semantic tree: the node arena, its root, and the declaration
/// groups and SCC lists created by later passes. The arena owns every node;
/// dropping the `Ast` drops the tree.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
    pub root: Option<AstId>,
    groups: Vec<DeclGroup>,
    group_lists: Vec<GroupList>,
}

impl Ast {
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
    pub fn add(&mut self, kind: AstKind, loc: SourceLoc) -> AstId {
        let id = AstId(u32::try_from(self.nodes.len()).expect("ast arena overflow"));
        self.nodes.push(AstNode {
            kind,
            loc,
            scope: ScopeId::TOP,
            ty: None,
        });
        id
    }

    #[must_use]
    pub fn get(&self, id: AstId) -> &AstNode {
        &self.nodes[id.index()]
    }

    /// Every node id in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = AstId> + '_ {
        (0..self.nodes.len()).map(|i| AstId(u32::try_from(i).expect("ast arena overflow")))
    }

    pub fn get_mut(&mut self, id: AstId) -> &mut AstNode {
        &mut self.nodes[id.index()]
    }

    /// Allocates a declaration group wrapping `declaration`.
    ///
    /// # Panics
    /// Panics if the group arena exceeds `u32::MAX` entries.
    pub fn new_group(&mut self, declaration: AstId) -> DeclGroupId {
        let id = DeclGroupId(u32::try_from(self.groups.len()).expect("group arena overflow"));
        self.groups.push(DeclGroup::new(declaration));
        id
    }

    #[must_use]
    pub fn group(&self, id: DeclGroupId) -> &DeclGroup {
        &self.groups[id.index()]
    }

    pub fn group_mut(&mut self, id: DeclGroupId) -> &mut DeclGroup {
        &mut self.groups[id.index()]
    }

    /// Stores an SCC output list and returns its handle.
    ///
    /// # Panics
    /// Panics if the list arena exceeds `u32::MAX` entries.
    pub fn add_group_list(&mut self, list: GroupList) -> GroupListId {
        let id = GroupListId(u32::try_from(self.group_lists.len()).expect("group list overflow"));
        self.group_lists.push(list);
        id
    }

    #[must_use]
    pub fn group_list(&self, id: GroupListId) -> &GroupList {
        &self.group_lists[id.index()]
    }

    /// Renders the tree as an indented variant dump for verbose output.
    #[must_use]
    pub fn dump(&self, interner: &Interner) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.dump_go(root, interner, 0, &mut out);
        } else {
            out.push_str("<empty>\n");
        }
        out
    }

    fn dump_go(&self, id: AstId, interner: &Interner, depth: usize, out: &mut String) {
        use std::fmt::Write;
        let node = self.get(id);
        for _ in 0..depth {
            out.push_str("  ");
        }
        match &node.kind {
            AstKind::Variable { name, symbol, .. }
            | AstKind::ConId { name, symbol, .. }
            | AstKind::BinOp {
                symbol: name,
                symbol_id: symbol,
                ..
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {}",
                    node.kind.name(),
                    interner.get(*name).unwrap_or("?"),
                    symbol
                );
            }
            AstKind::SimpleAssignment { name, symbol, .. }
            | AstKind::ApatsAssignment { name, symbol, .. }
            | AstKind::BindAssignment { name, symbol, .. } => {
                let _ = writeln!(
                    out,
                    "{} {} {}",
                    node.kind.name(),
                    interner.get(*name).unwrap_or("?"),
                    symbol
                );
            }
            AstKind::Constant { kind } => {
                let _ = writeln!(out, "Constant {kind:?}");
            }
            other => {
                let _ = writeln!(out, "{}", other.name());
            }
        }
        for child in self.children(id) {
            self.dump_go(child, interner, depth + 1, out);
        }
    }

    /// All direct children of a node, in source order.
    #[must_use]
    pub fn children(&self, id: AstId) -> Vec<AstId> {
        fn some(v: &Option<AstId>) -> impl Iterator<Item = AstId> + '_ {
            v.iter().copied()
        }
        match &self.get(id).kind {
            AstKind::Undefined | AstKind::Wildcard | AstKind::Constant { .. } | AstKind::ConId { .. } => Vec::new(),
            AstKind::UnaryOp { expr, .. } => vec![*expr],
            AstKind::BinOp { lhs, rhs, .. } => vec![*lhs, *rhs],
            AstKind::IfThenElse {
                cond,
                then_expr,
                else_expr,
            } => vec![*cond, *then_expr, *else_expr],
            AstKind::TopDecl { declaration, next, .. } | AstKind::Decl { declaration, next, .. } => {
                std::iter::once(*declaration).chain(some(next)).collect()
            }
            AstKind::SimpleAssignment { initializer, rhs, .. } => some(initializer).chain([*rhs]).collect(),
            AstKind::ApatsAssignment { apats, rhs, .. } => some(apats).chain([*rhs]).collect(),
            AstKind::PatAssignment { pat, rhs, .. } => vec![*pat, *rhs],
            AstKind::RightHandSide {
                expression,
                declarations,
            }
            | AstKind::LetExpression {
                expression,
                declarations,
            } => std::iter::once(*expression).chain(some(declarations)).collect(),
            AstKind::FunctionExpression { aexp, next } => std::iter::once(*aexp).chain(some(next)).collect(),
            AstKind::Variable { initializer, .. } => some(initializer).collect(),
            AstKind::Apats { apat, next } => std::iter::once(*apat).chain(some(next)).collect(),
            AstKind::Lambda { apats, expression } => vec![*apats, *expression],
            AstKind::Do { statements } => some(statements).collect(),
            AstKind::PatternExpression { expressions }
            | AstKind::ExpressionList { expressions }
            | AstKind::ExpressionArray { expressions }
            | AstKind::Tuple { expressions } => some(expressions).collect(),
            AstKind::ListNode { item, next } => some(item).chain(some(next)).collect(),
            AstKind::BindAssignment { expression, .. } => vec![*expression],
            AstKind::PatBindAssignment { pat, expression } => vec![*pat, *expression],
            AstKind::ArithmeticSequence { from, then, to, .. } => {
                std::iter::once(*from).chain(some(then)).chain(some(to)).collect()
            }
            AstKind::Case {
                expression,
                alternatives,
            } => std::iter::once(*expression).chain(some(alternatives)).collect(),
            AstKind::CaseAlternative { pat, body } => vec![*pat, *body],
            AstKind::TypeApp { ty, next_ty } => std::iter::once(*ty).chain(some(next_ty)).collect(),
            AstKind::BinOpSym { left, op, right } => vec![*left, *op, *right],
            AstKind::OpLeftSection { left, .. } => vec![*left],
            AstKind::OpRightSection { right, .. } => vec![*right],
            AstKind::Constructor { conid, arg_list } => std::iter::once(*conid).chain(some(arg_list)).collect(),
            AstKind::SimpleType {
                type_con,
                type_var_list,
            } => std::iter::once(*type_con).chain(some(type_var_list)).collect(),
            AstKind::DataDeclaration {
                simple_type,
                constructor_list,
                ..
            } => vec![*simple_type, *constructor_list],
            AstKind::TypeClassContext { conid, varid } => vec![*conid, *varid],
            AstKind::TypeClassDeclaration {
                context,
                tycls,
                tyvar,
                declarations,
                ..
            } => some(context)
                .chain([*tycls, *tyvar])
                .chain(some(declarations))
                .collect(),
            AstKind::TypeClassInstance {
                context,
                qtycls,
                inst,
                declarations,
                ..
            } => some(context).chain([*qtycls, *inst]).chain(some(declarations)).collect(),
            AstKind::TypeSignature { var, context, ty, .. } => {
                std::iter::once(*var).chain(some(context)).chain([*ty]).collect()
            }
            AstKind::FunctionType { ty, next_on_arrow } => vec![*ty, *next_on_arrow],
        }
    }
}
