//! Binding-group dependency analysis via Tarjan's strongly-connected
//! components, run once per declaration block.
//!
//! Each block gets its own analysis state: a monotonic index counter, the
//! Tarjan stack, the output SCC list, and a `current_group` cursor that
//! attributes every variable reference to the group whose right-hand side is
//! being walked. Blocks are visited in a fixed phase order so type
//! constructors resolve before class declarations, classes before
//! signatures, and signatures before terms.
//!
//! The output list is dependencies-first: when group A references a name
//! bound in group B and the two end up in different SCCs, B's component is
//! appended before A's.
//!
//! Multi-clause bindings enter as one chained unit: every clause is pushed,
//! the head absorbs each clause's low link, and on exit the chain is
//! re-threaded so the clauses sit in one SCC with uniform low links and
//! cleared `next` pointers.

use crate::{
    ast::{Ast, AstId, AstKind, DeclGroupId, GroupList},
    diagnostics::{CompileError, Result},
    intern::Interner,
    parse_ast::{ConKind, VarKind},
    symtab::{SymTable, SymbolId},
};

/// Index of one block's analysis state inside the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoId(u32);

impl InfoId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-block Tarjan state: counter, stack, output, and reference cursor.
#[derive(Debug, Default)]
struct DeclarationsInfo {
    index: i32,
    stack: Vec<DeclGroupId>,
    sccs: Vec<Vec<DeclGroupId>>,
    current_group: Option<DeclGroupId>,
}

/// Analyzes every declaration block reachable from the root and attaches the
/// topologically ordered group list to each block's head node.
pub fn analyze(ast: &mut Ast, symtab: &SymTable, interner: &Interner) -> Result<()> {
    let mut analyzer = Analyzer {
        ast,
        symtab,
        interner,
        infos: Vec::new(),
    };
    if let Some(root) = analyzer.ast.root {
        analyzer.go(root)?;
    }
    Ok(())
}

struct Analyzer<'a> {
    ast: &'a mut Ast,
    symtab: &'a SymTable,
    interner: &'a Interner,
    infos: Vec<DeclarationsInfo>,
}

impl Analyzer<'_> {
    fn new_info(&mut self) -> InfoId {
        let id = InfoId(u32::try_from(self.infos.len()).expect("analysis info overflow"));
        self.infos.push(DeclarationsInfo::default());
        id
    }

    fn info(&self, id: InfoId) -> &DeclarationsInfo {
        &self.infos[id.index()]
    }

    fn info_mut(&mut self, id: InfoId) -> &mut DeclarationsInfo {
        &mut self.infos[id.index()]
    }

    /// Tarjan entry: number the group, push it, make it current.
    fn strong_connect_enter(&mut self, group: DeclGroupId) {
        let info_id = self.ast.group(group).info.expect("group analyzed without info");
        let index = self.info(info_id).index;
        {
            let g = self.ast.group_mut(group);
            debug_assert!(!g.on_stack, "declaration group re-entered the Tarjan stack");
            g.index = index;
            g.low_link = index;
            g.on_stack = true;
        }
        let info = self.info_mut(info_id);
        info.index += 1;
        info.stack.push(group);
        info.current_group = Some(group);
    }

    /// Tarjan exit: a root pops its component off the stack, in push order.
    fn strong_connect_exit(&mut self, group: DeclGroupId) {
        let (index, low_link, info_id) = {
            let g = self.ast.group(group);
            (g.index, g.low_link, g.info.expect("group analyzed without info"))
        };
        if low_link != index {
            return;
        }
        let mut scc = Vec::new();
        loop {
            let popped = self.info_mut(info_id).stack.pop().expect("Tarjan stack underflow");
            self.ast.group_mut(popped).on_stack = false;
            scc.push(popped);
            if popped == group {
                break;
            }
        }
        scc.reverse();
        debug_assert_eq!(scc.first().copied(), Some(group));
        self.info_mut(info_id).sccs.push(scc);
    }

    /// A resolved variable reference: the heart of the dependency edges.
    fn analyze_var(&mut self, symbol: SymbolId) -> Result<()> {
        if symbol.is_null() {
            return Ok(());
        }
        let Some(w) = self.symtab.get(symbol).declaration_group else {
            return Ok(());
        };
        let Some(info_id) = self.ast.group(w).info else {
            // The referenced binding belongs to no block under analysis
            // (e.g. a primitive); no edge to record.
            return Ok(());
        };
        if self.info(info_id).current_group.is_none() {
            self.info_mut(info_id).current_group = Some(w);
        }
        let v = self.info(info_id).current_group.expect("current group just ensured");
        if self.ast.group(w).index == -1 {
            self.info_mut(info_id).current_group = Some(w);
            let declaration = self.ast.group(w).declaration;
            self.go(declaration)?;
            let w_low = self.ast.group(w).low_link;
            let v_group = self.ast.group_mut(v);
            v_group.low_link = v_group.low_link.min(w_low);
        } else if self.ast.group(w).on_stack {
            let w_low = self.ast.group(w).low_link;
            let v_group = self.ast.group_mut(v);
            v_group.low_link = v_group.low_link.min(w_low);
        }
        self.info_mut(info_id).current_group = Some(v);
        Ok(())
    }

    /// Walks a declaration block: wires up analysis info, then visits in the
    /// fixed cross-kind phase order.
    fn analyze_block(&mut self, head: AstId, top_level: bool) -> Result<()> {
        let info = self.new_info();

        // Phase 1: attach the shared info to every group in the block,
        // including every clause of multi-clause chains.
        let mut decls = Vec::new();
        let mut cursor = Some(head);
        while let Some(block_id) = cursor {
            let (declaration, next) = match self.ast.get(block_id).kind {
                AstKind::TopDecl { declaration, next, .. } | AstKind::Decl { declaration, next, .. } => {
                    (declaration, next)
                }
                _ => unreachable!("declaration block chain holds a non-block node"),
            };
            decls.push(declaration);
            let head_group = self.block_entry_group(declaration);
            if let Some(head_group) = head_group {
                // Assignments point at the symbol's head group so clause
                // chains share one entry.
                if let AstKind::SimpleAssignment { group, .. } | AstKind::ApatsAssignment { group, .. } =
                    &mut self.ast.get_mut(declaration).kind
                {
                    *group = Some(head_group);
                }
                let mut clause = Some(head_group);
                while let Some(g) = clause {
                    self.ast.group_mut(g).info = Some(info);
                    clause = self.ast.group(g).next;
                }
            }
            cursor = next;
        }

        // Phases 2-4 only occur at the top level; nested blocks hold terms
        // and signatures.
        if top_level {
            for decl in &decls {
                if matches!(self.ast.get(*decl).kind, AstKind::DataDeclaration { .. }) {
                    self.go(*decl)?;
                }
            }
            for decl in &decls {
                if matches!(
                    self.ast.get(*decl).kind,
                    AstKind::TypeClassDeclaration { .. } | AstKind::TypeClassInstance { .. }
                ) {
                    self.go(*decl)?;
                }
            }
        }
        for decl in &decls {
            if matches!(self.ast.get(*decl).kind, AstKind::TypeSignature { .. }) {
                self.go(*decl)?;
            }
        }
        for decl in &decls {
            if matches!(
                self.ast.get(*decl).kind,
                AstKind::SimpleAssignment { .. } | AstKind::ApatsAssignment { .. } | AstKind::PatAssignment { .. }
            ) {
                self.go(*decl)?;
            }
        }

        let sccs = std::mem::take(&mut self.info_mut(info).sccs);
        let list = self.ast.add_group_list(GroupList { sccs });
        if let AstKind::TopDecl { group_list, .. } | AstKind::Decl { group_list, .. } =
            &mut self.ast.get_mut(head).kind
        {
            *group_list = Some(list);
        }
        Ok(())
    }

    /// The head group a block entry contributes, resolving assignments
    /// through the symbol table so clauses share their chain head.
    fn block_entry_group(&self, declaration: AstId) -> Option<DeclGroupId> {
        match &self.ast.get(declaration).kind {
            AstKind::SimpleAssignment { symbol, .. } | AstKind::ApatsAssignment { symbol, .. } => {
                self.symtab.get(*symbol).declaration_group
            }
            AstKind::PatAssignment { group, .. }
            | AstKind::DataDeclaration { group, .. }
            | AstKind::TypeClassDeclaration { group, .. }
            | AstKind::TypeClassInstance { group, .. }
            | AstKind::TypeSignature { group, .. } => *group,
            other => unreachable!("unexpected declaration kind in block: {}", other.name()),
        }
    }

    fn go(&mut self, id: AstId) -> Result<()> {
        let loc = self.ast.get(id).loc;
        let kind = self.ast.get(id).kind.clone();
        match kind {
            AstKind::TopDecl { .. } => self.analyze_block(id, true),
            AstKind::Decl { .. } => self.analyze_block(id, false),

            AstKind::SimpleAssignment {
                name, symbol, group, ..
            }
            | AstKind::ApatsAssignment {
                name, symbol, group, ..
            } => {
                let head = group.expect("assignment missing declaration group");
                if self.ast.group(head).index != -1 {
                    return Ok(());
                }
                if let Some(sig) = self.symtab.get(symbol).optional_type_signature {
                    self.go(sig)?;
                }
                let entered_as_apats = matches!(self.ast.get(id).kind, AstKind::ApatsAssignment { .. });
                let mut clause = Some(head);
                while let Some(g) = clause {
                    self.strong_connect_enter(g);
                    let decl = self.ast.group(g).declaration;
                    match self.ast.get(decl).kind.clone() {
                        AstKind::ApatsAssignment { apats, rhs, .. } if entered_as_apats => {
                            if let Some(apats) = apats {
                                self.go(apats)?;
                            }
                            self.go(rhs)?;
                        }
                        AstKind::SimpleAssignment { rhs, .. } if !entered_as_apats => {
                            self.go(rhs)?;
                        }
                        _ => {
                            let name = self.interner.get(name).unwrap_or("<unknown>").to_owned();
                            return Err(CompileError::multiple_declarations(&name, loc));
                        }
                    }
                    let clause_low = self.ast.group(g).low_link;
                    let head_group = self.ast.group_mut(head);
                    head_group.low_link = head_group.low_link.min(clause_low);
                    clause = self.ast.group(g).next;
                }
                // Re-thread the chain: uniform low links, next pointers
                // cleared so each clause stands alone inside the one SCC.
                let head_low = self.ast.group(head).low_link;
                let mut clause = Some(head);
                while let Some(g) = clause {
                    let group = self.ast.group_mut(g);
                    group.low_link = head_low;
                    clause = group.next.take();
                }
                let info_id = self.ast.group(head).info.expect("group analyzed without info");
                self.info_mut(info_id).current_group = Some(head);
                self.strong_connect_exit(head);
                Ok(())
            }

            AstKind::PatAssignment { rhs, group, .. } => {
                let group = group.expect("pattern assignment missing declaration group");
                if self.ast.group(group).index != -1 {
                    return Ok(());
                }
                debug_assert!(self.ast.group(group).next.is_none());
                self.strong_connect_enter(group);
                self.go(rhs)?;
                self.strong_connect_exit(group);
                Ok(())
            }

            AstKind::DataDeclaration {
                simple_type,
                constructor_list,
                group,
            } => {
                let group = group.expect("data declaration missing declaration group");
                if self.ast.group(group).index != -1 {
                    return Ok(());
                }
                // TODO: reject cyclic data declarations once the language
                // settles on whether recursive sum types stay legal.
                self.strong_connect_enter(group);
                self.go(simple_type)?;
                self.go(constructor_list)?;
                self.strong_connect_exit(group);
                Ok(())
            }

            AstKind::TypeClassDeclaration {
                context, declarations, group, ..
            }
            | AstKind::TypeClassInstance {
                context, declarations, group, ..
            } => {
                let group = group.expect("class declaration missing declaration group");
                if self.ast.group(group).index != -1 {
                    return Ok(());
                }
                // TODO: detect cyclic class hierarchies here once superclass
                // contexts are threaded through inference.
                self.strong_connect_enter(group);
                if let Some(context) = context {
                    self.go(context)?;
                }
                if let Some(declarations) = declarations {
                    self.go(declarations)?;
                }
                self.strong_connect_exit(group);
                Ok(())
            }

            AstKind::TypeSignature { context, ty, group, .. } => {
                let group = group.expect("type signature missing declaration group");
                if self.ast.group(group).index != -1 {
                    return Ok(());
                }
                self.strong_connect_enter(group);
                if let Some(context) = context {
                    self.go(context)?;
                }
                self.go(ty)?;
                self.strong_connect_exit(group);
                Ok(())
            }

            AstKind::Variable { kind, symbol, .. } => {
                if kind == VarKind::Var {
                    self.analyze_var(symbol)?;
                }
                Ok(())
            }

            AstKind::ConId { kind, symbol, .. } => {
                if kind == ConKind::TypeVar {
                    self.analyze_var(symbol)?;
                }
                Ok(())
            }

            AstKind::BinOp { symbol_id, lhs, rhs, .. } => {
                self.analyze_var(symbol_id)?;
                self.go(lhs)?;
                self.go(rhs)
            }

            AstKind::OpLeftSection { symbol_id, left, .. } => {
                self.analyze_var(symbol_id)?;
                self.go(left)
            }

            AstKind::OpRightSection { symbol_id, right, .. } => {
                self.analyze_var(symbol_id)?;
                self.go(right)
            }

            AstKind::TypeClassContext { conid, .. } => self.go(conid),

            AstKind::RightHandSide {
                expression,
                declarations,
            } => {
                if let Some(declarations) = declarations {
                    self.go(declarations)?;
                }
                self.go(expression)
            }

            AstKind::LetExpression {
                expression,
                declarations,
            } => {
                if let Some(declarations) = declarations {
                    self.go(declarations)?;
                }
                self.go(expression)
            }

            // Structural recursion for everything else.
            _ => {
                for child in self.ast.children(id) {
                    self.go(child)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::SourceLoc,
        parse_ast::{ParseArena, VarKind as PVarKind},
        rename,
        symtab::ScopedSymTable,
    };

    /// Builds, reifies, and renames `f x = g x; g y = f y; h z = z`.
    fn analyzed_program() -> (Ast, ScopedSymTable, crate::intern::Interner) {
        let mut interner = crate::intern::Interner::new();
        let mut parse = ParseArena::new();
        let loc = SourceLoc::default();
        let (f, g, h) = (interner.intern("f"), interner.intern("g"), interner.intern("h"));
        let (x, y, z) = (interner.intern("x"), interner.intern("y"), interner.intern("z"));

        let fun_clause = |parse: &mut ParseArena, name, arg, callee: Option<crate::intern::Symbol>| {
            let pat = parse.var(arg, PVarKind::Declaration, loc);
            let apats = parse.apats(&[pat], loc);
            let body = match callee {
                Some(callee) => {
                    let callee = parse.var(callee, PVarKind::Var, loc);
                    let arg_use = parse.var(arg, PVarKind::Var, loc);
                    parse.apply(&[callee, arg_use], loc)
                }
                None => parse.var(arg, PVarKind::Var, loc),
            };
            let rhs = parse.right_hand_side(body, crate::parse_ast::ParseRef::NULL, loc);
            parse.apats_assignment(name, apats, rhs, loc)
        };

        let f_decl = fun_clause(&mut parse, f, x, Some(g));
        let g_decl = fun_clause(&mut parse, g, y, Some(f));
        let h_decl = fun_clause(&mut parse, h, z, None);
        parse.top_decls(&[f_decl, g_decl, h_decl], loc);

        let mut ast = crate::reify::reify(&parse, &mut interner);
        let mut scoped = ScopedSymTable::new();
        rename::rename(&mut ast, &mut scoped, &interner).expect("rename");
        (ast, scoped, interner)
    }

    #[test]
    fn mutual_recursion_forms_one_component() {
        let (mut ast, scoped, interner) = analyzed_program();
        analyze(&mut ast, &scoped.table, &interner).expect("analyze");
        let root = ast.root.unwrap();
        let AstKind::TopDecl { group_list, .. } = ast.get(root).kind else {
            panic!("root is not a top-level block");
        };
        let list = ast.group_list(group_list.expect("group list attached"));
        assert_eq!(list.sccs.len(), 2);
        // f and g share a component; h stands alone.
        assert_eq!(list.sccs[0].len(), 2);
        assert_eq!(list.sccs[1].len(), 1);
    }

    #[test]
    fn single_binding_yields_single_group_component() {
        let mut interner = crate::intern::Interner::new();
        let mut parse = ParseArena::new();
        let loc = SourceLoc::default();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let q = interner.intern("q");
        let rhs_var = parse.var(b, PVarKind::Var, loc);
        let rhs = parse.right_hand_side(rhs_var, crate::parse_ast::ParseRef::NULL, loc);
        let a_decl = parse.simple_assignment(a, rhs, loc);
        let b_pat = parse.var(q, PVarKind::Declaration, loc);
        let b_apats = parse.apats(&[b_pat], loc);
        // b is a one-clause function so `a = b` depends on it.
        let b_body = parse.var(q, PVarKind::Var, loc);
        let b_rhs = parse.right_hand_side(b_body, crate::parse_ast::ParseRef::NULL, loc);
        let b_decl = parse.apats_assignment(b, b_apats, b_rhs, loc);
        parse.top_decls(&[a_decl, b_decl], loc);

        let mut ast = crate::reify::reify(&parse, &mut interner);
        let mut scoped = ScopedSymTable::new();
        rename::rename(&mut ast, &mut scoped, &interner).expect("rename");
        analyze(&mut ast, &scoped.table, &interner).expect("analyze");

        let root = ast.root.unwrap();
        let AstKind::TopDecl { group_list, .. } = ast.get(root).kind else {
            panic!("root is not a top-level block");
        };
        let list = ast.group_list(group_list.unwrap());
        // Dependencies first: b's component precedes a's.
        assert_eq!(list.sccs.len(), 2);
        for scc in &list.sccs {
            assert_eq!(scc.len(), 1);
        }
        let first_decl = ast.group(list.sccs[0][0]).declaration;
        assert!(matches!(ast.get(first_decl).kind, AstKind::ApatsAssignment { .. }));
    }
}
