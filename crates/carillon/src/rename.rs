//! Scoped symbol resolution over the reified AST, in two full traversals.
//!
//! The *declare* pass installs every binding into the scope chain and writes
//! each node's scope back-pointer; the *use* pass resolves every occurrence
//! to a symbol id by walking parent links from that recorded scope. Keeping
//! the two separated means forward references inside a declaration block
//! resolve without any special casing.
//!
//! Scope-opening constructs: the top-level block (the top scope itself),
//! `let ... in`, lambdas (the apats open a fresh scope for the body), `do`
//! blocks, case alternatives (the pattern scopes its RHS), data declarations
//! (type variables visible in constructors), and class/instance bodies.
//!
//! Multi-clause function definitions are recognized here: a second
//! `ApatsAssignment` binding an already-bound name does not re-declare it,
//! it threads a fresh declaration group onto the existing clause chain.

use crate::{
    ast::{Ast, AstId, AstKind},
    diagnostics::{CompileError, Result},
    intern::{Interner, Symbol},
    parse_ast::{ConKind, SigKind, VarKind},
    symtab::{Namespace, ScopedSymTable, SymbolRecord},
};

/// Runs both renamer passes and the signature/definition consistency check.
pub fn rename(ast: &mut Ast, scoped: &mut ScopedSymTable, interner: &Interner) -> Result<()> {
    declare_pass(ast, scoped, interner)?;
    use_pass(ast, scoped, interner)?;
    Ok(())
}

/// The declare pass: installs bindings, assigns scopes, builds clause chains.
pub fn declare_pass(ast: &mut Ast, scoped: &mut ScopedSymTable, interner: &Interner) -> Result<()> {
    let mut renamer = Renamer {
        ast,
        scoped,
        interner,
    };
    if let Some(root) = renamer.ast.root {
        renamer.declare_go(root)?;
    }
    renamer.check_signatures()
}

/// The use pass: resolves every variable, operator, and constructor use.
pub fn use_pass(ast: &mut Ast, scoped: &mut ScopedSymTable, interner: &Interner) -> Result<()> {
    let mut renamer = Renamer {
        ast,
        scoped,
        interner,
    };
    if let Some(root) = renamer.ast.root {
        renamer.use_go(root)?;
    }
    Ok(())
}

struct Renamer<'a> {
    ast: &'a mut Ast,
    scoped: &'a mut ScopedSymTable,
    interner: &'a Interner,
}

impl Renamer<'_> {
    fn name_of(&self, symbol: Symbol) -> &str {
        self.interner.get(symbol).unwrap_or("<unknown>")
    }

    /// Stamps the node with the current scope; every declare visit starts here.
    fn enter(&mut self, id: AstId) {
        self.ast.get_mut(id).scope = self.scoped.current_scope();
    }

    fn count_apats(&self, mut apats: Option<AstId>) -> i32 {
        let mut count = 0;
        while let Some(id) = apats {
            let AstKind::Apats { next, .. } = &self.ast.get(id).kind else {
                break;
            };
            count += 1;
            apats = *next;
        }
        count
    }

    fn append_clause(&mut self, head: crate::ast::DeclGroupId, tail: crate::ast::DeclGroupId) {
        let mut cursor = head;
        while let Some(next) = self.ast.group(cursor).next {
            cursor = next;
        }
        self.ast.group_mut(cursor).next = Some(tail);
    }

    // ------------------------------------------------------------------
    // Declare pass
    // ------------------------------------------------------------------

    fn declare_go(&mut self, id: AstId) -> Result<()> {
        self.enter(id);
        let loc = self.ast.get(id).loc;
        let kind = self.ast.get(id).kind.clone();
        match kind {
            AstKind::TopDecl { declaration, next, .. } | AstKind::Decl { declaration, next, .. } => {
                self.declare_go(declaration)?;
                if let Some(next) = next {
                    self.declare_go(next)?;
                }
            }

            AstKind::SimpleAssignment { name, rhs, initializer, .. } => {
                let symbol = match self.scoped.lookup_current(name, Namespace::Term) {
                    Some(existing) if self.scoped.table.get(existing).declaration_group.is_none() => {
                        // A signature-only row; the definition claims it.
                        existing
                    }
                    Some(_) => {
                        return Err(CompileError::multiple_declarations(self.name_of(name), loc));
                    }
                    None => self
                        .scoped
                        .new_symbol(SymbolRecord::new(name, loc), Namespace::Term),
                };
                let group = self.ast.new_group(id);
                {
                    let record = self.scoped.table.get_mut(symbol);
                    record.declaration_group = Some(group);
                    record.ast_node = Some(id);
                    record.source_loc = loc;
                }
                if let AstKind::SimpleAssignment {
                    symbol: slot, group: g, ..
                } = &mut self.ast.get_mut(id).kind
                {
                    *slot = symbol;
                    *g = Some(group);
                }
                self.scoped.new_scope();
                if let Some(initializer) = initializer {
                    self.declare_go(initializer)?;
                }
                self.declare_go(rhs)?;
                self.scoped.pop_scope();
            }

            AstKind::ApatsAssignment { name, apats, rhs, .. } => {
                let arity = self.count_apats(apats);
                let (symbol, group) = match self.scoped.lookup_current(name, Namespace::Term) {
                    Some(existing) => match self.scoped.table.get(existing).declaration_group {
                        Some(head) => {
                            // Another clause of the same binding; clauses chain
                            // only between apats assignments.
                            let head_decl = self.ast.group(head).declaration;
                            if !matches!(self.ast.get(head_decl).kind, AstKind::ApatsAssignment { .. }) {
                                return Err(CompileError::multiple_declarations(self.name_of(name), loc));
                            }
                            let group = self.ast.new_group(id);
                            self.append_clause(head, group);
                            (existing, group)
                        }
                        None => {
                            // Signature-only row claimed by its definition.
                            let group = self.ast.new_group(id);
                            (existing, group)
                        }
                    },
                    None => {
                        let group = self.ast.new_group(id);
                        let symbol = self
                            .scoped
                            .new_symbol(SymbolRecord::new(name, loc), Namespace::Term);
                        (symbol, group)
                    }
                };
                {
                    let record = self.scoped.table.get_mut(symbol);
                    if record.declaration_group.is_none() {
                        record.declaration_group = Some(group);
                        record.ast_node = Some(id);
                        record.source_loc = loc;
                    }
                    if record.arity < 0 {
                        record.arity = arity;
                    }
                }
                if let AstKind::ApatsAssignment {
                    symbol: slot, group: g, ..
                } = &mut self.ast.get_mut(id).kind
                {
                    *slot = symbol;
                    *g = Some(group);
                }
                self.scoped.new_scope();
                if let Some(apats) = apats {
                    self.declare_go(apats)?;
                }
                self.declare_go(rhs)?;
                self.scoped.pop_scope();
            }

            AstKind::PatAssignment { pat, rhs, .. } => {
                let group = self.ast.new_group(id);
                if let AstKind::PatAssignment { group: g, .. } = &mut self.ast.get_mut(id).kind {
                    *g = Some(group);
                }
                // Pattern variables bind in the enclosing block.
                self.declare_pattern_group(pat, group)?;
                self.scoped.new_scope();
                self.declare_go(rhs)?;
                self.scoped.pop_scope();
            }

            AstKind::RightHandSide {
                expression,
                declarations,
            } => {
                // `where` declarations share the right-hand side's scope.
                if let Some(declarations) = declarations {
                    self.declare_go(declarations)?;
                }
                self.declare_go(expression)?;
            }

            AstKind::LetExpression {
                expression,
                declarations,
            } => {
                self.scoped.new_scope();
                if let Some(declarations) = declarations {
                    self.declare_go(declarations)?;
                }
                self.declare_go(expression)?;
                self.scoped.pop_scope();
            }

            AstKind::Lambda { apats, expression } => {
                self.scoped.new_scope();
                self.declare_go(apats)?;
                self.declare_go(expression)?;
                self.scoped.pop_scope();
            }

            AstKind::Do { statements } => {
                self.scoped.new_scope();
                if let Some(statements) = statements {
                    self.declare_go(statements)?;
                }
                self.scoped.pop_scope();
            }

            AstKind::BindAssignment { name, expression, .. } => {
                if self.scoped.lookup_current(name, Namespace::Term).is_some() {
                    return Err(CompileError::multiple_declarations(self.name_of(name), loc));
                }
                let symbol = self
                    .scoped
                    .new_symbol(SymbolRecord::new(name, loc), Namespace::Term);
                self.scoped.table.get_mut(symbol).ast_node = Some(id);
                if let AstKind::BindAssignment { symbol: slot, .. } = &mut self.ast.get_mut(id).kind {
                    *slot = symbol;
                }
                self.declare_go(expression)?;
            }

            AstKind::Case {
                expression,
                alternatives,
            } => {
                self.declare_go(expression)?;
                let mut cursor = alternatives;
                while let Some(alt_list) = cursor {
                    self.enter(alt_list);
                    let AstKind::ListNode { item, next } = self.ast.get(alt_list).kind.clone() else {
                        break;
                    };
                    if let Some(alt) = item {
                        self.declare_go(alt)?;
                    }
                    cursor = next;
                }
            }

            AstKind::CaseAlternative { pat, body } => {
                // The pattern opens a fresh scope for its right-hand side.
                self.scoped.new_scope();
                self.declare_go(pat)?;
                self.declare_go(body)?;
                self.scoped.pop_scope();
            }

            AstKind::Variable { name, kind, initializer, .. } => {
                match kind {
                    VarKind::Declaration => {
                        if self.scoped.lookup_current(name, Namespace::Term).is_some() {
                            return Err(CompileError::multiple_declarations(self.name_of(name), loc));
                        }
                        let symbol = self
                            .scoped
                            .new_symbol(SymbolRecord::new(name, loc), Namespace::Term);
                        self.scoped.table.get_mut(symbol).ast_node = Some(id);
                        if let AstKind::Variable { symbol: slot, .. } = &mut self.ast.get_mut(id).kind {
                            *slot = symbol;
                        }
                    }
                    VarKind::TypeVarDeclaration => {
                        if self.scoped.lookup_current(name, Namespace::Type).is_some() {
                            return Err(CompileError::multiple_declarations(self.name_of(name), loc));
                        }
                        let symbol = self
                            .scoped
                            .new_symbol(SymbolRecord::new(name, loc), Namespace::Type);
                        if let AstKind::Variable { symbol: slot, .. } = &mut self.ast.get_mut(id).kind {
                            *slot = symbol;
                        }
                    }
                    VarKind::TypeFreeVar => {
                        // Free type variables are implicitly quantified at
                        // their first occurrence.
                        if self.scoped.find(name, Namespace::Type).is_null() {
                            let symbol = self
                                .scoped
                                .new_symbol(SymbolRecord::new(name, loc), Namespace::Type);
                            if let AstKind::Variable { symbol: slot, .. } = &mut self.ast.get_mut(id).kind {
                                *slot = symbol;
                            }
                        }
                    }
                    VarKind::Var | VarKind::Sig | VarKind::ClassSig => {}
                }
                if let Some(initializer) = initializer {
                    self.declare_go(initializer)?;
                }
            }

            AstKind::ConId { name, kind, .. } => match kind {
                ConKind::Declaration => {
                    if self.scoped.lookup_current(name, Namespace::Term).is_some() {
                        return Err(CompileError::multiple_declarations(self.name_of(name), loc));
                    }
                    let symbol = self
                        .scoped
                        .new_symbol(SymbolRecord::new(name, loc), Namespace::Term);
                    if let AstKind::ConId { symbol: slot, .. } = &mut self.ast.get_mut(id).kind {
                        *slot = symbol;
                    }
                }
                ConKind::TypeDeclaration => {
                    if self.scoped.lookup_current(name, Namespace::Type).is_some() {
                        return Err(CompileError::multiple_declarations(self.name_of(name), loc));
                    }
                    let symbol = self
                        .scoped
                        .new_symbol(SymbolRecord::new(name, loc), Namespace::Type);
                    if let AstKind::ConId { symbol: slot, .. } = &mut self.ast.get_mut(id).kind {
                        *slot = symbol;
                    }
                }
                ConKind::Var | ConKind::TypeVar => {}
            },

            AstKind::DataDeclaration {
                simple_type,
                constructor_list,
                ..
            } => {
                self.declare_data(id, simple_type, constructor_list)?;
            }

            AstKind::TypeSignature { var, context, ty, .. } => {
                self.declare_signature(id, var, context, ty)?;
            }

            AstKind::TypeClassDeclaration {
                context,
                tycls,
                tyvar,
                declarations,
                ..
            } => {
                let group = self.ast.new_group(id);
                if let AstKind::TypeClassDeclaration { group: g, .. } = &mut self.ast.get_mut(id).kind {
                    *g = Some(group);
                }
                self.declare_go(tycls)?;
                if let AstKind::ConId { symbol, .. } = self.ast.get(tycls).kind
                    && !symbol.is_null()
                {
                    self.scoped.table.get_mut(symbol).declaration_group = Some(group);
                }
                self.scoped.new_scope();
                self.declare_go(tyvar)?;
                if let Some(context) = context {
                    self.declare_go(context)?;
                }
                if let Some(declarations) = declarations {
                    self.declare_go(declarations)?;
                }
                self.scoped.pop_scope();
            }

            AstKind::TypeClassInstance {
                context,
                qtycls,
                inst,
                declarations,
                ..
            } => {
                let group = self.ast.new_group(id);
                if let AstKind::TypeClassInstance { group: g, .. } = &mut self.ast.get_mut(id).kind {
                    *g = Some(group);
                }
                self.scoped.new_scope();
                if let Some(context) = context {
                    self.declare_go(context)?;
                }
                self.declare_go(qtycls)?;
                self.declare_go(inst)?;
                if let Some(declarations) = declarations {
                    self.declare_go(declarations)?;
                }
                self.scoped.pop_scope();
            }

            // Everything else just recurses.
            _ => {
                for child in self.ast.children(id) {
                    self.declare_go(child)?;
                }
            }
        }
        Ok(())
    }

    /// Declares a data declaration: the type constructor and the data
    /// constructors land in the enclosing scope; type variables live in a
    /// fresh scope that spans the constructor argument types.
    fn declare_data(&mut self, id: AstId, simple_type: AstId, constructor_list: AstId) -> Result<()> {
        let group = self.ast.new_group(id);
        if let AstKind::DataDeclaration { group: g, .. } = &mut self.ast.get_mut(id).kind {
            *g = Some(group);
        }

        self.enter(simple_type);
        let AstKind::SimpleType {
            type_con,
            type_var_list,
        } = self.ast.get(simple_type).kind.clone()
        else {
            panic!("data declaration without a simple type head");
        };
        self.declare_go(type_con)?;
        if let AstKind::ConId { symbol, .. } = self.ast.get(type_con).kind
            && !symbol.is_null()
        {
            let record = self.scoped.table.get_mut(symbol);
            record.declaration_group = Some(group);
            record.ast_node = Some(id);
        }

        // Constructors first, so they bind in the enclosing scope.
        let mut con_num = 0u32;
        let mut all_nullary = true;
        let mut cursor = Some(constructor_list);
        let mut constructor_ids = Vec::new();
        while let Some(list_id) = cursor {
            self.enter(list_id);
            let AstKind::ListNode { item, next } = self.ast.get(list_id).kind.clone() else {
                break;
            };
            if let Some(con) = item {
                self.enter(con);
                let AstKind::Constructor { conid, arg_list } = self.ast.get(con).kind.clone() else {
                    panic!("data declaration constructor list holds a non-constructor");
                };
                self.declare_go(conid)?;
                let arity = self.count_list(arg_list);
                if arity > 0 {
                    all_nullary = false;
                }
                if let AstKind::ConId { symbol, .. } = self.ast.get(conid).kind
                    && !symbol.is_null()
                {
                    let record = self.scoped.table.get_mut(symbol);
                    record.is_constructor = true;
                    record.con_num = con_num;
                    record.arity = arity;
                    record.declaration_group = Some(group);
                    constructor_ids.push(symbol);
                }
                con_num += 1;
            }
            cursor = next;
        }
        // A sum of nullary constructors is an enum.
        for con in &constructor_ids {
            self.scoped.table.get_mut(*con).is_enum = all_nullary;
        }

        // Type variables scope over the constructor argument types.
        self.scoped.new_scope();
        if let Some(type_var_list) = type_var_list {
            self.declare_go(type_var_list)?;
        }
        let mut cursor = Some(constructor_list);
        while let Some(list_id) = cursor {
            let AstKind::ListNode { item, next } = self.ast.get(list_id).kind.clone() else {
                break;
            };
            if let Some(con) = item {
                let AstKind::Constructor { arg_list, .. } = self.ast.get(con).kind.clone() else {
                    break;
                };
                if let Some(arg_list) = arg_list {
                    self.declare_go(arg_list)?;
                }
            }
            cursor = next;
        }
        self.scoped.pop_scope();
        Ok(())
    }

    /// Attaches a signature to its symbol row; the row is created if the
    /// signature precedes the definition.
    fn declare_signature(
        &mut self,
        id: AstId,
        var: AstId,
        context: Option<AstId>,
        ty: AstId,
    ) -> Result<()> {
        let group = self.ast.new_group(id);
        if let AstKind::TypeSignature { group: g, .. } = &mut self.ast.get_mut(id).kind {
            *g = Some(group);
        }
        self.enter(var);
        let loc = self.ast.get(var).loc;
        let AstKind::Variable { name, .. } = self.ast.get(var).kind.clone() else {
            panic!("type signature without a variable name");
        };
        let symbol = match self.scoped.lookup_current(name, Namespace::Term) {
            Some(existing) => existing,
            None => self
                .scoped
                .new_symbol(SymbolRecord::new(name, loc), Namespace::Term),
        };
        {
            let record = self.scoped.table.get_mut(symbol);
            record.optional_type_signature = Some(id);
        }
        if let AstKind::Variable { symbol: slot, .. } = &mut self.ast.get_mut(var).kind {
            *slot = symbol;
        }
        // Signature type variables live in their own scope.
        self.scoped.new_scope();
        if let Some(context) = context {
            self.declare_go(context)?;
        }
        self.declare_go(ty)?;
        self.scoped.pop_scope();
        Ok(())
    }

    /// Declares every variable occurring in a pattern into the current scope
    /// and points their records at the given declaration group.
    fn declare_pattern_group(&mut self, pat: AstId, group: crate::ast::DeclGroupId) -> Result<()> {
        self.declare_go(pat)?;
        self.link_pattern_vars(pat, group);
        Ok(())
    }

    fn link_pattern_vars(&mut self, id: AstId, group: crate::ast::DeclGroupId) {
        if let AstKind::Variable {
            kind: VarKind::Declaration,
            symbol,
            ..
        } = self.ast.get(id).kind
            && !symbol.is_null()
        {
            self.scoped.table.get_mut(symbol).declaration_group = Some(group);
        }
        for child in self.ast.children(id) {
            self.link_pattern_vars(child, group);
        }
    }

    fn count_list(&self, mut list: Option<AstId>) -> i32 {
        let mut count = 0;
        while let Some(id) = list {
            let AstKind::ListNode { next, .. } = &self.ast.get(id).kind else {
                break;
            };
            count += 1;
            list = *next;
        }
        count
    }

    /// Every declaration-kind signature must have been claimed by a
    /// definition by the end of the declare pass.
    fn check_signatures(&mut self) -> Result<()> {
        for row in self.scoped.table.iter() {
            if let Some(sig) = row.optional_type_signature
                && row.declaration_group.is_none()
                && matches!(
                    self.ast.get(sig).kind,
                    AstKind::TypeSignature {
                        kind: SigKind::Declaration,
                        ..
                    }
                )
            {
                let name = self.interner.get(row.name).unwrap_or("<unknown>").to_owned();
                return Err(CompileError::signature_without_definition(&name, row.source_loc));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Use pass
    // ------------------------------------------------------------------

    fn use_go(&mut self, id: AstId) -> Result<()> {
        let loc = self.ast.get(id).loc;
        let scope = self.ast.get(id).scope;
        let kind = self.ast.get(id).kind.clone();
        match kind {
            AstKind::Variable {
                name,
                kind: VarKind::Var,
                initializer,
                ..
            } => {
                let resolved = self.scoped.find_from(scope, name, Namespace::Term);
                if resolved.is_null() {
                    return Err(CompileError::unbound_variable(self.name_of(name), loc));
                }
                if let AstKind::Variable { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
                if let Some(initializer) = initializer {
                    self.use_go(initializer)?;
                }
            }

            AstKind::Variable {
                name,
                kind: VarKind::TypeFreeVar,
                ..
            } => {
                let resolved = self.scoped.find_from(scope, name, Namespace::Type);
                if resolved.is_null() {
                    return Err(CompileError::unbound_variable(self.name_of(name), loc));
                }
                if let AstKind::Variable { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
            }

            AstKind::BinOp { symbol: name, .. } => {
                let resolved = self.scoped.find_from(scope, name, Namespace::Term);
                if resolved.is_null() {
                    return Err(CompileError::unbound_variable(self.name_of(name), loc));
                }
                if let AstKind::BinOp { symbol_id, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol_id = resolved;
                }
                for child in self.ast.children(id) {
                    self.use_go(child)?;
                }
            }

            AstKind::OpLeftSection { symbol: name, .. } | AstKind::OpRightSection { symbol: name, .. } => {
                let resolved = self.scoped.find_from(scope, name, Namespace::Term);
                if resolved.is_null() {
                    return Err(CompileError::unbound_variable(self.name_of(name), loc));
                }
                match &mut self.ast.get_mut(id).kind {
                    AstKind::OpLeftSection { symbol_id, .. } | AstKind::OpRightSection { symbol_id, .. } => {
                        *symbol_id = resolved;
                    }
                    _ => unreachable!(),
                }
                for child in self.ast.children(id) {
                    self.use_go(child)?;
                }
            }

            AstKind::ConId {
                name,
                kind: ConKind::Var,
                ..
            } => {
                let resolved = self.scoped.find_from(scope, name, Namespace::Term);
                if resolved.is_null() {
                    if !self.scoped.find_from(scope, name, Namespace::Type).is_null() {
                        return Err(CompileError::constructor_in_term_position(self.name_of(name), loc));
                    }
                    return Err(CompileError::unbound_variable(self.name_of(name), loc));
                }
                if let AstKind::ConId { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
            }

            AstKind::ConId {
                name,
                kind: ConKind::TypeVar,
                ..
            } => {
                let resolved = self.scoped.find_from(scope, name, Namespace::Type);
                if resolved.is_null() {
                    if !self.scoped.find_from(scope, name, Namespace::Term).is_null() {
                        return Err(CompileError::variable_in_type_position(self.name_of(name), loc));
                    }
                    return Err(CompileError::unbound_variable(self.name_of(name), loc));
                }
                if let AstKind::ConId { symbol, .. } = &mut self.ast.get_mut(id).kind {
                    *symbol = resolved;
                }
            }

            _ => {
                for child in self.ast.children(id) {
                    self.use_go(child)?;
                }
            }
        }
        Ok(())
    }
}
