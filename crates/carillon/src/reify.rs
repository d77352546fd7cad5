//! Reification: rehydrates the compact parse arena into the semantic AST.
//!
//! Structure is preserved variant for variant, with exactly two desugarings
//! applied here and nowhere else:
//!
//! * integer literals become `fromInt <lit>` and floating literals become
//!   `fromRational <lit>` (pattern literals are left alone), so numeric
//!   overloading funnels through two method names;
//! * binary operators with a canonical dictionary method (`+`, `==`, `>>=`,
//!   ...) have their symbol rewritten to that method name, for operator
//!   sections too. The operator kind is preserved for downstream
//!   tie-breaking; user-defined operators keep their own symbol and resolve
//!   through the ordinary variable path.

use crate::{
    ast::{Ast, AstId, AstKind},
    diagnostics::SourceLoc,
    intern::{Interner, Symbol},
    parse_ast::{BinOpKind, ConstantKind, ParseArena, ParseKind, ParseRef, VarKind},
};

/// Reifies a whole parse arena. An empty arena yields an empty program.
pub fn reify(parse: &ParseArena, interner: &mut Interner) -> Ast {
    let mut reifier = Reifier {
        parse,
        interner,
        ast: Ast::new(),
    };
    let root = reifier.go(parse.root);
    reifier.ast.root = root;
    reifier.ast
}

struct Reifier<'a> {
    parse: &'a ParseArena,
    interner: &'a mut Interner,
    ast: Ast,
}

impl Reifier<'_> {
    /// Rewrites an operator symbol to its canonical method name, if any.
    fn method_symbol(&mut self, op: BinOpKind, symbol: Symbol) -> Symbol {
        match op.method_name() {
            Some(method) => self.interner.intern(method),
            None => symbol,
        }
    }

    /// Wraps a reified literal in an application of `method`.
    fn from_application(&mut self, method: &'static str, lit: AstId, loc: SourceLoc) -> AstId {
        let method_sym = self.interner.intern(method);
        let var = self.ast.add(
            AstKind::Variable {
                name: method_sym,
                kind: VarKind::Var,
                symbol: crate::symtab::SymbolId::NULL,
                initializer: None,
            },
            loc,
        );
        let arg = self.ast.add(
            AstKind::FunctionExpression { aexp: lit, next: None },
            loc,
        );
        self.ast.add(
            AstKind::FunctionExpression {
                aexp: var,
                next: Some(arg),
            },
            loc,
        )
    }

    fn go(&mut self, node: ParseRef) -> Option<AstId> {
        let parsed = self.parse.get(node)?;
        let loc = parsed.loc;
        let kind = parsed.kind.clone();
        let reified = match kind {
            ParseKind::Undefined => self.ast.add(AstKind::Undefined, loc),
            ParseKind::Constant { kind } => {
                let lit = self.ast.add(AstKind::Constant { kind }, loc);
                match kind {
                    ConstantKind::Int(_) => self.from_application("fromInt", lit, loc),
                    ConstantKind::Float(_) => self.from_application("fromRational", lit, loc),
                    _ => lit,
                }
            }
            ParseKind::UnaryOp { symbol, expr } => {
                let expr = self.required(expr);
                self.ast.add(AstKind::UnaryOp { symbol, expr }, loc)
            }
            ParseKind::BinOp { op, symbol, lhs, rhs } => {
                let symbol = self.method_symbol(op, symbol);
                let lhs = self.required(lhs);
                let rhs = self.required(rhs);
                self.ast.add(
                    AstKind::BinOp {
                        op,
                        symbol,
                        symbol_id: crate::symtab::SymbolId::NULL,
                        lhs,
                        rhs,
                    },
                    loc,
                )
            }
            ParseKind::IfThenElse {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.required(cond);
                let then_expr = self.required(then_expr);
                let else_expr = self.required(else_expr);
                self.ast.add(
                    AstKind::IfThenElse {
                        cond,
                        then_expr,
                        else_expr,
                    },
                    loc,
                )
            }
            ParseKind::TopDecl { declaration, next } => {
                let declaration = self.required(declaration);
                let next = self.go(next);
                self.ast.add(
                    AstKind::TopDecl {
                        declaration,
                        next,
                        group_list: None,
                    },
                    loc,
                )
            }
            ParseKind::Decl { declaration, next } => {
                let declaration = self.required(declaration);
                let next = self.go(next);
                self.ast.add(
                    AstKind::Decl {
                        declaration,
                        next,
                        group_list: None,
                    },
                    loc,
                )
            }
            ParseKind::SimpleAssignment { name, initializer, rhs } => {
                let initializer = self.go(initializer);
                let rhs = self.required(rhs);
                self.ast.add(
                    AstKind::SimpleAssignment {
                        name,
                        symbol: crate::symtab::SymbolId::NULL,
                        initializer,
                        rhs,
                        group: None,
                    },
                    loc,
                )
            }
            ParseKind::ApatsAssignment { name, apats, rhs } => {
                let apats = self.go(apats);
                let rhs = self.required(rhs);
                self.ast.add(
                    AstKind::ApatsAssignment {
                        name,
                        symbol: crate::symtab::SymbolId::NULL,
                        apats,
                        rhs,
                        group: None,
                    },
                    loc,
                )
            }
            ParseKind::PatAssignment { pat, rhs } => {
                let pat = self.required(pat);
                let rhs = self.required(rhs);
                self.ast.add(AstKind::PatAssignment { pat, rhs, group: None }, loc)
            }
            ParseKind::RightHandSide {
                expression,
                declarations,
            } => {
                let expression = self.required(expression);
                let declarations = self.go(declarations);
                self.ast.add(
                    AstKind::RightHandSide {
                        expression,
                        declarations,
                    },
                    loc,
                )
            }
            ParseKind::LetExpression {
                expression,
                declarations,
            } => {
                let expression = self.required(expression);
                let declarations = self.go(declarations);
                self.ast.add(
                    AstKind::LetExpression {
                        expression,
                        declarations,
                    },
                    loc,
                )
            }
            ParseKind::FunctionExpression { aexp, next } => {
                let aexp = self.required(aexp);
                let next = self.go(next);
                self.ast.add(AstKind::FunctionExpression { aexp, next }, loc)
            }
            ParseKind::Variable { name, kind, initializer } => {
                let initializer = self.go(initializer);
                self.ast.add(
                    AstKind::Variable {
                        name,
                        kind,
                        symbol: crate::symtab::SymbolId::NULL,
                        initializer,
                    },
                    loc,
                )
            }
            ParseKind::Apats { apat, next } => {
                let apat = self.required(apat);
                let next = self.go(next);
                self.ast.add(AstKind::Apats { apat, next }, loc)
            }
            ParseKind::Wildcard => self.ast.add(AstKind::Wildcard, loc),
            ParseKind::Lambda { apats, expression } => {
                let apats = self.required(apats);
                let expression = self.required(expression);
                self.ast.add(AstKind::Lambda { apats, expression }, loc)
            }
            ParseKind::Do { statements } => {
                let statements = self.go(statements);
                self.ast.add(AstKind::Do { statements }, loc)
            }
            ParseKind::PatternExpression { expressions } => {
                let expressions = self.go(expressions);
                self.ast.add(AstKind::PatternExpression { expressions }, loc)
            }
            ParseKind::ExpressionList { expressions } => {
                let expressions = self.go(expressions);
                self.ast.add(AstKind::ExpressionList { expressions }, loc)
            }
            ParseKind::ExpressionArray { expressions } => {
                let expressions = self.go(expressions);
                self.ast.add(AstKind::ExpressionArray { expressions }, loc)
            }
            ParseKind::Tuple { expressions } => {
                let expressions = self.go(expressions);
                self.ast.add(AstKind::Tuple { expressions }, loc)
            }
            ParseKind::ListNode { item, next } => {
                let item = self.go(item);
                let next = self.go(next);
                self.ast.add(AstKind::ListNode { item, next }, loc)
            }
            ParseKind::BindAssignment { name, expression } => {
                let expression = self.required(expression);
                self.ast.add(
                    AstKind::BindAssignment {
                        name,
                        symbol: crate::symtab::SymbolId::NULL,
                        expression,
                    },
                    loc,
                )
            }
            ParseKind::PatBindAssignment { pat, expression } => {
                let pat = self.required(pat);
                let expression = self.required(expression);
                self.ast.add(AstKind::PatBindAssignment { pat, expression }, loc)
            }
            ParseKind::ArithmeticSequence { from, then, to, kind } => {
                let from = self.required(from);
                let then = self.go(then);
                let to = self.go(to);
                self.ast.add(AstKind::ArithmeticSequence { from, then, to, kind }, loc)
            }
            ParseKind::Case {
                expression,
                alternatives,
            } => {
                let expression = self.required(expression);
                let alternatives = self.go(alternatives);
                self.ast.add(
                    AstKind::Case {
                        expression,
                        alternatives,
                    },
                    loc,
                )
            }
            ParseKind::CaseAlternative { pat, body } => {
                let pat = self.required(pat);
                let body = self.required(body);
                self.ast.add(AstKind::CaseAlternative { pat, body }, loc)
            }
            ParseKind::ConId { name, kind } => self.ast.add(
                AstKind::ConId {
                    name,
                    kind,
                    symbol: crate::symtab::SymbolId::NULL,
                },
                loc,
            ),
            ParseKind::TypeApp { ty, next_ty } => {
                let ty = self.required(ty);
                let next_ty = self.go(next_ty);
                self.ast.add(AstKind::TypeApp { ty, next_ty }, loc)
            }
            ParseKind::BinOpSym { left, op, right } => {
                let left = self.required(left);
                let op = self.required(op);
                let right = self.required(right);
                self.ast.add(AstKind::BinOpSym { left, op, right }, loc)
            }
            ParseKind::OpLeftSection { op, symbol, left } => {
                let symbol = self.method_symbol(op, symbol);
                let left = self.required(left);
                self.ast.add(
                    AstKind::OpLeftSection {
                        op,
                        symbol,
                        symbol_id: crate::symtab::SymbolId::NULL,
                        left,
                    },
                    loc,
                )
            }
            ParseKind::OpRightSection { op, symbol, right } => {
                let symbol = self.method_symbol(op, symbol);
                let right = self.required(right);
                self.ast.add(
                    AstKind::OpRightSection {
                        op,
                        symbol,
                        symbol_id: crate::symtab::SymbolId::NULL,
                        right,
                    },
                    loc,
                )
            }
            ParseKind::Constructor { conid, arg_list } => {
                let conid = self.required(conid);
                let arg_list = self.go(arg_list);
                self.ast.add(AstKind::Constructor { conid, arg_list }, loc)
            }
            ParseKind::SimpleType {
                type_con,
                type_var_list,
            } => {
                let type_con = self.required(type_con);
                let type_var_list = self.go(type_var_list);
                self.ast.add(
                    AstKind::SimpleType {
                        type_con,
                        type_var_list,
                    },
                    loc,
                )
            }
            ParseKind::DataDeclaration {
                simple_type,
                constructor_list,
            } => {
                let simple_type = self.required(simple_type);
                let constructor_list = self.required(constructor_list);
                self.ast.add(
                    AstKind::DataDeclaration {
                        simple_type,
                        constructor_list,
                        group: None,
                    },
                    loc,
                )
            }
            ParseKind::TypeClassContext { conid, varid } => {
                let conid = self.required(conid);
                let varid = self.required(varid);
                self.ast.add(AstKind::TypeClassContext { conid, varid }, loc)
            }
            ParseKind::TypeClassDeclaration {
                context,
                tycls,
                tyvar,
                declarations,
            } => {
                let context = self.go(context);
                let tycls = self.required(tycls);
                let tyvar = self.required(tyvar);
                let declarations = self.go(declarations);
                self.ast.add(
                    AstKind::TypeClassDeclaration {
                        context,
                        tycls,
                        tyvar,
                        declarations,
                        group: None,
                    },
                    loc,
                )
            }
            ParseKind::TypeClassInstance {
                context,
                qtycls,
                inst,
                declarations,
            } => {
                let context = self.go(context);
                let qtycls = self.required(qtycls);
                let inst = self.required(inst);
                let declarations = self.go(declarations);
                self.ast.add(
                    AstKind::TypeClassInstance {
                        context,
                        qtycls,
                        inst,
                        declarations,
                        group: None,
                    },
                    loc,
                )
            }
            ParseKind::TypeSignature { var, context, ty, kind } => {
                let var = self.required(var);
                let context = self.go(context);
                let ty = self.required(ty);
                self.ast.add(
                    AstKind::TypeSignature {
                        var,
                        context,
                        ty,
                        kind,
                        group: None,
                    },
                    loc,
                )
            }
            ParseKind::FunctionType { ty, next_on_arrow } => {
                let ty = self.required(ty);
                let next_on_arrow = self.required(next_on_arrow);
                self.ast.add(AstKind::FunctionType { ty, next_on_arrow }, loc)
            }
        };
        Some(reified)
    }

    /// Reifies a child that the grammar guarantees to be present.
    ///
    /// # Panics
    /// Panics when the parser emitted a null reference in a required slot;
    /// that is a malformed parse arena, not a user error.
    fn required(&mut self, node: ParseRef) -> AstId {
        self.go(node).expect("required child missing in parse arena")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_ast::VarKind;

    #[test]
    fn empty_arena_reifies_to_empty_program() {
        let parse = ParseArena::new();
        let mut interner = Interner::new();
        let ast = reify(&parse, &mut interner);
        assert!(ast.root.is_none());
    }

    #[test]
    fn integer_literals_become_from_int_applications() {
        let mut parse = ParseArena::new();
        let mut interner = Interner::new();
        let loc = SourceLoc::default();
        let lit = parse.int(440, loc);
        parse.root = lit;
        let ast = reify(&parse, &mut interner);
        let root = ast.root.unwrap();
        let AstKind::FunctionExpression { aexp, next } = &ast.get(root).kind else {
            panic!("expected application, got {}", ast.get(root).kind.name());
        };
        let AstKind::Variable { name, .. } = &ast.get(*aexp).kind else {
            panic!("expected fromInt head");
        };
        assert_eq!(interner.get(*name), Some("fromInt"));
        let arg_chain = next.unwrap();
        let AstKind::FunctionExpression { aexp: arg, .. } = &ast.get(arg_chain).kind else {
            panic!("expected argument link");
        };
        assert_eq!(
            ast.get(*arg).kind,
            AstKind::Constant {
                kind: ConstantKind::Int(440)
            }
        );
    }

    #[test]
    fn pattern_literals_stay_literals() {
        let mut parse = ParseArena::new();
        let mut interner = Interner::new();
        let loc = SourceLoc::default();
        let lit = parse.add(
            ParseKind::Constant {
                kind: ConstantKind::PatInt(0),
            },
            loc,
        );
        parse.root = lit;
        let ast = reify(&parse, &mut interner);
        assert_eq!(
            ast.get(ast.root.unwrap()).kind,
            AstKind::Constant {
                kind: ConstantKind::PatInt(0)
            }
        );
    }

    #[test]
    fn operators_rewrite_to_method_names() {
        let mut parse = ParseArena::new();
        let mut interner = Interner::new();
        let loc = SourceLoc::default();
        let x = interner.intern("x");
        let plus = interner.intern("+");
        let lhs = parse.var(x, VarKind::Var, loc);
        let rhs = parse.var(x, VarKind::Var, loc);
        let op = parse.bin_op(BinOpKind::Add, plus, lhs, rhs, loc);
        parse.root = op;
        let ast = reify(&parse, &mut interner);
        let AstKind::BinOp { op, symbol, .. } = &ast.get(ast.root.unwrap()).kind else {
            panic!("expected bin op");
        };
        assert_eq!(*op, BinOpKind::Add);
        assert_eq!(interner.get(*symbol), Some("add"));
    }

    #[test]
    fn user_operators_keep_their_symbol() {
        let mut parse = ParseArena::new();
        let mut interner = Interner::new();
        let loc = SourceLoc::default();
        let x = interner.intern("x");
        let custom = interner.intern("<+>");
        let lhs = parse.var(x, VarKind::Var, loc);
        let rhs = parse.var(x, VarKind::Var, loc);
        let op = parse.bin_op(BinOpKind::Other, custom, lhs, rhs, loc);
        parse.root = op;
        let ast = reify(&parse, &mut interner);
        let AstKind::BinOp { symbol, .. } = &ast.get(ast.root.unwrap()).kind else {
            panic!("expected bin op");
        };
        assert_eq!(interner.get(*symbol), Some("<+>"));
    }
}
