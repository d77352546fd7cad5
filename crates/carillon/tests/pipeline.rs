//! Front-half pipeline tests: reification, renaming, and dependency
//! analysis driven through the public API, mirroring how an embedding
//! parser would feed the compiler.

use carillon::{
    Analysis, CompileInfo, Interner, ScopedSymTable, SourceLoc,
    ast::AstKind,
    parse_ast::{BinOpKind, ConKind, ParseArena, ParseKind, ParseRef, SigKind, VarKind},
    symtab::Namespace,
};
use pretty_assertions::assert_eq;

fn loc() -> SourceLoc {
    SourceLoc::default()
}

fn analyze(parse: &ParseArena, interner: &mut Interner) -> Analysis {
    carillon::analyze(parse, interner, CompileInfo::default()).expect("analysis failed")
}

/// `x = 1` as the parser would emit it.
fn simple_binding(parse: &mut ParseArena, interner: &mut Interner, name: &str, value: i64) -> ParseRef {
    let sym = interner.intern(name);
    let lit = parse.int(value, loc());
    let rhs = parse.right_hand_side(lit, ParseRef::NULL, loc());
    parse.simple_assignment(sym, rhs, loc())
}

#[test]
fn empty_parse_arena_yields_empty_program() {
    let parse = ParseArena::new();
    let mut interner = Interner::new();
    let analysis = analyze(&parse, &mut interner);
    assert!(analysis.ast.root.is_none());
    assert!(analysis.ast.is_empty());
}

#[test]
fn simple_binding_resolves_and_forms_one_component() {
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let decl = simple_binding(&mut parse, &mut interner, "x", 1);
    parse.top_decls(&[decl], loc());

    let analysis = analyze(&parse, &mut interner);
    let x = interner.intern("x");
    let x_id = analysis.scoped.find(x, Namespace::Term);
    assert!(!x_id.is_null());
    assert_eq!(analysis.scoped.table.get(x_id).id, x_id);

    let root = analysis.ast.root.unwrap();
    let AstKind::TopDecl { group_list, .. } = analysis.ast.get(root).kind else {
        panic!("root is not a top-level block");
    };
    let list = analysis.ast.group_list(group_list.expect("group list attached"));
    assert_eq!(list.sccs.len(), 1);
    assert_eq!(list.sccs[0].len(), 1);
}

#[test]
fn operators_resolve_to_prim_methods() {
    // f x = x + 1
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let f = interner.intern("f");
    let x = interner.intern("x");
    let plus = interner.intern("+");
    let pat = parse.var(x, VarKind::Declaration, loc());
    let apats = parse.apats(&[pat], loc());
    let x_use = parse.var(x, VarKind::Var, loc());
    let one = parse.int(1, loc());
    let body = parse.bin_op(BinOpKind::Add, plus, x_use, one, loc());
    let rhs = parse.right_hand_side(body, ParseRef::NULL, loc());
    let decl = parse.apats_assignment(f, apats, rhs, loc());
    parse.top_decls(&[decl], loc());

    let analysis = analyze(&parse, &mut interner);
    // The operator's symbol was rewritten to `add` and resolved against the
    // prim row installed before renaming.
    let mut found = false;
    for id in analysis.ast.ids() {
        if let AstKind::BinOp { symbol_id, .. } = analysis.ast.get(id).kind {
            assert_eq!(symbol_id, analysis.prim.add);
            found = true;
        }
    }
    assert!(found, "no bin op survived reification");
}

/// Builds `even n = if n == 0 then True else odd (n - 1)` (and the mirrored
/// `odd`) and returns the analysis.
fn even_odd() -> (Analysis, Interner) {
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let eq_sym = interner.intern("==");
    let minus = interner.intern("-");

    let clause = |parse: &mut ParseArena,
                  interner: &mut Interner,
                  name: &str,
                  result_con: &str,
                  callee: &str| {
        let name = interner.intern(name);
        let n = interner.intern("n");
        let pat = parse.var(n, VarKind::Declaration, loc());
        let apats = parse.apats(&[pat], loc());
        let n_use = parse.var(n, VarKind::Var, loc());
        let zero = parse.int(0, loc());
        let cond = parse.bin_op(BinOpKind::Eq, eq_sym, n_use, zero, loc());
        let result_con = interner.intern(result_con);
        let then_branch = parse.conid(result_con, ConKind::Var, loc());
        let callee = interner.intern(callee);
        let callee_use = parse.var(callee, VarKind::Var, loc());
        let n_use2 = parse.var(n, VarKind::Var, loc());
        let one = parse.int(1, loc());
        let arg = parse.bin_op(BinOpKind::Sub, minus, n_use2, one, loc());
        let call = parse.apply(&[callee_use, arg], loc());
        let ite = parse.if_then_else(cond, then_branch, call, loc());
        let rhs = parse.right_hand_side(ite, ParseRef::NULL, loc());
        parse.apats_assignment(name, apats, rhs, loc())
    };

    let even = clause(&mut parse, &mut interner, "even", "True", "odd");
    let odd = clause(&mut parse, &mut interner, "odd", "False", "even");
    parse.top_decls(&[even, odd], loc());

    let analysis = analyze(&parse, &mut interner);
    (analysis, interner)
}

#[test]
fn mutual_recursion_shares_one_component() {
    let (analysis, _interner) = even_odd();
    let root = analysis.ast.root.unwrap();
    let AstKind::TopDecl { group_list, .. } = analysis.ast.get(root).kind else {
        panic!("root is not a top-level block");
    };
    let list = analysis.ast.group_list(group_list.unwrap());
    assert_eq!(list.sccs.len(), 1);
    assert_eq!(list.sccs[0].len(), 2);
}

#[test]
fn resolved_references_stay_inside_ancestor_scopes() {
    let (analysis, _interner) = even_odd();
    // Every resolved variable's defining scope is an ancestor of the scope
    // the reference was renamed in.
    fn walk(analysis: &Analysis, id: carillon::ast::AstId) {
        let node = analysis.ast.get(id);
        if let AstKind::Variable { symbol, .. } = node.kind
            && !symbol.is_null()
        {
            let record = analysis.scoped.table.get(symbol);
            assert!(
                analysis.scoped.is_ancestor(record.scope, node.scope),
                "reference escapes its binder's scope"
            );
        }
        for child in analysis.ast.children(id) {
            walk(analysis, child);
        }
    }
    walk(&analysis, analysis.ast.root.unwrap());
}

#[test]
fn symbol_ids_stay_stable_across_stages() {
    let (analysis, _interner) = even_odd();
    for record in analysis.scoped.table.iter() {
        assert_eq!(analysis.scoped.table.get(record.id).id, record.id);
    }
}

/// fib with three clauses: `fib 0 = 0; fib 1 = 1; fib n = fib (n-1) + fib (n-2)`.
fn fib_parse(interner: &mut Interner) -> ParseArena {
    let mut parse = ParseArena::new();
    let fib = interner.intern("fib");
    let minus = interner.intern("-");
    let plus = interner.intern("+");

    let pat0 = parse.add(
        ParseKind::Constant {
            kind: carillon::parse_ast::ConstantKind::PatInt(0),
        },
        loc(),
    );
    let apats0 = parse.apats(&[pat0], loc());
    let zero = parse.int(0, loc());
    let rhs0 = parse.right_hand_side(zero, ParseRef::NULL, loc());
    let clause0 = parse.apats_assignment(fib, apats0, rhs0, loc());

    let pat1 = parse.add(
        ParseKind::Constant {
            kind: carillon::parse_ast::ConstantKind::PatInt(1),
        },
        loc(),
    );
    let apats1 = parse.apats(&[pat1], loc());
    let one = parse.int(1, loc());
    let rhs1 = parse.right_hand_side(one, ParseRef::NULL, loc());
    let clause1 = parse.apats_assignment(fib, apats1, rhs1, loc());

    let n = interner.intern("n");
    let patn = parse.var(n, VarKind::Declaration, loc());
    let apatsn = parse.apats(&[patn], loc());
    let rec_call = |parse: &mut ParseArena, k: i64| {
        let fib_use = parse.var(fib, VarKind::Var, loc());
        let n_use = parse.var(n, VarKind::Var, loc());
        let lit = parse.int(k, loc());
        let sub = parse.bin_op(BinOpKind::Sub, minus, n_use, lit, loc());
        parse.apply(&[fib_use, sub], loc())
    };
    let left = rec_call(&mut parse, 1);
    let right = rec_call(&mut parse, 2);
    let sum = parse.bin_op(BinOpKind::Add, plus, left, right, loc());
    let rhsn = parse.right_hand_side(sum, ParseRef::NULL, loc());
    let clausen = parse.apats_assignment(fib, apatsn, rhsn, loc());

    parse.top_decls(&[clause0, clause1, clausen], loc());
    parse
}

#[test]
fn multi_clause_bindings_chain_declaration_groups() {
    let mut interner = Interner::new();
    let parse = fib_parse(&mut interner);
    let mut scoped = ScopedSymTable::new();
    let _prim = carillon::machine::prim::install_names(&mut scoped, &mut interner);
    let mut ast = carillon::reify::reify(&parse, &mut interner);
    carillon::rename::declare_pass(&mut ast, &mut scoped, &interner).expect("declare pass");

    let fib = interner.intern("fib");
    let fib_id = scoped.find(fib, Namespace::Term);
    let mut chain = 0;
    let mut cursor = scoped.table.get(fib_id).declaration_group;
    while let Some(group) = cursor {
        chain += 1;
        cursor = ast.group(group).next;
    }
    assert_eq!(chain, 3);
    assert_eq!(scoped.table.get(fib_id).arity, 1);
}

#[test]
fn multi_clause_bindings_collapse_into_one_component() {
    let mut interner = Interner::new();
    let parse = fib_parse(&mut interner);
    let analysis = analyze(&parse, &mut interner);
    let root = analysis.ast.root.unwrap();
    let AstKind::TopDecl { group_list, .. } = analysis.ast.get(root).kind else {
        panic!("root is not a top-level block");
    };
    let list = analysis.ast.group_list(group_list.unwrap());
    // One SCC holding all three clauses, each as its own entry with the
    // clause links cleared.
    assert_eq!(list.sccs.len(), 1);
    assert_eq!(list.sccs[0].len(), 3);
    for group in &list.sccs[0] {
        assert!(analysis.ast.group(*group).next.is_none());
    }
}

#[test]
fn redefining_a_name_in_one_scope_is_rejected() {
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let first = simple_binding(&mut parse, &mut interner, "x", 1);
    let second = simple_binding(&mut parse, &mut interner, "x", 2);
    parse.top_decls(&[first, second], loc());

    let err = carillon::analyze(&parse, &mut interner, CompileInfo::default()).unwrap_err();
    assert_eq!(err.message, "Multiple declarations of: x");
}

#[test]
fn unbound_variables_are_rejected() {
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let ghost = interner.intern("ghost");
    let ghost_use = parse.var(ghost, VarKind::Var, loc());
    let rhs = parse.right_hand_side(ghost_use, ParseRef::NULL, loc());
    let decl = parse.simple_assignment(x, rhs, loc());
    parse.top_decls(&[decl], loc());

    let err = carillon::analyze(&parse, &mut interner, CompileInfo::default()).unwrap_err();
    assert_eq!(err.message, "Unbound variable: ghost");
}

#[test]
fn signatures_without_definitions_are_rejected() {
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let lonely = interner.intern("lonely");
    let int_name = interner.intern("Int");
    let var = parse.var(lonely, VarKind::Sig, loc());
    let ty = parse.conid(int_name, ConKind::TypeVar, loc());
    let sig = parse.add(
        ParseKind::TypeSignature {
            var,
            context: ParseRef::NULL,
            ty,
            kind: SigKind::Declaration,
        },
        loc(),
    );
    parse.top_decls(&[sig], loc());

    let err = carillon::analyze(&parse, &mut interner, CompileInfo::default()).unwrap_err();
    assert_eq!(err.message, "Type signature without accompanying definition: lonely");
}

#[test]
fn signatures_attach_to_their_definitions() {
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let int_name = interner.intern("Int");
    let var = parse.var(x, VarKind::Sig, loc());
    let ty = parse.conid(int_name, ConKind::TypeVar, loc());
    let sig = parse.add(
        ParseKind::TypeSignature {
            var,
            context: ParseRef::NULL,
            ty,
            kind: SigKind::Declaration,
        },
        loc(),
    );
    let def = simple_binding(&mut parse, &mut interner, "x", 1);
    parse.top_decls(&[sig, def], loc());

    let analysis = analyze(&parse, &mut interner);
    let x_id = analysis.scoped.find(x, Namespace::Term);
    let record = analysis.scoped.table.get(x_id);
    assert!(record.optional_type_signature.is_some());
    assert!(record.declaration_group.is_some());
}

#[test]
fn data_declarations_register_constructors() {
    // data Shape a = Point | Circle a
    let mut parse = ParseArena::new();
    let mut interner = Interner::new();
    let shape = interner.intern("Shape");
    let a = interner.intern("a");
    let point = interner.intern("Point");
    let circle = interner.intern("Circle");

    let type_con = parse.conid(shape, ConKind::TypeDeclaration, loc());
    let a_decl = parse.var(a, VarKind::TypeVarDeclaration, loc());
    let ty_vars = parse.list(&[a_decl], loc());
    let simple_type = parse.add(
        ParseKind::SimpleType {
            type_con,
            type_var_list: ty_vars,
        },
        loc(),
    );
    let point_id = parse.conid(point, ConKind::Declaration, loc());
    let point_con = parse.add(
        ParseKind::Constructor {
            conid: point_id,
            arg_list: ParseRef::NULL,
        },
        loc(),
    );
    let circle_id = parse.conid(circle, ConKind::Declaration, loc());
    let a_use = parse.var(a, VarKind::TypeFreeVar, loc());
    let circle_args = parse.list(&[a_use], loc());
    let circle_con = parse.add(
        ParseKind::Constructor {
            conid: circle_id,
            arg_list: circle_args,
        },
        loc(),
    );
    let cons = parse.list(&[point_con, circle_con], loc());
    let data = parse.add(
        ParseKind::DataDeclaration {
            simple_type,
            constructor_list: cons,
        },
        loc(),
    );
    parse.top_decls(&[data], loc());

    let analysis = analyze(&parse, &mut interner);
    let shape_id = analysis.scoped.find(shape, Namespace::Type);
    assert!(!shape_id.is_null());
    let point_id = analysis.scoped.find(point, Namespace::Term);
    let circle_id = analysis.scoped.find(circle, Namespace::Term);
    let point_rec = analysis.scoped.table.get(point_id);
    let circle_rec = analysis.scoped.table.get(circle_id);
    assert!(point_rec.is_constructor && circle_rec.is_constructor);
    assert_eq!((point_rec.con_num, point_rec.arity), (0, 0));
    assert_eq!((circle_rec.con_num, circle_rec.arity), (1, 1));
}
