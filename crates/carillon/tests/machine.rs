//! Machine lowering tests: Core trees (as the external core conversion
//! would produce them) driven through prim installation and the three
//! lowering passes, with the program invariants checked on every result.

use carillon::{
    Analysis, CompileInfo, Core, Interner, MachineProgram, SourceLoc, StateKind, Ty,
    core::CoreAlt,
    machine::{
        ir::{LoadSource, MachLit, MachineRepr, Stmt, StoreDest, Terminator, Value, ValueKind},
        ty::MachTy,
    },
    parse_ast::ParseArena,
    symtab::{SymbolId, SymbolRecord},
};
use pretty_assertions::assert_eq;

fn setup() -> (Interner, Analysis) {
    let mut interner = Interner::new();
    let parse = ParseArena::new();
    let analysis = carillon::analyze(&parse, &mut interner, CompileInfo::default()).expect("analysis failed");
    (interner, analysis)
}

/// A fresh symbol row, standing in for a name the core converter introduced.
fn fresh(analysis: &mut Analysis, interner: &mut Interner, name: &str) -> SymbolId {
    let sym = interner.intern(name);
    analysis.scoped.table.insert(SymbolRecord::new(sym, SourceLoc::default()))
}

fn compile(core: &mut Core, analysis: &mut Analysis, interner: &mut Interner) -> MachineProgram {
    let program = carillon::compile_core(core, analysis, interner, CompileInfo::default());
    assert_well_formed(&program);
    program
}

/// The universal program invariants: every block carries exactly one
/// terminator, and node members occupy slots 2, 3, ... in layout order.
fn assert_well_formed(program: &MachineProgram) {
    for def in &program.functions {
        for block in &def.blocks {
            assert!(block.terminator.is_some(), "unterminated block in the program");
        }
    }
    for (_, node) in program.all_nodes() {
        for (i, member) in node.members.iter().enumerate() {
            assert_eq!(member.slot_num as usize, i + 2);
        }
    }
}

fn callable(analysis: &Analysis, program: &MachineProgram, sym: SymbolId) -> Value {
    match analysis.scoped.table.get(sym).machine_repr.expect("symbol not lowered") {
        MachineRepr::Fn(id) => program.function(id).value,
        MachineRepr::Value(value) => value,
        MachineRepr::Node(_) => panic!("expected a callable, found a node"),
    }
}

#[test]
fn empty_core_lowers_to_prims_only() {
    let (mut interner, mut analysis) = setup();
    let mut core = Core::new();
    let program = compile(&mut core, &mut analysis, &mut interner);
    assert!(program.node_defs.is_empty());
    assert!(program.globals.is_empty());
    // The prim functions are all that exists.
    assert!(program.functions.iter().all(|f| !f.blocks.is_empty()));
}

#[test]
fn constant_binding_boxes_its_literal() {
    // x = 1
    let (mut interner, mut analysis) = setup();
    let x = fresh(&mut analysis, &mut interner, "x");
    let prim = analysis.prim.clone();

    let mut core = Core::new();
    let from_int = core.var(prim.from_int_int);
    let one = core.lit_int(1);
    let body = core.app(from_int, &[one]);
    let bind = core.bind(x, body, Ty::con(prim.int_ty));
    core.top_level(&[bind]);

    let program = compile(&mut core, &mut analysis, &mut interner);
    assert_eq!(program.node_defs.len(), 1);
    let node = program.node(program.node_defs[0]);
    assert_eq!(node.bind_name, x);
    assert_eq!(node.state, StateKind::Constant);
    assert!(node.members.is_empty());

    // Node struct: header plus the boxed Int value.
    let MachTy::Struct { members, .. } = program.types.get(node.struct_ty.expect("layout")) else {
        panic!("node layout is not a struct");
    };
    assert_eq!(members.len(), 2);

    // A global holds the node struct pointer.
    assert!(node.global_value.is_some());
    assert_eq!(program.globals.len(), 1);

    // The update function calls fromInt@Int on the raw 1i64 and returns the
    // boxed result.
    let update = program.function(node.update_fn.expect("update emitted"));
    let body = &update.blocks[0];
    let from_int_value = callable(&analysis, &program, prim.from_int_int);
    let Stmt::Call { fn_value, args, result } = &body.stmts[0] else {
        panic!("update body does not start with a call");
    };
    assert_eq!(*fn_value, from_int_value);
    assert_eq!(args.len(), 1);
    assert!(matches!(args[0].kind, ValueKind::Lit(MachLit::Int64(1))));
    assert_eq!(body.terminator, Some(Terminator::Return(*result)));
}

#[test]
fn pointwise_function_keeps_no_state() {
    // f x = add@Int x (fromInt@Int 1)
    let (mut interner, mut analysis) = setup();
    let f = fresh(&mut analysis, &mut interner, "f");
    let x = fresh(&mut analysis, &mut interner, "x");
    let prim = analysis.prim.clone();

    let mut core = Core::new();
    let arg = core.var(x);
    let add = core.var(prim.add_int);
    let x_use = core.var(x);
    let from_int = core.var(prim.from_int_int);
    let one = core.lit_int(1);
    let boxed_one = core.app(from_int, &[one]);
    let body = core.app(add, &[x_use, boxed_one]);
    let lam = core.lam(arg, body);
    let int = Ty::con(prim.int_ty);
    let bind = core.bind(f, lam, Ty::fun(int.clone(), int));
    core.top_level(&[bind]);

    let program = compile(&mut core, &mut analysis, &mut interner);
    let node = program.node(program.node_defs[0]);
    assert_eq!(node.state, StateKind::Pointwise);
    assert!(node.members.is_empty());
    assert_eq!(node.arg_names, vec![x]);
    assert!(node.global_value.is_none());

    // No self pointer: the update function takes only x.
    let update = program.function(node.update_fn.expect("update emitted"));
    let MachTy::Fn { params, .. } = program.types.get(update.ty) else {
        panic!("update is not a function");
    };
    assert_eq!(params.len(), 1);

    // add@Int is applied to the parameter and the boxed literal.
    let add_value = callable(&analysis, &program, prim.add_int);
    let body = &update.blocks[0];
    let add_call = body
        .stmts
        .iter()
        .find_map(|s| match s {
            Stmt::Call { fn_value, args, .. } if *fn_value == add_value => Some(args.clone()),
            _ => None,
        })
        .expect("no call to add@Int");
    assert!(matches!(add_call[0].kind, ValueKind::Param { index: 0, .. }));
}

#[test]
fn mutually_recursive_nodes_emit_in_one_pass() {
    // even n = odd n; odd n = even n  (recursion distilled to its cycle)
    let (mut interner, mut analysis) = setup();
    let even = fresh(&mut analysis, &mut interner, "even");
    let odd = fresh(&mut analysis, &mut interner, "odd");
    let n1 = fresh(&mut analysis, &mut interner, "n");
    let n2 = fresh(&mut analysis, &mut interner, "n");
    let prim = analysis.prim.clone();
    let int = Ty::con(prim.int_ty);
    let fn_ty = Ty::fun(int.clone(), int);

    let mut core = Core::new();
    let even_arg = core.var(n1);
    let odd_use = core.var(odd);
    let n1_use = core.var(n1);
    let even_body = core.app(odd_use, &[n1_use]);
    let even_lam = core.lam(even_arg, even_body);
    let even_bind = core.bind(even, even_lam, fn_ty.clone());

    let odd_arg = core.var(n2);
    let even_use = core.var(even);
    let n2_use = core.var(n2);
    let odd_body = core.app(even_use, &[n2_use]);
    let odd_lam = core.lam(odd_arg, odd_body);
    let odd_bind = core.bind(odd, odd_lam, fn_ty);

    core.top_level(&[even_bind, odd_bind]);
    let program = compile(&mut core, &mut analysis, &mut interner);

    assert_eq!(program.node_defs.len(), 2);
    for id in &program.node_defs {
        let node = program.node(*id);
        assert!(node.update_fn.is_some(), "update function missing for a cycle member");
        assert_eq!(node.state, StateKind::Stateful);
    }
    // Each call site persisted a sub-node slot in its caller.
    let even_node = program.node(program.node_defs[0]);
    assert!(!even_node.members.is_empty());
}

#[test]
fn data_declarations_lower_to_tagged_structs() {
    // data Opt a = Non | Some a; isSome m = case m of Some -> True; _ -> False
    let (mut interner, mut analysis) = setup();
    let opt = fresh(&mut analysis, &mut interner, "Opt");
    let non = fresh(&mut analysis, &mut interner, "Non");
    let some = fresh(&mut analysis, &mut interner, "Some");
    let is_some = fresh(&mut analysis, &mut interner, "isSome");
    let m = fresh(&mut analysis, &mut interner, "m");
    let prim = analysis.prim.clone();

    let mut core = Core::new();
    let non_con = core.data_con(non, vec![]);
    let payload = core.type_node(Ty::Var(0));
    let some_con = core.data_con(some, vec![payload]);
    let data = core.data_decl(opt, vec![non_con, some_con]);

    let arg = core.var(m);
    let scrutinee = core.var(m);
    let some_pat = core.var(some);
    let true_use = core.var(prim.true_con);
    let false_use = core.var(prim.false_con);
    let case = core.case(
        scrutinee,
        vec![
            CoreAlt {
                pat: Some(some_pat),
                body: true_use,
            },
            CoreAlt {
                pat: None,
                body: false_use,
            },
        ],
    );
    core.set_ty(case, Ty::con(prim.bool_ty));
    let lam = core.lam(arg, case);
    let bind = core.bind(is_some, lam, Ty::fun(Ty::con(opt), Ty::con(prim.bool_ty)));
    core.top_level(&[data, bind]);

    let program = compile(&mut core, &mut analysis, &mut interner);

    // The struct is sized by the widest constructor: header + 1 slot.
    let opt_ty = program.struct_ty(opt).expect("Opt registered");
    let MachTy::Struct { members, .. } = program.types.get(opt_ty) else {
        panic!("Opt is not a struct");
    };
    assert_eq!(members.len(), 2);

    // Makers tag with the declaration-order constructor index.
    assert_eq!(analysis.scoped.table.get(non).con_num, 0);
    assert_eq!(analysis.scoped.table.get(some).con_num, 1);
    let non_value = callable(&analysis, &program, non);
    let tag_of = |value: Value| {
        let def = program.functions.iter().find(|f| f.value == value).expect("maker");
        def.blocks[0]
            .stmts
            .iter()
            .find_map(|s| match s {
                Stmt::Store {
                    value,
                    dest: StoreDest::Tag(_),
                } => match value.kind {
                    ValueKind::Lit(MachLit::UInt32(tag)) => Some(tag),
                    _ => None,
                },
                _ => None,
            })
            .expect("maker writes no tag")
    };
    assert_eq!(tag_of(non_value), 0);
    assert_eq!(tag_of(callable(&analysis, &program, some)), 1);

    // The case dispatches on the scrutinee's tag.
    let node = program
        .all_nodes()
        .find(|(_, n)| n.bind_name == is_some)
        .map(|(_, n)| n)
        .expect("isSome node");
    let update = program.function(node.update_fn.expect("update emitted"));
    let entry = &update.blocks[0];
    let Some(Terminator::Switch { cases, default, .. }) = &entry.terminator else {
        panic!("case did not lower to a switch");
    };
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].0, 1);
    assert!(default.is_some());
    // enter, merge, and one block per alternative.
    assert_eq!(update.blocks.len(), 4);

    // The case's value really flows: the entry block allocates a cell,
    // every alternative stores the boolean its maker produced into the
    // cell's payload slot, and the merge block loads that payload back and
    // returns it.
    let cell = entry
        .stmts
        .iter()
        .find_map(|s| match s {
            Stmt::Nalloc { result, .. } => Some(*result),
            _ => None,
        })
        .expect("entry allocates no merge cell");
    for alt_block in &update.blocks[2..] {
        let alt_value = alt_block
            .stmts
            .iter()
            .find_map(|s| match s {
                Stmt::Call { result, .. } => Some(*result),
                _ => None,
            })
            .expect("alternative body calls no maker");
        let stored = alt_block
            .stmts
            .iter()
            .find_map(|s| match s {
                Stmt::Store {
                    value,
                    dest: StoreDest::Slot { ptr, slot: 1 },
                } if *ptr == cell => Some(*value),
                _ => None,
            })
            .expect("alternative writes nothing into the merge cell");
        assert_eq!(stored, alt_value);
        assert!(matches!(alt_block.terminator, Some(Terminator::Break(_))));
    }
    let merge = &update.blocks[1];
    let loaded = merge
        .stmts
        .iter()
        .find_map(|s| match s {
            Stmt::Load {
                source: LoadSource::Slot { ptr, slot: 1 },
                result,
            } if *ptr == cell => Some(*result),
            _ => None,
        })
        .expect("merge block reads nothing out of the cell");
    let returned = match merge.terminator {
        Some(Terminator::Return(value)) => value,
        _ => panic!("merge block does not return"),
    };
    let retyped = merge
        .stmts
        .iter()
        .find_map(|s| match s {
            Stmt::BitCast { from, result } if *from == loaded => Some(*result),
            _ => None,
        })
        .unwrap_or(loaded);
    assert_eq!(returned, retyped);
}

#[test]
fn recursive_call_sites_each_get_a_persistent_slot() {
    // fib n = add@Int (fib (sub@Int n (fromInt@Int 1)))
    //                 (fib (sub@Int n (fromInt@Int 2)))
    let (mut interner, mut analysis) = setup();
    let fib = fresh(&mut analysis, &mut interner, "fib");
    let n = fresh(&mut analysis, &mut interner, "n");
    let prim = analysis.prim.clone();
    let int = Ty::con(prim.int_ty);

    let mut core = Core::new();
    let arg = core.var(n);
    let rec_call = |core: &mut Core, k: i64| {
        let sub = core.var(prim.sub_int);
        let n_use = core.var(n);
        let from_int = core.var(prim.from_int_int);
        let lit = core.lit_int(k);
        let boxed = core.app(from_int, &[lit]);
        let decremented = core.app(sub, &[n_use, boxed]);
        let fib_use = core.var(fib);
        core.app(fib_use, &[decremented])
    };
    let left = rec_call(&mut core, 1);
    let right = rec_call(&mut core, 2);
    let add = core.var(prim.add_int);
    let body = core.app(add, &[left, right]);
    let lam = core.lam(arg, body);
    let bind = core.bind(fib, lam, Ty::fun(int.clone(), int));
    core.top_level(&[bind]);

    let program = compile(&mut core, &mut analysis, &mut interner);
    let node = program.node(program.node_defs[0]);
    assert_eq!(node.state, StateKind::Stateful);
    // One slot per recursive call site.
    assert_eq!(node.members.len(), 2);
    assert_eq!((node.members[0].slot_num, node.members[1].slot_num), (2, 3));

    // The update function threads each sub-node through gep + bitcast and
    // calls itself.
    let update = program.function(node.update_fn.expect("update emitted"));
    let MachTy::Fn { params, .. } = program.types.get(update.ty) else {
        panic!("update is not a function");
    };
    assert_eq!(params.len(), 2, "self pointer plus the argument");
    let body = &update.blocks[0];
    let geps: Vec<_> = body
        .stmts
        .iter()
        .filter_map(|s| match s {
            Stmt::Gep { indices, .. } => Some(indices.to_vec()),
            _ => None,
        })
        .collect();
    assert_eq!(geps, vec![vec![0, 2], vec![0, 3]]);
    let update_value = update.value;
    let self_calls = body
        .stmts
        .iter()
        .filter(|s| matches!(s, Stmt::Call { fn_value, .. } if *fn_value == update_value))
        .count();
    assert_eq!(self_calls, 2);
}

#[test]
fn top_level_node_references_load_from_globals() {
    // x = fromInt@Int 1; y = add@Int x x
    let (mut interner, mut analysis) = setup();
    let x = fresh(&mut analysis, &mut interner, "x");
    let y = fresh(&mut analysis, &mut interner, "y");
    let prim = analysis.prim.clone();
    let int = Ty::con(prim.int_ty);

    let mut core = Core::new();
    let from_int = core.var(prim.from_int_int);
    let one = core.lit_int(1);
    let x_body = core.app(from_int, &[one]);
    let x_bind = core.bind(x, x_body, int.clone());

    let add = core.var(prim.add_int);
    let x_use1 = core.var(x);
    let x_use2 = core.var(x);
    let y_body = core.app(add, &[x_use1, x_use2]);
    let y_bind = core.bind(y, y_body, int);
    core.top_level(&[x_bind, y_bind]);

    let program = compile(&mut core, &mut analysis, &mut interner);
    let y_node = program
        .all_nodes()
        .find(|(_, n)| n.bind_name == y)
        .map(|(_, n)| n)
        .expect("y node");
    let update = program.function(y_node.update_fn.expect("update emitted"));
    let global_loads = update.blocks[0]
        .stmts
        .iter()
        .filter(|s| {
            matches!(
                s,
                Stmt::Load {
                    source: carillon::machine::ir::LoadSource::Slot { ptr, slot: 1 },
                    ..
                } if matches!(ptr.kind, ValueKind::Global(_))
            )
        })
        .count();
    assert_eq!(global_loads, 2);
}
