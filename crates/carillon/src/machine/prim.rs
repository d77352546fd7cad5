//! Built-in types, constructors, and arithmetic primitives.
//!
//! Primitives are installed in two steps that bracket the user pipeline:
//!
//! * [`install_names`] runs before renaming and seeds the top scope with
//!   every built-in name — type constructors, data constructors, the
//!   type-class method names the reifier rewrites operators into, and their
//!   monomorphized `method@Type` instances — so user code always resolves.
//! * [`install_machine`] runs once into an empty machine program, right
//!   before lowering, and gives those rows their machine bodies: the boxed
//!   numeric types, one `mk` maker per constructor, the `fromInt@Int` /
//!   `fromRational@Float` boxing conversions, and the boxed arithmetic ops.

use crate::{
    intern::Interner,
    machine::{
        MachineProgram,
        build::Builder,
        ir::{BinopKind, FnKind, MachineRepr, Value},
        ty::MachTyId,
    },
    symtab::{Namespace, ScopedSymTable, SymTable, SymbolId, SymbolRecord},
};

/// Symbol rows of every built-in name, captured at install time so later
/// stages never do string lookups.
#[derive(Debug, Clone)]
pub struct PrimNames {
    // IR-internal struct names (never user-visible).
    pub node_data: SymbolId,
    pub poly: SymbolId,
    pub env: SymbolId,
    pub cell: SymbolId,
    // Type constructors.
    pub int_ty: SymbolId,
    pub float_ty: SymbolId,
    pub rational_ty: SymbolId,
    pub audio_ty: SymbolId,
    pub bool_ty: SymbolId,
    pub unit_ty: SymbolId,
    pub list_ty: SymbolId,
    pub maybe_ty: SymbolId,
    pub array_ty: SymbolId,
    // Data constructors.
    pub int_con: SymbolId,
    pub float_con: SymbolId,
    pub rational_con: SymbolId,
    pub audio_con: SymbolId,
    pub unit_con: SymbolId,
    pub cons_con: SymbolId,
    pub nil_con: SymbolId,
    pub just_con: SymbolId,
    pub nothing_con: SymbolId,
    pub array_con: SymbolId,
    pub false_con: SymbolId,
    pub true_con: SymbolId,
    // Type-class method names the reifier rewrites operators into.
    pub from_int: SymbolId,
    pub from_rational: SymbolId,
    pub add: SymbolId,
    pub sub: SymbolId,
    pub mul: SymbolId,
    pub div: SymbolId,
    pub eq: SymbolId,
    pub neq: SymbolId,
    pub lt: SymbolId,
    pub gt: SymbolId,
    pub lte: SymbolId,
    pub gte: SymbolId,
    pub bind: SymbolId,
    pub append: SymbolId,
    // Monomorphized instances referenced by elaborated Core.
    pub from_int_int: SymbolId,
    pub add_int: SymbolId,
    pub sub_int: SymbolId,
    pub mul_int: SymbolId,
    pub div_int: SymbolId,
    pub from_rational_float: SymbolId,
    pub add_float: SymbolId,
    pub sub_float: SymbolId,
    pub mul_float: SymbolId,
    pub div_float: SymbolId,
}

fn ty_name(scoped: &mut ScopedSymTable, interner: &mut Interner, name: &str) -> SymbolId {
    let symbol = interner.intern(name);
    scoped.new_symbol(SymbolRecord::new(symbol, crate::diagnostics::SourceLoc::default()), Namespace::Type)
}

fn con_name(
    scoped: &mut ScopedSymTable,
    interner: &mut Interner,
    name: &str,
    arity: i32,
    con_num: u32,
    is_enum: bool,
) -> SymbolId {
    let symbol = interner.intern(name);
    let mut record = SymbolRecord::new(symbol, crate::diagnostics::SourceLoc::default());
    record.is_constructor = true;
    record.arity = arity;
    record.con_num = con_num;
    record.is_enum = is_enum;
    scoped.new_symbol(record, Namespace::Term)
}

fn method_name(scoped: &mut ScopedSymTable, interner: &mut Interner, name: &str, arity: i32) -> SymbolId {
    let symbol = interner.intern(name);
    let mut record = SymbolRecord::new(symbol, crate::diagnostics::SourceLoc::default());
    record.arity = arity;
    scoped.new_symbol(record, Namespace::Term)
}

/// Seeds the top scope with every built-in name. Runs before renaming.
pub fn install_names(scoped: &mut ScopedSymTable, interner: &mut Interner) -> PrimNames {
    let node_data = scoped.new_generated(interner.intern("NodeData"));
    let poly = scoped.new_generated(interner.intern("Poly"));
    let env = scoped.new_generated(interner.intern("Env"));
    let cell = scoped.new_generated(interner.intern("Cell"));

    let int_ty = ty_name(scoped, interner, "Int");
    let float_ty = ty_name(scoped, interner, "Float");
    let rational_ty = ty_name(scoped, interner, "Rational");
    let audio_ty = ty_name(scoped, interner, "Audio");
    let bool_ty = ty_name(scoped, interner, "Bool");
    let unit_ty = ty_name(scoped, interner, "()");
    let list_ty = ty_name(scoped, interner, "[]");
    let maybe_ty = ty_name(scoped, interner, "Maybe");
    let array_ty = ty_name(scoped, interner, "Array");

    let int_con = con_name(scoped, interner, "Int", 1, 0, false);
    let float_con = con_name(scoped, interner, "Float", 1, 0, false);
    let rational_con = con_name(scoped, interner, "Rational", 2, 0, false);
    let audio_con = con_name(scoped, interner, "Audio", 1, 0, false);
    let unit_con = con_name(scoped, interner, "()", 0, 0, true);
    let cons_con = con_name(scoped, interner, ":", 2, 0, false);
    let nil_con = con_name(scoped, interner, "[]", 0, 1, false);
    let just_con = con_name(scoped, interner, "Just", 1, 0, false);
    let nothing_con = con_name(scoped, interner, "Nothing", 0, 1, false);
    let array_con = con_name(scoped, interner, "Array", 1, 0, false);
    let false_con = con_name(scoped, interner, "False", 0, 0, true);
    let true_con = con_name(scoped, interner, "True", 0, 1, true);

    let from_int = method_name(scoped, interner, "fromInt", 1);
    let from_rational = method_name(scoped, interner, "fromRational", 1);
    let add = method_name(scoped, interner, "add", 2);
    let sub = method_name(scoped, interner, "sub", 2);
    let mul = method_name(scoped, interner, "mul", 2);
    let div = method_name(scoped, interner, "div", 2);
    let eq = method_name(scoped, interner, "eq", 2);
    let neq = method_name(scoped, interner, "neq", 2);
    let lt = method_name(scoped, interner, "lt", 2);
    let gt = method_name(scoped, interner, "gt", 2);
    let lte = method_name(scoped, interner, "lte", 2);
    let gte = method_name(scoped, interner, "gte", 2);
    let bind = method_name(scoped, interner, "bind", 2);
    let append = method_name(scoped, interner, "append", 2);

    let from_int_int = method_name(scoped, interner, "fromInt@Int", 1);
    let add_int = method_name(scoped, interner, "add@Int", 2);
    let sub_int = method_name(scoped, interner, "sub@Int", 2);
    let mul_int = method_name(scoped, interner, "mul@Int", 2);
    let div_int = method_name(scoped, interner, "div@Int", 2);
    let from_rational_float = method_name(scoped, interner, "fromRational@Float", 1);
    let add_float = method_name(scoped, interner, "add@Float", 2);
    let sub_float = method_name(scoped, interner, "sub@Float", 2);
    let mul_float = method_name(scoped, interner, "mul@Float", 2);
    let div_float = method_name(scoped, interner, "div@Float", 2);

    PrimNames {
        node_data,
        poly,
        env,
        cell,
        int_ty,
        float_ty,
        rational_ty,
        audio_ty,
        bool_ty,
        unit_ty,
        list_ty,
        maybe_ty,
        array_ty,
        int_con,
        float_con,
        rational_con,
        audio_con,
        unit_con,
        cons_con,
        nil_con,
        just_con,
        nothing_con,
        array_con,
        false_con,
        true_con,
        from_int,
        from_rational,
        add,
        sub,
        mul,
        div,
        eq,
        neq,
        lt,
        gt,
        lte,
        gte,
        bind,
        append,
        from_int_int,
        add_int,
        sub_int,
        mul_int,
        div_int,
        from_rational_float,
        add_float,
        sub_float,
        mul_float,
        div_float,
    }
}

/// Emits one constructor maker: allocate, tag, fill parameter slots, null
/// out the rest, return the pointer. Returns the maker's callable value.
fn create_prim_con(
    b: &mut Builder<'_>,
    struct_ty: MachTyId,
    con: SymbolId,
    elems: &[MachTyId],
    tag: u32,
) -> Value {
    let con_str = b.interner.resolve(b.symtab.get(con).name).to_owned();
    let mk_name = b.gen_name(&format!("mk{con_str}"));
    let struct_ptr = b.program.types.ptr_to(struct_ty);
    let mk_ty = b.program.types.func(struct_ptr, elems.to_vec());
    let mk_fn = b.create_fn(mk_name, mk_ty, FnKind::PrimOp);
    let data_ptr = b.build_nalloc(mk_fn, struct_ty, u16::try_from(elems.len()).expect("constructor arity"));
    let tag_value = b.uint32_value(tag);
    b.build_store_into_tag(mk_fn, tag_value, data_ptr);
    for i in 0..elems.len() {
        let param = b.param_reg(mk_fn, u32::try_from(i).expect("parameter index"));
        b.build_store_into_slot(mk_fn, param, data_ptr, u32::try_from(i).expect("slot") + 1);
    }
    let member_count = match b.program.types.get(struct_ty) {
        crate::machine::ty::MachTy::Struct { members, .. } => members.len(),
        _ => unreachable!("prim constructor over a non-struct"),
    };
    for slot in (elems.len() + 1)..member_count {
        let null = b.null_ptr_value(b.program.poly_ptr_ty);
        b.build_store_into_slot(mk_fn, null, data_ptr, u32::try_from(slot).expect("slot"));
    }
    b.build_return(mk_fn, data_ptr);
    let fn_value = b.program.function(mk_fn).value;
    b.symtab.get_mut(con).machine_repr = Some(MachineRepr::Value(fn_value));
    fn_value
}

/// Registers a product type and its single constructor in one step.
fn create_prim_type(
    b: &mut Builder<'_>,
    ty_name: SymbolId,
    con: SymbolId,
    members: &[MachTyId],
) -> MachTyId {
    let struct_ty = b.program.types.strukt(ty_name, members.to_vec());
    b.program.register_struct(ty_name, struct_ty);
    create_prim_con(b, struct_ty, con, &members[1..], 0);
    struct_ty
}

/// Emits one boxed arithmetic function: unbox both operands, apply the
/// primitive op, box the result through the type's maker.
fn create_prim_binop(
    b: &mut Builder<'_>,
    fn_name: SymbolId,
    boxed_ptr: MachTyId,
    mk_fn_value: Value,
    op: BinopKind,
) {
    let fn_ty = b.program.types.func(boxed_ptr, vec![boxed_ptr, boxed_ptr]);
    let fn_id = b.create_fn(fn_name, fn_ty, FnKind::PrimOp);
    let lhs_boxed = b.param_reg(fn_id, 0);
    let rhs_boxed = b.param_reg(fn_id, 1);
    let lhs = b.build_load_slot(fn_id, lhs_boxed, 1, "lhs");
    let rhs = b.build_load_slot(fn_id, rhs_boxed, 1, "rhs");
    let result = b.build_binop(fn_id, op, lhs, rhs);
    let boxed = b.build_call(fn_id, mk_fn_value, &[result], "box");
    b.build_return(fn_id, boxed);
}

/// The monomorphized numeric conversion behind the reifier's `fromInt` /
/// `fromRational` desugaring: literals reach it as raw machine values and
/// leave boxed.
fn create_from_fn(b: &mut Builder<'_>, fn_name: SymbolId, raw: MachTyId, boxed_ptr: MachTyId, mk_fn_value: Value) {
    let fn_ty = b.program.types.func(boxed_ptr, vec![raw]);
    let fn_id = b.create_fn(fn_name, fn_ty, FnKind::PrimOp);
    let param = b.param_reg(fn_id, 0);
    let boxed = b.build_call(fn_id, mk_fn_value, &[param], "box");
    b.build_return(fn_id, boxed);
}

/// Installs the machine bodies of every primitive into an empty program.
pub fn install_machine(
    program: &mut MachineProgram,
    symtab: &mut SymTable,
    interner: &mut Interner,
    prim: &PrimNames,
) {
    let mut b = Builder::new(program, symtab, interner);
    let node_data = b.program.node_data_ty;
    let poly_ptr = b.program.poly_ptr_ty;
    let i64_ty = b.program.types.int64;
    let f64_ty = b.program.types.f64;

    // The global environment header.
    let env_ty = b.program.types.strukt(prim.env, vec![node_data]);
    b.program.register_struct(prim.env, env_ty);

    // Boxed numerics.
    let int_ty = b.program.types.strukt(prim.int_ty, vec![node_data, i64_ty]);
    b.program.register_struct(prim.int_ty, int_ty);
    let mk_int = create_prim_con(&mut b, int_ty, prim.int_con, &[i64_ty], 0);
    b.program.mk_int_fn = Some(mk_int);

    let float_ty = b.program.types.strukt(prim.float_ty, vec![node_data, f64_ty]);
    b.program.register_struct(prim.float_ty, float_ty);
    let mk_float = create_prim_con(&mut b, float_ty, prim.float_con, &[f64_ty], 0);
    b.program.mk_float_fn = Some(mk_float);

    create_prim_type(&mut b, prim.rational_ty, prim.rational_con, &[node_data, i64_ty, i64_ty]);

    let f64_ptr = b.program.types.ptr_to(f64_ty);
    create_prim_type(&mut b, prim.audio_ty, prim.audio_con, &[node_data, f64_ptr]);

    create_prim_type(&mut b, prim.unit_ty, prim.unit_con, &[node_data]);

    // Lists: one struct, a maker per constructor, tags by position.
    let list_ty = b.program.types.strukt(prim.list_ty, vec![node_data, poly_ptr, poly_ptr]);
    b.program.register_struct(prim.list_ty, list_ty);
    let list_ptr = b.program.types.ptr_to(list_ty);
    create_prim_con(&mut b, list_ty, prim.cons_con, &[poly_ptr, list_ptr], 0);
    create_prim_con(&mut b, list_ty, prim.nil_con, &[], 1);

    // Maybe.
    let maybe_ty = b.program.types.strukt(prim.maybe_ty, vec![node_data, poly_ptr]);
    b.program.register_struct(prim.maybe_ty, maybe_ty);
    create_prim_con(&mut b, maybe_ty, prim.just_con, &[poly_ptr], 0);
    create_prim_con(&mut b, maybe_ty, prim.nothing_con, &[], 1);

    // Bool: an enum, two nullary makers.
    let bool_ty = b.program.types.strukt(prim.bool_ty, vec![node_data]);
    b.program.register_struct(prim.bool_ty, bool_ty);
    create_prim_con(&mut b, bool_ty, prim.false_con, &[], 0);
    create_prim_con(&mut b, bool_ty, prim.true_con, &[], 1);

    create_prim_type(&mut b, prim.array_ty, prim.array_con, &[node_data, poly_ptr]);

    // Int functions.
    let int_ptr = b.program.types.ptr_to(int_ty);
    create_from_fn(&mut b, prim.from_int_int, i64_ty, int_ptr, mk_int);
    create_prim_binop(&mut b, prim.add_int, int_ptr, mk_int, BinopKind::IAdd);
    create_prim_binop(&mut b, prim.sub_int, int_ptr, mk_int, BinopKind::ISub);
    create_prim_binop(&mut b, prim.mul_int, int_ptr, mk_int, BinopKind::IMul);
    create_prim_binop(&mut b, prim.div_int, int_ptr, mk_int, BinopKind::IDiv);

    // Float functions.
    let float_ptr = b.program.types.ptr_to(float_ty);
    create_from_fn(&mut b, prim.from_rational_float, f64_ty, float_ptr, mk_float);
    create_prim_binop(&mut b, prim.add_float, float_ptr, mk_float, BinopKind::FAdd);
    create_prim_binop(&mut b, prim.sub_float, float_ptr, mk_float, BinopKind::FSub);
    create_prim_binop(&mut b, prim.mul_float, float_ptr, mk_float, BinopKind::FMul);
    create_prim_binop(&mut b, prim.div_float, float_ptr, mk_float, BinopKind::FDiv);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::ir::{Stmt, Terminator};

    #[test]
    fn install_names_makes_operators_resolvable() {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let prim = install_names(&mut scoped, &mut interner);
        let add = interner.intern("add");
        assert_eq!(scoped.find(add, Namespace::Term), prim.add);
        let int = interner.intern("Int");
        assert_eq!(scoped.find(int, Namespace::Type), prim.int_ty);
        assert!(scoped.table.get(prim.just_con).is_constructor);
        assert_eq!(scoped.table.get(prim.cons_con).arity, 2);
    }

    #[test]
    fn boxed_add_unboxes_applies_and_reboxes() {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let prim = install_names(&mut scoped, &mut interner);
        let mut program = MachineProgram::new(&prim);
        install_machine(&mut program, &mut scoped.table, &mut interner, &prim);

        let Some(MachineRepr::Fn(add_fn)) = scoped.table.get(prim.add_int).machine_repr else {
            panic!("add@Int has no machine body");
        };
        let body = &program.function(add_fn).blocks[0];
        let loads = body.stmts.iter().filter(|s| matches!(s, Stmt::Load { .. })).count();
        let binops = body.stmts.iter().filter(|s| matches!(s, Stmt::Binop { .. })).count();
        let calls = body.stmts.iter().filter(|s| matches!(s, Stmt::Call { .. })).count();
        assert_eq!((loads, binops, calls), (2, 1, 1));
        assert!(matches!(body.terminator, Some(Terminator::Return(_))));
    }

    #[test]
    fn sum_type_makers_tag_by_position() {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let prim = install_names(&mut scoped, &mut interner);
        let mut program = MachineProgram::new(&prim);
        install_machine(&mut program, &mut scoped.table, &mut interner, &prim);

        // Nothing's maker writes tag 1; it also null-fills the payload slot.
        let Some(MachineRepr::Value(nothing_mk)) = scoped.table.get(prim.nothing_con).machine_repr else {
            panic!("Nothing has no maker");
        };
        let fn_id = program
            .functions
            .iter()
            .position(|f| f.value == nothing_mk)
            .expect("maker registered");
        let body = &program.functions[fn_id].blocks[0];
        let tag_stores = body
            .stmts
            .iter()
            .filter_map(|s| match s {
                Stmt::Store {
                    value,
                    dest: crate::machine::ir::StoreDest::Tag(_),
                } => Some(*value),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(tag_stores.len(), 1);
        assert!(matches!(
            tag_stores[0].kind,
            crate::machine::ir::ValueKind::Lit(crate::machine::ir::MachLit::UInt32(1))
        ));
    }
}
