//! Stateless builder helpers that append statements to a function's current
//! block and hand back the produced value, so callers can thread data
//! dependencies straight through.
//!
//! Every builder type-checks its operands up front; constructing ill-typed
//! IR is a programmer error and panics. Register and block names are
//! generated through the interner so the printed program reads like source.

use smallvec::SmallVec;

use crate::{
    intern::Interner,
    machine::{
        MachineProgram,
        ir::{
            Block, BlockId, BinopKind, FnDef, FnId, FnKind, LoadSource, MachLit, MachineRepr, Stmt, StoreDest,
            Terminator, Value, ValueKind,
        },
        ty::{MachTy, MachTyId},
    },
    symtab::{SymTable, SymbolId},
};

/// Construction context: the program plus the tables register names live in.
pub struct Builder<'a> {
    pub program: &'a mut MachineProgram,
    pub symtab: &'a mut SymTable,
    pub interner: &'a mut Interner,
}

impl<'a> Builder<'a> {
    pub fn new(program: &'a mut MachineProgram, symtab: &'a mut SymTable, interner: &'a mut Interner) -> Self {
        Self {
            program,
            symtab,
            interner,
        }
    }

    /// Generates a fresh symbol row named `header#N`.
    pub fn gen_name(&mut self, header: &str) -> SymbolId {
        let n = self.program.gen_count;
        self.program.gen_count += 1;
        let symbol = self.interner.intern(&format!("{header}#{n}"));
        self.symtab.insert(crate::symtab::SymbolRecord::new(
            symbol,
            crate::diagnostics::SourceLoc::default(),
        ))
    }

    /// A fresh register of the given type.
    pub fn create_reg(&mut self, ty: MachTyId, header: &str) -> Value {
        let name = self.gen_name(header);
        Value::reg(name, ty)
    }

    /// The `index`th parameter of a function, typed from its signature.
    ///
    /// # Panics
    /// Panics when the index is out of range.
    pub fn param_reg(&mut self, fn_id: FnId, index: u32) -> Value {
        let fn_def = self.program.function(fn_id);
        let MachTy::Fn { params, .. } = self.program.types.get(fn_def.ty) else {
            panic!("parameter reference into a non-function");
        };
        let ty = *params
            .get(index as usize)
            .unwrap_or_else(|| panic!("parameter index {index} out of range"));
        Value {
            kind: ValueKind::Param {
                fn_name: fn_def.name,
                index,
            },
            ty,
        }
    }

    pub fn uint32_value(&self, v: u32) -> Value {
        Value::lit(MachLit::UInt32(v), self.program.types.uint32)
    }

    pub fn uint16_value(&self, v: u16) -> Value {
        Value::lit(MachLit::UInt16(v), self.program.types.uint16)
    }

    pub fn int64_value(&self, v: i64) -> Value {
        Value::lit(MachLit::Int64(v), self.program.types.int64)
    }

    pub fn f64_value(&self, v: f64) -> Value {
        Value::lit(MachLit::F64(v), self.program.types.f64)
    }

    /// A null pointer of the given pointer type.
    ///
    /// # Panics
    /// Panics when `ty` is not a pointer.
    pub fn null_ptr_value(&self, ty: MachTyId) -> Value {
        assert!(
            matches!(self.program.types.get(ty), MachTy::Ptr { .. }),
            "null literal requires a pointer type"
        );
        Value::lit(MachLit::NullPtr, ty)
    }

    // ------------------------------------------------------------------
    // Functions and blocks
    // ------------------------------------------------------------------

    /// Creates a function with a single `enter` block and registers it both
    /// with the program and as the symbol's machine representation.
    pub fn create_fn(&mut self, name: SymbolId, fn_ty: MachTyId, kind: FnKind) -> FnId {
        debug_assert!(matches!(self.program.types.get(fn_ty), MachTy::Fn { .. }));
        let enter = self.interner.intern("enter");
        let def = FnDef {
            name,
            ty: fn_ty,
            kind,
            blocks: vec![Block::new(enter)],
            current_block: BlockId::new(0),
            value: Value::global(name, fn_ty),
        };
        let id = self.program.add_function(def);
        self.symtab.get_mut(name).machine_repr = Some(MachineRepr::Fn(id));
        id
    }

    /// Appends a new block to a function and makes it current.
    pub fn append_block(&mut self, fn_id: FnId, name_header: &str) -> BlockId {
        let n = self.program.gen_count;
        self.program.gen_count += 1;
        let name = self.interner.intern(&format!("{name_header}{n}"));
        let fn_def = self.program.function_mut(fn_id);
        let id = BlockId::new(fn_def.blocks.len());
        fn_def.blocks.push(Block::new(name));
        fn_def.current_block = id;
        id
    }

    /// Repositions the construction cursor onto an existing block.
    ///
    /// # Panics
    /// Panics when the block does not belong to the function.
    pub fn move_to_block(&mut self, fn_id: FnId, block: BlockId) {
        let fn_def = self.program.function_mut(fn_id);
        assert!(block.index() < fn_def.blocks.len(), "block not in function");
        fn_def.current_block = block;
    }

    fn add_stmt(&mut self, fn_id: FnId, stmt: Stmt) {
        let fn_def = self.program.function_mut(fn_id);
        let block = &mut fn_def.blocks[fn_def.current_block.index()];
        assert!(
            block.terminator.is_none(),
            "statement appended after a block terminator"
        );
        block.stmts.push(stmt);
    }

    /// Sets the current block's terminator.
    ///
    /// # Panics
    /// Panics when the block is already terminated.
    pub fn terminate(&mut self, fn_id: FnId, terminator: Terminator) {
        let fn_def = self.program.function_mut(fn_id);
        let block = &mut fn_def.blocks[fn_def.current_block.index()];
        assert!(block.terminator.is_none(), "block terminated twice");
        block.terminator = Some(terminator);
    }

    // ------------------------------------------------------------------
    // Statement builders
    // ------------------------------------------------------------------

    /// Allocates a struct on the node heap; `slots` hints the capacity the
    /// allocator should reserve.
    pub fn build_nalloc(&mut self, fn_id: FnId, ty: MachTyId, slots: u16) -> Value {
        let ptr_ty = self.program.types.ptr_to(ty);
        let result = self.create_reg(ptr_ty, "data_ptr");
        self.add_stmt(fn_id, Stmt::Nalloc { ty, slots, result });
        result
    }

    /// The struct type a pointer value points at.
    ///
    /// # Panics
    /// Panics when the value is not a pointer to a struct.
    fn pointee_struct_members(&self, ptr: Value) -> (MachTyId, Vec<MachTyId>) {
        let MachTy::Ptr { pointee } = self.program.types.get(ptr.ty) else {
            panic!("expected a pointer value");
        };
        let MachTy::Struct { members, .. } = self.program.types.get(*pointee) else {
            panic!("expected a pointer to a struct");
        };
        (*pointee, members.clone())
    }

    /// Stores `value` into member `slot` of the struct behind `ptr`.
    pub fn build_store_into_slot(&mut self, fn_id: FnId, value: Value, ptr: Value, slot: u32) {
        let (_, members) = self.pointee_struct_members(ptr);
        let slot_ty = members
            .get(slot as usize)
            .copied()
            .unwrap_or_else(|| panic!("slot {slot} out of range"));
        self.program.types.check(value.ty, slot_ty);
        self.add_stmt(
            fn_id,
            Stmt::Store {
                value,
                dest: StoreDest::Slot { ptr, slot },
            },
        );
    }

    /// Stores a `u32` into the tag field (slot 0 of the header).
    pub fn build_store_into_tag(&mut self, fn_id: FnId, value: Value, ptr: Value) {
        self.program.types.check(value.ty, self.program.types.uint32);
        debug_assert!(matches!(self.program.types.get(ptr.ty), MachTy::Ptr { .. }));
        self.add_stmt(
            fn_id,
            Stmt::Store {
                value,
                dest: StoreDest::Tag(ptr),
            },
        );
    }

    /// Stores through a raw pointer.
    pub fn build_store_into_ptr(&mut self, fn_id: FnId, value: Value, ptr: Value) {
        let MachTy::Ptr { pointee } = self.program.types.get(ptr.ty) else {
            panic!("store through a non-pointer");
        };
        self.program.types.check(value.ty, *pointee);
        self.add_stmt(
            fn_id,
            Stmt::Store {
                value,
                dest: StoreDest::Ptr(ptr),
            },
        );
    }

    /// Loads member `slot` of the struct behind `ptr`.
    pub fn build_load_slot(&mut self, fn_id: FnId, ptr: Value, slot: u32, header: &str) -> Value {
        let (_, members) = self.pointee_struct_members(ptr);
        let slot_ty = members
            .get(slot as usize)
            .copied()
            .unwrap_or_else(|| panic!("slot {slot} out of range"));
        let result = self.create_reg(slot_ty, header);
        self.add_stmt(
            fn_id,
            Stmt::Load {
                source: LoadSource::Slot { ptr, slot },
                result,
            },
        );
        result
    }

    /// Loads the `u32` tag of a heap object.
    pub fn build_load_tag(&mut self, fn_id: FnId, ptr: Value, header: &str) -> Value {
        debug_assert!(matches!(self.program.types.get(ptr.ty), MachTy::Ptr { .. }));
        let result = self.create_reg(self.program.types.uint32, header);
        self.add_stmt(
            fn_id,
            Stmt::Load {
                source: LoadSource::Tag(ptr),
                result,
            },
        );
        result
    }

    /// Dereferences a pointer.
    pub fn build_load_ptr(&mut self, fn_id: FnId, ptr: Value, header: &str) -> Value {
        let MachTy::Ptr { pointee } = self.program.types.get(ptr.ty) else {
            panic!("load through a non-pointer");
        };
        let result = self.create_reg(*pointee, header);
        self.add_stmt(
            fn_id,
            Stmt::Load {
                source: LoadSource::Ptr(ptr),
                result,
            },
        );
        result
    }

    /// Computes the address of a nested member.
    ///
    /// The first index steps through the pointer and must be 0; subsequent
    /// indices step through struct members. The result is a pointer to the
    /// leaf type, tracked here so later stores type-check.
    pub fn build_gep(&mut self, fn_id: FnId, source: Value, indices: &[u32], header: &str) -> Value {
        let mut ty = source.ty;
        for (i, index) in indices.iter().enumerate() {
            match self.program.types.get(ty) {
                MachTy::Ptr { pointee } => {
                    assert!(i == 0, "only the first index may step through a pointer");
                    assert!(*index == 0, "pointer step in a gep must be 0");
                    ty = *pointee;
                }
                MachTy::Struct { members, .. } => {
                    ty = *members
                        .get(*index as usize)
                        .unwrap_or_else(|| panic!("gep index {index} out of range"));
                }
                other => panic!("gep through non-aggregate type {other:?}"),
            }
        }
        let result_ty = self.program.types.ptr_to(ty);
        let result = self.create_reg(result_ty, header);
        self.add_stmt(
            fn_id,
            Stmt::Gep {
                source,
                indices: SmallVec::from_slice(indices),
                result,
            },
        );
        result
    }

    /// Reinterprets one pointer as another pointer type.
    ///
    /// # Panics
    /// Panics unless both sides are pointers; literal integers cannot be
    /// bit cast.
    pub fn build_bit_cast(&mut self, fn_id: FnId, value: Value, to_ty: MachTyId) -> Value {
        assert!(
            matches!(self.program.types.get(value.ty), MachTy::Ptr { .. }),
            "bit cast source must be a pointer"
        );
        assert!(
            matches!(self.program.types.get(to_ty), MachTy::Ptr { .. }),
            "bit cast target must be a pointer"
        );
        if let ValueKind::Lit(lit) = value.kind {
            assert!(matches!(lit, MachLit::NullPtr), "cannot bit cast integer literals");
        }
        let result = self.create_reg(to_ty, "cst");
        self.add_stmt(fn_id, Stmt::BitCast { from: value, result });
        result
    }

    /// Calls a function value, checking arity and argument types.
    pub fn build_call(&mut self, fn_id: FnId, fn_value: Value, args: &[Value], header: &str) -> Value {
        let MachTy::Fn { ret, params } = self.program.types.get(fn_value.ty).clone() else {
            panic!("call through a non-function value");
        };
        assert_eq!(params.len(), args.len(), "call arity mismatch");
        for (param, arg) in params.iter().zip(args.iter()) {
            self.program.types.check(*param, arg.ty);
        }
        let result = self.create_reg(ret, header);
        self.add_stmt(
            fn_id,
            Stmt::Call {
                fn_value,
                args: SmallVec::from_slice(args),
                result,
            },
        );
        result
    }

    /// Applies a primitive arithmetic op to two operands of the same
    /// primitive type; the result has the operand type.
    pub fn build_binop(&mut self, fn_id: FnId, op: BinopKind, lhs: Value, rhs: Value) -> Value {
        self.program.types.check(lhs.ty, rhs.ty);
        let result = self.create_reg(lhs.ty, "op");
        self.add_stmt(fn_id, Stmt::Binop { op, lhs, rhs, result });
        result
    }

    /// Terminates the current block with a return.
    pub fn build_return(&mut self, fn_id: FnId, value: Value) {
        let fn_ty = self.program.function(fn_id).ty;
        let MachTy::Fn { ret, .. } = self.program.types.get(fn_ty) else {
            panic!("return from a non-function");
        };
        self.program.types.check(*ret, value.ty);
        self.terminate(fn_id, Terminator::Return(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::prim::{self, PrimNames};
    use crate::symtab::ScopedSymTable;

    fn setup() -> (MachineProgram, SymTable, Interner, PrimNames) {
        let mut interner = Interner::new();
        let mut scoped = ScopedSymTable::new();
        let prim = prim::install_names(&mut scoped, &mut interner);
        let program = MachineProgram::new(&prim);
        (program, scoped.table, interner, prim)
    }

    #[test]
    fn blocks_reject_statements_after_terminator() {
        let (mut program, mut symtab, mut interner, _prim) = setup();
        let mut b = Builder::new(&mut program, &mut symtab, &mut interner);
        let name = b.gen_name("f");
        let i64_ty = b.program.types.int64;
        let fn_ty = b.program.types.func(i64_ty, vec![]);
        let f = b.create_fn(name, fn_ty, FnKind::User);
        let v = b.int64_value(3);
        b.build_return(f, v);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut b = Builder::new(&mut program, &mut symtab, &mut interner);
            let lhs = b.int64_value(1);
            let rhs = b.int64_value(2);
            b.build_binop(f, BinopKind::IAdd, lhs, rhs);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn call_checks_arity_and_types() {
        let (mut program, mut symtab, mut interner, _prim) = setup();
        let mut b = Builder::new(&mut program, &mut symtab, &mut interner);
        let callee_name = b.gen_name("callee");
        let i64_ty = b.program.types.int64;
        let callee_ty = b.program.types.func(i64_ty, vec![i64_ty]);
        let callee = b.create_fn(callee_name, callee_ty, FnKind::User);
        let callee_value = b.program.function(callee).value;

        let caller_name = b.gen_name("caller");
        let caller_ty = b.program.types.func(i64_ty, vec![]);
        let caller = b.create_fn(caller_name, caller_ty, FnKind::User);
        let arg = b.int64_value(7);
        let result = b.build_call(caller, callee_value, &[arg], "r");
        assert_eq!(result.ty, i64_ty);
    }

    #[test]
    fn gep_tracks_leaf_types() {
        let (mut program, mut symtab, mut interner, _prim) = setup();
        let mut b = Builder::new(&mut program, &mut symtab, &mut interner);
        let s_name = b.gen_name("S");
        let u32_ty = b.program.types.uint32;
        let i64_ty = b.program.types.int64;
        let s_ty = b.program.types.strukt(s_name, vec![u32_ty, i64_ty]);
        let fn_name = b.gen_name("f");
        let fn_ty = b.program.types.func(i64_ty, vec![]);
        let f = b.create_fn(fn_name, fn_ty, FnKind::User);
        let obj = b.build_nalloc(f, s_ty, 2);
        let leaf = b.build_gep(f, obj, &[0, 1], "gep");
        let MachTy::Ptr { pointee } = b.program.types.get(leaf.ty) else {
            panic!("gep result must be a pointer");
        };
        assert_eq!(*pointee, i64_ty);
    }

    #[test]
    fn store_into_slot_accepts_poly_wildcard() {
        let (mut program, mut symtab, mut interner, _prim) = setup();
        let poly_ptr = program.poly_ptr_ty;
        let mut b = Builder::new(&mut program, &mut symtab, &mut interner);
        let s_name = b.gen_name("Cell");
        let node_data = b.program.node_data_ty;
        let s_ty = b.program.types.strukt(s_name, vec![node_data, poly_ptr]);
        let fn_name = b.gen_name("mk");
        let s_ptr = b.program.types.ptr_to(s_ty);
        let i64_ptr = b.program.types.ptr_to(b.program.types.int64);
        let fn_ty = b.program.types.func(s_ptr, vec![i64_ptr]);
        let f = b.create_fn(fn_name, fn_ty, FnKind::User);
        let obj = b.build_nalloc(f, s_ty, 1);
        let arg = b.param_reg(f, 0);
        // An i64* stores cleanly into a Poly* slot.
        b.build_store_into_slot(f, arg, obj, 1);
        b.build_return(f, obj);
    }
}
