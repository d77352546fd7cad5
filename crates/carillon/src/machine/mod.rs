//! The typed, register-based abstract machine IR and its construction.
//!
//! This is the pipeline's output stage: a lowering from desugared Core to a
//! program of struct definitions, functions, node definitions, and globals.
//! The defining feature of the language — every binding is a node that
//! retains state across executions of `main` — lives here: lowering decides
//! which bindings need persistent slots and emits the per-node `update`
//! functions a code generator consumes.
//!
//! Lowering runs in three passes over Core:
//!
//! 1. lower data declarations to structs and constructor functions, and
//!    allocate a node-definition skeleton for every bind;
//! 2. compute statefulness and persistent-slot layout;
//! 3. emit the update function bodies.

pub mod build;
pub mod ir;
pub mod lower;
pub mod prim;
pub mod print;
pub mod ty;

use indexmap::IndexMap;

use crate::{
    core::Core,
    intern::Interner,
    symtab::{SymTable, SymbolId},
};

use self::{
    ir::{FnDef, FnId, NodeDef, NodeId, StructDef, Value},
    prim::PrimNames,
    ty::{MachTyId, MachineTypes},
};

/// The machine program: four ordered definition vectors plus cached handles
/// to the primitive types every heap object embeds. One arena-of-vectors
/// owns all machine entities; consumers enumerate the vectors in order.
#[derive(Debug)]
pub struct MachineProgram {
    pub types: MachineTypes,
    pub structs: Vec<StructDef>,
    pub functions: Vec<FnDef>,
    nodes: Vec<NodeDef>,
    /// Top-level node definitions, in emission order.
    pub node_defs: Vec<NodeId>,
    pub globals: Vec<Value>,
    struct_index: IndexMap<SymbolId, MachTyId>,
    /// The `{ u32, u32 }` header present on every heap-allocated object.
    pub node_data_ty: MachTyId,
    /// The wildcard struct standing in for unresolved values.
    pub poly_ty: MachTyId,
    pub poly_ptr_ty: MachTyId,
    /// The `{ header, Poly* }` single-payload cell that backs control-flow
    /// join points such as case merges.
    pub cell_ty: MachTyId,
    /// Boxing constructors cached for the reifier-inserted conversions.
    pub mk_int_fn: Option<Value>,
    pub mk_float_fn: Option<Value>,
    pub(crate) gen_count: u32,
}

impl MachineProgram {
    /// Creates the empty program with the `NodeData` header and `Poly`
    /// wildcard structs installed and cached.
    #[must_use]
    pub fn new(prim: &PrimNames) -> Self {
        let mut types = MachineTypes::new();
        let u32_ty = types.uint32;
        let node_data_ty = types.strukt(prim.node_data, vec![u32_ty, u32_ty]);
        let poly_ty = types.strukt(prim.poly, vec![node_data_ty]);
        types.set_poly(poly_ty);
        let poly_ptr_ty = types.ptr_to(poly_ty);
        let cell_ty = types.strukt(prim.cell, vec![node_data_ty, poly_ptr_ty]);
        let mut program = Self {
            types,
            structs: Vec::new(),
            functions: Vec::new(),
            nodes: Vec::new(),
            node_defs: Vec::new(),
            globals: Vec::new(),
            struct_index: IndexMap::new(),
            node_data_ty,
            poly_ty,
            poly_ptr_ty,
            cell_ty,
            mk_int_fn: None,
            mk_float_fn: None,
            gen_count: 0,
        };
        program.register_struct(prim.node_data, node_data_ty);
        program.register_struct(prim.poly, poly_ty);
        program.register_struct(prim.cell, cell_ty);
        program
    }

    /// Registers a struct type under its name for later lookup.
    pub fn register_struct(&mut self, name: SymbolId, ty: MachTyId) {
        self.structs.push(StructDef { name, ty });
        self.struct_index.insert(name, ty);
    }

    /// The struct type previously registered under `name`.
    #[must_use]
    pub fn struct_ty(&self, name: SymbolId) -> Option<MachTyId> {
        self.struct_index.get(&name).copied()
    }

    pub fn add_function(&mut self, def: FnDef) -> FnId {
        let id = FnId::new(self.functions.len());
        self.functions.push(def);
        id
    }

    #[must_use]
    pub fn function(&self, id: FnId) -> &FnDef {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FnId) -> &mut FnDef {
        &mut self.functions[id.index()]
    }

    /// Adds a node definition; top-level nodes are also registered in the
    /// program's `node_defs` vector.
    pub fn add_node(&mut self, def: NodeDef) -> NodeId {
        let top_level = def.outer.is_none();
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(def);
        if top_level {
            self.node_defs.push(id);
        }
        id
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeDef {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeDef {
        &mut self.nodes[id.index()]
    }

    /// All node definitions (nested included), in creation order.
    pub fn all_nodes(&self) -> impl Iterator<Item = (NodeId, &NodeDef)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId::new(i), n))
    }

    pub fn add_global(&mut self, value: Value) {
        debug_assert!(matches!(value.kind, ir::ValueKind::Global(_)));
        self.globals.push(value);
    }
}

/// Runs prim installation and the three lowering passes over a Core tree,
/// producing the machine program.
///
/// The symbol table must already carry the renamer's and inferencer's
/// annotations; `prim` is the name set installed before renaming.
pub fn core_to_machine(
    core: &mut Core,
    symtab: &mut SymTable,
    interner: &mut Interner,
    prim: &PrimNames,
) -> MachineProgram {
    let mut program = MachineProgram::new(prim);
    prim::install_machine(&mut program, symtab, interner, prim);
    lower::lower(&mut program, core, symtab, interner);
    program
}
