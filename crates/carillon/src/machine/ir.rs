//! Machine IR data structures: values, statements, blocks, and the three
//! kinds of definitions (structs, functions, nodes), plus the program that
//! owns them all.
//!
//! The IR is a register machine with infinite named registers. The heap is a
//! graph of *nodes*: every source binding becomes a node definition whose
//! struct layout is `{ header, current value, member0, member1, ... }` and
//! whose `update` function recomputes the value once per run of `main`.

use smallvec::SmallVec;

use crate::{
    intern::Symbol,
    machine::ty::MachTyId,
    symtab::{StateKind, SymbolId},
};

/// Index of a function definition in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(u32);

impl FnId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("function id overflow"))
    }
}

/// Index of a node definition in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("node id overflow"))
    }
}

/// Index of a block within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("block id overflow"))
    }
}

/// Literal machine values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MachLit {
    UInt16(u16),
    UInt32(u32),
    Int64(i64),
    F64(f64),
    NullPtr,
}

/// What a value names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueKind {
    /// A virtual register.
    Reg(SymbolId),
    /// The `index`th parameter of the named function.
    Param { fn_name: SymbolId, index: u32 },
    /// A named global.
    Global(SymbolId),
    Lit(MachLit),
}

/// A machine value: a kind plus its IR type. Small and copied freely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Value {
    pub kind: ValueKind,
    pub ty: MachTyId,
}

impl Value {
    #[must_use]
    pub fn reg(name: SymbolId, ty: MachTyId) -> Self {
        Self {
            kind: ValueKind::Reg(name),
            ty,
        }
    }

    #[must_use]
    pub fn global(name: SymbolId, ty: MachTyId) -> Self {
        Self {
            kind: ValueKind::Global(name),
            ty,
        }
    }

    #[must_use]
    pub fn lit(lit: MachLit, ty: MachTyId) -> Self {
        Self {
            kind: ValueKind::Lit(lit),
            ty,
        }
    }
}

/// Arithmetic and logical primitive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BinopKind {
    IAdd,
    ISub,
    IMul,
    IDiv,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

/// Where a load reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadSource {
    /// Dereference a pointer.
    Ptr(Value),
    /// Member `slot` of the struct behind the pointer.
    Slot { ptr: Value, slot: u32 },
    /// The `u32` tag at slot 0 of a heap object.
    Tag(Value),
}

/// Where a store writes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreDest {
    Ptr(Value),
    Slot { ptr: Value, slot: u32 },
    Tag(Value),
}

/// One (non-terminator) statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Call {
        fn_value: Value,
        args: SmallVec<[Value; 4]>,
        result: Value,
    },
    Load {
        source: LoadSource,
        result: Value,
    },
    Store {
        value: Value,
        dest: StoreDest,
    },
    BitCast {
        from: Value,
        result: Value,
    },
    Nalloc {
        ty: MachTyId,
        slots: u16,
        result: Value,
    },
    Gep {
        source: Value,
        indices: SmallVec<[u32; 4]>,
        result: Value,
    },
    Binop {
        op: BinopKind,
        lhs: Value,
        rhs: Value,
        result: Value,
    },
}

/// Every block ends in exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Return(Value),
    Break(BlockId),
    CondBreak {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        scrutinee: Value,
        cases: Vec<(u32, BlockId)>,
        default: Option<BlockId>,
    },
    Unreachable,
}

/// A named statement sequence with a single terminator.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: Symbol,
    pub stmts: Vec<Stmt>,
    pub terminator: Option<Terminator>,
}

impl Block {
    #[must_use]
    pub fn new(name: Symbol) -> Self {
        Self {
            name,
            stmts: Vec::new(),
            terminator: None,
        }
    }
}

/// Classification of a function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FnKind {
    /// Emitted from user code.
    User,
    /// Declared here, implemented by the runtime.
    Runtime,
    /// Emitted by the prim initializer.
    PrimOp,
}

/// A function definition: signature, blocks, and the construction cursor.
#[derive(Debug)]
pub struct FnDef {
    pub name: SymbolId,
    /// Function machine type (always `MachTy::Fn`).
    pub ty: MachTyId,
    pub kind: FnKind,
    pub blocks: Vec<Block>,
    /// Block currently being appended to during construction.
    pub current_block: BlockId,
    /// The callable global value of this function.
    pub value: Value,
}

/// A named struct type registered with the program.
#[derive(Debug, Clone, Copy)]
pub struct StructDef {
    pub name: SymbolId,
    pub ty: MachTyId,
}

/// One persistent member of a node struct. Slot 0 is the header and slot 1
/// the current value, so member slots start at 2 and `members[i].slot_num`
/// is always `i + 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub slot_num: u32,
    pub ty: MachTyId,
}

/// A node definition: the machine image of one source binding.
#[derive(Debug)]
pub struct NodeDef {
    /// The source-level binding symbol.
    pub bind_name: SymbolId,
    /// The synthesized node-type name.
    pub node_type_name: SymbolId,
    /// IR type of one output value per execution.
    pub value_ty: MachTyId,
    /// Function type when the node takes arguments.
    pub fn_ty: Option<MachTyId>,
    pub arg_names: Vec<SymbolId>,
    pub members: Vec<Slot>,
    pub state: StateKind,
    pub mk_fn: Option<FnId>,
    pub init_fn: Option<FnId>,
    pub update_fn: Option<FnId>,
    /// Global holding the node struct pointer, for top-level stateful or
    /// constant nullary nodes.
    pub global_value: Option<Value>,
    /// Enclosing node definition for nested binds.
    pub outer: Option<NodeId>,
    /// Constructor index stored on allocation for sum-typed nodes.
    pub initial_tag: u32,
    /// The synthesized `{ header, value, members... }` struct type,
    /// available after lowering pass 2.
    pub struct_ty: Option<MachTyId>,
}

impl NodeDef {
    /// Appends a member and returns its slot; slots count from 2.
    pub fn add_member(&mut self, ty: MachTyId) -> Slot {
        let slot = Slot {
            slot_num: u32::try_from(self.members.len()).expect("member overflow") + 2,
            ty,
        };
        self.members.push(slot);
        slot
    }
}

/// What a symbol resolves to during machine lowering. This is the
/// machine-stage half of the symbol record's union-over-stage field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MachineRepr {
    Node(NodeId),
    Fn(FnId),
    Value(Value),
}
