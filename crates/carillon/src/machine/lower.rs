//! Core-to-machine lowering, in three passes over the Core tree.
//!
//! Pass 1 lowers data declarations into structs with one maker function per
//! constructor, and gives every bind a node-definition skeleton. Pass 2
//! decides statefulness: referencing a stateful nested node from an outer
//! scope captures it into a persistent slot, and applying a stateful
//! function allocates a per-call-site sub-node; afterwards each top-level
//! node's struct type `{ header, value, members... }` is synthesized and
//! globals are attached. Pass 3 emits the update function bodies.
//!
//! The top-level Core chain arrives dependency-ordered from the SCC
//! analysis, so a callee's layout is always settled before a caller's call
//! sites are laid out — except self-recursion, where the call site persists
//! only the sub-node header.

use crate::{
    core::{Core, CoreAlt, CoreId, CoreKind, CoreLit},
    intern::Interner,
    machine::{
        MachineProgram,
        build::Builder,
        ir::{FnId, FnKind, MachineRepr, NodeDef, NodeId, Terminator, Value},
        ty::{MachTy, MachTyId},
    },
    symtab::{StateKind, SymTable, SymbolId},
    ty::Ty,
};

/// Runs the three lowering passes over a Core tree.
pub fn lower(program: &mut MachineProgram, core: &mut Core, symtab: &mut SymTable, interner: &mut Interner) {
    let mut ctx = Lower {
        program,
        core,
        symtab,
        interner,
    };
    let top_level = ctx.top_level_chain();
    for expr in &top_level {
        ctx.pass1(*expr, None);
    }
    for expr in &top_level {
        ctx.pass2(*expr, None);
    }
    // Update functions are declared for every top-level node before any
    // body is emitted, so mutually recursive nodes can call each other.
    for expr in &top_level {
        ctx.pass3_declare(*expr);
    }
    for expr in &top_level {
        ctx.pass3(*expr, None);
    }
}

struct Lower<'a> {
    program: &'a mut MachineProgram,
    core: &'a mut Core,
    symtab: &'a mut SymTable,
    interner: &'a mut Interner,
}

impl Lower<'_> {
    fn builder(&mut self) -> Builder<'_> {
        Builder::new(self.program, self.symtab, self.interner)
    }

    fn top_level_chain(&self) -> Vec<CoreId> {
        let mut out = Vec::new();
        let mut cursor = self.core.root;
        while let Some(id) = cursor {
            let CoreKind::List { expr, next } = &self.core.get(id).kind else {
                panic!("top-level chain holds a non-list node");
            };
            if let Some(expr) = expr {
                out.push(*expr);
            }
            cursor = *next;
        }
        out
    }

    /// Maps a resolved source type onto the machine type lattice: boxed
    /// constructors become pointers to their structs, type variables become
    /// `Poly*`, arrows become function types.
    fn machine_ty_from_source(&mut self, ty: &Ty) -> MachTyId {
        match ty {
            Ty::Var(_) => self.program.poly_ptr_ty,
            Ty::Con { name, .. } => match self.program.struct_ty(*name) {
                Some(struct_ty) => self.program.types.ptr_to(struct_ty),
                None => self.program.poly_ptr_ty,
            },
            Ty::Fun { .. } => {
                let (params, result) = ty.uncurry();
                let params: Vec<Ty> = params.into_iter().cloned().collect();
                let result = result.clone();
                let param_tys: Vec<MachTyId> = params.iter().map(|p| self.machine_ty_from_source(p)).collect();
                let ret = self.machine_ty_from_source(&result);
                self.program.types.func(ret, param_tys)
            }
        }
    }

    fn node_of(&self, symbol: SymbolId) -> Option<NodeId> {
        match self.symtab.get(symbol).machine_repr {
            Some(MachineRepr::Node(id)) => Some(id),
            _ => None,
        }
    }

    fn update_fn_of(&self, node: NodeId) -> FnId {
        self.program
            .node(node)
            .update_fn
            .expect("update function not yet emitted")
    }

    // ==================================================================
    // Pass 1: data declarations and node skeletons
    // ==================================================================

    fn pass1(&mut self, id: CoreId, outer: Option<NodeId>) {
        match self.core.get(id).kind.clone() {
            CoreKind::DataDecl { symbol, cons } => self.pass1_data_decl(symbol, &cons),
            CoreKind::Bind { symbol, expr } => self.pass1_bind(id, symbol, expr, outer),
            CoreKind::Let { bind, expr } => {
                self.pass1(bind, outer);
                self.pass1(expr, outer);
            }
            CoreKind::Lam { body, .. } => self.pass1(body, outer),
            CoreKind::App { fun, arg, .. } => {
                self.pass1(fun, outer);
                self.pass1(arg, outer);
            }
            CoreKind::Case { expr, alts } => {
                self.pass1(expr, outer);
                for alt in alts {
                    self.pass1(alt.body, outer);
                }
            }
            CoreKind::Var { .. } | CoreKind::Lit(_) | CoreKind::Type { .. } => {}
            CoreKind::DataCon { .. } => unreachable!("constructor outside a data declaration"),
            CoreKind::List { .. } => unreachable!("list node below the top level"),
        }
    }

    /// One struct per declaration, sized by the widest constructor, plus a
    /// maker per constructor that tags and fills it.
    fn pass1_data_decl(&mut self, symbol: SymbolId, cons: &[CoreId]) {
        let mut con_arg_tys: Vec<(SymbolId, Vec<MachTyId>)> = Vec::new();
        let mut max_arity = 0usize;
        for con in cons {
            let CoreKind::DataCon { symbol: con_sym, args } = self.core.get(*con).kind.clone() else {
                panic!("data declaration holds a non-constructor");
            };
            let mut tys = Vec::new();
            for arg in &args {
                let arg_ty = match &self.core.get(*arg).kind {
                    CoreKind::Type { ty } => ty.clone(),
                    _ => panic!("constructor argument is not a type"),
                };
                tys.push(self.machine_ty_from_source(&arg_ty));
            }
            max_arity = max_arity.max(tys.len());
            con_arg_tys.push((con_sym, tys));
        }

        // Header plus one polymorphic slot per possible field.
        let mut members = vec![self.program.node_data_ty];
        members.extend(std::iter::repeat_n(self.program.poly_ptr_ty, max_arity));
        let struct_ty = self.program.types.strukt(symbol, members);
        self.program.register_struct(symbol, struct_ty);

        for (con_num, (con_sym, param_tys)) in con_arg_tys.iter().enumerate() {
            self.pass1_data_con(struct_ty, *con_sym, param_tys, con_num as u32, max_arity);
        }
    }

    fn pass1_data_con(
        &mut self,
        struct_ty: MachTyId,
        con: SymbolId,
        param_tys: &[MachTyId],
        con_num: u32,
        max_arity: usize,
    ) {
        let arity = param_tys.len();
        let mut b = self.builder();
        let con_str = b.interner.resolve(b.symtab.get(con).name).to_owned();
        let mk_name = b.gen_name(&format!("mk{con_str}"));
        let struct_ptr = b.program.types.ptr_to(struct_ty);
        let mk_ty = b.program.types.func(struct_ptr, param_tys.to_vec());
        let mk_fn = b.create_fn(mk_name, mk_ty, FnKind::User);
        let data_ptr = b.build_nalloc(mk_fn, struct_ty, u16::try_from(arity).expect("constructor arity"));
        let tag = b.uint32_value(con_num);
        b.build_store_into_tag(mk_fn, tag, data_ptr);
        for i in 0..max_arity {
            let slot = u32::try_from(i).expect("slot index") + 1;
            if i < arity {
                let param = b.param_reg(mk_fn, u32::try_from(i).expect("parameter index"));
                b.build_store_into_slot(mk_fn, param, data_ptr, slot);
            } else {
                let null = b.null_ptr_value(b.program.poly_ptr_ty);
                b.build_store_into_slot(mk_fn, null, data_ptr, slot);
            }
        }
        b.build_return(mk_fn, data_ptr);
        let fn_value = b.program.function(mk_fn).value;
        let record = self.symtab.get_mut(con);
        record.machine_repr = Some(MachineRepr::Value(fn_value));
        record.is_constructor = true;
        record.con_num = con_num;
        record.arity = i32::try_from(arity).expect("constructor arity");
    }

    /// Allocates the initial node-definition skeleton for one bind.
    fn pass1_bind(&mut self, id: CoreId, symbol: SymbolId, expr: CoreId, outer: Option<NodeId>) {
        let src_ty = self
            .core
            .get(id)
            .ty
            .clone()
            .expect("bind reached lowering without an inferred type");
        let machine_ty = self.machine_ty_from_source(&src_ty);
        let (value_ty, fn_ty) = match self.program.types.get(machine_ty) {
            MachTy::Fn { ret, .. } => (*ret, Some(machine_ty)),
            _ => (machine_ty, None),
        };

        // Synthesized node-type name: the binding, capitalized, plus its id.
        let bind_str = self.interner.resolve(self.symtab.get(symbol).name).to_owned();
        let mut node_str: String = bind_str;
        if let Some(first) = node_str.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        let type_name_sym = self.interner.intern(&format!("{node_str}Node#{}", symbol.index()));
        let node_type_name = self.symtab.insert(crate::symtab::SymbolRecord::new(
            type_name_sym,
            crate::diagnostics::SourceLoc::default(),
        ));

        // Argument names come off the lambda spine.
        let mut arg_names = Vec::new();
        let mut cursor = expr;
        while let CoreKind::Lam { arg, body } = self.core.get(cursor).kind {
            let CoreKind::Var { symbol } = self.core.get(arg).kind else {
                panic!("lambda parameter is not a variable");
            };
            arg_names.push(symbol);
            cursor = body;
        }

        let node = NodeDef {
            bind_name: symbol,
            node_type_name,
            value_ty,
            fn_ty,
            arg_names,
            members: Vec::new(),
            // Every node starts stateful; pass 2 reclassifies.
            state: StateKind::Stateful,
            mk_fn: None,
            init_fn: None,
            update_fn: None,
            global_value: None,
            outer,
            initial_tag: 0,
            struct_ty: None,
        };
        let node_id = self.program.add_node(node);
        self.symtab.get_mut(symbol).machine_repr = Some(MachineRepr::Node(node_id));
        self.symtab.get_mut(node_type_name).machine_repr = Some(MachineRepr::Node(node_id));

        self.pass1(expr, Some(node_id));
    }

    // ==================================================================
    // Pass 2: statefulness and persistent-slot layout
    // ==================================================================

    fn pass2(&mut self, id: CoreId, outer: Option<NodeId>) {
        match self.core.get(id).kind.clone() {
            CoreKind::Bind { symbol, expr } => self.pass2_bind(symbol, expr, outer),
            CoreKind::Let { bind, expr } => {
                self.pass2(bind, outer);
                self.pass2(expr, outer);
            }
            CoreKind::Lam { arg, body } => {
                self.pass2(arg, outer);
                self.pass2(body, outer);
            }
            CoreKind::App { .. } => self.pass2_app(id, outer),
            CoreKind::Case { expr, alts } => {
                self.pass2(expr, outer);
                for alt in alts {
                    self.pass2(alt.body, outer);
                }
            }
            CoreKind::Var { symbol } => self.pass2_var(symbol, outer),
            CoreKind::Lit(_) | CoreKind::DataDecl { .. } | CoreKind::DataCon { .. } | CoreKind::Type { .. } => {}
            CoreKind::List { .. } => unreachable!("list node below the top level"),
        }
    }

    fn calculate_statefulness(&mut self, node: NodeId) {
        let def = self.program.node_mut(node);
        def.state = if def.members.is_empty() {
            if def.arg_names.is_empty() {
                StateKind::Constant
            } else {
                StateKind::Pointwise
            }
        } else {
            StateKind::Stateful
        };
    }

    fn pass2_bind(&mut self, symbol: SymbolId, expr: CoreId, outer: Option<NodeId>) {
        let node_id = self.node_of(symbol).expect("bind without a node skeleton");

        if let Some(outer) = outer {
            self.pass2(expr, Some(outer));
            self.calculate_statefulness(node_id);
            self.symtab.get_mut(symbol).state_kind = self.program.node(node_id).state;
            return;
        }

        self.pass2(expr, Some(node_id));
        self.calculate_statefulness(node_id);
        if let Some(con_num) = self.head_constructor_tag(expr) {
            self.program.node_mut(node_id).initial_tag = con_num;
        }
        self.symtab.get_mut(symbol).state_kind = self.program.node(node_id).state;

        // Synthesize the node struct: header, current value, members.
        let def = self.program.node(node_id);
        let mut members = vec![self.program.node_data_ty, def.value_ty];
        members.extend(def.members.iter().map(|slot| slot.ty));
        let node_type_name = def.node_type_name;
        let struct_ty = self.program.types.strukt(node_type_name, members);
        self.program.node_mut(node_id).struct_ty = Some(struct_ty);
        self.program.register_struct(node_type_name, struct_ty);

        // Top-level stateful or constant nullary nodes live in globals.
        let def = self.program.node(node_id);
        if matches!(def.state, StateKind::Constant | StateKind::Stateful) && def.arg_names.is_empty() {
            let bind_name = def.bind_name;
            let global_ty = self.program.types.ptr_to(struct_ty);
            let global = Value::global(bind_name, global_ty);
            self.program.node_mut(node_id).global_value = Some(global);
            self.program.add_global(global);
        }
    }

    /// The constructor index a node's value starts from, when its body's
    /// head resolves to a data constructor.
    fn head_constructor_tag(&self, expr: CoreId) -> Option<u32> {
        let mut cursor = expr;
        loop {
            match &self.core.get(cursor).kind {
                CoreKind::Lam { body, .. } => cursor = *body,
                CoreKind::App { fun, .. } => cursor = *fun,
                CoreKind::Var { symbol } => {
                    let record = self.symtab.get(*symbol);
                    return record.is_constructor.then_some(record.con_num);
                }
                _ => return None,
            }
        }
    }

    /// Applying a stateful function captures a per-call-site sub-node: the
    /// caller gains the callee's whole layout, headed by a `NodeData` slot
    /// whose index is recorded on the application.
    fn pass2_app(&mut self, id: CoreId, outer: Option<NodeId>) {
        let mut arg_count = 0usize;
        let mut cursor = id;
        while let CoreKind::App { fun, arg, .. } = self.core.get(cursor).kind {
            self.pass2(arg, outer);
            arg_count += 1;
            cursor = fun;
        }
        let CoreKind::Var { symbol } = self.core.get(cursor).kind else {
            panic!("application head is not a variable");
        };

        let repr = self
            .symtab
            .get(symbol)
            .machine_repr
            .expect("application of an unlowered symbol");
        let (fn_ty, callee) = match repr {
            MachineRepr::Node(node_id) => {
                let def = self.program.node(node_id);
                (def.fn_ty.expect("stateful application of a non-function node"), Some(node_id))
            }
            MachineRepr::Fn(fn_id) => (self.program.function(fn_id).ty, None),
            MachineRepr::Value(value) => (value.ty, None),
        };
        let MachTy::Fn { params, .. } = self.program.types.get(fn_ty) else {
            panic!("application of a non-function value");
        };
        assert_eq!(params.len(), arg_count, "application arity mismatch");

        let is_persistent = callee.is_some_and(|n| self.program.node(n).state == StateKind::Stateful);
        if !is_persistent {
            return;
        }
        let outer = outer.expect("stateful application outside any node");
        let callee = callee.expect("persistent call without a node");

        let head_slot = {
            let node_data = self.program.node_data_ty;
            self.program.node_mut(outer).add_member(node_data)
        };
        // Flatten the callee's settled layout behind the header slot. A
        // self-recursive call site has no settled layout yet and persists
        // only the header.
        if let Some(callee_struct) = self.program.node(callee).struct_ty {
            let MachTy::Struct { members, .. } = self.program.types.get(callee_struct).clone() else {
                unreachable!("node struct is not a struct");
            };
            for member in &members[1..] {
                self.program.node_mut(outer).add_member(*member);
            }
        }
        if let CoreKind::App { persistent_slot, .. } = &mut self.core.get_mut(id).kind {
            *persistent_slot = head_slot.slot_num;
        }
    }

    /// Referencing a stateful nested node from an enclosing scope latches
    /// its value into a persistent slot of the referencing node.
    fn pass2_var(&mut self, symbol: SymbolId, outer: Option<NodeId>) {
        let Some(node_id) = self.node_of(symbol) else {
            return;
        };
        if self.program.node(node_id).state != StateKind::Stateful {
            return;
        }
        let Some(outer) = outer else {
            return;
        };
        if self.program.node(outer).arg_names.contains(&symbol) {
            return;
        }
        if self.program.node(node_id).outer.is_none() {
            // Top-level nodes are reached through their global.
            return;
        }
        if self.symtab.get(symbol).persistent_slot != 0 {
            return;
        }
        let value_ty = self.program.node(node_id).value_ty;
        let slot = self.program.node_mut(outer).add_member(value_ty);
        self.symtab.get_mut(symbol).persistent_slot = slot.slot_num;
    }

    // ==================================================================
    // Pass 3: update function bodies
    // ==================================================================

    fn pass3(&mut self, id: CoreId, outer: Option<NodeId>) -> Option<Value> {
        match self.core.get(id).kind.clone() {
            CoreKind::Bind { symbol, expr } => self.pass3_bind(symbol, expr, outer),
            CoreKind::Let { bind, expr } => {
                self.pass3(bind, outer);
                self.pass3(expr, outer)
            }
            CoreKind::Lam { body, .. } => self.pass3(body, outer),
            CoreKind::App { .. } => Some(self.pass3_app(id, outer)),
            CoreKind::Case { expr, alts } => self.pass3_case(id, expr, &alts, outer),
            CoreKind::Var { symbol } => Some(self.pass3_var(symbol, outer)),
            CoreKind::Lit(lit) => Some(self.pass3_lit(lit)),
            CoreKind::DataDecl { .. } | CoreKind::DataCon { .. } | CoreKind::Type { .. } => None,
            CoreKind::List { .. } => unreachable!("list node below the top level"),
        }
    }

    fn pass3_lit(&mut self, lit: CoreLit) -> Value {
        let b = self.builder();
        match lit {
            CoreLit::Int(v) => b.int64_value(v),
            CoreLit::Float(v) => b.f64_value(v),
            CoreLit::Char(c) => b.uint32_value(u32::from(c)),
            CoreLit::String(_) => unreachable!("string literals do not reach machine lowering"),
        }
    }

    fn pass3_bind(&mut self, symbol: SymbolId, expr: CoreId, outer: Option<NodeId>) -> Option<Value> {
        let node_id = self.node_of(symbol).expect("bind without a node skeleton");

        if let Some(outer_id) = outer {
            // A nested bind lowers inline: its value either persists into
            // the enclosing node's slot or binds locally for later lookups.
            let result = self.pass3(expr, outer)?;
            let slot = self.symtab.get(symbol).persistent_slot;
            if slot != 0 {
                let update_fn = self.update_fn_of(outer_id);
                let mut b = self.builder();
                let self_ptr = b.param_reg(update_fn, 0);
                b.build_store_into_slot(update_fn, result, self_ptr, slot);
            } else {
                self.symtab.get_mut(symbol).machine_repr = Some(MachineRepr::Value(result));
            }
            return Some(result);
        }

        if self.program.node(node_id).state == StateKind::Static {
            return self.pass3(expr, outer);
        }

        let update_fn = self.update_fn_of(node_id);
        let result = self
            .pass3(expr, Some(node_id))
            .expect("node body produced no value");
        let mut b = self.builder();
        b.build_return(update_fn, result);
        None
    }

    /// Walks a top-level declaration and creates the (empty) update function
    /// of its node, binding argument names to parameter registers. Runs for
    /// every top-level bind before any body emission so mutually recursive
    /// nodes resolve each other's update functions.
    fn pass3_declare(&mut self, id: CoreId) {
        let CoreKind::Bind { symbol, .. } = self.core.get(id).kind else {
            return;
        };
        let node_id = self.node_of(symbol).expect("bind without a node skeleton");
        if self.program.node(node_id).state == StateKind::Static {
            return;
        }

        // Update function signature: self pointer (when stateful), then the
        // source-level arguments.
        let def = self.program.node(node_id);
        let is_stateful = def.state == StateKind::Stateful;
        let value_ty = def.value_ty;
        let fn_ty = def.fn_ty;
        let arg_names = def.arg_names.clone();
        let struct_ty = def.struct_ty.expect("update declared before layout");

        let mut params = Vec::new();
        if is_stateful {
            params.push(self.program.types.ptr_to(struct_ty));
        }
        if let Some(fn_ty) = fn_ty {
            let MachTy::Fn { params: arg_tys, .. } = self.program.types.get(fn_ty).clone() else {
                unreachable!("node function type is not a function");
            };
            assert_eq!(arg_tys.len(), arg_names.len());
            params.extend(arg_tys);
        }
        let update_ty = self.program.types.func(value_ty, params);

        let bind_str = self.interner.resolve(self.symtab.get(symbol).name).to_owned();
        let mut b = self.builder();
        let update_name = b.gen_name(&format!("update_{bind_str}"));
        let update_fn = b.create_fn(update_name, update_ty, FnKind::User);
        self.program.node_mut(node_id).update_fn = Some(update_fn);

        // Arguments resolve to their parameter registers from here on.
        let offset = u32::from(is_stateful);
        for (i, arg) in arg_names.iter().enumerate() {
            let mut b = self.builder();
            let param = b.param_reg(update_fn, u32::try_from(i).expect("parameter index") + offset);
            self.symtab.get_mut(*arg).machine_repr = Some(MachineRepr::Value(param));
        }
    }

    /// Applications gather their arguments right-to-left off the spine; a
    /// stateful callee additionally receives a pointer to its persistent
    /// sub-node, carved out of the caller's self pointer.
    fn pass3_app(&mut self, id: CoreId, outer: Option<NodeId>) -> Value {
        let outer_id = outer.expect("expression outside any node");
        let update_fn = self.update_fn_of(outer_id);

        let (persistent_slot, mut arg_count) = match self.core.get(id).kind {
            CoreKind::App { persistent_slot, .. } => (persistent_slot, 0usize),
            _ => unreachable!(),
        };
        let mut cursor = id;
        while let CoreKind::App { fun, .. } = self.core.get(cursor).kind {
            arg_count += 1;
            cursor = fun;
        }
        let CoreKind::Var { symbol } = self.core.get(cursor).kind else {
            panic!("application head is not a variable");
        };

        let repr = self
            .symtab
            .get(symbol)
            .machine_repr
            .expect("application of an unlowered symbol");
        let (fn_value, callee_node) = match repr {
            MachineRepr::Node(node_id) => {
                let update = self.update_fn_of(node_id);
                (self.program.function(update).value, Some(node_id))
            }
            MachineRepr::Fn(fn_id) => (self.program.function(fn_id).value, None),
            MachineRepr::Value(value) => (value, None),
        };

        if persistent_slot != 0 {
            arg_count += 1;
        }
        let MachTy::Fn { params, .. } = self.program.types.get(fn_value.ty) else {
            panic!("call through a non-function value");
        };
        assert_eq!(params.len(), arg_count, "call arity mismatch");

        let mut args: Vec<Option<Value>> = vec![None; arg_count];
        let mut index = arg_count;
        let mut cursor = id;
        while let CoreKind::App { fun, arg, .. } = self.core.get(cursor).kind {
            index -= 1;
            args[index] = Some(self.pass3(arg, outer).expect("argument produced no value"));
            cursor = fun;
        }

        if persistent_slot != 0 {
            let callee = callee_node.expect("persistent call without a node");
            let callee_struct = self
                .program
                .node(callee)
                .struct_ty
                .expect("persistent callee without a layout");
            let callee_ptr_ty = self.program.types.ptr_to(callee_struct);
            let mut b = self.builder();
            let self_ptr = b.param_reg(update_fn, 0);
            let gep = b.build_gep(update_fn, self_ptr, &[0, persistent_slot], "gep");
            let sub_node = b.build_bit_cast(update_fn, gep, callee_ptr_ty);
            args[0] = Some(sub_node);
        }

        let args: Vec<Value> = args.into_iter().map(|a| a.expect("argument slot unfilled")).collect();
        let mut b = self.builder();
        b.build_call(update_fn, fn_value, &args, "app")
    }

    fn pass3_var(&mut self, symbol: SymbolId, outer: Option<NodeId>) -> Value {
        let outer_id = outer.expect("expression outside any node");
        let update_fn = self.update_fn_of(outer_id);
        let record = self.symtab.get(symbol);

        if record.is_constructor {
            let repr = record.machine_repr.expect("constructor without a maker");
            let MachineRepr::Value(mk_value) = repr else {
                panic!("constructor resolved to a non-value");
            };
            if record.arity <= 0 {
                let mut b = self.builder();
                return b.build_call(update_fn, mk_value, &[], "con");
            }
            // Applied constructors are called at their application site.
            return mk_value;
        }

        let slot = record.persistent_slot;
        if slot != 0 {
            let mut b = self.builder();
            let self_ptr = b.param_reg(update_fn, 0);
            return b.build_load_slot(update_fn, self_ptr, slot, "var");
        }

        match record.machine_repr.expect("variable lowered before its binding") {
            MachineRepr::Value(value) => value,
            MachineRepr::Fn(fn_id) => self.program.function(fn_id).value,
            MachineRepr::Node(node_id) => {
                // A top-level node reference reads the current value out of
                // the node's global, at slot 1.
                let global = self
                    .program
                    .node(node_id)
                    .global_value
                    .expect("node reference without a global");
                let mut b = self.builder();
                b.build_load_slot(update_fn, global, 1, "glb")
            }
        }
    }


    /// Case: load the scrutinee's tag and dispatch through a switch. Every
    /// alternative body lands in its own block, stores its computed value
    /// into a single-payload cell, and breaks to a merge block that loads
    /// the cell back as the case's value. Collapsing the cell into a phi is
    /// the code generator's job.
    fn pass3_case(&mut self, id: CoreId, expr: CoreId, alts: &[CoreAlt], outer: Option<NodeId>) -> Option<Value> {
        let outer_id = outer.expect("expression outside any node");
        let update_fn = self.update_fn_of(outer_id);

        let scrutinee = self.pass3(expr, outer)?;
        let result_ty = match self.core.get(id).ty.clone() {
            Some(ty) => self.machine_ty_from_source(&ty),
            None => self.program.poly_ptr_ty,
        };

        let cell_ty = self.program.cell_ty;
        let mut b = self.builder();
        let tag = b.build_load_tag(update_fn, scrutinee, "tag");
        let cell = b.build_nalloc(update_fn, cell_ty, 1);
        let entry = b.program.function(update_fn).current_block;
        let merge = b.append_block(update_fn, "case_end");

        let mut cases = Vec::new();
        let mut default = None;
        for alt in alts {
            let mut b = self.builder();
            let block = b.append_block(update_fn, "case_alt");
            let value = self
                .pass3(alt.body, outer)
                .expect("case alternative produced no value");
            let mut b = self.builder();
            b.build_store_into_slot(update_fn, value, cell, 1);
            b.terminate(update_fn, Terminator::Break(merge));
            match alt.pat.map(|p| self.alt_tag(p)) {
                Some(tag_value) => cases.push((tag_value, block)),
                None => default = Some(block),
            }
        }

        let mut b = self.builder();
        b.move_to_block(update_fn, entry);
        b.terminate(
            update_fn,
            Terminator::Switch {
                scrutinee: tag,
                cases,
                default,
            },
        );
        b.move_to_block(update_fn, merge);
        let loaded = b.build_load_slot(update_fn, cell, 1, "case_result");
        // The payload comes back as Poly*; re-type it when the case's own
        // type pins down a concrete pointer.
        let result = match self.program.types.get(result_ty) {
            MachTy::Ptr { .. } if !self.program.types.is_poly_ptr(result_ty) => {
                let mut b = self.builder();
                b.build_bit_cast(update_fn, loaded, result_ty)
            }
            _ => loaded,
        };
        Some(result)
    }

    /// The switch value that an alternative's pattern selects: a constructor's
    /// tag, or an integer pattern literal's value.
    fn alt_tag(&self, pat: CoreId) -> u32 {
        let mut cursor = pat;
        loop {
            match &self.core.get(cursor).kind {
                CoreKind::App { fun, .. } => cursor = *fun,
                CoreKind::Var { symbol } => {
                    let record = self.symtab.get(*symbol);
                    assert!(record.is_constructor, "case pattern head is not a constructor");
                    return record.con_num;
                }
                CoreKind::Lit(CoreLit::Int(v)) => {
                    return u32::try_from(*v).expect("integer pattern out of tag range");
                }
                other => panic!("unsupported case pattern: {other:?}"),
            }
        }
    }
}
