//! Textual rendering of a machine program, for verbose phase output and for
//! eyeballing lowering results in tests.

use std::fmt::Write;

use crate::{
    intern::Interner,
    machine::{
        MachineProgram,
        ir::{Block, FnDef, LoadSource, MachLit, NodeDef, Stmt, StoreDest, Terminator, Value, ValueKind},
    },
    symtab::{SymTable, SymbolId},
};

/// Renders the whole program: structs, functions, node definitions, globals.
#[must_use]
pub fn dump_program(program: &MachineProgram, symtab: &SymTable, interner: &Interner) -> String {
    let p = Printer {
        program,
        symtab,
        interner,
    };
    let mut out = String::new();
    for def in &program.structs {
        p.struct_def(&mut out, def.name, def.ty);
    }
    out.push('\n');
    for def in &program.functions {
        p.fn_def(&mut out, def);
    }
    for id in &program.node_defs {
        p.node_def(&mut out, program.node(*id));
    }
    if !program.globals.is_empty() {
        let _ = writeln!(out, "globals:");
        for global in &program.globals {
            let _ = writeln!(out, "  {} : {}", p.value(*global), p.ty(global.ty));
        }
    }
    out
}

struct Printer<'a> {
    program: &'a MachineProgram,
    symtab: &'a SymTable,
    interner: &'a Interner,
}

impl Printer<'_> {
    fn name(&self, id: SymbolId) -> &str {
        if id.is_null() {
            return "<null>";
        }
        self.interner.get(self.symtab.get(id).name).unwrap_or("<?>")
    }

    fn ty(&self, ty: crate::machine::ty::MachTyId) -> String {
        self.program.types.display(ty, self.symtab, self.interner)
    }

    fn value(&self, value: Value) -> String {
        match value.kind {
            ValueKind::Reg(name) => format!("%{}", self.name(name)),
            ValueKind::Param { index, .. } => format!("%arg{index}"),
            ValueKind::Global(name) => format!("@{}", self.name(name)),
            ValueKind::Lit(lit) => match lit {
                MachLit::UInt16(v) => format!("{v}u16"),
                MachLit::UInt32(v) => format!("{v}u32"),
                MachLit::Int64(v) => format!("{v}i64"),
                MachLit::F64(v) => format!("{v}f64"),
                MachLit::NullPtr => "null".to_owned(),
            },
        }
    }

    fn struct_def(&self, out: &mut String, name: SymbolId, ty: crate::machine::ty::MachTyId) {
        let crate::machine::ty::MachTy::Struct { members, .. } = self.program.types.get(ty) else {
            return;
        };
        let members: Vec<String> = members.iter().map(|m| self.ty(*m)).collect();
        let _ = writeln!(out, "struct %{} {{ {} }}", self.name(name), members.join(", "));
    }

    fn fn_def(&self, out: &mut String, def: &FnDef) {
        let _ = writeln!(out, "{} {} : {}", def.kind, self.name(def.name), self.ty(def.ty));
        for block in &def.blocks {
            self.block(out, block);
        }
        out.push('\n');
    }

    fn block(&self, out: &mut String, block: &Block) {
        let _ = writeln!(out, "{}:", self.interner.get(block.name).unwrap_or("<?>"));
        for stmt in &block.stmts {
            self.stmt(out, stmt);
        }
        match &block.terminator {
            Some(terminator) => self.terminator(out, terminator),
            None => {
                let _ = writeln!(out, "  <unterminated>");
            }
        }
    }

    fn stmt(&self, out: &mut String, stmt: &Stmt) {
        match stmt {
            Stmt::Call { fn_value, args, result } => {
                let args: Vec<String> = args.iter().map(|a| self.value(*a)).collect();
                let _ = writeln!(
                    out,
                    "  {} = call {}({})",
                    self.value(*result),
                    self.value(*fn_value),
                    args.join(", ")
                );
            }
            Stmt::Load { source, result } => {
                let source = match source {
                    LoadSource::Ptr(ptr) => format!("*{}", self.value(*ptr)),
                    LoadSource::Slot { ptr, slot } => format!("{}[{slot}]", self.value(*ptr)),
                    LoadSource::Tag(ptr) => format!("tag {}", self.value(*ptr)),
                };
                let _ = writeln!(out, "  {} = load {source}", self.value(*result));
            }
            Stmt::Store { value, dest } => {
                let dest = match dest {
                    StoreDest::Ptr(ptr) => format!("*{}", self.value(*ptr)),
                    StoreDest::Slot { ptr, slot } => format!("{}[{slot}]", self.value(*ptr)),
                    StoreDest::Tag(ptr) => format!("tag {}", self.value(*ptr)),
                };
                let _ = writeln!(out, "  store {} -> {dest}", self.value(*value));
            }
            Stmt::BitCast { from, result } => {
                let _ = writeln!(
                    out,
                    "  {} = bitcast {} to {}",
                    self.value(*result),
                    self.value(*from),
                    self.ty(result.ty)
                );
            }
            Stmt::Nalloc { ty, slots, result } => {
                let _ = writeln!(out, "  {} = nalloc {} [{slots} slots]", self.value(*result), self.ty(*ty));
            }
            Stmt::Gep { source, indices, result } => {
                let indices: Vec<String> = indices.iter().map(ToString::to_string).collect();
                let _ = writeln!(
                    out,
                    "  {} = gep {} [{}]",
                    self.value(*result),
                    self.value(*source),
                    indices.join(", ")
                );
            }
            Stmt::Binop { op, lhs, rhs, result } => {
                let _ = writeln!(
                    out,
                    "  {} = {op} {} {}",
                    self.value(*result),
                    self.value(*lhs),
                    self.value(*rhs)
                );
            }
        }
    }

    fn terminator(&self, out: &mut String, terminator: &Terminator) {
        match terminator {
            Terminator::Return(value) => {
                let _ = writeln!(out, "  return {}", self.value(*value));
            }
            Terminator::Break(block) => {
                let _ = writeln!(out, "  break -> block{}", block.index());
            }
            Terminator::CondBreak {
                cond,
                then_block,
                else_block,
            } => {
                let _ = writeln!(
                    out,
                    "  condbreak {} ? block{} : block{}",
                    self.value(*cond),
                    then_block.index(),
                    else_block.index()
                );
            }
            Terminator::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let cases: Vec<String> = cases.iter().map(|(v, b)| format!("{v} -> block{}", b.index())).collect();
                let default = match default {
                    Some(block) => format!(", default -> block{}", block.index()),
                    None => String::new(),
                };
                let _ = writeln!(out, "  switch {} [{}{default}]", self.value(*scrutinee), cases.join(", "));
            }
            Terminator::Unreachable => {
                let _ = writeln!(out, "  unreachable");
            }
        }
    }

    fn node_def(&self, out: &mut String, def: &NodeDef) {
        let _ = writeln!(
            out,
            "node {} ({}) : {}",
            self.name(def.bind_name),
            def.state,
            self.ty(def.value_ty)
        );
        if !def.arg_names.is_empty() {
            let args: Vec<&str> = def.arg_names.iter().map(|a| self.name(*a)).collect();
            let _ = writeln!(out, "  args: {}", args.join(", "));
        }
        for member in &def.members {
            let _ = writeln!(out, "  slot {}: {}", member.slot_num, self.ty(member.ty));
        }
        if let Some(update) = def.update_fn {
            let _ = writeln!(out, "  update: {}", self.name(self.program.function(update).name));
        }
        out.push('\n');
    }
}
