//! carillon: the front-to-mid pipeline of a compiler for a small, pure,
//! non-strict functional language in which every binding is a node that
//! retains state across executions of `main`.
//!
//! The pipeline runs in fixed stages, each consuming the previous stage's
//! output plus the process-wide symbol table:
//!
//! 1. [`reify`] rehydrates the external parser's compact arena into the
//!    semantic AST and applies the numeric-literal and operator-method
//!    desugarings;
//! 2. [`rename`] resolves names in two passes (declare, then use) against a
//!    lexical scope chain over the flat symbol table;
//! 3. [`dependency`] rewrites every declaration block into a topologically
//!    ordered list of mutually-recursive groups via Tarjan's SCC;
//! 4. [`machine`] lowers desugared Core (produced by external inference and
//!    core conversion) into the typed, register-based machine IR of
//!    stateful nodes.
//!
//! Lexing, parsing, type inference, and core conversion are external
//! collaborators; [`parse_ast`], [`ty`], and [`core`] are the interfaces
//! they feed.

pub mod ast;
pub mod core;
pub mod dependency;
pub mod diagnostics;
pub mod intern;
pub mod machine;
pub mod parse_ast;
pub mod reify;
pub mod rename;
pub mod symtab;
pub mod ty;

pub use crate::{
    ast::Ast,
    core::Core,
    diagnostics::{CompileError, CompileInfo, Phase, Result, SourceLoc},
    intern::{Interner, Symbol},
    machine::{MachineProgram, core_to_machine, prim::PrimNames},
    parse_ast::ParseArena,
    symtab::{ScopedSymTable, StateKind, SymTable, SymbolId},
    ty::Ty,
};

/// Everything the front half of the pipeline produces: the renamed,
/// dependency-analyzed AST, the scoped symbol table (whose top scope is the
/// program's namespace), and the installed primitive names.
#[derive(Debug)]
pub struct Analysis {
    pub ast: Ast,
    pub scoped: ScopedSymTable,
    pub prim: PrimNames,
}

/// Runs the front half of the pipeline on a parse arena: primitive name
/// installation, reification, both renamer passes, and dependency analysis.
///
/// The first user error aborts the failing stage; later stages do not run.
pub fn analyze(parse: &ParseArena, interner: &mut Interner, info: CompileInfo) -> Result<Analysis> {
    let mut scoped = ScopedSymTable::new();
    let prim = machine::prim::install_names(&mut scoped, interner);

    let mut ast = reify::reify(parse, interner);
    if info.should_trace(Phase::Reify) {
        eprintln!("-- reify\n{}", ast.dump(interner));
    }

    rename::declare_pass(&mut ast, &mut scoped, interner)?;
    if info.should_trace(Phase::RenameDeclare) {
        eprintln!("-- rename (declare)\n{}", scoped.table.dump(interner));
    }
    rename::use_pass(&mut ast, &mut scoped, interner)?;
    if info.should_trace(Phase::RenameUse) {
        eprintln!("-- rename (use)\n{}", ast.dump(interner));
    }

    dependency::analyze(&mut ast, &scoped.table, interner)?;
    if info.should_trace(Phase::DependencyAnalysis) {
        eprintln!("-- dependency analysis\n{}", scoped.table.dump(interner));
    }

    Ok(Analysis { ast, scoped, prim })
}

/// Lowers a Core tree against an existing analysis, producing the machine
/// program. Core conversion and type inference happen outside; their results
/// arrive as Core annotations and symbol-table types.
pub fn compile_core(core: &mut Core, analysis: &mut Analysis, interner: &mut Interner, info: CompileInfo) -> MachineProgram {
    let program = core_to_machine(core, &mut analysis.scoped.table, interner, &analysis.prim);
    if info.should_trace(Phase::MachineLower) {
        eprintln!(
            "-- machine\n{}",
            machine::print::dump_program(&program, &analysis.scoped.table, interner)
        );
    }
    program
}
