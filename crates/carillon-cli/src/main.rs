//! Pipeline driver: pushes a small demo program through every stage and
//! prints the resulting machine program, with per-phase timings on stderr.
//!
//! The external collaborators (parser, inferencer, core conversion) are
//! stood in for by direct construction of their interface structures.

use std::{env, process::ExitCode, time::Instant};

use carillon::{
    Analysis, CompileInfo, Core, Interner, Phase, SourceLoc, Ty,
    parse_ast::{BinOpKind, ParseArena, ParseRef, VarKind},
    symtab::{Namespace, SymbolId, SymbolRecord},
};

fn main() -> ExitCode {
    let verbose = env::args().any(|arg| arg == "-v" || arg == "--verbose");
    let info = CompileInfo {
        phase: Phase::All,
        verbosity: u32::from(verbose),
    };

    let mut interner = Interner::new();
    let mut parse = ParseArena::new();
    build_demo(&mut parse, &mut interner);

    let start = Instant::now();
    let mut analysis = match carillon::analyze(&parse, &mut interner, info) {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("front end: {:?}", start.elapsed());

    let start = Instant::now();
    let mut core = build_demo_core(&mut analysis, &mut interner);
    let program = carillon::compile_core(&mut core, &mut analysis, &mut interner, info);
    eprintln!("machine lowering: {:?}", start.elapsed());

    println!(
        "{}",
        carillon::machine::print::dump_program(&program, &analysis.scoped.table, &interner)
    );
    ExitCode::SUCCESS
}

/// The demo source, as the parser would emit it:
///
/// ```text
/// root = 440
/// detune x = x + 7
/// voice = detune root
/// ```
fn build_demo(parse: &mut ParseArena, interner: &mut Interner) {
    let loc = SourceLoc::default();
    let root = interner.intern("root");
    let detune = interner.intern("detune");
    let voice = interner.intern("voice");
    let x = interner.intern("x");
    let plus = interner.intern("+");

    let freq = parse.int(440, loc);
    let root_rhs = parse.right_hand_side(freq, ParseRef::NULL, loc);
    let root_decl = parse.simple_assignment(root, root_rhs, loc);

    let pat = parse.var(x, VarKind::Declaration, loc);
    let apats = parse.apats(&[pat], loc);
    let x_use = parse.var(x, VarKind::Var, loc);
    let seven = parse.int(7, loc);
    let sum = parse.bin_op(BinOpKind::Add, plus, x_use, seven, loc);
    let detune_rhs = parse.right_hand_side(sum, ParseRef::NULL, loc);
    let detune_decl = parse.apats_assignment(detune, apats, detune_rhs, loc);

    let detune_use = parse.var(detune, VarKind::Var, loc);
    let root_use = parse.var(root, VarKind::Var, loc);
    let call = parse.apply(&[detune_use, root_use], loc);
    let voice_rhs = parse.right_hand_side(call, ParseRef::NULL, loc);
    let voice_decl = parse.simple_assignment(voice, voice_rhs, loc);

    parse.top_decls(&[root_decl, detune_decl, voice_decl], loc);
}

/// The demo after (stand-in) inference and core conversion: numeric methods
/// monomorphized to their `@Int` instances, every bind annotated.
fn build_demo_core(analysis: &mut Analysis, interner: &mut Interner) -> Core {
    let prim = analysis.prim.clone();
    let int = Ty::con(prim.int_ty);

    let root = top_level_id(analysis, interner, "root");
    let detune = top_level_id(analysis, interner, "detune");
    let voice = top_level_id(analysis, interner, "voice");
    let x = analysis
        .scoped
        .table
        .insert(SymbolRecord::new(interner.intern("x"), SourceLoc::default()));

    let mut core = Core::new();

    let from_int = core.var(prim.from_int_int);
    let freq = core.lit_int(440);
    let root_body = core.app(from_int, &[freq]);
    let root_bind = core.bind(root, root_body, int.clone());

    let arg = core.var(x);
    let add = core.var(prim.add_int);
    let x_use = core.var(x);
    let from_int = core.var(prim.from_int_int);
    let seven = core.lit_int(7);
    let boxed_seven = core.app(from_int, &[seven]);
    let sum = core.app(add, &[x_use, boxed_seven]);
    let lam = core.lam(arg, sum);
    let detune_bind = core.bind(detune, lam, Ty::fun(int.clone(), int.clone()));

    let detune_use = core.var(detune);
    let root_use = core.var(root);
    let voice_body = core.app(detune_use, &[root_use]);
    let voice_bind = core.bind(voice, voice_body, int);

    core.top_level(&[root_bind, detune_bind, voice_bind]);
    core
}

fn top_level_id(analysis: &Analysis, interner: &mut Interner, name: &str) -> SymbolId {
    let symbol = interner.intern(name);
    let id = analysis.scoped.find(symbol, Namespace::Term);
    assert!(!id.is_null(), "demo name {name} did not survive renaming");
    id
}
