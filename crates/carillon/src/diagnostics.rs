//! Source locations, user-facing errors, and per-phase compile info.
//!
//! Two error categories exist in the pipeline. Internal consistency failures
//! (ill-typed IR, impossible variants) are programmer errors and panic via
//! assertions. Everything a user can cause — name clashes, unbound variables,
//! signatures without definitions — travels as a [`CompileError`] out of the
//! stage that detected it, and later stages simply never run.

use std::{borrow::Cow, fmt};

use strum::{Display, EnumString};

/// A position in the source text: line, character, and byte offset.
///
/// The file is implicit (one compilation, one file); only the position is
/// carried around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLoc {
    pub line: u32,
    pub character: u32,
    pub pos: u32,
}

impl SourceLoc {
    #[must_use]
    pub fn new(line: u32, character: u32, pos: u32) -> Self {
        Self { line, character, pos }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// A user error with the location it was detected at.
///
/// The first error aborts the current pass; the pipeline driver stops at the
/// first failing stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: Cow<'static, str>,
    pub loc: SourceLoc,
}

impl CompileError {
    pub fn new(message: impl Into<Cow<'static, str>>, loc: SourceLoc) -> Self {
        Self {
            message: message.into(),
            loc,
        }
    }

    /// A name used before any binding introduced it.
    pub fn unbound_variable(name: &str, loc: SourceLoc) -> Self {
        Self::new(format!("Unbound variable: {name}"), loc)
    }

    /// The same name bound twice in one scope.
    pub fn multiple_declarations(name: &str, loc: SourceLoc) -> Self {
        Self::new(format!("Multiple declarations of: {name}"), loc)
    }

    /// A data constructor written where a term variable is required.
    pub fn constructor_in_term_position(name: &str, loc: SourceLoc) -> Self {
        Self::new(format!("Constructor used in term position: {name}"), loc)
    }

    /// A term variable written where a type is required.
    pub fn variable_in_type_position(name: &str, loc: SourceLoc) -> Self {
        Self::new(format!("Variable used in type position: {name}"), loc)
    }

    /// A type signature whose name never receives a definition.
    pub fn signature_without_definition(name: &str, loc: SourceLoc) -> Self {
        Self::new(format!("Type signature without accompanying definition: {name}"), loc)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error at {}: {}", self.loc, self.message)
    }
}

impl std::error::Error for CompileError {}

pub type Result<T> = std::result::Result<T, CompileError>;

/// The pipeline stages, in execution order.
///
/// Lexing, parsing, type inference, and core conversion are external
/// collaborators; they appear here so verbosity gating can name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Reify,
    RenameDeclare,
    RenameUse,
    DependencyAnalysis,
    MachinePrim,
    MachineLower,
    All,
}

/// What to compile up to and how loudly to narrate it.
///
/// A stage pretty-prints its output when it matches `phase` and
/// `verbosity > 0`, mirroring how the driver decides what to dump.
#[derive(Debug, Clone, Copy)]
pub struct CompileInfo {
    pub phase: Phase,
    pub verbosity: u32,
}

impl Default for CompileInfo {
    fn default() -> Self {
        Self {
            phase: Phase::All,
            verbosity: 0,
        }
    }
}

impl CompileInfo {
    #[must_use]
    pub fn should_trace(&self, phase: Phase) -> bool {
        self.verbosity > 0 && (self.phase == phase || self.phase == Phase::All)
    }
}
