//! Resolved source types, as handed over by the (external) type inferencer.
//!
//! The pipeline consumes these as annotations on symbol records and Core
//! nodes; it never computes them. Only as much structure is modeled as the
//! machine lowering needs: constructor applications, arrows, and variables.

use crate::symtab::SymbolId;

/// A resolved source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    /// A type-constructor application, e.g. `Int` or `Maybe a`.
    Con { name: SymbolId, args: Vec<Ty> },
    /// A function arrow.
    Fun { arg: Box<Ty>, result: Box<Ty> },
    /// A universally quantified type variable.
    Var(u32),
}

impl Ty {
    /// A nullary type constructor.
    #[must_use]
    pub fn con(name: SymbolId) -> Self {
        Self::Con { name, args: Vec::new() }
    }

    #[must_use]
    pub fn fun(arg: Self, result: Self) -> Self {
        Self::Fun {
            arg: Box::new(arg),
            result: Box::new(result),
        }
    }

    /// Builds `a -> b -> ... -> result` from a parameter list.
    #[must_use]
    pub fn fun_from(params: Vec<Self>, result: Self) -> Self {
        params.into_iter().rev().fold(result, |acc, p| Self::fun(p, acc))
    }

    /// Number of top-level arrows, i.e. how many arguments a binding of this
    /// type accepts before producing a value.
    #[must_use]
    pub fn arity(&self) -> usize {
        let mut ty = self;
        let mut n = 0;
        while let Self::Fun { result, .. } = ty {
            n += 1;
            ty = result;
        }
        n
    }

    /// Splits the arrow spine into parameter types and the final result.
    #[must_use]
    pub fn uncurry(&self) -> (Vec<&Self>, &Self) {
        let mut params = Vec::new();
        let mut ty = self;
        while let Self::Fun { arg, result } = ty {
            params.push(arg.as_ref());
            ty = result;
        }
        (params, ty)
    }
}
