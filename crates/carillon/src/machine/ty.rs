//! Machine IR types and the structural type check.
//!
//! Types live in one arena owned by the machine program; everything else
//! refers to them by [`MachTyId`]. The check is structural with a single
//! wildcard: a pointer to the distinguished `Poly` struct matches any
//! pointer. The IR is never meant to be constructed ill-typed, so a failed
//! check is an assertion, not an error value.

use crate::{
    intern::Interner,
    symtab::{SymTable, SymbolId},
};

/// Index of a type in the machine type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachTyId(u32);

impl MachTyId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A machine IR type.
#[derive(Debug, Clone, PartialEq)]
pub enum MachTy {
    UInt16,
    UInt32,
    Int64,
    F64,
    Char,
    Ptr {
        pointee: MachTyId,
    },
    Struct {
        name: SymbolId,
        members: Vec<MachTyId>,
    },
    Fn {
        ret: MachTyId,
        params: Vec<MachTyId>,
    },
}

/// The type arena plus cached primitive ids.
///
/// `poly` is set once the prim initializer creates the `Poly` struct; until
/// then nothing can mention the wildcard, so the unset state is safe.
#[derive(Debug)]
pub struct MachineTypes {
    tys: Vec<MachTy>,
    pub uint16: MachTyId,
    pub uint32: MachTyId,
    pub int64: MachTyId,
    pub f64: MachTyId,
    pub char: MachTyId,
    poly: Option<MachTyId>,
}

impl Default for MachineTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineTypes {
    #[must_use]
    pub fn new() -> Self {
        let mut types = Self {
            tys: Vec::new(),
            uint16: MachTyId(0),
            uint32: MachTyId(0),
            int64: MachTyId(0),
            f64: MachTyId(0),
            char: MachTyId(0),
            poly: None,
        };
        types.uint16 = types.add(MachTy::UInt16);
        types.uint32 = types.add(MachTy::UInt32);
        types.int64 = types.add(MachTy::Int64);
        types.f64 = types.add(MachTy::F64);
        types.char = types.add(MachTy::Char);
        types
    }

    /// # Panics
    /// Panics if the arena exceeds `u32::MAX` types.
    pub fn add(&mut self, ty: MachTy) -> MachTyId {
        let id = MachTyId(u32::try_from(self.tys.len()).expect("machine type arena overflow"));
        self.tys.push(ty);
        id
    }

    #[must_use]
    pub fn get(&self, id: MachTyId) -> &MachTy {
        &self.tys[id.index()]
    }

    pub fn ptr_to(&mut self, pointee: MachTyId) -> MachTyId {
        self.add(MachTy::Ptr { pointee })
    }

    pub fn strukt(&mut self, name: SymbolId, members: Vec<MachTyId>) -> MachTyId {
        self.add(MachTy::Struct { name, members })
    }

    pub fn func(&mut self, ret: MachTyId, params: Vec<MachTyId>) -> MachTyId {
        self.add(MachTy::Fn { ret, params })
    }

    /// Records the `Poly` wildcard struct; called once by prim init.
    pub fn set_poly(&mut self, poly: MachTyId) {
        debug_assert!(self.poly.is_none(), "Poly registered twice");
        self.poly = Some(poly);
    }

    /// True for a pointer whose pointee is the `Poly` struct.
    #[must_use]
    pub fn is_poly_ptr(&self, id: MachTyId) -> bool {
        match (self.get(id), self.poly) {
            (MachTy::Ptr { pointee }, Some(poly)) => *pointee == poly || self.struct_name(*pointee) == self.struct_name(poly),
            _ => false,
        }
    }

    fn struct_name(&self, id: MachTyId) -> Option<SymbolId> {
        match self.get(id) {
            MachTy::Struct { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Structural equality with `Poly*` as a pointer wildcard.
    #[must_use]
    pub fn matches(&self, a: MachTyId, b: MachTyId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (MachTy::UInt16, MachTy::UInt16)
            | (MachTy::UInt32, MachTy::UInt32)
            | (MachTy::Int64, MachTy::Int64)
            | (MachTy::F64, MachTy::F64)
            | (MachTy::Char, MachTy::Char) => true,
            (MachTy::Struct { name: na, .. }, MachTy::Struct { name: nb, .. }) => na == nb,
            (MachTy::Fn { ret: ra, params: pa }, MachTy::Fn { ret: rb, params: pb }) => {
                pa.len() == pb.len()
                    && self.matches(*ra, *rb)
                    && pa.iter().zip(pb.iter()).all(|(x, y)| self.matches(*x, *y))
            }
            (MachTy::Ptr { pointee: ea }, MachTy::Ptr { pointee: eb }) => {
                self.is_poly_ptr(a) || self.is_poly_ptr(b) || self.matches(*ea, *eb)
            }
            _ => false,
        }
    }

    /// Asserts that two types match structurally.
    ///
    /// # Panics
    /// Panics when they do not; builders construct only well-typed IR.
    pub fn check(&self, a: MachTyId, b: MachTyId) {
        assert!(
            self.matches(a, b),
            "machine IR type mismatch: {:?} vs {:?}",
            self.get(a),
            self.get(b)
        );
    }

    /// Renders a type for dumps and panics.
    #[must_use]
    pub fn display(&self, id: MachTyId, symtab: &SymTable, interner: &Interner) -> String {
        match self.get(id) {
            MachTy::UInt16 => "u16".to_owned(),
            MachTy::UInt32 => "u32".to_owned(),
            MachTy::Int64 => "i64".to_owned(),
            MachTy::F64 => "f64".to_owned(),
            MachTy::Char => "char".to_owned(),
            MachTy::Ptr { pointee } => format!("{}*", self.display(*pointee, symtab, interner)),
            MachTy::Struct { name, .. } => {
                if name.is_null() {
                    "%?".to_owned()
                } else {
                    format!("%{}", interner.get(symtab.get(*name).name).unwrap_or("?"))
                }
            }
            MachTy::Fn { ret, params } => {
                let params: Vec<String> = params.iter().map(|p| self.display(*p, symtab, interner)).collect();
                format!("fn({}) -> {}", params.join(", "), self.display(*ret, symtab, interner))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_match_by_tag_only() {
        let types = MachineTypes::new();
        assert!(types.matches(types.int64, types.int64));
        assert!(!types.matches(types.int64, types.f64));
        assert!(!types.matches(types.uint16, types.uint32));
    }

    #[test]
    fn structs_match_by_name() {
        let mut types = MachineTypes::new();
        let name_a = crate::symtab::SymbolId::NULL;
        let a1 = types.strukt(name_a, vec![types.uint32]);
        let a2 = types.strukt(name_a, vec![types.uint32, types.int64]);
        assert!(types.matches(a1, a2));
    }

    #[test]
    fn poly_ptr_matches_any_pointer() {
        let mut types = MachineTypes::new();
        let poly = types.strukt(crate::symtab::SymbolId::NULL, vec![]);
        types.set_poly(poly);
        let poly_ptr = types.ptr_to(poly);
        let int_ptr = types.ptr_to(types.int64);
        assert!(types.matches(poly_ptr, int_ptr));
        assert!(types.matches(int_ptr, poly_ptr));
        // But the wildcard is pointer-only.
        assert!(!types.matches(poly_ptr, types.int64));
    }

    #[test]
    fn function_types_match_pointwise() {
        let mut types = MachineTypes::new();
        let f1 = types.func(types.int64, vec![types.int64, types.int64]);
        let f2 = types.func(types.int64, vec![types.int64, types.int64]);
        let f3 = types.func(types.int64, vec![types.int64]);
        assert!(types.matches(f1, f2));
        assert!(!types.matches(f1, f3));
    }

    #[test]
    #[should_panic(expected = "machine IR type mismatch")]
    fn check_panics_on_mismatch() {
        let types = MachineTypes::new();
        types.check(types.int64, types.f64);
    }
}
