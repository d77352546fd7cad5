//! The compact parse AST produced by the external parser.
//!
//! Nodes live in one flat arena of variant records; children are referenced
//! by [`ParseRef`] integer offsets with a null sentinel for "absent". The
//! reifier is the only consumer — it rehydrates this arena into the
//! pointer-linked (index-linked) semantic AST.
//!
//! The parser itself is an external collaborator; this module is the
//! interface it writes into, plus enough construction helpers for drivers
//! and tests to assemble programs directly.

use strum::Display;

use crate::{diagnostics::SourceLoc, intern::Symbol};

/// Offset of a node inside a [`ParseArena`]. `NULL` marks an absent child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParseRef(u32);

impl Default for ParseRef {
    fn default() -> Self {
        Self::NULL
    }
}

impl ParseRef {
    pub const NULL: Self = Self(u32::MAX);

    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Literal payloads, with separate variants for pattern literals.
///
/// The reifier desugars `Int`/`Float` into `fromInt`/`fromRational`
/// applications; the `Pat*` variants are left alone so patterns keep their
/// literal shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantKind {
    Int(i64),
    Float(f64),
    Char(char),
    String(Symbol),
    PatInt(i64),
    PatFloat(f64),
    PatChar(char),
}

/// Binary operator tokens.
///
/// Operators with a canonical type-class method are rewritten to that method
/// name during reification; `Other` operators resolve through the ordinary
/// variable path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    BindRight,
    Append,
    Other,
}

impl BinOpKind {
    /// The canonical dictionary-method name for this operator, if it has one.
    #[must_use]
    pub fn method_name(self) -> Option<&'static str> {
        match self {
            Self::Add => Some("add"),
            Self::Sub => Some("sub"),
            Self::Mul => Some("mul"),
            Self::Div => Some("div"),
            Self::Eq => Some("eq"),
            Self::Neq => Some("neq"),
            Self::Lt => Some("lt"),
            Self::Gt => Some("gt"),
            Self::Lte => Some("lte"),
            Self::Gte => Some("gte"),
            Self::BindRight => Some("bind"),
            Self::Append => Some("append"),
            Self::Other => None,
        }
    }
}

/// How a variable occurrence is being used, set by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// An ordinary use of a term variable.
    Var,
    /// A binding occurrence (pattern variable, assignment left-hand side).
    Declaration,
    /// The name position of a type signature.
    Sig,
    /// The name position of a class-method signature.
    ClassSig,
    /// A type-variable binding (e.g. the `a` in `data Maybe a`).
    TypeVarDeclaration,
    /// A free type variable inside a type expression.
    TypeFreeVar,
}

/// How a constructor identifier is being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConKind {
    /// Term-position use (constructing or matching a value).
    Var,
    /// Type-position use (a type constructor).
    TypeVar,
    /// The binding occurrence of a data constructor.
    Declaration,
    /// The binding occurrence of a type constructor.
    TypeDeclaration,
}

/// Shape of an arithmetic sequence expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    From,
    FromTo,
    FromThenTo,
}

/// Whether a type signature belongs to a declaration or a class body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigKind {
    Declaration,
    TypeClass,
}

/// One variant record in the parse arena.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseKind {
    Undefined,
    Constant {
        kind: ConstantKind,
    },
    UnaryOp {
        symbol: Symbol,
        expr: ParseRef,
    },
    BinOp {
        op: BinOpKind,
        symbol: Symbol,
        lhs: ParseRef,
        rhs: ParseRef,
    },
    IfThenElse {
        cond: ParseRef,
        then_expr: ParseRef,
        else_expr: ParseRef,
    },
    TopDecl {
        declaration: ParseRef,
        next: ParseRef,
    },
    Decl {
        declaration: ParseRef,
        next: ParseRef,
    },
    SimpleAssignment {
        name: Symbol,
        initializer: ParseRef,
        rhs: ParseRef,
    },
    ApatsAssignment {
        name: Symbol,
        apats: ParseRef,
        rhs: ParseRef,
    },
    PatAssignment {
        pat: ParseRef,
        rhs: ParseRef,
    },
    RightHandSide {
        expression: ParseRef,
        declarations: ParseRef,
    },
    LetExpression {
        expression: ParseRef,
        declarations: ParseRef,
    },
    /// One step of a curried application chain.
    FunctionExpression {
        aexp: ParseRef,
        next: ParseRef,
    },
    Variable {
        name: Symbol,
        kind: VarKind,
        initializer: ParseRef,
    },
    Apats {
        apat: ParseRef,
        next: ParseRef,
    },
    Wildcard,
    Lambda {
        apats: ParseRef,
        expression: ParseRef,
    },
    Do {
        statements: ParseRef,
    },
    PatternExpression {
        expressions: ParseRef,
    },
    ExpressionList {
        expressions: ParseRef,
    },
    ExpressionArray {
        expressions: ParseRef,
    },
    Tuple {
        expressions: ParseRef,
    },
    ListNode {
        item: ParseRef,
        next: ParseRef,
    },
    BindAssignment {
        name: Symbol,
        expression: ParseRef,
    },
    PatBindAssignment {
        pat: ParseRef,
        expression: ParseRef,
    },
    ArithmeticSequence {
        from: ParseRef,
        then: ParseRef,
        to: ParseRef,
        kind: SequenceKind,
    },
    Case {
        expression: ParseRef,
        alternatives: ParseRef,
    },
    CaseAlternative {
        pat: ParseRef,
        body: ParseRef,
    },
    ConId {
        name: Symbol,
        kind: ConKind,
    },
    TypeApp {
        ty: ParseRef,
        next_ty: ParseRef,
    },
    BinOpSym {
        left: ParseRef,
        op: ParseRef,
        right: ParseRef,
    },
    OpLeftSection {
        op: BinOpKind,
        symbol: Symbol,
        left: ParseRef,
    },
    OpRightSection {
        op: BinOpKind,
        symbol: Symbol,
        right: ParseRef,
    },
    Constructor {
        conid: ParseRef,
        arg_list: ParseRef,
    },
    SimpleType {
        type_con: ParseRef,
        type_var_list: ParseRef,
    },
    DataDeclaration {
        simple_type: ParseRef,
        constructor_list: ParseRef,
    },
    TypeClassContext {
        conid: ParseRef,
        varid: ParseRef,
    },
    TypeClassDeclaration {
        context: ParseRef,
        tycls: ParseRef,
        tyvar: ParseRef,
        declarations: ParseRef,
    },
    TypeClassInstance {
        context: ParseRef,
        qtycls: ParseRef,
        inst: ParseRef,
        declarations: ParseRef,
    },
    TypeSignature {
        var: ParseRef,
        context: ParseRef,
        ty: ParseRef,
        kind: SigKind,
    },
    FunctionType {
        ty: ParseRef,
        next_on_arrow: ParseRef,
    },
}

#[derive(Debug, Clone)]
pub struct ParseNode {
    pub kind: ParseKind,
    pub loc: SourceLoc,
}

/// The flat arena of parse nodes plus the root reference.
#[derive(Debug, Default)]
pub struct ParseArena {
    nodes: Vec<ParseNode>,
    pub root: ParseRef,
}

impl ParseArena {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: ParseRef::NULL,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a node and returns its offset.
    ///
    /// # Panics
    /// Panics if the arena exceeds `u32::MAX - 1` nodes.
    pub fn add(&mut self, kind: ParseKind, loc: SourceLoc) -> ParseRef {
        let index = u32::try_from(self.nodes.len()).expect("parse arena overflow");
        assert!(index != u32::MAX, "parse arena overflow");
        self.nodes.push(ParseNode { kind, loc });
        ParseRef(index)
    }

    /// Fetches a node; null references yield `None`.
    #[must_use]
    pub fn get(&self, node: ParseRef) -> Option<&ParseNode> {
        if node.is_null() {
            return None;
        }
        self.nodes.get(node.index())
    }

    // ------------------------------------------------------------------
    // Construction helpers for drivers and tests. The external parser
    // writes records directly; these cover the common shapes.
    // ------------------------------------------------------------------

    pub fn int(&mut self, value: i64, loc: SourceLoc) -> ParseRef {
        self.add(
            ParseKind::Constant {
                kind: ConstantKind::Int(value),
            },
            loc,
        )
    }

    pub fn float(&mut self, value: f64, loc: SourceLoc) -> ParseRef {
        self.add(
            ParseKind::Constant {
                kind: ConstantKind::Float(value),
            },
            loc,
        )
    }

    pub fn var(&mut self, name: Symbol, kind: VarKind, loc: SourceLoc) -> ParseRef {
        self.add(
            ParseKind::Variable {
                name,
                kind,
                initializer: ParseRef::NULL,
            },
            loc,
        )
    }

    pub fn conid(&mut self, name: Symbol, kind: ConKind, loc: SourceLoc) -> ParseRef {
        self.add(ParseKind::ConId { name, kind }, loc)
    }

    pub fn bin_op(&mut self, op: BinOpKind, symbol: Symbol, lhs: ParseRef, rhs: ParseRef, loc: SourceLoc) -> ParseRef {
        self.add(ParseKind::BinOp { op, symbol, lhs, rhs }, loc)
    }

    /// Builds the curried application chain `f a b c ...`.
    pub fn apply(&mut self, items: &[ParseRef], loc: SourceLoc) -> ParseRef {
        let mut next = ParseRef::NULL;
        for item in items.iter().rev() {
            next = self.add(
                ParseKind::FunctionExpression {
                    aexp: *item,
                    next,
                },
                loc,
            );
        }
        next
    }

    pub fn right_hand_side(&mut self, expression: ParseRef, declarations: ParseRef, loc: SourceLoc) -> ParseRef {
        self.add(
            ParseKind::RightHandSide {
                expression,
                declarations,
            },
            loc,
        )
    }

    pub fn simple_assignment(&mut self, name: Symbol, rhs: ParseRef, loc: SourceLoc) -> ParseRef {
        self.add(
            ParseKind::SimpleAssignment {
                name,
                initializer: ParseRef::NULL,
                rhs,
            },
            loc,
        )
    }

    pub fn apats_assignment(&mut self, name: Symbol, apats: ParseRef, rhs: ParseRef, loc: SourceLoc) -> ParseRef {
        self.add(ParseKind::ApatsAssignment { name, apats, rhs }, loc)
    }

    /// Chains atomic patterns into an apats list.
    pub fn apats(&mut self, pats: &[ParseRef], loc: SourceLoc) -> ParseRef {
        let mut next = ParseRef::NULL;
        for pat in pats.iter().rev() {
            next = self.add(ParseKind::Apats { apat: *pat, next }, loc);
        }
        next
    }

    /// Chains declarations into a top-level block and sets it as the root.
    pub fn top_decls(&mut self, decls: &[ParseRef], loc: SourceLoc) -> ParseRef {
        let mut next = ParseRef::NULL;
        for decl in decls.iter().rev() {
            next = self.add(
                ParseKind::TopDecl {
                    declaration: *decl,
                    next,
                },
                loc,
            );
        }
        self.root = next;
        next
    }

    /// Chains declarations into a nested declaration block.
    pub fn decls(&mut self, decls: &[ParseRef], loc: SourceLoc) -> ParseRef {
        let mut next = ParseRef::NULL;
        for decl in decls.iter().rev() {
            next = self.add(
                ParseKind::Decl {
                    declaration: *decl,
                    next,
                },
                loc,
            );
        }
        next
    }

    pub fn if_then_else(&mut self, cond: ParseRef, then_expr: ParseRef, else_expr: ParseRef, loc: SourceLoc) -> ParseRef {
        self.add(
            ParseKind::IfThenElse {
                cond,
                then_expr,
                else_expr,
            },
            loc,
        )
    }

    pub fn case(&mut self, expression: ParseRef, alternatives: ParseRef, loc: SourceLoc) -> ParseRef {
        self.add(
            ParseKind::Case {
                expression,
                alternatives,
            },
            loc,
        )
    }

    pub fn case_alternative(&mut self, pat: ParseRef, body: ParseRef, loc: SourceLoc) -> ParseRef {
        self.add(ParseKind::CaseAlternative { pat, body }, loc)
    }

    /// Chains items into a generic list-node sequence.
    pub fn list(&mut self, items: &[ParseRef], loc: SourceLoc) -> ParseRef {
        let mut next = ParseRef::NULL;
        for item in items.iter().rev() {
            next = self.add(ParseKind::ListNode { item: *item, next }, loc);
        }
        next
    }
}
