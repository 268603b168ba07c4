//! The Penguin abstract syntax tree.
//!
//! The parser builds this directly; there is no separate untyped parse tree.
//! Type checking annotates expression nodes in place (see `front::check`).

use std::cell::Cell;

use crate::common::Id;
use crate::front::types::Type;

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

/// The right-hand side of a declaration: either a single expression or a
/// bracketed list literal (the only aggregate a program can construct).
#[derive(Clone, Debug)]
pub enum Init {
    Expr(Expr),
    List(Vec<Expr>),
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Decl {
        ty: Type,
        name: Id,
        init: Option<Init>,
        line: usize,
    },
    Assign {
        target: LValue,
        value: Expr,
        line: usize,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        line: usize,
    },
    Loop {
        cond: Expr,
        body: Vec<Stmt>,
        line: usize,
    },
    Return {
        value: Option<Expr>,
        line: usize,
    },
    ProcDef {
        name: Id,
        params: Vec<(Type, Id)>,
        ret: Type,
        body: Vec<Stmt>,
        line: usize,
    },
    Call {
        call: Call,
        line: usize,
    },
}

/// An assignable place: a bare variable, an indexed element, or an
/// attribute of an `oam-entry` or hardware module.
#[derive(Clone, Debug)]
pub enum LValue {
    Var(Id),
    Index(Box<LValue>, Box<Expr>),
    Attr(Box<LValue>, Id),
}

#[derive(Clone, Debug)]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<Expr>,
}

/// Either a plain call (`Add(1, 2)`) or a dotted hardware call
/// (`control.LCDon()`), canonicalised to a flat `module_fn` name during
/// type checking, not here.
#[derive(Clone, Debug)]
pub enum Callee {
    Plain(Id),
    Dotted(Id, Id),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    BitNot,
    Not,
}

/// Expression nodes. Each carries a `Cell<Option<Type>>` filled in by the
/// type checker; it is `None` until then and `Some` for every node
/// afterward (the checked property: type annotation completeness).
#[derive(Clone, Debug)]
pub enum Expr {
    Int(i64, Cell<Option<Type>>),
    Str(String, Cell<Option<Type>>),
    Var(Id, Cell<Option<Type>>),
    Index(Box<Expr>, Box<Expr>, Cell<Option<Type>>),
    Attr(Box<Expr>, Id, Cell<Option<Type>>),
    Unary(UnOp, Box<Expr>, Cell<Option<Type>>),
    Binary(BinOp, Box<Expr>, Box<Expr>, Cell<Option<Type>>),
    Call(Call, Cell<Option<Type>>),
}

impl Expr {
    pub fn int(v: i64) -> Self {
        Expr::Int(v, Cell::new(None))
    }
    pub fn str(v: String) -> Self {
        Expr::Str(v, Cell::new(None))
    }
    pub fn var(v: Id) -> Self {
        Expr::Var(v, Cell::new(None))
    }
    pub fn index(base: Expr, idx: Expr) -> Self {
        Expr::Index(Box::new(base), Box::new(idx), Cell::new(None))
    }
    pub fn attr(base: Expr, name: Id) -> Self {
        Expr::Attr(Box::new(base), name, Cell::new(None))
    }
    pub fn unary(op: UnOp, e: Expr) -> Self {
        Expr::Unary(op, Box::new(e), Cell::new(None))
    }
    pub fn binary(op: BinOp, l: Expr, r: Expr) -> Self {
        Expr::Binary(op, Box::new(l), Box::new(r), Cell::new(None))
    }
    pub fn call(call: Call) -> Self {
        Expr::Call(call, Cell::new(None))
    }

    /// The type resolved for this node by the checker, if it has run.
    pub fn resolved_ty(&self) -> Option<Type> {
        match self {
            Expr::Int(_, t)
            | Expr::Str(_, t)
            | Expr::Var(_, t)
            | Expr::Index(_, _, t)
            | Expr::Attr(_, _, t)
            | Expr::Unary(_, _, t)
            | Expr::Binary(_, _, _, t)
            | Expr::Call(_, t) => t.get(),
        }
    }

    pub fn set_resolved_ty(&self, ty: Type) {
        match self {
            Expr::Int(_, t)
            | Expr::Str(_, t)
            | Expr::Var(_, t)
            | Expr::Index(_, _, t)
            | Expr::Attr(_, _, t)
            | Expr::Unary(_, _, t)
            | Expr::Binary(_, _, _, t)
            | Expr::Call(_, t) => t.set(Some(ty)),
        }
    }
}
