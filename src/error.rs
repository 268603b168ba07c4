//! The compiler's single error type, spanning every phase.
//!
//! Grounded on the teacher's own `LexError`/`ParseError` idiom (manual
//! `Display`, `Debug` forwarding to `Display`) rather than pulling in a
//! generic error crate; the taxonomy itself is grounded on
//! `original_source/src/customErrors.py`.

use derive_more::Display;

use crate::common::Id;
use crate::front::lex::LexError;
use crate::front::types::Type;

#[derive(Display)]
pub enum CompileError {
    #[display("{_0}")]
    Lex(LexError),

    #[display("parse error at {line}:{col}: expected {expected}, found {found}")]
    Parse { line: usize, col: usize, expected: String, found: String },

    #[display("'{name}' is already declared in this scope")]
    DuplicateDeclaration { name: Id },

    #[display("'{name}' is used before it is declared")]
    UndeclaredVariable { name: Id },

    #[display("procedure '{name}' is never defined")]
    UndeclaredProcedure { name: Id },

    #[display("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch { context: String, expected: Type, found: Type },

    #[display("'{name}' is not a recognised type")]
    InvalidType { name: String },

    #[display("type {ty} has no attribute '{attr}'")]
    InvalidAttribute { ty: Type, attr: Id },

    #[display("{name} expects {expected} argument(s), found {found}")]
    ArgCountMismatch { name: Id, expected: usize, found: usize },

    #[display("return outside of a procedure body")]
    ReturnOutsideProcedure,

    #[display("internal compiler inconsistency: {detail}")]
    Internal { detail: String },
}

impl std::fmt::Debug for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
