//! Shared front-end data structures for Peek.
//!
//! Everything that more than one phase needs to agree on lives here:
//! interned [`Name`]s, source [`Span`]s and the [`LineIndex`], the flat
//! arena-based syntax tree, semantic [`Type`]s and the token stream.
//!
//! # Layered arenas
//!
//! A debugger fragment is parsed *on top of* an already-parsed program. The
//! fragment's [`ExprArena`] is layered over the program's arena so that every
//! [`ExprId`] is unique across both, and later phases (resolution, codegen)
//! can look up program expressions and fragment expressions through the same
//! handle. See [`ExprArena::layered`].

mod arena;
pub mod ast;
mod cancel;
mod expr_id;
mod interner;
mod line_index;
mod name;
mod span;
pub mod stack;
mod token;
mod ty;
pub mod visitor;

pub use arena::ExprArena;
pub use ast::{
    BinaryOp, Expr, ExprKind, Function, Lambda, LambdaReceiver, Modifiers, Module, Param,
    ParsedType, UnaryOp,
};
pub use cancel::{CancellationFlag, Cancelled};
pub use expr_id::ExprId;
pub use interner::{SharedInterner, StringInterner};
pub use line_index::LineIndex;
pub use name::Name;
pub use span::Span;
pub use token::{Token, TokenKind, TokenList};
pub use ty::{FunctionType, Type};

#[cfg(test)]
mod tests;
