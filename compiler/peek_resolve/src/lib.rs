//! Name resolution and type inference for Peek.
//!
//! [`Program::analyze`] parses and resolves a source file. The result is
//! immutable: a debugger fragment is resolved against it through the
//! [`Resolver`] trait, in tables layered over the program's so that every
//! [`DeclId`], [`ScopeId`] and binding of the program stays valid while the
//! fragment adds its own.
//!
//! # Breakpoint context
//!
//! While resolving a program the walker records, for the first statement
//! starting on each line, which names and receivers are in scope (a
//! [`ContextSite`]). A fragment evaluated at that line is resolved in a
//! [`ScopeKind::Fragment`] scope whose parent is the statement's scope, so
//! walking up from a fragment reference crosses the same lambdas and local
//! functions the program's own code would.

mod bindings;
mod decl;
mod env;
mod fragment;
mod program;
mod scope;
mod walker;

pub use bindings::{Bindings, Builtin, CallKind, Capture, MemberBuiltin, Reference};
pub use decl::{DeclId, DeclKind, DeclTable, Declaration, Origin, Visibility};
pub use env::{ContextSite, ReceiverFrame};
pub use fragment::FragmentResolution;
pub use program::Program;
pub use scope::{ScopeData, ScopeId, ScopeKind, ScopeTree};

use peek_parse::FragmentAst;

/// Where the debuggee is suspended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DebugPosition {
    /// 1-based source line.
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no code to evaluate against at line {line}")]
    InvalidPosition { line: u32 },
}

/// Resolves fragments in the context of a suspended program.
pub trait Resolver {
    fn resolve_fragment(
        &self,
        fragment: &FragmentAst,
        position: DebugPosition,
    ) -> Result<FragmentResolution, ResolveError>;
}

/// Name of the local slot holding the receiver labeled `label`.
pub fn receiver_slot_name(label: &str) -> String {
    format!("this@{label}")
}

#[cfg(test)]
mod tests;
