//! Diagnostics for the Peek toolchain.
//!
//! Every phase that can reject user input (lexer, parser, resolver) reports
//! [`Diagnostic`] values carrying an [`ErrorCode`], a [`Severity`] and
//! labelled spans. Only diagnostics with [`Severity::Error`] block code
//! generation; callers may additionally ignore specific codes (the debugger
//! evaluator ignores [`ErrorCode::E2005`]).

mod diagnostic;
mod error_code;
mod render;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use render::render;
