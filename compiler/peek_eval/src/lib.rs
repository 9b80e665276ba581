//! Peek Eval - evaluating expressions in a suspended debuggee.
//!
//! # Architecture
//!
//! - [`CompilationCache`]: compiled fragments of the current suspension,
//!   keyed by text and position
//! - [`VariableFinder`]: reads the generated method's arguments out of the
//!   suspended frame
//! - [`Interpreter`]: runs compiled fragments host-side when the debuggee
//!   cannot run them itself
//! - [`Evaluator`]: compile, run natively or interpret, and recompile once
//!   when cached code turns out to be stale
//! - [`DebugSession`]: a program in a [`peek_vm::Vm`] together with an
//!   evaluator, as a debugger front end drives it

mod cache;
mod error;
mod evaluator;
mod finder;
mod guard;
mod interpreter;
mod result;
mod session;

pub use cache::{CacheStats, CompilationCache, CompiledDataDescriptor};
pub use error::EvaluateError;
pub use evaluator::{Evaluator, EvaluatorConfig, IGNORED_DIAGNOSTICS};
pub use finder::VariableFinder;
pub use guard::BreakpointsDisabled;
pub use interpreter::{Interpreter, DEFAULT_MAX_DEPTH};
pub use result::{CodeFragment, EvaluationResult, ExceptionKind};
pub use session::{DebugSession, SessionError};

#[cfg(test)]
mod tests;
