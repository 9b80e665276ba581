//! Failures of an evaluation request.

use std::fmt;

use peek_ir::Cancelled;
use peek_target::TargetError;
use tracing::error;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvaluateError {
    // ── The fragment itself ─────────────────────────────────────────
    #[error("{message}")]
    Syntax { message: String },
    #[error("{message}")]
    Semantic { message: String },
    #[error("Couldn't evaluate expression: breakpoint at line {line} is placed outside the file or on a line without code")]
    InvalidPosition { line: u32 },

    // ── Reading the frame ───────────────────────────────────────────
    /// The value lives outside the closure the debuggee is suspended in,
    /// and the closure did not capture it.
    #[error("'{name}' is not captured")]
    NotCaptured { name: String },
    #[error("Cannot find local variable: name = '{name}', type = {ty}")]
    VariableNotFound { name: String, ty: String },

    // ── Execution ───────────────────────────────────────────────────
    /// Compiled code no longer matches the debuggee, even after
    /// recompiling it.
    #[error("evaluated code does not match the debuggee: {message}")]
    BrokenCode { message: String },
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("evaluation cancelled")]
    Cancelled,
    #[error("An exception occurs during Evaluate Expression Action: {message}")]
    Internal { message: String },
}

impl EvaluateError {
    /// An unexpected failure, logged where it is classified.
    pub(crate) fn internal(cause: impl fmt::Display) -> Self {
        let message = cause.to_string();
        error!(%message, "unexpected evaluation failure");
        EvaluateError::Internal { message }
    }
}

impl From<Cancelled> for EvaluateError {
    fn from(_: Cancelled) -> Self {
        EvaluateError::Cancelled
    }
}
