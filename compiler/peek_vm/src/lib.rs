//! Peek VM - a stack machine that runs compiled programs as a debuggee.
//!
//! The VM runs one thread: `main` of the program class. The thread stops at
//! enabled breakpoints and after steps; while it is stopped the VM answers
//! [`peek_target::DebugTarget`] requests against its top frame, including
//! running further methods on top of the suspended frames.

mod heap;
mod machine;
mod output;
mod target;

use peek_codegen::ClassFormatError;
use peek_target::TargetError;

pub use machine::{ThreadState, Vm};
pub use output::Output;

/// Method the thread starts in.
pub const ENTRY_POINT: &str = "main";

/// Capabilities a VM grants to debuggers.
#[derive(Clone, Debug)]
pub struct VmConfig {
    /// Whether classes can be loaded into the running VM.
    pub allow_class_loading: bool,
    /// Whether methods can be invoked on the suspended thread.
    pub allow_invocation: bool,
    /// Deepest call stack before a stack overflow is thrown.
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            allow_class_loading: true,
            allow_invocation: true,
            max_call_depth: 1024,
        }
    }
}

/// Why the thread stopped running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint { line: u32 },
    Step { line: u32 },
    /// `main` returned.
    Finished,
    /// An exception left `main`; the thread is gone.
    Exception { message: String },
}

impl StopReason {
    /// Line the thread is suspended at, if it still runs.
    pub fn line(&self) -> Option<u32> {
        match self {
            StopReason::Breakpoint { line } | StopReason::Step { line } => Some(*line),
            StopReason::Finished | StopReason::Exception { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error(transparent)]
    Format(#[from] ClassFormatError),
    #[error("program has no `{ENTRY_POINT}` function")]
    NoEntryPoint,
    #[error("thread is not suspended ({state:?})")]
    NotSuspended { state: ThreadState },
    #[error(transparent)]
    Target(#[from] TargetError),
}

#[cfg(test)]
mod tests;
