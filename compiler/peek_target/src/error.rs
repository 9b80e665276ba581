use crate::ObjectId;

/// Failures reported by a debuggee.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    // Structural: the debuggee cannot run the given code, but could run
    // other code.
    #[error("class loading is not available in this debuggee")]
    ClassLoadingRefused,
    #[error("class `{class}` is not loaded")]
    ClassNotLoaded { class: String },
    #[error("method `{class}.{method}` not found")]
    MethodNotFound { class: String, method: String },
    #[error("linkage error: {message}")]
    Linkage { message: String },
    #[error("method invocation is not available in this debuggee")]
    InvocationRefused,
    #[error("invalid code in `{class}`: {message}")]
    InvalidCode { class: String, message: String },

    // Process-level: the debuggee itself is in no state to serve requests.
    #[error("debuggee is not suspended")]
    NotSuspended,
    #[error("debuggee has terminated")]
    Disconnected,
    #[error("object {id} has been collected")]
    ObjectCollected { id: ObjectId },
    #[error("object {id} is a {found}, expected {expected}")]
    UnexpectedObject {
        id: ObjectId,
        expected: &'static str,
        found: &'static str,
    },
    #[error("inconsistent debug information: {message}")]
    InconsistentDebugInfo { message: String },
    #[error("breakpoint at line {line} hit during method invocation")]
    BreakpointDuringInvocation { line: u32 },
}

impl TargetError {
    /// Whether the failure concerns the code being run rather than the
    /// debuggee. Structural failures of injected code are recovered from by
    /// interpreting that code instead; the others end the request.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TargetError::ClassLoadingRefused
                | TargetError::ClassNotLoaded { .. }
                | TargetError::MethodNotFound { .. }
                | TargetError::Linkage { .. }
                | TargetError::InvocationRefused
                | TargetError::InvalidCode { .. }
        )
    }

    /// Whether the failure means the code refers to classes or methods that
    /// no longer exist in the shape it was compiled against.
    pub fn is_linkage(&self) -> bool {
        matches!(
            self,
            TargetError::ClassNotLoaded { .. }
                | TargetError::MethodNotFound { .. }
                | TargetError::Linkage { .. }
                | TargetError::InvalidCode { .. }
        )
    }
}
