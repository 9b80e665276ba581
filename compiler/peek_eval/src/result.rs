use peek_ir::CancellationFlag;
use peek_resolve::DebugPosition;
use peek_target::{ObjectId, TargetValue};

/// Text entered by the user and where it is evaluated.
#[derive(Clone, Debug)]
pub struct CodeFragment {
    pub text: String,
    pub position: DebugPosition,
    pub(crate) cancellation: Option<CancellationFlag>,
}

impl CodeFragment {
    pub fn new(text: impl Into<String>, line: u32) -> Self {
        CodeFragment {
            text: text.into(),
            position: DebugPosition { line },
            cancellation: None,
        }
    }

    /// Abandon the request once `flag` is raised.
    #[must_use]
    pub fn cancellable(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// Thrown by the fragment or by code it called.
    FromEvaluatedCode,
    /// The compiled fragment refers to classes or methods the debuggee
    /// does not have in the compiled shape.
    BrokenCode,
}

/// How an evaluation completed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvaluationResult {
    ValueReturned(TargetValue),
    ExceptionThrown {
        exception: ObjectId,
        kind: ExceptionKind,
    },
    AbnormalTermination(String),
}

impl EvaluationResult {
    pub fn is_broken_code(&self) -> bool {
        matches!(
            self,
            EvaluationResult::ExceptionThrown {
                kind: ExceptionKind::BrokenCode,
                ..
            }
        )
    }
}
