//! Peek Target - the interface to a debuggee suspended at a breakpoint.
//!
//! The evaluator never touches the debuggee directly: it reads the top
//! frame, loads compiled classes, invokes methods and mirrors values through
//! a [`DebugTarget`]. Objects stay in the debuggee and are handled by
//! [`ObjectId`].

mod error;
mod value;

use peek_codegen::NamedBinary;

pub use error::TargetError;
pub use value::{FrameVariable, InvocationOutcome, ObjectId, ObjectKind, TargetValue};

/// A debuggee whose thread is suspended.
///
/// Every request is answered against the top frame of the suspended thread.
/// Invocations run that thread until the invoked method completes and leave
/// it suspended where it was.
pub trait DebugTarget {
    // ── Suspension ──────────────────────────────────────────────────

    /// Changes every time the thread resumes or steps. Anything derived from
    /// one suspension (frame values, compiled fragments) is stale once it
    /// changes.
    fn generation(&self) -> u64;

    fn is_suspended(&self) -> bool;

    /// Source line the thread is suspended at.
    fn current_line(&self) -> Option<u32>;

    // ── Frame state ─────────────────────────────────────────────────

    /// Variables of the top frame visible at the current position, outermost
    /// first.
    fn frame_variables(&self) -> Result<Vec<FrameVariable>, TargetError>;

    /// Captured state of the top frame when it runs a closure body.
    fn captured_variables(&self) -> Result<Vec<FrameVariable>, TargetError>;

    // ── Classes and invocation ──────────────────────────────────────

    fn load_class(&mut self, class: &NamedBinary) -> Result<(), TargetError>;

    fn is_loaded(&self, class: &str) -> bool;

    fn has_method(&self, class: &str, method: &str) -> bool;

    fn invoke_static(
        &mut self,
        class: &str,
        method: &str,
        args: &[TargetValue],
    ) -> Result<InvocationOutcome, TargetError>;

    fn invoke_closure(
        &mut self,
        closure: ObjectId,
        args: &[TargetValue],
    ) -> Result<InvocationOutcome, TargetError>;

    // ── Objects ─────────────────────────────────────────────────────

    fn object_kind(&self, id: ObjectId) -> Result<ObjectKind, TargetError>;

    /// Instantiate a loaded closure class.
    fn new_closure(
        &mut self,
        class: &str,
        captures: Vec<TargetValue>,
    ) -> Result<ObjectId, TargetError>;

    fn closure_captures(&self, closure: ObjectId) -> Result<Vec<TargetValue>, TargetError>;

    fn new_box(&mut self, value: TargetValue) -> Result<ObjectId, TargetError>;

    fn box_get(&self, cell: ObjectId) -> Result<TargetValue, TargetError>;

    fn box_set(&mut self, cell: ObjectId, value: TargetValue) -> Result<(), TargetError>;

    /// Create a string in the debuggee.
    fn mirror_string(&mut self, text: &str) -> Result<ObjectId, TargetError>;

    fn read_string(&self, id: ObjectId) -> Result<String, TargetError>;

    fn new_exception(&mut self, message: &str) -> Result<ObjectId, TargetError>;

    fn exception_message(&self, id: ObjectId) -> Result<String, TargetError>;

    /// Write a line to the debuggee's output.
    fn print(&mut self, text: &str) -> Result<(), TargetError>;

    // ── Breakpoints ─────────────────────────────────────────────────

    fn breakpoints(&self) -> Vec<u32>;

    fn breakpoints_enabled(&self) -> bool;

    fn set_breakpoints_enabled(&mut self, enabled: bool);

    // ── Provided ────────────────────────────────────────────────────

    /// String form of a value, as the language's `toString` renders it.
    fn render_value(&self, value: TargetValue) -> Result<String, TargetError> {
        match value {
            TargetValue::Int(n) => Ok(n.to_string()),
            TargetValue::Bool(b) => Ok(b.to_string()),
            TargetValue::Unit => Ok("Unit".to_owned()),
            TargetValue::Object(id) => match self.object_kind(id)? {
                ObjectKind::Str => self.read_string(id),
                ObjectKind::Closure { class } => Ok(format!("<closure {class}>")),
                ObjectKind::Ref => {
                    let content = self.box_get(id)?;
                    self.render_value(content)
                }
                ObjectKind::Exception => {
                    Ok(format!("Exception: {}", self.exception_message(id)?))
                }
            },
        }
    }

    /// Structural equality for strings, identity for other objects.
    fn values_equal(&self, left: TargetValue, right: TargetValue) -> Result<bool, TargetError> {
        if let (TargetValue::Object(l), TargetValue::Object(r)) = (left, right) {
            if l != r
                && self.object_kind(l)? == ObjectKind::Str
                && self.object_kind(r)? == ObjectKind::Str
            {
                return Ok(self.read_string(l)? == self.read_string(r)?);
            }
        }
        Ok(left == right)
    }
}

#[cfg(test)]
mod tests;
