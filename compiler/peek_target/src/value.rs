//! Values as seen from outside the debuggee.

use std::fmt;

use peek_codegen::BinaryType;

/// Handle to an object living in the debuggee.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub const fn new(index: u32) -> Self {
        ObjectId(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A value read from or passed into the debuggee.
///
/// Primitives travel by value; strings, closures, shared boxes and
/// exceptions stay in the debuggee and are referred to by [`ObjectId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetValue {
    Int(i64),
    Bool(bool),
    Unit,
    Object(ObjectId),
}

impl TargetValue {
    pub fn as_object(self) -> Option<ObjectId> {
        match self {
            TargetValue::Object(id) => Some(id),
            _ => None,
        }
    }
}

/// What an object in the debuggee is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Str,
    /// Instance of the named closure class.
    Closure { class: String },
    /// Shared box of a mutable variable captured by a closure.
    Ref,
    Exception,
}

impl ObjectKind {
    /// Binary type of a variable holding such an object.
    pub fn binary_type(&self) -> BinaryType {
        match self {
            ObjectKind::Str => BinaryType::Str,
            ObjectKind::Closure { .. } => BinaryType::Function,
            ObjectKind::Ref => BinaryType::Ref,
            // Exceptions never sit in variables of the language.
            ObjectKind::Exception => BinaryType::Void,
        }
    }
}

/// A named variable of the suspended frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameVariable {
    pub name: String,
    pub ty: BinaryType,
    pub value: TargetValue,
}

/// How a method invoked in the debuggee completed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    Returned(TargetValue),
    /// The method threw; the payload is the exception object.
    Threw(ObjectId),
}
