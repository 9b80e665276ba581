use std::fmt;

use peek_ir::{ExprId, Name, Type};
use peek_resolve::DeclId;
use rustc_hash::{FxHashMap, FxHashSet};

/// A value the fragment reads from the suspended frame, passed to the
/// synthesized method as parameter `index`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    /// Position in the synthesized method's parameter list.
    pub index: usize,
    /// Name used to look the value up in the frame: the variable name, or
    /// `this@label` for a receiver.
    pub raw: String,
    pub ty: Type,
    /// Declaration (or, for receivers, the declaring function or lambda).
    pub decl: DeclId,
    pub kind: ParameterKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// A local value or parameter.
    Ordinary { name: Name },
    /// The receiver of an enclosing extension function or lambda.
    ExtensionReceiver { label: Name },
    /// A local function, passed as a function-typed value.
    LocalFunction { name: Name },
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.raw, self.ty)
    }
}

/// What a fragment captures from its context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterInfo {
    /// In order of first reference.
    pub parameters: Vec<Parameter>,
    /// Every mapped reference expression and its parameter index.
    pub mappings: FxHashMap<ExprId, usize>,
    /// Parameters referenced from inside a closure that does not run in the
    /// suspended frame.
    pub crossing_bounds: FxHashSet<usize>,
}

impl ParameterInfo {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Parameter a reference expression was mapped to.
    pub fn parameter_for(&self, id: ExprId) -> Option<&Parameter> {
        self.mappings
            .get(&id)
            .and_then(|&index| self.parameters.get(index))
    }

    pub fn is_crossing(&self, index: usize) -> bool {
        self.crossing_bounds.contains(&index)
    }

    /// Parameter carrying `decl`'s value (not its receiver).
    pub fn parameter_for_decl(&self, decl: DeclId) -> Option<&Parameter> {
        self.parameters.iter().find(|p| {
            p.decl == decl && !matches!(p.kind, ParameterKind::ExtensionReceiver { .. })
        })
    }

    /// Parameter carrying the receiver of `owner`.
    pub fn parameter_for_receiver(&self, owner: DeclId) -> Option<&Parameter> {
        self.parameters.iter().find(|p| {
            p.decl == owner && matches!(p.kind, ParameterKind::ExtensionReceiver { .. })
        })
    }
}
