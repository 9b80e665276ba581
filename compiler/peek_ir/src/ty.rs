//! Semantic types.

use std::fmt;
use std::sync::Arc;

/// The type of a value or expression after resolution.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Str,
    Unit,
    /// Type of expressions that never complete normally, such as `error(..)`.
    Nothing,
    Function(Arc<FunctionType>),
    /// Produced after a reported error; compatible with everything.
    Error,
}

/// `(P1, P2) -> R` or `Recv.(P1) -> R`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FunctionType {
    pub receiver: Option<Type>,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl FunctionType {
    /// Number of values passed on invocation, counting the receiver.
    pub fn arity(&self) -> usize {
        self.params.len() + usize::from(self.receiver.is_some())
    }

    /// Parameter types in invocation order, receiver first.
    pub fn invocation_params(&self) -> impl Iterator<Item = &Type> {
        self.receiver.iter().chain(self.params.iter())
    }
}

impl Type {
    pub fn function(receiver: Option<Type>, params: Vec<Type>, ret: Type) -> Self {
        Type::Function(Arc::new(FunctionType {
            receiver,
            params,
            ret,
        }))
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// Whether a value of type `other` may be used where `self` is expected.
    ///
    /// `Nothing` flows into every type and `Error` is compatible both ways so
    /// that one mistake is reported once.
    pub fn accepts(&self, other: &Type) -> bool {
        if self == other || other.is_error() || self.is_error() {
            return true;
        }
        match (self, other) {
            (_, Type::Nothing) => true,
            (Type::Function(expected), Type::Function(actual)) => {
                expected.params.len() == actual.params.len()
                    && match (&expected.receiver, &actual.receiver) {
                        (Some(e), Some(a)) => a.accepts(e),
                        (None, None) => true,
                        _ => false,
                    }
                    && expected
                        .params
                        .iter()
                        .zip(&actual.params)
                        .all(|(e, a)| a.accepts(e))
                    && expected.ret.accepts(&actual.ret)
            }
            _ => false,
        }
    }

    /// Least common type of two branches, if there is one.
    pub fn join(&self, other: &Type) -> Option<Type> {
        if self.accepts(other) && !matches!(self, Type::Nothing) {
            Some(self.clone())
        } else if other.accepts(self) {
            Some(other.clone())
        } else {
            None
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Bool => write!(f, "Bool"),
            Type::Str => write!(f, "Str"),
            Type::Unit => write!(f, "Unit"),
            Type::Nothing => write!(f, "Nothing"),
            Type::Error => write!(f, "{{error}}"),
            Type::Function(func) => {
                if let Some(receiver) = &func.receiver {
                    write!(f, "{receiver}.")?;
                }
                write!(f, "(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {}", func.ret)
            }
        }
    }
}
