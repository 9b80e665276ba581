//! Synthetic declarations for a debugger fragment.
//!
//! A fragment is compiled as the single static method of a generated final
//! object class. The descriptors built here describe that class and method
//! to the backend; they are plain data and never touch the program's symbol
//! tables.

use peek_capture::ParameterInfo;
use peek_ir::Type;

use crate::BinaryType;

/// Classes of one package, as seen by a compilation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageView {
    /// Fully qualified name; the root package is `""`.
    pub name: String,
    pub classes: Vec<String>,
}

impl PackageView {
    pub fn contains(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    /// A class with exactly one instance and no state.
    Object,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructorDescriptor {
    pub is_primary: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueParameterDescriptor {
    pub index: usize,
    /// `p0`, `p1`, ...
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    /// Class the method belongs to.
    pub owner: String,
    pub parameters: Vec<ValueParameterDescriptor>,
    pub return_type: Type,
    pub is_static: bool,
}

impl MethodDescriptor {
    pub fn param_types(&self) -> Vec<BinaryType> {
        self.parameters
            .iter()
            .map(|p| BinaryType::of(&p.ty))
            .collect()
    }

    pub fn return_binary_type(&self) -> BinaryType {
        BinaryType::of(&self.return_type)
    }
}

/// Member scope of the generated class: it knows exactly one method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticMemberScope {
    method: MethodDescriptor,
}

impl SyntheticMemberScope {
    pub fn lookup(&self, name: &str) -> Option<&MethodDescriptor> {
        (self.method.name == name).then_some(&self.method)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.method.name.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    /// Package the class is declared in.
    pub package: String,
    pub kind: ClassKind,
    pub is_final: bool,
    pub constructors: Vec<ConstructorDescriptor>,
    pub supertypes: Vec<String>,
    pub members: SyntheticMemberScope,
}

/// Build the class and method descriptors of a fragment.
///
/// The method has one parameter per entry of `parameters`, named `p<index>`
/// and typed like the captured value, and returns `return_type`.
pub fn create_descriptors_for_fragment(
    class_name: &str,
    method_name: &str,
    parameters: &ParameterInfo,
    return_type: &Type,
    package: &PackageView,
) -> (ClassDescriptor, MethodDescriptor) {
    let method = MethodDescriptor {
        name: method_name.to_owned(),
        owner: class_name.to_owned(),
        parameters: parameters
            .parameters
            .iter()
            .map(|p| ValueParameterDescriptor {
                index: p.index,
                name: format!("p{}", p.index),
                ty: p.ty.clone(),
            })
            .collect(),
        return_type: match return_type {
            Type::Nothing => Type::Unit,
            other => other.clone(),
        },
        is_static: true,
    };
    let class = ClassDescriptor {
        name: class_name.to_owned(),
        package: package.name.clone(),
        kind: ClassKind::Object,
        is_final: true,
        constructors: vec![ConstructorDescriptor { is_primary: true }],
        supertypes: Vec::new(),
        members: SyntheticMemberScope {
            method: method.clone(),
        },
    };
    (class, method)
}
