//! Peek Codegen - class-file generation for programs and debugger fragments.
//!
//! # Architecture
//!
//! - [`ClassFile`] / [`NamedBinary`]: the binary format a debuggee loads
//! - [`create_descriptors_for_fragment`]: synthetic class and method
//!   descriptors for a fragment
//! - [`ModuleDescriptor`]: what a compilation sees of its module;
//!   [`EvaluatorModule`] adds the generated class to the program's module
//! - [`CodegenBackend`]: compiles a [`FragmentUnit`], consulting a
//!   [`ReferenceInterceptor`] for every reference; [`StackBackend`] is the
//!   implementation targeting the stack machine
//! - [`compile_program`]: the same lowering, applied to whole programs
//! - [`FragmentCompiler`]: analysis, descriptors and backend, in that order

mod backend;
mod class_file;
mod descriptors;
mod fragment;
mod instr;
mod lower;
mod module;
mod program;

use peek_ir::Cancelled;

pub use backend::{CodegenBackend, FragmentUnit, NoIntercept, ReferenceInterceptor, StackBackend};
pub use class_file::{
    BinaryType, CapturedVariable, ClassFile, ClassFlags, ClassFormatError, LineEntry,
    LocalVariable, MethodFlags, MethodInfo, NamedBinary, CLASS_FORMAT_VERSION, INVOKE_METHOD,
};
pub use descriptors::{
    create_descriptors_for_fragment, ClassDescriptor, ClassKind, ConstructorDescriptor,
    MethodDescriptor, PackageView, SyntheticMemberScope, ValueParameterDescriptor,
};
pub use fragment::{compile_fragment, CompilationResult, FragmentCompiler, MethodSignature};
pub use instr::Instruction;
pub use lower::local_function_slot_name;
pub use module::{EvaluatorModule, FunctionRef, ModuleDescriptor, ProgramModule, PROGRAM_CLASS_NAME};
pub use program::compile_program;

/// Name of the static method a fragment is compiled to.
pub const GENERATED_FUNCTION_NAME: &str = "generated_for_debugger_fun";

/// Name of the class holding [`GENERATED_FUNCTION_NAME`].
pub const GENERATED_CLASS_NAME: &str = "Generated_for_debugger_class";

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("program has {count} error(s)")]
    ProgramHasErrors { count: usize },
    #[error("unresolved {what}")]
    Unresolved { what: String },
    #[error("no value for `{name}` in this frame")]
    UnboundReference { name: String },
    #[error("{what} is not supported")]
    Unsupported { what: String },
    #[error("too many local variables in `{method}`")]
    TooManyLocals { method: String },
    #[error("too many captured values in `{class}`")]
    TooManyCaptures { class: String },
    #[error("too many arguments")]
    TooManyArguments,
    #[error("compilation cancelled")]
    Cancelled,
    #[error(transparent)]
    Format(#[from] ClassFormatError),
}

impl From<Cancelled> for CodegenError {
    fn from(_: Cancelled) -> Self {
        CodegenError::Cancelled
    }
}

#[cfg(test)]
mod tests;
