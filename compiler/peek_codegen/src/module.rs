//! What a compilation can see of the surrounding program.

use peek_ir::Function;
use peek_resolve::{DeclId, DeclKind, Program};

use crate::PackageView;

/// Name of the class holding a program's top-level functions.
pub const PROGRAM_CLASS_NAME: &str = "Program";

/// Static method implementing a top-level function.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub class: String,
    pub method: String,
}

/// The module a compilation unit belongs to.
pub trait ModuleDescriptor {
    fn name(&self) -> &str;

    /// Classes of the package `fq_name`, if it exists.
    fn package(&self, fq_name: &str) -> Option<PackageView>;

    /// Where the top-level function `decl` is compiled to.
    fn function_owner(&self, decl: DeclId) -> Option<FunctionRef>;

    /// Syntax of the inline function `decl`, for expansion at call sites.
    fn inline_body(&self, decl: DeclId) -> Option<&Function>;
}

/// The module of a resolved program.
pub struct ProgramModule<'p> {
    program: &'p Program,
}

impl<'p> ProgramModule<'p> {
    pub fn new(program: &'p Program) -> Self {
        ProgramModule { program }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }
}

/// Method name of a top-level function. Extension functions are suffixed
/// with their receiver type so that `Int.show` and `Str.show` can coexist.
pub(crate) fn method_name(program: &Program, decl: DeclId) -> String {
    let declaration = program.decls().get(decl);
    let name = program.interner().lookup(declaration.name);
    match declaration.receiver_type() {
        Some(receiver) => format!("{name}${receiver}"),
        None => name.to_owned(),
    }
}

impl ModuleDescriptor for ProgramModule<'_> {
    fn name(&self) -> &str {
        "program"
    }

    fn package(&self, fq_name: &str) -> Option<PackageView> {
        fq_name.is_empty().then(|| PackageView {
            name: String::new(),
            classes: vec![PROGRAM_CLASS_NAME.to_owned()],
        })
    }

    fn function_owner(&self, decl: DeclId) -> Option<FunctionRef> {
        match self.program.decls().get(decl).kind {
            DeclKind::Function { inline: false, .. } => Some(FunctionRef {
                class: PROGRAM_CLASS_NAME.to_owned(),
                method: method_name(self.program, decl),
            }),
            _ => None,
        }
    }

    fn inline_body(&self, decl: DeclId) -> Option<&Function> {
        match self.program.decls().get(decl).kind {
            DeclKind::Function { inline: true, .. } => self.program.function(decl),
            _ => None,
        }
    }
}

/// Module seen by a debugger fragment: the program's module, with the
/// generated class added to its package.
///
/// Only [`package`](ModuleDescriptor::package) differs from the wrapped
/// module.
pub struct EvaluatorModule<'m> {
    inner: &'m dyn ModuleDescriptor,
    package: String,
    generated_class: String,
}

impl<'m> EvaluatorModule<'m> {
    pub fn new(
        inner: &'m dyn ModuleDescriptor,
        package: impl Into<String>,
        generated_class: impl Into<String>,
    ) -> Self {
        EvaluatorModule {
            inner,
            package: package.into(),
            generated_class: generated_class.into(),
        }
    }
}

impl ModuleDescriptor for EvaluatorModule<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn package(&self, fq_name: &str) -> Option<PackageView> {
        if fq_name != self.package {
            return self.inner.package(fq_name);
        }
        let mut view = self.inner.package(fq_name).unwrap_or_else(|| PackageView {
            name: fq_name.to_owned(),
            classes: Vec::new(),
        });
        if !view.contains(&self.generated_class) {
            view.classes.push(self.generated_class.clone());
        }
        Some(view)
    }

    fn function_owner(&self, decl: DeclId) -> Option<FunctionRef> {
        self.inner.function_owner(decl)
    }

    fn inline_body(&self, decl: DeclId) -> Option<&Function> {
        self.inner.inline_body(decl)
    }
}
