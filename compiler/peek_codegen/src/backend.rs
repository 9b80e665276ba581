//! Backend interface and the stack-machine backend.

use peek_ir::{ExprId, StringInterner};
use peek_parse::FragmentAst;
use peek_resolve::{Capture, FragmentResolution};

use crate::lower::{FrameBuilder, Lowerer};
use crate::{
    ClassDescriptor, ClassFile, ClassFlags, CodegenError, MethodFlags, ModuleDescriptor,
    NamedBinary,
};

/// Redirects references of the compiled unit to parameters of the method
/// being generated.
///
/// Consulted for every identifier, `this` and `super` expression compiled in
/// the generated method's own frame (including inlined lambdas and inlined
/// function bodies), and for every value captured by a closure created in
/// that frame. Code inside non-inlined closures is never intercepted.
pub trait ReferenceInterceptor {
    /// Parameter index to load instead of compiling the reference `id`.
    fn intercept(&self, id: ExprId) -> Option<usize>;

    /// Parameter index carrying a value a closure captures.
    fn intercept_capture(&self, capture: Capture) -> Option<usize>;
}

/// Compiles every reference normally.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoIntercept;

impl ReferenceInterceptor for NoIntercept {
    fn intercept(&self, _id: ExprId) -> Option<usize> {
        None
    }

    fn intercept_capture(&self, _capture: Capture) -> Option<usize> {
        None
    }
}

/// Everything a backend needs to compile one fragment.
pub struct FragmentUnit<'a> {
    pub fragment: &'a FragmentAst,
    pub resolution: &'a FragmentResolution,
    pub interner: &'a StringInterner,
    pub module: &'a dyn ModuleDescriptor,
    pub class: &'a ClassDescriptor,
    /// The generated method, looked up in the class's member scope.
    pub method_name: &'a str,
}

pub trait CodegenBackend {
    /// Compile the fragment's class and the closure classes it needs. The
    /// fragment's own class comes first and is the only one flagged main.
    fn compile_fragment(
        &self,
        unit: &FragmentUnit<'_>,
        interceptor: &dyn ReferenceInterceptor,
    ) -> Result<Vec<NamedBinary>, CodegenError>;
}

/// Backend producing [`ClassFile`]s for the stack machine.
#[derive(Copy, Clone, Debug, Default)]
pub struct StackBackend;

impl CodegenBackend for StackBackend {
    #[tracing::instrument(level = "debug", skip_all, fields(class = %unit.class.name))]
    fn compile_fragment(
        &self,
        unit: &FragmentUnit<'_>,
        interceptor: &dyn ReferenceInterceptor,
    ) -> Result<Vec<NamedBinary>, CodegenError> {
        let resolution = unit.resolution;
        let mut lowerer = Lowerer::new(
            &unit.fragment.arena,
            &resolution.decls,
            &resolution.bindings,
            unit.interner,
            unit.module,
            interceptor,
            None,
        );

        let method = unit.class.members.lookup(unit.method_name).ok_or_else(|| {
            CodegenError::Unresolved {
                what: format!("method `{}` of `{}`", unit.method_name, unit.class.name),
            }
        })?;
        let mut frame = FrameBuilder::method(&unit.class.name, &method.name, true);
        for param in &method.parameters {
            frame.param(None, &param.name, &param.ty)?;
        }
        lowerer.statements(&mut frame, unit.fragment.statements())?;
        let code = frame.finish_body(&method.return_type);

        let mut flags = MethodFlags::SYNTHETIC;
        if method.is_static {
            flags |= MethodFlags::STATIC;
        }
        let mut class = ClassFile::new(&unit.class.name, ClassFlags::FINAL | ClassFlags::SYNTHETIC);
        class.methods.push(code.into_method(
            &method.name,
            flags,
            method.param_types(),
            method.return_binary_type(),
        ));

        let mut binaries = vec![NamedBinary::encode(&class, true)?];
        for closure in lowerer.finish() {
            binaries.push(NamedBinary::encode(&closure, false)?);
        }
        Ok(binaries)
    }
}
