//! The fragment compiler: analysis, synthetic descriptors and code
//! generation of one debugger fragment.

use peek_capture::{analyze, analyze_cancellable, ParameterInfo};
use peek_ir::{CancellationFlag, ExprId, StringInterner, Type};
use peek_parse::{FragmentAst, FragmentKind};
use peek_resolve::{Capture, FragmentResolution};
use tracing::debug;

use crate::{
    create_descriptors_for_fragment, BinaryType, CodegenBackend, CodegenError, EvaluatorModule,
    FragmentUnit, ModuleDescriptor, NamedBinary, ReferenceInterceptor, GENERATED_CLASS_NAME,
    GENERATED_FUNCTION_NAME,
};

/// Binary signature of the generated method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub class: String,
    pub name: String,
    pub params: Vec<BinaryType>,
    pub ret: BinaryType,
}

/// Output of compiling one fragment.
#[derive(Clone, Debug)]
pub struct CompilationResult {
    /// Main class first, then the closure classes.
    pub classes: Vec<NamedBinary>,
    pub parameter_info: ParameterInfo,
    pub main_method: MethodSignature,
}

impl CompilationResult {
    pub fn main_class(&self) -> Option<&NamedBinary> {
        self.classes.iter().find(|c| c.is_main)
    }

    pub fn auxiliary_classes(&self) -> impl Iterator<Item = &NamedBinary> {
        self.classes.iter().filter(|c| !c.is_main)
    }
}

/// Turns references the analysis mapped into loads of the matching
/// method parameter.
struct ParameterInterceptor<'a> {
    info: &'a ParameterInfo,
}

impl ReferenceInterceptor for ParameterInterceptor<'_> {
    fn intercept(&self, id: ExprId) -> Option<usize> {
        self.info.mappings.get(&id).copied()
    }

    fn intercept_capture(&self, capture: Capture) -> Option<usize> {
        let parameter = match capture {
            Capture::Value(decl) => self.info.parameter_for_decl(decl),
            Capture::Receiver(owner) => self.info.parameter_for_receiver(owner),
        };
        parameter.map(|p| p.index)
    }
}

/// Compiles fragments against one module with one backend.
pub struct FragmentCompiler<'a> {
    module: &'a dyn ModuleDescriptor,
    backend: &'a dyn CodegenBackend,
    class_name: String,
    method_name: String,
    package: String,
    cancellation: Option<&'a CancellationFlag>,
}

impl<'a> FragmentCompiler<'a> {
    pub fn new(module: &'a dyn ModuleDescriptor, backend: &'a dyn CodegenBackend) -> Self {
        FragmentCompiler {
            module,
            backend,
            class_name: GENERATED_CLASS_NAME.to_owned(),
            method_name: GENERATED_FUNCTION_NAME.to_owned(),
            package: String::new(),
            cancellation: None,
        }
    }

    #[must_use]
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = name.into();
        self
    }

    #[must_use]
    pub fn method_name(mut self, name: impl Into<String>) -> Self {
        self.method_name = name.into();
        self
    }

    /// Package the generated class is added to.
    #[must_use]
    pub fn package(mut self, fq_name: impl Into<String>) -> Self {
        self.package = fq_name.into();
        self
    }

    #[must_use]
    pub fn cancellable(mut self, flag: &'a CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    fn check_cancelled(&self) -> Result<(), CodegenError> {
        match self.cancellation {
            Some(flag) => Ok(flag.check()?),
            None => Ok(()),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(fragment = %fragment.text))]
    pub fn compile(
        &self,
        fragment: &FragmentAst,
        resolution: &FragmentResolution,
        interner: &StringInterner,
    ) -> Result<CompilationResult, CodegenError> {
        let parameter_info = match self.cancellation {
            Some(flag) => analyze_cancellable(fragment, resolution, interner, flag)?,
            None => analyze(fragment, resolution, interner),
        };

        let module = EvaluatorModule::new(self.module, &self.package, &self.class_name);
        let package = module.package(&self.package).unwrap_or_default();
        // Only a single expression produces a value; statement sequences run
        // for their effects.
        let return_type = match fragment.kind {
            FragmentKind::Expression => resolution.ty.clone(),
            FragmentKind::Block => Type::Unit,
        };
        let (class, method) = create_descriptors_for_fragment(
            &self.class_name,
            &self.method_name,
            &parameter_info,
            &return_type,
            &package,
        );
        assert_eq!(
            method.parameters.len(),
            parameter_info.len(),
            "generated method arity differs from the captured parameters"
        );

        let unit = FragmentUnit {
            fragment,
            resolution,
            interner,
            module: &module,
            class: &class,
            method_name: &method.name,
        };
        let interceptor = ParameterInterceptor {
            info: &parameter_info,
        };
        let classes = self.backend.compile_fragment(&unit, &interceptor)?;
        self.check_cancelled()?;

        let mains = classes.iter().filter(|c| c.is_main).count();
        assert_eq!(mains, 1, "a fragment compiles to exactly one main class");
        debug!(
            parameters = parameter_info.len(),
            classes = classes.len(),
            "fragment compiled"
        );

        Ok(CompilationResult {
            classes,
            main_method: MethodSignature {
                class: class.name,
                name: method.name.clone(),
                params: method.param_types(),
                ret: method.return_binary_type(),
            },
            parameter_info,
        })
    }
}

/// Compile `fragment` with the default generated names.
pub fn compile_fragment(
    fragment: &FragmentAst,
    resolution: &FragmentResolution,
    interner: &StringInterner,
    module: &dyn ModuleDescriptor,
    backend: &dyn CodegenBackend,
) -> Result<CompilationResult, CodegenError> {
    FragmentCompiler::new(module, backend).compile(fragment, resolution, interner)
}
