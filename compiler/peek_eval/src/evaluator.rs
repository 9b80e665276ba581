//! The dual-mode evaluator.
//!
//! A request compiles the fragment (or takes it from the cache), then tries
//! to run it natively in the debuggee: load its classes and invoke the
//! generated method with arguments read from the suspended frame. When the
//! debuggee cannot do that, the compiled code is interpreted host-side
//! instead. An interpretation that finds a cached compilation stale
//! recompiles it once and interprets again; that second result is final.

use std::sync::Arc;

use parking_lot::RwLock;
use peek_codegen::{
    ClassFile, CodegenError, CompilationResult, FragmentCompiler, NamedBinary, ProgramModule,
    StackBackend, GENERATED_CLASS_NAME, GENERATED_FUNCTION_NAME,
};
use peek_diagnostic::{render, Diagnostic, ErrorCode};
use peek_parse::parse_fragment;
use peek_resolve::{Program, ResolveError, Resolver};
use peek_target::{DebugTarget, InvocationOutcome, ObjectKind, TargetError, TargetValue};
use tracing::{debug, warn};

use crate::interpreter::{Interpreter, DEFAULT_MAX_DEPTH};
use crate::{
    BreakpointsDisabled, CacheStats, CodeFragment, CompilationCache, CompiledDataDescriptor,
    EvaluateError, EvaluationResult, ExceptionKind, VariableFinder,
};

/// Diagnostics that do not stop a fragment from being compiled.
///
/// Fragments are compiled outside the program, so the program's private
/// functions are invisible to them; the debugger calls them anyway.
pub const IGNORED_DIAGNOSTICS: &[ErrorCode] = &[ErrorCode::E2005];

/// File name fragments are reported under.
const FRAGMENT_FILE: &str = "<fragment>";

#[derive(Clone, Debug)]
pub struct EvaluatorConfig {
    pub class_name: String,
    pub method_name: String,
    /// Try running compiled fragments in the debuggee before interpreting.
    pub native: bool,
    /// Deepest nesting of calls between interpreted methods.
    pub max_interpreter_depth: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            class_name: GENERATED_CLASS_NAME.to_owned(),
            method_name: GENERATED_FUNCTION_NAME.to_owned(),
            native: true,
            max_interpreter_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

pub struct Evaluator {
    config: EvaluatorConfig,
    cache: CompilationCache,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Evaluator {
            config,
            cache: CompilationCache::new(),
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn cache(&self) -> &CompilationCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Forget every compiled fragment, e.g. because the program changed.
    pub fn invalidate(&mut self) {
        self.cache.invalidate_all();
    }

    /// Evaluate `fragment` in the top frame of `target`.
    ///
    /// Compilation runs under a read lock of `program`, released before the
    /// debuggee is touched. Breakpoints are disabled while the fragment
    /// runs.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(text = %fragment.text, line = fragment.position.line)
    )]
    pub fn evaluate(
        &mut self,
        program: &RwLock<Arc<Program>>,
        target: &mut dyn DebugTarget,
        fragment: &CodeFragment,
    ) -> Result<EvaluationResult, EvaluateError> {
        if fragment.is_empty() {
            return Ok(EvaluationResult::ValueReturned(TargetValue::Unit));
        }
        if !target.is_suspended() {
            return Err(TargetError::NotSuspended.into());
        }

        let config = &self.config;
        let generation = target.generation();
        let (descriptor, cached) = self.cache.get(
            &fragment.text,
            fragment.position,
            generation,
            false,
            || compile(config, program, fragment),
        )?;
        check_cancelled(fragment)?;

        let mut target = BreakpointsDisabled::new(target);
        let result = self.execute(&mut *target, &descriptor)?;
        if !(cached && result.is_broken_code()) {
            return finish(&*target, result);
        }

        warn!("cached compilation does not match the debuggee; recompiling");
        let config = &self.config;
        let (descriptor, _) = self.cache.get(
            &fragment.text,
            fragment.position,
            generation,
            true,
            || compile(config, program, fragment),
        )?;
        check_cancelled(fragment)?;
        left_to_interpreter(load_classes(&mut *target, &descriptor))?;
        let args = VariableFinder::new(&*target).arguments(&descriptor.compilation.parameter_info)?;
        let result = self.interpret(&mut *target, &descriptor.compilation, &args)?;
        finish(&*target, result)
    }

    /// Run natively when possible, interpreting otherwise.
    fn execute(
        &self,
        target: &mut dyn DebugTarget,
        descriptor: &CompiledDataDescriptor,
    ) -> Result<EvaluationResult, EvaluateError> {
        let compilation = &descriptor.compilation;
        let args = VariableFinder::new(target).arguments(&compilation.parameter_info)?;
        if self.config.native {
            match run_native(target, descriptor, &args) {
                Ok(result) => return Ok(result),
                Err(error) if error.is_structural() => {
                    warn!(%error, "native evaluation unavailable; interpreting");
                }
                Err(error) => return Err(error.into()),
            }
        } else {
            // Closures the fragment creates are instantiated and may be
            // invoked by the debuggee itself.
            left_to_interpreter(load_auxiliary(target, descriptor))?;
        }
        self.interpret(target, compilation, &args)
    }

    fn interpret(
        &self,
        target: &mut dyn DebugTarget,
        compilation: &CompilationResult,
        args: &[TargetValue],
    ) -> Result<EvaluationResult, EvaluateError> {
        let classes = compilation
            .classes
            .iter()
            .map(NamedBinary::decode)
            .collect::<Result<Vec<ClassFile>, _>>()
            .map_err(EvaluateError::internal)?;
        let main = &compilation.main_method;
        Interpreter::new(target, classes)
            .max_depth(self.config.max_interpreter_depth)
            .interpret(&main.class, &main.name, args)
    }
}

/// Parse, resolve and compile `fragment` against the program.
fn compile(
    config: &EvaluatorConfig,
    program: &RwLock<Arc<Program>>,
    fragment: &CodeFragment,
) -> Result<CompiledDataDescriptor, EvaluateError> {
    let guard = program.read();
    let program: &Program = &guard;

    let parsed = parse_fragment(
        &fragment.text,
        program.interner(),
        Arc::clone(program.arena()),
    );
    if let Some(diagnostic) = parsed.errors.iter().find(|d| d.is_error()) {
        return Err(EvaluateError::Syntax {
            message: render(diagnostic, &fragment.text, FRAGMENT_FILE),
        });
    }
    check_cancelled(fragment)?;

    let resolution = program
        .resolve_fragment(&parsed.fragment, fragment.position)
        .map_err(|error| match error {
            ResolveError::InvalidPosition { line } => EvaluateError::InvalidPosition { line },
        })?;
    if let Some(diagnostic) = resolution.diagnostics.iter().find(|d| blocks_compilation(d)) {
        return Err(EvaluateError::Semantic {
            message: render(diagnostic, &fragment.text, FRAGMENT_FILE),
        });
    }

    let module = ProgramModule::new(program);
    let mut compiler = FragmentCompiler::new(&module, &StackBackend)
        .class_name(config.class_name.as_str())
        .method_name(config.method_name.as_str());
    if let Some(flag) = &fragment.cancellation {
        compiler = compiler.cancellable(flag);
    }
    let compilation = compiler
        .compile(&parsed.fragment, &resolution, program.interner())
        .map_err(|error| match error {
            CodegenError::Cancelled => EvaluateError::Cancelled,
            other => EvaluateError::internal(other),
        })?;
    Ok(CompiledDataDescriptor::new(compilation, fragment.position))
}

fn blocks_compilation(diagnostic: &Diagnostic) -> bool {
    diagnostic.is_error() && !IGNORED_DIAGNOSTICS.contains(&diagnostic.code)
}

fn check_cancelled(fragment: &CodeFragment) -> Result<(), EvaluateError> {
    match &fragment.cancellation {
        Some(flag) => Ok(flag.check()?),
        None => Ok(()),
    }
}

/// Load the main class, then the classes it creates.
fn load_classes(
    target: &mut dyn DebugTarget,
    descriptor: &CompiledDataDescriptor,
) -> Result<(), TargetError> {
    if let Some(main) = descriptor.compilation.main_class() {
        target.load_class(main)?;
    }
    load_auxiliary(target, descriptor)
}

fn load_auxiliary(
    target: &mut dyn DebugTarget,
    descriptor: &CompiledDataDescriptor,
) -> Result<(), TargetError> {
    let classes = &descriptor.compilation.classes;
    for name in &descriptor.auxiliary {
        let class = classes
            .iter()
            .find(|c| &c.class_name == name)
            .ok_or_else(|| TargetError::ClassNotLoaded {
                class: name.clone(),
            })?;
        target.load_class(class)?;
    }
    Ok(())
}

/// A class the debuggee refuses is still run by the interpreter, which
/// reports the mismatch if the code needs it.
fn left_to_interpreter(loaded: Result<(), TargetError>) -> Result<(), EvaluateError> {
    match loaded {
        Ok(()) => Ok(()),
        Err(error) if error.is_structural() => {
            debug!(%error, "fragment classes not loaded");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

fn run_native(
    target: &mut dyn DebugTarget,
    descriptor: &CompiledDataDescriptor,
    args: &[TargetValue],
) -> Result<EvaluationResult, TargetError> {
    load_classes(target, descriptor)?;
    let main = &descriptor.compilation.main_method;
    if !target.has_method(&main.class, &main.name) {
        return Err(TargetError::MethodNotFound {
            class: main.class.clone(),
            method: main.name.clone(),
        });
    }
    debug!(class = %main.class, method = %main.name, "invoking natively");
    Ok(match target.invoke_static(&main.class, &main.name, args)? {
        InvocationOutcome::Returned(value) => EvaluationResult::ValueReturned(value),
        InvocationOutcome::Threw(exception) => EvaluationResult::ExceptionThrown {
            exception,
            kind: ExceptionKind::FromEvaluatedCode,
        },
    })
}

/// Unwrap returned boxes; report stale code as an error.
fn finish(
    target: &dyn DebugTarget,
    result: EvaluationResult,
) -> Result<EvaluationResult, EvaluateError> {
    match result {
        EvaluationResult::ValueReturned(mut value) => {
            while let TargetValue::Object(id) = value {
                if target.object_kind(id)? != ObjectKind::Ref {
                    break;
                }
                value = target.box_get(id)?;
            }
            Ok(EvaluationResult::ValueReturned(value))
        }
        EvaluationResult::ExceptionThrown {
            exception,
            kind: ExceptionKind::BrokenCode,
        } => Err(EvaluateError::BrokenCode {
            message: target.exception_message(exception)?,
        }),
        other => Ok(other),
    }
}
