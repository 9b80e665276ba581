use std::sync::Arc;

use parking_lot::RwLock;
use peek_capture::ParameterKind;
use peek_codegen::{compile_program, NamedBinary, GENERATED_CLASS_NAME, GENERATED_FUNCTION_NAME};
use peek_ir::{CancellationFlag, SharedInterner, Type};
use peek_resolve::{DebugPosition, Program};
use peek_target::{
    DebugTarget, FrameVariable, InvocationOutcome, ObjectId, ObjectKind, TargetError, TargetValue,
};
use peek_vm::{Output, StopReason, Vm, VmConfig};
use pretty_assertions::assert_eq;

use crate::{
    CodeFragment, DebugSession, EvaluateError, EvaluationResult, Evaluator, EvaluatorConfig,
    ExceptionKind, SessionError,
};

const PROGRAM: &str = "\
fun twice(a: Int): Int = a * 2
fun run(f: () -> Int): Int = f()
private fun secret(): Int = 42
fun main() {
    val x = 5
    val y = \"s\"
    fun add(n: Int): Int {
        n + x
    }
    var i = 0
    while (i < 3) {
        i = i + add(1)
    }
    println(y + i)
}
";

/// `println(...)` at the end of `main`.
const END_LINE: u32 = 14;
/// `i = i + add(1)` inside the loop.
const LOOP_LINE: u32 = 12;
/// `n + x` in the body of the local function `add`.
const ADD_LINE: u32 = 8;

struct Fixture {
    program: RwLock<Arc<Program>>,
    vm: Vm,
    evaluator: Evaluator,
}

impl Fixture {
    fn stopped_at(line: u32) -> Self {
        Self::with(line, VmConfig::default(), EvaluatorConfig::default())
    }

    fn with(line: u32, vm_config: VmConfig, config: EvaluatorConfig) -> Self {
        let program = Program::analyze(PROGRAM, &SharedInterner::default());
        assert!(!program.has_errors(), "{:?}", program.diagnostics());
        let binaries = compile_program(&program).unwrap_or_else(|e| panic!("{e}"));
        let mut vm = Vm::new(vm_config).with_output(Output::buffer());
        vm.load_program(&binaries).unwrap_or_else(|e| panic!("{e}"));
        vm.set_breakpoint(line);
        assert_eq!(
            vm.run().unwrap_or_else(|e| panic!("{e}")),
            StopReason::Breakpoint { line }
        );
        Fixture {
            program: RwLock::new(Arc::new(program)),
            vm,
            evaluator: Evaluator::new(config),
        }
    }

    fn line(&self) -> u32 {
        self.vm
            .current_line()
            .unwrap_or_else(|| panic!("thread is not suspended"))
    }

    fn evaluate(&mut self, text: &str) -> Result<EvaluationResult, EvaluateError> {
        let fragment = CodeFragment::new(text, self.line());
        self.evaluator.evaluate(&self.program, &mut self.vm, &fragment)
    }

    fn value_of(&mut self, text: &str) -> TargetValue {
        match self.evaluate(text) {
            Ok(EvaluationResult::ValueReturned(value)) => value,
            other => panic!("{text:?} evaluated to {other:?}"),
        }
    }
}

// ── Evaluating ──────────────────────────────────────────────────────

#[test]
fn test_constant_fragment() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert_eq!(fixture.value_of("1 + 1"), TargetValue::Int(2));

    let entry = fixture
        .evaluator
        .cache()
        .lookup("1 + 1", DebugPosition { line: END_LINE })
        .unwrap_or_else(|| panic!("fragment should be cached"));
    assert!(entry.compilation.parameter_info.is_empty());
}

#[test]
fn test_fragment_reads_frame_variables() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert_eq!(fixture.value_of("x + 1"), TargetValue::Int(6));
    assert_eq!(fixture.value_of("i * 10"), TargetValue::Int(30));

    let entry = fixture
        .evaluator
        .cache()
        .lookup("x + 1", DebugPosition { line: END_LINE })
        .unwrap_or_else(|| panic!("fragment should be cached"));
    let parameters = &entry.compilation.parameter_info.parameters;
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].raw, "x");
    assert_eq!(parameters[0].ty, Type::Int);
    assert!(matches!(parameters[0].kind, ParameterKind::Ordinary { .. }));
}

#[test]
fn test_fragment_calls_program_functions() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert_eq!(fixture.value_of("twice(x)"), TargetValue::Int(10));
    assert_eq!(fixture.value_of("run { x + 2 }"), TargetValue::Int(7));
}

#[test]
fn test_private_functions_are_callable() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert_eq!(fixture.value_of("secret()"), TargetValue::Int(42));
}

#[test]
fn test_string_result_lives_in_debuggee() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    let value = fixture.value_of("y + \"!\"");
    let id = value
        .as_object()
        .unwrap_or_else(|| panic!("string object expected"));
    assert_eq!(fixture.vm.read_string(id), Ok("s!".to_owned()));
}

#[test]
fn test_empty_fragment_is_unit() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert_eq!(fixture.value_of("   "), TargetValue::Unit);
    assert_eq!(fixture.evaluator.cache_stats().computations, 0);
}

#[test]
fn test_exception_from_evaluated_code() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    let result = fixture.evaluate("error(\"boom\")");
    let Ok(EvaluationResult::ExceptionThrown { exception, kind }) = result else {
        panic!("expected an exception, got {result:?}");
    };
    assert_eq!(kind, ExceptionKind::FromEvaluatedCode);
    assert_eq!(fixture.vm.exception_message(exception), Ok("boom".to_owned()));
    assert!(fixture.vm.is_suspended());
}

#[test]
fn test_breakpoints_restored_after_evaluation() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    fixture.vm.set_breakpoint(1);
    assert_eq!(fixture.value_of("twice(3)"), TargetValue::Int(6));
    assert!(fixture.vm.breakpoints_enabled());
    assert_eq!(fixture.vm.breakpoints(), vec![1, END_LINE]);
}

// ── Interpreting ────────────────────────────────────────────────────

#[test]
fn test_interprets_when_class_loading_is_refused() {
    let vm_config = VmConfig {
        allow_class_loading: false,
        ..VmConfig::default()
    };
    let mut fixture = Fixture::with(END_LINE, vm_config, EvaluatorConfig::default());
    assert_eq!(fixture.value_of("twice(x) + 1"), TargetValue::Int(11));
    let value = fixture.value_of("y + x");
    let id = value
        .as_object()
        .unwrap_or_else(|| panic!("string object expected"));
    assert_eq!(fixture.vm.read_string(id), Ok("s5".to_owned()));
}

#[test]
fn test_interpreter_only_configuration() {
    let config = EvaluatorConfig {
        native: false,
        ..EvaluatorConfig::default()
    };
    let mut fixture = Fixture::with(END_LINE, VmConfig::default(), config);
    assert_eq!(fixture.value_of("if (i > 2) x else 0"), TargetValue::Int(5));
    assert!(!fixture.vm.is_loaded(GENERATED_CLASS_NAME));

    // The program invokes the fragment's lambda itself.
    assert_eq!(fixture.value_of("run { x + 2 }"), TargetValue::Int(7));
    let lambda = format!("{GENERATED_CLASS_NAME}${GENERATED_FUNCTION_NAME}$lambda$1");
    assert!(fixture.vm.is_loaded(&lambda));
    assert!(!fixture.vm.is_loaded(GENERATED_CLASS_NAME));
}

#[test]
fn test_statement_sequence_evaluates_to_unit() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert_eq!(fixture.value_of("val z = x\nz + 1"), TargetValue::Unit);
    assert_eq!(fixture.value_of("x + 1"), TargetValue::Int(6));
}

#[test]
fn test_interpreted_exception() {
    let config = EvaluatorConfig {
        native: false,
        ..EvaluatorConfig::default()
    };
    let mut fixture = Fixture::with(END_LINE, VmConfig::default(), config);
    let result = fixture.evaluate("x / 0");
    assert!(
        matches!(
            result,
            Ok(EvaluationResult::ExceptionThrown {
                kind: ExceptionKind::FromEvaluatedCode,
                ..
            })
        ),
        "{result:?}"
    );
}

#[test]
fn test_interpreter_depth_limit() {
    let config = EvaluatorConfig {
        native: false,
        max_interpreter_depth: 0,
        ..EvaluatorConfig::default()
    };
    let mut fixture = Fixture::with(END_LINE, VmConfig::default(), config);
    assert!(matches!(
        fixture.evaluate("1"),
        Ok(EvaluationResult::AbnormalTermination(_))
    ));
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn test_syntax_error() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert!(matches!(
        fixture.evaluate("1 +"),
        Err(EvaluateError::Syntax { .. })
    ));
    assert!(fixture.evaluator.cache().is_empty());
}

#[test]
fn test_semantic_error() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    let result = fixture.evaluate("nope + 1");
    let Err(EvaluateError::Semantic { message }) = result else {
        panic!("expected a semantic error, got {result:?}");
    };
    assert!(message.contains("nope"), "{message}");
}

#[test]
fn test_invalid_position() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    let fragment = CodeFragment::new("1", 100);
    let result = fixture
        .evaluator
        .evaluate(&fixture.program, &mut fixture.vm, &fragment);
    assert_eq!(result, Err(EvaluateError::InvalidPosition { line: 100 }));
    assert_eq!(
        EvaluateError::InvalidPosition { line: 100 }.to_string(),
        "Couldn't evaluate expression: breakpoint at line 100 is placed outside the file or on a line without code"
    );
}

#[test]
fn test_cancelled_request() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    let flag = CancellationFlag::new();
    flag.cancel();
    let fragment = CodeFragment::new("x + 1", END_LINE).cancellable(flag);
    let result = fixture
        .evaluator
        .evaluate(&fixture.program, &mut fixture.vm, &fragment);
    assert_eq!(result, Err(EvaluateError::Cancelled));
}

#[test]
fn test_requires_suspended_thread() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    fixture.vm.clear_breakpoint(END_LINE);
    assert_eq!(
        fixture.vm.resume().unwrap_or_else(|e| panic!("{e}")),
        StopReason::Finished
    );
    let fragment = CodeFragment::new("1", END_LINE);
    let result = fixture
        .evaluator
        .evaluate(&fixture.program, &mut fixture.vm, &fragment);
    assert_eq!(result, Err(EvaluateError::Target(TargetError::NotSuspended)));
}

// ── Closure frames ──────────────────────────────────────────────────

#[test]
fn test_closure_frame_reads_captured_values() {
    let mut fixture = Fixture::stopped_at(ADD_LINE);
    assert_eq!(fixture.value_of("x * 2"), TargetValue::Int(10));
}

#[test]
fn test_uncaptured_variable_in_closure_frame() {
    let mut fixture = Fixture::stopped_at(ADD_LINE);
    assert_eq!(
        fixture.evaluate("y.length"),
        Err(EvaluateError::VariableNotFound {
            name: "y".to_owned(),
            ty: "Str".to_owned()
        })
    );
    assert_eq!(
        fixture.evaluate("run { y.length }"),
        Err(EvaluateError::NotCaptured {
            name: "y".to_owned()
        })
    );
    assert_eq!(
        EvaluateError::NotCaptured {
            name: "y".to_owned()
        }
        .to_string(),
        "'y' is not captured"
    );
}

// ── Caching ─────────────────────────────────────────────────────────

#[test]
fn test_repeated_fragment_is_compiled_once() {
    let mut fixture = Fixture::stopped_at(END_LINE);
    assert_eq!(fixture.value_of("x + 1"), TargetValue::Int(6));
    assert_eq!(fixture.value_of("x + 1"), TargetValue::Int(6));
    let stats = fixture.evaluator.cache_stats();
    assert_eq!((stats.hits, stats.misses, stats.computations), (1, 1, 1));
}

#[test]
fn test_cache_dropped_when_thread_resumes() {
    let mut fixture = Fixture::stopped_at(LOOP_LINE);
    assert_eq!(fixture.value_of("i"), TargetValue::Int(0));
    assert_eq!(
        fixture.vm.resume().unwrap_or_else(|e| panic!("{e}")),
        StopReason::Breakpoint { line: LOOP_LINE }
    );
    assert_eq!(fixture.value_of("i"), TargetValue::Int(1));
    let stats = fixture.evaluator.cache_stats();
    assert_eq!((stats.hits, stats.misses), (0, 2));
}

// ── Stale compilations ──────────────────────────────────────────────

/// A debuggee that refuses class loading and fails the next
/// `stale_calls` static invocations as if the method had changed shape.
struct StaleTarget {
    vm: Vm,
    stale_calls: usize,
}

impl DebugTarget for StaleTarget {
    fn generation(&self) -> u64 {
        self.vm.generation()
    }

    fn is_suspended(&self) -> bool {
        self.vm.is_suspended()
    }

    fn current_line(&self) -> Option<u32> {
        self.vm.current_line()
    }

    fn frame_variables(&self) -> Result<Vec<FrameVariable>, TargetError> {
        self.vm.frame_variables()
    }

    fn captured_variables(&self) -> Result<Vec<FrameVariable>, TargetError> {
        self.vm.captured_variables()
    }

    fn load_class(&mut self, _: &NamedBinary) -> Result<(), TargetError> {
        Err(TargetError::ClassLoadingRefused)
    }

    fn is_loaded(&self, class: &str) -> bool {
        self.vm.is_loaded(class)
    }

    fn has_method(&self, class: &str, method: &str) -> bool {
        self.vm.has_method(class, method)
    }

    fn invoke_static(
        &mut self,
        class: &str,
        method: &str,
        args: &[TargetValue],
    ) -> Result<InvocationOutcome, TargetError> {
        if self.stale_calls > 0 {
            self.stale_calls -= 1;
            return Err(TargetError::MethodNotFound {
                class: class.to_owned(),
                method: method.to_owned(),
            });
        }
        self.vm.invoke_static(class, method, args)
    }

    fn invoke_closure(
        &mut self,
        closure: ObjectId,
        args: &[TargetValue],
    ) -> Result<InvocationOutcome, TargetError> {
        self.vm.invoke_closure(closure, args)
    }

    fn object_kind(&self, id: ObjectId) -> Result<ObjectKind, TargetError> {
        self.vm.object_kind(id)
    }

    fn new_closure(
        &mut self,
        class: &str,
        captures: Vec<TargetValue>,
    ) -> Result<ObjectId, TargetError> {
        self.vm.new_closure(class, captures)
    }

    fn closure_captures(&self, closure: ObjectId) -> Result<Vec<TargetValue>, TargetError> {
        self.vm.closure_captures(closure)
    }

    fn new_box(&mut self, value: TargetValue) -> Result<ObjectId, TargetError> {
        self.vm.new_box(value)
    }

    fn box_get(&self, cell: ObjectId) -> Result<TargetValue, TargetError> {
        self.vm.box_get(cell)
    }

    fn box_set(&mut self, cell: ObjectId, value: TargetValue) -> Result<(), TargetError> {
        self.vm.box_set(cell, value)
    }

    fn mirror_string(&mut self, text: &str) -> Result<ObjectId, TargetError> {
        self.vm.mirror_string(text)
    }

    fn read_string(&self, id: ObjectId) -> Result<String, TargetError> {
        self.vm.read_string(id)
    }

    fn new_exception(&mut self, message: &str) -> Result<ObjectId, TargetError> {
        self.vm.new_exception(message)
    }

    fn exception_message(&self, id: ObjectId) -> Result<String, TargetError> {
        self.vm.exception_message(id)
    }

    fn print(&mut self, text: &str) -> Result<(), TargetError> {
        self.vm.print(text)
    }

    fn breakpoints(&self) -> Vec<u32> {
        self.vm.breakpoints()
    }

    fn breakpoints_enabled(&self) -> bool {
        self.vm.breakpoints_enabled()
    }

    fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.vm.set_breakpoints_enabled(enabled);
    }
}

fn stale_evaluate(
    program: &RwLock<Arc<Program>>,
    evaluator: &mut Evaluator,
    target: &mut StaleTarget,
) -> Result<EvaluationResult, EvaluateError> {
    let fragment = CodeFragment::new("twice(x)", END_LINE);
    evaluator.evaluate(program, target, &fragment)
}

#[test]
fn test_stale_cached_code_is_recompiled_once() {
    let Fixture {
        program,
        vm,
        mut evaluator,
    } = Fixture::stopped_at(END_LINE);
    let mut target = StaleTarget { vm, stale_calls: 0 };

    assert_eq!(
        stale_evaluate(&program, &mut evaluator, &mut target),
        Ok(EvaluationResult::ValueReturned(TargetValue::Int(10)))
    );
    assert_eq!(evaluator.cache_stats().computations, 1);

    target.stale_calls = 1;
    assert_eq!(
        stale_evaluate(&program, &mut evaluator, &mut target),
        Ok(EvaluationResult::ValueReturned(TargetValue::Int(10)))
    );
    let stats = evaluator.cache_stats();
    assert_eq!((stats.hits, stats.computations), (1, 2));
    assert!(target.breakpoints_enabled());
}

#[test]
fn test_stale_code_fails_after_one_retry() {
    let Fixture {
        program,
        vm,
        mut evaluator,
    } = Fixture::stopped_at(END_LINE);
    let mut target = StaleTarget {
        vm,
        stale_calls: usize::MAX,
    };
    let expected = Err(EvaluateError::BrokenCode {
        message: "method `Program.twice` not found".to_owned(),
    });

    // A fresh compilation is not retried.
    assert_eq!(
        stale_evaluate(&program, &mut evaluator, &mut target),
        expected
    );
    assert_eq!(evaluator.cache_stats().computations, 1);

    // A cached one is recompiled exactly once.
    assert_eq!(
        stale_evaluate(&program, &mut evaluator, &mut target),
        expected
    );
    assert_eq!(evaluator.cache_stats().computations, 2);
}

// ── Sessions ────────────────────────────────────────────────────────

fn session() -> DebugSession {
    let vm = Vm::new(VmConfig::default()).with_output(Output::buffer());
    DebugSession::new(PROGRAM, "main.pk", vm, EvaluatorConfig::default())
        .unwrap_or_else(|e| panic!("{e}"))
}

#[test]
fn test_session_runs_to_breakpoint() {
    let mut session = session();
    session.set_breakpoint(END_LINE);
    assert_eq!(
        session.run().unwrap_or_else(|e| panic!("{e}")),
        StopReason::Breakpoint { line: END_LINE }
    );
    assert_eq!(
        session.locals().unwrap_or_else(|e| panic!("{e}")),
        vec![
            ("x".to_owned(), "5".to_owned()),
            ("y".to_owned(), "s".to_owned()),
            ("i".to_owned(), "3".to_owned()),
        ]
    );
    let result = session.evaluate("y + i").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(session.render(&result), Ok("s3".to_owned()));

    assert_eq!(
        session.resume().unwrap_or_else(|e| panic!("{e}")),
        StopReason::Finished
    );
    assert_eq!(session.vm().output().captured(), "s3\n");
    assert!(session.evaluator().cache().is_empty());
}

#[test]
fn test_session_renders_exceptions() {
    let mut session = session();
    session.set_breakpoint(END_LINE);
    session.run().unwrap_or_else(|e| panic!("{e}"));
    let result = session
        .evaluate("error(\"bad\")")
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(session.render(&result), Ok("exception: bad".to_owned()));
}

#[test]
fn test_session_evaluate_before_run() {
    let mut session = session();
    assert_eq!(
        session.evaluate("1"),
        Err(EvaluateError::Target(TargetError::NotSuspended))
    );
}

#[test]
fn test_session_rejects_broken_program() {
    let vm = Vm::new(VmConfig::default()).with_output(Output::buffer());
    let result = DebugSession::new(
        "fun main() {\n    val x = y\n}\n",
        "main.pk",
        vm,
        EvaluatorConfig::default(),
    );
    let Err(SessionError::Program { diagnostics }) = result else {
        panic!("expected program diagnostics");
    };
    assert!(diagnostics.contains("main.pk"), "{diagnostics}");
}

#[test]
fn test_session_reload_starts_over() {
    let mut session = session();
    session.set_breakpoint(END_LINE);
    session.run().unwrap_or_else(|e| panic!("{e}"));
    session.evaluate("x").unwrap_or_else(|e| panic!("{e}"));

    session
        .reload("fun main() {\n    val x = 7\n    println(x)\n}\n")
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(session.evaluator().cache().is_empty());
    assert!(!session.vm().is_suspended());

    session.set_breakpoint(3);
    assert_eq!(
        session.run().unwrap_or_else(|e| panic!("{e}")),
        StopReason::Breakpoint { line: 3 }
    );
    let result = session.evaluate("x * 2").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        result,
        EvaluationResult::ValueReturned(TargetValue::Int(14))
    );
}
