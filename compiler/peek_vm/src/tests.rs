use peek_codegen::{
    compile_program, BinaryType, ClassFile, ClassFlags, Instruction, MethodFlags, MethodInfo,
    NamedBinary, PROGRAM_CLASS_NAME,
};
use peek_ir::SharedInterner;
use peek_resolve::Program;
use peek_target::{DebugTarget, InvocationOutcome, ObjectKind, TargetError, TargetValue};
use pretty_assertions::assert_eq;

use crate::{Output, StopReason, ThreadState, Vm, VmConfig, VmError};

const LOOP: &str = "\
fun twice(a: Int): Int = a * 2
fun main() {
    val x = 5
    var total = 0
    var i = 0
    while (i < x) {
        total = total + twice(i)
        i = i + 1
    }
    println(\"total \" + total)
}
";

const COUNTER: &str = "\
fun main() {
    var count = 0
    fun bump(): Int {
        count = count + 1
        count
    }
    bump()
    bump()
    println(count)
}
";

fn vm_with(source: &str, config: VmConfig) -> Vm {
    let program = Program::analyze(source, &SharedInterner::default());
    assert!(!program.has_errors(), "{:?}", program.diagnostics());
    let binaries = compile_program(&program).unwrap_or_else(|e| panic!("{e}"));
    let mut vm = Vm::new(config).with_output(Output::buffer());
    vm.load_program(&binaries).unwrap_or_else(|e| panic!("{e}"));
    vm
}

fn vm_for(source: &str) -> Vm {
    vm_with(source, VmConfig::default())
}

fn run(vm: &mut Vm) -> StopReason {
    vm.run().unwrap_or_else(|e| panic!("{e}"))
}

fn resume(vm: &mut Vm) -> StopReason {
    vm.resume().unwrap_or_else(|e| panic!("{e}"))
}

fn variables(vm: &Vm) -> Vec<(String, TargetValue)> {
    vm.frame_variables()
        .unwrap_or_else(|e| panic!("{e}"))
        .into_iter()
        .map(|v| (v.name, v.value))
        .collect()
}

fn synthetic_class(name: &str, code: Vec<Instruction>) -> NamedBinary {
    let mut class = ClassFile::new(name, ClassFlags::FINAL | ClassFlags::SYNTHETIC);
    class.methods.push(MethodInfo {
        name: "answer".to_owned(),
        flags: MethodFlags::STATIC | MethodFlags::SYNTHETIC,
        params: Vec::new(),
        ret: BinaryType::Int,
        max_locals: 0,
        code,
        locals: Vec::new(),
        lines: Vec::new(),
    });
    NamedBinary::encode(&class, true).unwrap_or_else(|e| panic!("{e}"))
}

// ── Running ─────────────────────────────────────────────────────────

#[test]
fn test_run_to_completion() {
    let mut vm = vm_for(LOOP);
    assert_eq!(run(&mut vm), StopReason::Finished);
    assert_eq!(vm.state(), ThreadState::Finished);
    assert_eq!(vm.output().captured(), "total 20\n");
}

#[test]
fn test_captured_variable_is_shared() {
    let mut vm = vm_for(COUNTER);
    assert_eq!(run(&mut vm), StopReason::Finished);
    assert_eq!(vm.output().captured(), "2\n");
}

#[test]
fn test_division_by_zero_terminates() {
    let mut vm = vm_for("fun main() {\n    val z = 0\n    println(10 / z)\n}\n");
    assert_eq!(
        run(&mut vm),
        StopReason::Exception {
            message: "/ by zero".to_owned()
        }
    );
    assert_eq!(vm.state(), ThreadState::Terminated);
    assert!(!vm.is_suspended());
}

#[test]
fn test_error_builtin_throws() {
    let mut vm = vm_for("fun main() {\n    error(\"boom\")\n}\n");
    assert_eq!(
        run(&mut vm),
        StopReason::Exception {
            message: "boom".to_owned()
        }
    );
}

#[test]
fn test_resume_requires_suspension() {
    let mut vm = vm_for(LOOP);
    assert!(matches!(
        vm.resume(),
        Err(VmError::NotSuspended {
            state: ThreadState::NotStarted
        })
    ));
}

#[test]
fn test_missing_main() {
    let mut vm = vm_for("fun helper(): Int = 1\n");
    assert!(matches!(vm.run(), Err(VmError::NoEntryPoint)));
}

// ── Breakpoints and stepping ────────────────────────────────────────

#[test]
fn test_breakpoint_exposes_frame() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(10);
    assert_eq!(run(&mut vm), StopReason::Breakpoint { line: 10 });
    assert_eq!(vm.current_line(), Some(10));
    assert_eq!(
        variables(&vm),
        vec![
            ("x".to_owned(), TargetValue::Int(5)),
            ("total".to_owned(), TargetValue::Int(20)),
            ("i".to_owned(), TargetValue::Int(5)),
        ]
    );
    assert_eq!(resume(&mut vm), StopReason::Finished);
}

#[test]
fn test_breakpoint_in_loop_hits_every_iteration() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(7);
    assert_eq!(run(&mut vm), StopReason::Breakpoint { line: 7 });
    let first = vm.generation();
    assert_eq!(variables(&vm)[2], ("i".to_owned(), TargetValue::Int(0)));

    assert_eq!(resume(&mut vm), StopReason::Breakpoint { line: 7 });
    assert_eq!(variables(&vm)[2], ("i".to_owned(), TargetValue::Int(1)));
    assert!(vm.generation() > first);

    assert!(vm.clear_breakpoint(7));
    assert_eq!(resume(&mut vm), StopReason::Finished);
    assert_eq!(vm.output().captured(), "total 20\n");
}

#[test]
fn test_step_moves_to_next_line() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(3);
    assert_eq!(run(&mut vm), StopReason::Breakpoint { line: 3 });
    assert_eq!(
        vm.step().unwrap_or_else(|e| panic!("{e}")),
        StopReason::Step { line: 4 }
    );
    assert_eq!(variables(&vm), vec![("x".to_owned(), TargetValue::Int(5))]);
}

#[test]
fn test_closure_frame_exposes_captures() {
    let mut vm = vm_for(COUNTER);
    vm.set_breakpoint(4);
    assert_eq!(run(&mut vm), StopReason::Breakpoint { line: 4 });

    let captured = vm.captured_variables().unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].name, "count");
    assert_eq!(captured[0].ty, BinaryType::Ref);
    let cell = captured[0]
        .value
        .as_object()
        .unwrap_or_else(|| panic!("captured box expected"));
    assert_eq!(vm.box_get(cell), Ok(TargetValue::Int(0)));
}

// ── Invocation ──────────────────────────────────────────────────────

#[test]
fn test_invoke_static_while_suspended() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(10);
    run(&mut vm);
    let generation = vm.generation();
    assert_eq!(
        vm.invoke_static(PROGRAM_CLASS_NAME, "twice", &[TargetValue::Int(21)]),
        Ok(InvocationOutcome::Returned(TargetValue::Int(42)))
    );
    assert_eq!(vm.generation(), generation);
    assert_eq!(vm.current_line(), Some(10));
}

#[test]
fn test_breakpoint_during_invocation() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(10);
    run(&mut vm);
    vm.set_breakpoint(1);
    assert_eq!(
        vm.invoke_static(PROGRAM_CLASS_NAME, "twice", &[TargetValue::Int(1)]),
        Err(TargetError::BreakpointDuringInvocation { line: 1 })
    );
    assert_eq!(variables(&vm).len(), 3);

    vm.set_breakpoints_enabled(false);
    assert_eq!(
        vm.invoke_static(PROGRAM_CLASS_NAME, "twice", &[TargetValue::Int(1)]),
        Ok(InvocationOutcome::Returned(TargetValue::Int(2)))
    );
}

#[test]
fn test_invoke_errors() {
    let mut vm = vm_for(LOOP);
    assert_eq!(
        vm.invoke_static(PROGRAM_CLASS_NAME, "twice", &[TargetValue::Int(1)]),
        Err(TargetError::NotSuspended)
    );
    vm.set_breakpoint(10);
    run(&mut vm);
    assert!(matches!(
        vm.invoke_static(PROGRAM_CLASS_NAME, "thrice", &[]),
        Err(TargetError::MethodNotFound { .. })
    ));
    assert!(matches!(
        vm.invoke_static("Missing", "twice", &[]),
        Err(TargetError::ClassNotLoaded { .. })
    ));
    assert!(matches!(
        vm.invoke_static(PROGRAM_CLASS_NAME, "twice", &[]),
        Err(TargetError::Linkage { .. })
    ));
}

#[test]
fn test_invocation_refused_by_config() {
    let config = VmConfig {
        allow_invocation: false,
        ..VmConfig::default()
    };
    let mut vm = vm_with(LOOP, config);
    vm.set_breakpoint(10);
    run(&mut vm);
    assert_eq!(
        vm.invoke_static(PROGRAM_CLASS_NAME, "twice", &[TargetValue::Int(1)]),
        Err(TargetError::InvocationRefused)
    );
}

// ── Class loading ───────────────────────────────────────────────────

#[test]
fn test_load_and_invoke_class() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(10);
    run(&mut vm);
    let binary = synthetic_class("Gen", vec![Instruction::PushInt(42), Instruction::Return]);
    assert_eq!(vm.load_class(&binary), Ok(()));
    assert!(vm.is_loaded("Gen"));
    assert!(vm.has_method("Gen", "answer"));
    assert_eq!(
        vm.invoke_static("Gen", "answer", &[]),
        Ok(InvocationOutcome::Returned(TargetValue::Int(42)))
    );

    // Generated classes may be redefined.
    let binary = synthetic_class("Gen", vec![Instruction::PushInt(7), Instruction::Return]);
    assert_eq!(vm.load_class(&binary), Ok(()));
    assert_eq!(
        vm.invoke_static("Gen", "answer", &[]),
        Ok(InvocationOutcome::Returned(TargetValue::Int(7)))
    );
}

#[test]
fn test_invalid_code_leaves_frame_intact() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(10);
    run(&mut vm);
    let binary = synthetic_class("Gen", vec![Instruction::Add, Instruction::Return]);
    assert_eq!(vm.load_class(&binary), Ok(()));
    let error = vm.invoke_static("Gen", "answer", &[]);
    assert!(matches!(error, Err(TargetError::InvalidCode { .. })), "{error:?}");
    assert!(vm.is_suspended());
    assert_eq!(vm.current_line(), Some(10));
}

#[test]
fn test_program_class_cannot_be_redefined() {
    let mut vm = vm_for(LOOP);
    let binary = synthetic_class(PROGRAM_CLASS_NAME, vec![Instruction::PushInt(0)]);
    assert!(matches!(
        vm.load_class(&binary),
        Err(TargetError::Linkage { .. })
    ));
}

#[test]
fn test_class_loading_refused_by_config() {
    let config = VmConfig {
        allow_class_loading: false,
        ..VmConfig::default()
    };
    let mut vm = vm_with(LOOP, config);
    let binary = synthetic_class("Gen", vec![Instruction::PushInt(0), Instruction::Return]);
    assert_eq!(
        vm.load_class(&binary),
        Err(TargetError::ClassLoadingRefused)
    );
}

// ── Objects ─────────────────────────────────────────────────────────

#[test]
fn test_mirrored_objects() {
    let mut vm = vm_for(LOOP);
    vm.set_breakpoint(10);
    run(&mut vm);

    let a = vm.mirror_string("abc").unwrap_or_else(|e| panic!("{e}"));
    let b = vm.mirror_string("abc").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(vm.object_kind(a), Ok(ObjectKind::Str));
    assert_eq!(
        vm.values_equal(TargetValue::Object(a), TargetValue::Object(b)),
        Ok(true)
    );

    let cell = vm
        .new_box(TargetValue::Int(3))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(vm.box_set(cell, TargetValue::Int(4)), Ok(()));
    assert_eq!(
        vm.render_value(TargetValue::Object(cell)),
        Ok("4".to_owned())
    );
    assert!(matches!(
        vm.read_string(cell),
        Err(TargetError::UnexpectedObject { .. })
    ));

    let exception = vm.new_exception("bad").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(vm.exception_message(exception), Ok("bad".to_owned()));
}
