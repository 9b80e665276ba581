use std::sync::Arc;

use peek_capture::ParameterInfo;
use peek_ir::{CancellationFlag, SharedInterner, Type};
use peek_parse::{parse_fragment, FragmentAst};
use peek_resolve::{DebugPosition, FragmentResolution, Program, Resolver};
use pretty_assertions::assert_eq;

use crate::{
    compile_fragment, compile_program, create_descriptors_for_fragment, BinaryType,
    CapturedVariable, ClassFile, ClassFlags, ClassFormatError, ClassKind, CodegenBackend,
    CodegenError, CompilationResult, EvaluatorModule, FragmentCompiler, FragmentUnit,
    FunctionRef, Instruction, MethodFlags, MethodInfo, ModuleDescriptor, NamedBinary,
    NoIntercept, PackageView, ProgramModule, StackBackend, GENERATED_CLASS_NAME,
    GENERATED_FUNCTION_NAME, INVOKE_METHOD, PROGRAM_CLASS_NAME,
};

const PROGRAM: &str = "\
fun twice(a: Int): Int = a * 2
fun run(f: () -> Int): Int = f()
inline fun runInline(f: () -> Int): Int = f()
fun Int.show(): Str {
    val s = \"v\"
    s + this
}
fun main() {
    val x = 5
    val y = \"s\"
    fun local(n: Int): Int = n + x
    println(local(x) + y.length + x.show().length)
}
";

/// Line of `println(...)` in `main`.
const MAIN_LINE: u32 = 12;

struct Prepared {
    program: Program,
    fragment: FragmentAst,
    resolution: FragmentResolution,
}

fn program() -> Program {
    let program = Program::analyze(PROGRAM, &SharedInterner::default());
    assert!(!program.has_errors(), "{:?}", program.diagnostics());
    program
}

fn prepare(text: &str) -> Prepared {
    let program = program();
    let parsed = parse_fragment(text, program.interner(), Arc::clone(program.arena()));
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let resolution = program
        .resolve_fragment(&parsed.fragment, DebugPosition { line: MAIN_LINE })
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(!resolution.has_errors(), "{:?}", resolution.diagnostics);
    Prepared {
        program,
        fragment: parsed.fragment,
        resolution,
    }
}

fn compile(text: &str) -> CompilationResult {
    let prepared = prepare(text);
    let module = ProgramModule::new(&prepared.program);
    compile_fragment(
        &prepared.fragment,
        &prepared.resolution,
        prepared.program.interner(),
        &module,
        &StackBackend,
    )
    .unwrap_or_else(|e| panic!("{e}"))
}

fn decode(binary: &NamedBinary) -> ClassFile {
    binary.decode().unwrap_or_else(|e| panic!("{e}"))
}

fn main_code(result: &CompilationResult) -> Vec<Instruction> {
    let main = result
        .main_class()
        .unwrap_or_else(|| panic!("no main class"));
    let class = decode(main);
    let method = class
        .method(GENERATED_FUNCTION_NAME)
        .unwrap_or_else(|| panic!("no generated method"));
    method.code.clone()
}

// ── Descriptors ─────────────────────────────────────────────────────

#[test]
fn test_descriptors_name_parameters_by_index() {
    let prepared = prepare("x + y.length");
    let info = peek_capture::analyze(
        &prepared.fragment,
        &prepared.resolution,
        prepared.program.interner(),
    );
    let package = PackageView::default();
    let (class, method) =
        create_descriptors_for_fragment("Gen", "run", &info, &Type::Int, &package);

    let names: Vec<&str> = method.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["p0", "p1"]);
    assert_eq!(method.param_types(), vec![BinaryType::Int, BinaryType::Str]);
    assert_eq!(method.return_type, Type::Int);
    assert!(method.is_static);
    assert_eq!(method.owner, "Gen");

    assert_eq!(class.kind, ClassKind::Object);
    assert!(class.is_final);
    assert_eq!(class.constructors.len(), 1);
    assert!(class.constructors[0].is_primary);
    assert!(class.supertypes.is_empty());
}

#[test]
fn test_member_scope_knows_only_the_generated_method() {
    let (class, method) = create_descriptors_for_fragment(
        "Gen",
        "run",
        &ParameterInfo::default(),
        &Type::Unit,
        &PackageView::default(),
    );
    assert_eq!(class.members.lookup("run"), Some(&method));
    assert_eq!(class.members.lookup("main"), None);
    assert_eq!(class.members.method_names().collect::<Vec<_>>(), vec!["run"]);
}

#[test]
fn test_nothing_return_type_becomes_unit() {
    let (_, method) = create_descriptors_for_fragment(
        "Gen",
        "run",
        &ParameterInfo::default(),
        &Type::Nothing,
        &PackageView::default(),
    );
    assert_eq!(method.return_type, Type::Unit);
    assert_eq!(method.return_binary_type(), BinaryType::Void);
}

// ── Modules ─────────────────────────────────────────────────────────

#[test]
fn test_evaluator_module_adds_generated_class_to_package() {
    let program = program();
    let real = ProgramModule::new(&program);
    let module = EvaluatorModule::new(&real, "", "Gen");

    let package = module
        .package("")
        .unwrap_or_else(|| panic!("root package missing"));
    assert_eq!(package.classes, vec![PROGRAM_CLASS_NAME.to_owned(), "Gen".to_owned()]);
    assert_eq!(real.package(""), Some(PackageView {
        name: String::new(),
        classes: vec![PROGRAM_CLASS_NAME.to_owned()],
    }));
    assert_eq!(module.package("util"), None);
}

#[test]
fn test_evaluator_module_forwards_everything_else() {
    let program = program();
    let real = ProgramModule::new(&program);
    let module = EvaluatorModule::new(&real, "", "Gen");

    let twice = program
        .function_named("twice")
        .unwrap_or_else(|| panic!("twice missing"));
    let inline = program
        .function_named("runInline")
        .unwrap_or_else(|| panic!("runInline missing"));

    assert_eq!(module.name(), real.name());
    assert_eq!(
        module.function_owner(twice),
        Some(FunctionRef {
            class: PROGRAM_CLASS_NAME.to_owned(),
            method: "twice".to_owned(),
        })
    );
    assert_eq!(module.function_owner(inline), None);
    assert!(module.inline_body(inline).is_some());
    assert!(module.inline_body(twice).is_none());
}

// ── Class files ─────────────────────────────────────────────────────

fn sample_class() -> ClassFile {
    let mut class = ClassFile::new("Sample", ClassFlags::FINAL);
    class.methods.push(MethodInfo {
        name: "answer".to_owned(),
        flags: MethodFlags::STATIC,
        params: vec![BinaryType::Int],
        ret: BinaryType::Int,
        max_locals: 1,
        code: vec![
            Instruction::Load(0),
            Instruction::PushInt(42),
            Instruction::Add,
            Instruction::Return,
        ],
        locals: Vec::new(),
        lines: Vec::new(),
    });
    class
}

#[test]
fn test_class_file_survives_encoding() {
    let class = sample_class();
    let binary = NamedBinary::encode(&class, true).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(binary.class_name, "Sample");
    assert!(binary.is_main);
    assert_eq!(decode(&binary), class);
    assert_eq!(
        class
            .method("answer")
            .map(MethodInfo::descriptor)
            .as_deref(),
        Some("(I)I")
    );
}

#[test]
fn test_class_file_rejects_other_versions() {
    let mut class = sample_class();
    class.version = 99;
    let bytes = class.to_bytes().unwrap_or_else(|e| panic!("{e}"));
    assert!(matches!(
        ClassFile::from_bytes(&bytes),
        Err(ClassFormatError::UnsupportedVersion { found: 99 })
    ));
}

#[test]
fn test_class_file_rejects_garbage() {
    assert!(matches!(
        ClassFile::from_bytes(&[1, 2, 3]),
        Err(ClassFormatError::Decode { .. })
    ));
}

// ── Programs ────────────────────────────────────────────────────────

#[test]
fn test_program_compiles_functions_to_static_methods() {
    let program = program();
    let binaries = compile_program(&program).unwrap_or_else(|e| panic!("{e}"));

    assert!(binaries[0].is_main);
    assert_eq!(binaries.iter().filter(|b| b.is_main).count(), 1);
    let class = decode(&binaries[0]);
    assert_eq!(class.name, PROGRAM_CLASS_NAME);
    let methods: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(methods, vec!["twice", "run", "show$Int", "main"]);
    assert!(class.methods.iter().all(MethodInfo::is_static));

    let main = class
        .method("main")
        .unwrap_or_else(|| panic!("main missing"));
    assert_eq!(main.line_starting_at(0), Some(9));
    assert_eq!(main.ret, BinaryType::Void);
}

#[test]
fn test_program_compiles_local_function_to_closure_class() {
    let program = program();
    let binaries = compile_program(&program).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(binaries.len(), 2);

    let closure = decode(&binaries[1]);
    assert!(!binaries[1].is_main);
    assert!(closure.is_closure());
    assert_eq!(closure.name, "Program$main$lambda$1");
    assert_eq!(
        closure.captures,
        vec![CapturedVariable {
            name: "x".to_owned(),
            ty: BinaryType::Int,
        }]
    );
    let invoke = closure
        .method(INVOKE_METHOD)
        .unwrap_or_else(|| panic!("invoke missing"));
    assert_eq!(invoke.params, vec![BinaryType::Int]);
    assert!(!invoke.is_static());
}

#[test]
fn test_program_with_errors_is_rejected() {
    let program = Program::analyze("fun main() { y }", &SharedInterner::default());
    assert!(matches!(
        compile_program(&program),
        Err(CodegenError::ProgramHasErrors { .. })
    ));
}

// ── Fragments ───────────────────────────────────────────────────────

#[test]
fn test_constant_fragment() {
    let result = compile("1 + 1");
    assert!(result.parameter_info.is_empty());
    assert_eq!(result.classes.len(), 1);
    assert_eq!(result.main_method.class, GENERATED_CLASS_NAME);
    assert_eq!(result.main_method.name, GENERATED_FUNCTION_NAME);
    assert_eq!(result.main_method.params, Vec::<BinaryType>::new());
    assert_eq!(
        main_code(&result),
        vec![
            Instruction::PushInt(1),
            Instruction::PushInt(1),
            Instruction::Add,
            Instruction::Return,
        ]
    );
}

#[test]
fn test_references_load_parameters() {
    let result = compile("x + 1");
    assert_eq!(result.parameter_info.len(), 1);
    assert_eq!(result.main_method.params, vec![BinaryType::Int]);
    assert_eq!(result.main_method.ret, BinaryType::Int);
    assert_eq!(
        main_code(&result),
        vec![
            Instruction::Load(0),
            Instruction::PushInt(1),
            Instruction::Add,
            Instruction::Return,
        ]
    );
}

#[test]
fn test_arity_matches_parameters() {
    let result = compile("local(x) + y.length");
    let main = decode(
        result
            .main_class()
            .unwrap_or_else(|| panic!("no main class")),
    );
    let method = main
        .method(GENERATED_FUNCTION_NAME)
        .unwrap_or_else(|| panic!("no generated method"));
    assert_eq!(method.params.len(), result.parameter_info.len());
    assert_eq!(
        method.params,
        vec![BinaryType::Function, BinaryType::Int, BinaryType::Str]
    );
}

#[test]
fn test_inline_call_is_expanded_in_place() {
    let result = compile("runInline { x }");
    assert_eq!(result.classes.len(), 1);
    assert_eq!(
        main_code(&result),
        vec![Instruction::Load(0), Instruction::Return]
    );
}

#[test]
fn test_lambda_captures_parameter_at_creation() {
    let result = compile("run { x }");
    assert_eq!(result.classes.len(), 2);
    assert_eq!(result.auxiliary_classes().count(), 1);

    let class_name = format!("{GENERATED_CLASS_NAME}${GENERATED_FUNCTION_NAME}$lambda$1");
    assert_eq!(
        main_code(&result),
        vec![
            Instruction::Load(0),
            Instruction::MakeClosure {
                class: class_name.clone(),
                captures: 1,
            },
            Instruction::InvokeStatic {
                class: PROGRAM_CLASS_NAME.to_owned(),
                method: "run".to_owned(),
                argc: 1,
            },
            Instruction::Return,
        ]
    );

    let closure = decode(&result.classes[1]);
    assert_eq!(closure.name, class_name);
    let invoke = closure
        .method(INVOKE_METHOD)
        .unwrap_or_else(|| panic!("invoke missing"));
    assert_eq!(
        invoke.code,
        vec![Instruction::LoadCapture(0), Instruction::Return]
    );
}

#[test]
fn test_unit_fragment_returns_unit() {
    let result = compile("println(x)");
    assert_eq!(result.main_method.ret, BinaryType::Void);
    assert_eq!(
        main_code(&result),
        vec![
            Instruction::Load(0),
            Instruction::Print,
            Instruction::PushUnit,
            Instruction::Pop,
            Instruction::PushUnit,
            Instruction::Return,
        ]
    );
}

#[test]
fn test_statement_sequence_returns_unit() {
    let result = compile("val z = x\nz + 1");
    assert_eq!(result.main_method.ret, BinaryType::Void);
    let code = main_code(&result);
    assert_eq!(
        code[code.len() - 3..].to_vec(),
        vec![Instruction::Pop, Instruction::PushUnit, Instruction::Return]
    );

    // A lone expression keeps its own type.
    assert_eq!(compile("x + 1").main_method.ret, BinaryType::Int);
}

#[test]
fn test_backend_compiles_only_methods_of_the_member_scope() {
    let prepared = prepare("x + 1");
    let module = ProgramModule::new(&prepared.program);
    let info = peek_capture::analyze(
        &prepared.fragment,
        &prepared.resolution,
        prepared.program.interner(),
    );
    let package = PackageView::default();
    let (class, _) = create_descriptors_for_fragment("Gen", "run", &info, &Type::Int, &package);
    let unit = FragmentUnit {
        fragment: &prepared.fragment,
        resolution: &prepared.resolution,
        interner: prepared.program.interner(),
        module: &module,
        class: &class,
        method_name: "main",
    };
    assert!(matches!(
        StackBackend.compile_fragment(&unit, &NoIntercept),
        Err(CodegenError::Unresolved { .. })
    ));
}

#[test]
fn test_cancelled_compilation() {
    let prepared = prepare("x + 1");
    let module = ProgramModule::new(&prepared.program);
    let flag = CancellationFlag::new();
    flag.cancel();
    let result = FragmentCompiler::new(&module, &StackBackend)
        .cancellable(&flag)
        .compile(
            &prepared.fragment,
            &prepared.resolution,
            prepared.program.interner(),
        );
    assert!(matches!(result, Err(CodegenError::Cancelled)));
}
