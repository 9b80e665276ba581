use std::sync::Arc;

use peek_ir::{CancellationFlag, Cancelled, SharedInterner, Type};
use peek_parse::{parse_fragment, FragmentAst};
use peek_resolve::{DebugPosition, FragmentResolution, Program, Resolver};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::{analyze, analyze_cancellable, ParameterInfo, ParameterKind};

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
/// Line of `s + this` in `show`.
const SHOW_LINE: u32 = 6;

struct Analyzed {
    program: Program,
    fragment: FragmentAst,
    resolution: FragmentResolution,
}

fn prepare(text: &str, line: u32) -> Analyzed {
    prepare_in(PROGRAM, text, line)
}

fn prepare_in(source: &str, text: &str, line: u32) -> Analyzed {
    let program = Program::analyze(source, &SharedInterner::default());
    assert!(!program.has_errors(), "{:?}", program.diagnostics());
    let parsed = parse_fragment(text, program.interner(), Arc::clone(program.arena()));
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let resolution = program
        .resolve_fragment(&parsed.fragment, DebugPosition { line })
        .unwrap_or_else(|e| panic!("{e}"));
    assert!(!resolution.has_errors(), "{:?}", resolution.diagnostics);
    Analyzed {
        program,
        fragment: parsed.fragment,
        resolution,
    }
}

fn parameters_of(text: &str, line: u32) -> ParameterInfo {
    let analyzed = prepare(text, line);
    analyze(
        &analyzed.fragment,
        &analyzed.resolution,
        analyzed.program.interner(),
    )
}

fn raw_names(info: &ParameterInfo) -> Vec<&str> {
    info.parameters.iter().map(|p| p.raw.as_str()).collect()
}

#[test]
fn test_constant_fragment_has_no_parameters() {
    let info = parameters_of("1 + 1", MAIN_LINE);
    assert!(info.is_empty());
    assert!(info.mappings.is_empty());
}

#[test]
fn test_top_level_functions_are_not_parameters() {
    let info = parameters_of("twice(3) + run { 4 }", MAIN_LINE);
    assert!(info.is_empty());
}

#[test]
fn test_repeated_reference_maps_to_one_parameter() {
    let info = parameters_of("x + x * x", MAIN_LINE);
    assert_eq!(raw_names(&info), vec!["x"]);
    assert_eq!(info.mappings.len(), 3);
    assert!(info.mappings.values().all(|&index| index == 0));
    assert_eq!(info.parameters[0].ty, Type::Int);
    assert!(matches!(
        info.parameters[0].kind,
        ParameterKind::Ordinary { .. }
    ));
}

#[test]
fn test_parameter_order_is_first_reference_order() {
    let info = parameters_of("y.length + x", MAIN_LINE);
    assert_eq!(raw_names(&info), vec!["y", "x"]);
    assert_eq!(info.parameters[0].ty, Type::Str);
    assert_eq!(
        info.parameters.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![0, 1]
    );
    // `length` is a member selector, not a reference.
    assert_eq!(info.mappings.len(), 2);
}

#[test]
fn test_local_function_becomes_function_parameter() {
    let info = parameters_of("local(x)", MAIN_LINE);
    assert_eq!(raw_names(&info), vec!["local", "x"]);
    assert!(matches!(
        info.parameters[0].kind,
        ParameterKind::LocalFunction { .. }
    ));
    assert_eq!(info.parameters[0].ty.to_string(), "(Int) -> Int");
}

#[test]
fn test_fragment_declarations_are_not_parameters() {
    let info = parameters_of("val z = 1\nz + x", MAIN_LINE);
    assert_eq!(raw_names(&info), vec!["x"]);
}

#[test]
fn test_crossing_only_inside_non_inlined_lambda() {
    let direct = parameters_of("x", MAIN_LINE);
    assert!(!direct.is_crossing(0));

    let through_closure = parameters_of("run { x }", MAIN_LINE);
    assert_eq!(raw_names(&through_closure), vec!["x"]);
    assert!(through_closure.is_crossing(0));

    let through_inline = parameters_of("runInline { x }", MAIN_LINE);
    assert!(!through_inline.is_crossing(0));
}

#[test]
fn test_receiver_becomes_labeled_parameter() {
    let analyzed = prepare("this + this@show + s.length", SHOW_LINE);
    let info = analyze(
        &analyzed.fragment,
        &analyzed.resolution,
        analyzed.program.interner(),
    );
    assert_eq!(raw_names(&info), vec!["this@show", "s"]);
    assert_eq!(info.parameters[0].ty, Type::Int);
    let ParameterKind::ExtensionReceiver { label } = info.parameters[0].kind else {
        panic!("expected a receiver parameter");
    };
    assert_eq!(analyzed.program.interner().lookup(label), "show");
    assert_eq!(info.mappings.values().filter(|&&i| i == 0).count(), 2);
}

#[test]
fn test_labeled_lambda_receiver_takes_the_lambda_label() {
    const SOURCE: &str = "\
fun main() {
    val f = outer@{ this: Int, y: Int ->
        this + y
    }
    println(f(3, 4))
}
";
    for text in ["this + y", "this@outer * y"] {
        let analyzed = prepare_in(SOURCE, text, 3);
        let info = analyze(
            &analyzed.fragment,
            &analyzed.resolution,
            analyzed.program.interner(),
        );
        assert_eq!(raw_names(&info), vec!["this@outer", "y"]);
        assert_eq!(info.parameters[0].ty, Type::Int);
        let ParameterKind::ExtensionReceiver { label } = info.parameters[0].kind else {
            panic!("expected a receiver parameter");
        };
        assert_eq!(analyzed.program.interner().lookup(label), "outer");
    }
}

#[test]
fn test_deeply_nested_fragment() {
    let depth = 20_000;
    let text = format!("{}x{}", "-(".repeat(depth), ")".repeat(depth));
    let info = parameters_of(&text, MAIN_LINE);
    assert_eq!(raw_names(&info), vec!["x"]);
    assert_eq!(info.mappings.len(), 1);
}

#[test]
fn test_cancelled_analysis() {
    let analyzed = prepare("x + y.length", MAIN_LINE);
    let flag = CancellationFlag::new();
    flag.cancel();
    let result = analyze_cancellable(
        &analyzed.fragment,
        &analyzed.resolution,
        analyzed.program.interner(),
        &flag,
    );
    assert_eq!(result, Err(Cancelled));
}

fn literal_expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i64..1000).prop_map(|n| n.to_string()),
        (0i64..100).prop_map(|n| format!("twice({n})")),
    ];
    leaf.prop_recursive(4, 16, 2, |inner| {
        (inner.clone(), prop_oneof![Just("+"), Just("-"), Just("*")], inner)
            .prop_map(|(l, op, r)| format!("({l} {op} {r})"))
    })
}

proptest! {
    #[test]
    fn prop_non_local_fragments_have_no_parameters(text in literal_expression()) {
        let info = parameters_of(&text, MAIN_LINE);
        prop_assert!(info.is_empty());
    }

    #[test]
    fn prop_n_references_give_one_parameter(n in 1usize..8) {
        let text = vec!["x"; n].join(" + ");
        let info = parameters_of(&text, MAIN_LINE);
        prop_assert_eq!(info.len(), 1);
        prop_assert_eq!(info.mappings.len(), n);
    }
}
