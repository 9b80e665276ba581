use std::sync::Arc;

use peek_diagnostic::ErrorCode;
use peek_ir::{ExprKind, SharedInterner, Type};
use peek_parse::parse_fragment;
use pretty_assertions::assert_eq;

use crate::{
    CallKind, Capture, DebugPosition, DeclId, DeclKind, FragmentResolution, Origin, Program,
    Reference, ResolveError, Resolver, ScopeKind,
};

const PROGRAM: &str = "\
fun helper(a: Int): Int = a * 2
private fun secret(): Int = 42
fun main() {
    val x = 1
    var y = x + 1
    println(helper(x) + y)
}
";

fn analyze(source: &str) -> Program {
    Program::analyze(source, &SharedInterner::default())
}

fn error_codes(program: &Program) -> Vec<ErrorCode> {
    program
        .diagnostics()
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.code)
        .collect()
}

fn evaluate_at(
    program: &Program,
    text: &str,
    line: u32,
) -> (peek_parse::FragmentAst, FragmentResolution) {
    let parsed = parse_fragment(text, program.interner(), Arc::clone(program.arena()));
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let resolution = program
        .resolve_fragment(&parsed.fragment, DebugPosition { line })
        .unwrap_or_else(|e| panic!("resolution failed: {e}"));
    (parsed.fragment, resolution)
}

fn fragment_codes(resolution: &FragmentResolution) -> Vec<ErrorCode> {
    resolution
        .diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.code)
        .collect()
}

fn find_decl(program: &Program, name: &str, pred: impl Fn(&DeclKind) -> bool) -> DeclId {
    program
        .decls()
        .iter_own()
        .find(|(_, d)| program.interner().lookup(d.name) == name && pred(&d.kind))
        .map(|(id, _)| id)
        .unwrap_or_else(|| panic!("no declaration `{name}`"))
}

#[test]
fn test_well_formed_program_has_no_errors() {
    let program = analyze(PROGRAM);
    assert_eq!(error_codes(&program), Vec::<ErrorCode>::new());
    let helper = program
        .function_named("helper")
        .unwrap_or_else(|| panic!("helper"));
    assert_eq!(program.decls().get(helper).ty.to_string(), "(Int) -> Int");
}

#[test]
fn test_return_type_is_inferred_from_expression_body() {
    let program = analyze("fun twice(x: Int) = x * 2\nfun label() = \"n=\" + twice(2)\n");
    assert_eq!(error_codes(&program), Vec::<ErrorCode>::new());
    let label = program
        .function_named("label")
        .unwrap_or_else(|| panic!("label"));
    assert_eq!(program.decls().get(label).ty.to_string(), "() -> Str");
}

#[test]
fn test_resolution_errors() {
    let cases = [
        ("fun main() {\n    val x = y\n}\n", ErrorCode::E2002),
        ("fun main() {\n    val x: Int = \"a\"\n    println(x)\n}\n", ErrorCode::E2001),
        ("fun f(n: Int) = f(n - 1)\n", ErrorCode::E2013),
        ("inline fun f(x: Int): Int = f(x)\n", ErrorCode::E2012),
        ("fun main() {\n    val x = 1\n    x = 2\n}\n", ErrorCode::E2007),
        ("fun f() {}\nfun f() {}\n", ErrorCode::E2006),
        ("fun main() {\n    println(1, 2)\n}\n", ErrorCode::E2003),
        ("fun main() {\n    val f = { a -> a }\n}\n", ErrorCode::E2004),
        ("inline fun keep(f: () -> Int): () -> Int = f\n", ErrorCode::E2015),
        ("fun Int.bad(): Int = this@nope\n", ErrorCode::E2008),
        ("fun main() {\n    println(\"s\".size)\n}\n", ErrorCode::E2011),
    ];
    for (source, code) in cases {
        let program = analyze(source);
        assert!(
            error_codes(&program).contains(&code),
            "expected {code} for {source:?}, got {:?}",
            program.diagnostics()
        );
    }
}

#[test]
fn test_unused_local_is_a_warning() {
    let program = analyze("fun main() {\n    val unused = 1\n}\n");
    assert!(!program.has_errors());
    let warnings: Vec<ErrorCode> = program.diagnostics().iter().map(|d| d.code).collect();
    assert_eq!(warnings, vec![ErrorCode::W2001]);
}

#[test]
fn test_breakpoint_sites_see_earlier_statements_only() {
    let program = analyze(PROGRAM);
    assert_eq!(program.breakpoint_lines(), vec![1, 2, 4, 5, 6]);

    let names = |line: u32| -> Vec<&str> {
        let site = program.site(line).unwrap_or_else(|| panic!("site at {line}"));
        site.names
            .iter()
            .map(|(name, _)| program.interner().lookup(*name))
            .collect()
    };
    assert_eq!(names(4), Vec::<&str>::new());
    assert_eq!(names(5), vec!["x"]);
    assert_eq!(names(6), vec!["x", "y"]);
}

#[test]
fn test_fragment_references_suspended_locals() {
    let program = analyze(PROGRAM);
    let (fragment, resolution) = evaluate_at(&program, "x + y", 6);
    assert_eq!(fragment_codes(&resolution), Vec::<ErrorCode>::new());
    assert_eq!(resolution.ty, Type::Int);

    let root = fragment.expression().unwrap_or_else(|| panic!("expression"));
    let ExprKind::Binary { left, .. } = fragment.arena.kind(root) else {
        panic!("expected binary");
    };
    let Some(Reference::Decl(x)) = resolution.bindings.reference(*left) else {
        panic!("`x` should resolve to a declaration");
    };
    assert_eq!(resolution.decls.get(x).origin, Origin::Program);
    assert_eq!(
        resolution.scopes.kind(resolution.scope),
        ScopeKind::Fragment
    );
    assert_eq!(
        resolution.scopes.parent(resolution.scope),
        Some(resolution.context.scope)
    );
}

#[test]
fn test_fragment_calls_program_functions() {
    let program = analyze(PROGRAM);
    let (fragment, resolution) = evaluate_at(&program, "helper(x)", 6);
    assert_eq!(fragment_codes(&resolution), Vec::<ErrorCode>::new());
    let root = fragment.expression().unwrap_or_else(|| panic!("expression"));
    let helper = program
        .function_named("helper")
        .unwrap_or_else(|| panic!("helper"));
    assert_eq!(resolution.bindings.call(root), Some(CallKind::Static(helper)));
}

#[test]
fn test_fragment_before_declaration_cannot_see_it() {
    let program = analyze(PROGRAM);
    let (_, resolution) = evaluate_at(&program, "x", 4);
    assert_eq!(fragment_codes(&resolution), vec![ErrorCode::E2002]);
}

#[test]
fn test_fragment_restrictions() {
    let program = analyze(PROGRAM);
    let cases = [
        ("secret()", ErrorCode::E2005),
        ("y = 3", ErrorCode::E2014),
        ("super", ErrorCode::E2009),
        ("this", ErrorCode::E2008),
    ];
    for (text, code) in cases {
        let (_, resolution) = evaluate_at(&program, text, 6);
        assert_eq!(fragment_codes(&resolution), vec![code], "fragment {text:?}");
    }
}

#[test]
fn test_fragment_at_line_without_code() {
    let program = analyze(PROGRAM);
    let parsed = parse_fragment("1", program.interner(), Arc::clone(program.arena()));
    let result = program.resolve_fragment(&parsed.fragment, DebugPosition { line: 99 });
    assert_eq!(result.err(), Some(ResolveError::InvalidPosition { line: 99 }));
}

#[test]
fn test_closure_captures_box_mutated_locals() {
    let program = analyze(
        "fun main() {\n    var n = 0\n    val inc = { n = n + 1 }\n    inc()\n    println(n)\n}\n",
    );
    assert_eq!(error_codes(&program), Vec::<ErrorCode>::new());
    let n = find_decl(&program, "n", |k| *k == DeclKind::Local);
    let lambda = find_decl(&program, "lambda", |k| matches!(k, DeclKind::Lambda { .. }));
    assert_eq!(program.bindings().captures(lambda), &[Capture::Value(n)]);
    assert!(program.bindings().is_boxed(n));
}

#[test]
fn test_lambda_passed_to_inline_function_is_inlined() {
    let program = analyze(
        "inline fun run(f: () -> Int): Int = f()\n\
         fun main() {\n    val x = 1\n    println(run { x })\n}\n",
    );
    assert_eq!(error_codes(&program), Vec::<ErrorCode>::new());
    let lambda = find_decl(&program, "run", |k| matches!(k, DeclKind::Lambda { .. }));
    assert!(matches!(
        program.decls().get(lambda).kind,
        DeclKind::Lambda { inline: true, .. }
    ));
    assert!(program.bindings().captures(lambda).is_empty());
}

#[test]
fn test_lambda_receiver_comes_from_expected_type() {
    let program = analyze(
        "fun apply(x: Int, f: Int.() -> Int): Int = f(x)\n\
         fun main() {\n    println(apply(2) { this@apply * 3 })\n}\n",
    );
    assert_eq!(error_codes(&program), Vec::<ErrorCode>::new());
    let lambda = find_decl(&program, "apply", |k| matches!(k, DeclKind::Lambda { .. }));
    assert_eq!(
        program.decls().get(lambda).ty.to_string(),
        "Int.() -> Int"
    );
}

#[test]
fn test_fragment_inside_lambda_crosses_closure_boundary() {
    let program = analyze(
        "fun main() {\n    val x = 1\n    val f = { a: Int ->\n        a + 1\n    }\n    println(f(x))\n}\n",
    );
    assert_eq!(error_codes(&program), Vec::<ErrorCode>::new());
    let (_, resolution) = evaluate_at(&program, "x", 4);
    assert_eq!(fragment_codes(&resolution), Vec::<ErrorCode>::new());
    let x = find_decl(&program, "x", |k| *k == DeclKind::Local);
    let x_scope = program.decls().get(x).scope;
    assert!(resolution
        .scopes
        .crosses_closure_boundary(resolution.scope, x_scope));
}
