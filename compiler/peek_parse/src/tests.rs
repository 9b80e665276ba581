use std::sync::Arc;

use peek_diagnostic::ErrorCode;
use peek_ir::{BinaryOp, ExprArena, ExprId, ExprKind, ParsedType, SharedInterner};
use pretty_assertions::assert_eq;

use crate::{parse_fragment, parse_program, FragmentKind};

fn fragment(text: &str, interner: &SharedInterner) -> crate::FragmentParse {
    parse_fragment(text, interner, Arc::new(ExprArena::new()))
}

#[test]
fn test_parse_functions_with_modifiers() {
    let interner = SharedInterner::default();
    let source = "private inline fun twice(f: (Int) -> Int, x: Int): Int = f(f(x))\n\
                  fun Int.double(): Int = this * 2\n\
                  fun main() {\n    val x = 5\n    println(x)\n}\n";
    let output = parse_program(source, &interner);
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    assert_eq!(output.module.functions.len(), 3);

    let twice = &output.module.functions[0];
    assert!(twice.modifiers.inline);
    assert!(twice.modifiers.private);
    assert!(twice.expr_body);
    assert_eq!(twice.params.len(), 2);
    assert!(matches!(
        twice.params[0].ty,
        Some(ParsedType::Function { ref params, .. }) if params.len() == 1
    ));

    let double = &output.module.functions[1];
    assert_eq!(interner.lookup(double.name), "double");
    assert!(matches!(
        double.receiver,
        Some(ParsedType::Named { name, .. }) if interner.lookup(name) == "Int"
    ));

    let main = &output.module.functions[2];
    assert!(!main.expr_body);
    match output.arena.kind(main.body) {
        ExprKind::Block { stmts } => assert_eq!(stmts.len(), 2),
        other => panic!("expected block, got {other:?}"),
    }
}

#[test]
fn test_fragment_kind_detection() {
    let interner = SharedInterner::default();
    assert_eq!(fragment("x + 1", &interner).fragment.kind, FragmentKind::Expression);
    assert_eq!(
        fragment("val y = 1\ny", &interner).fragment.kind,
        FragmentKind::Block
    );
    assert_eq!(fragment("val y = 1", &interner).fragment.kind, FragmentKind::Block);

    let empty = fragment("   ", &interner);
    assert!(empty.errors.is_empty());
    assert!(empty.fragment.is_empty());
    assert_eq!(empty.fragment.expression(), None);
}

#[test]
fn test_binary_precedence() {
    let interner = SharedInterner::default();
    let parsed = fragment("1 + 2 * 3 == 7 && true", &interner);
    let arena = &parsed.fragment.arena;
    let root = parsed.fragment.expression().unwrap_or_else(|| panic!("expression"));

    let ExprKind::Binary { op: BinaryOp::And, left, .. } = arena.kind(root) else {
        panic!("expected &&, got {:?}", arena.kind(root));
    };
    let ExprKind::Binary { op: BinaryOp::Eq, left: sum, .. } = arena.kind(*left) else {
        panic!("expected ==");
    };
    let ExprKind::Binary { op: BinaryOp::Add, right: product, .. } = arena.kind(*sum) else {
        panic!("expected +");
    };
    assert!(matches!(
        arena.kind(*product),
        ExprKind::Binary { op: BinaryOp::Mul, .. }
    ));
}

#[test]
fn test_lambda_forms() {
    let interner = SharedInterner::default();
    let parsed = fragment(
        "val f = { a: Int, b -> a + b }\nval g = outer@{ this: Int -> this@outer + 1 }\nval h = { 42 }",
        &interner,
    );
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let arena = &parsed.fragment.arena;
    let stmts = parsed.fragment.statements();

    let lambda_of = |stmt: ExprId| match arena.kind(stmt) {
        ExprKind::Let { init, .. } => match arena.kind(*init) {
            ExprKind::Lambda(lambda) => lambda.clone(),
            other => panic!("expected lambda, got {other:?}"),
        },
        other => panic!("expected val, got {other:?}"),
    };

    let f = lambda_of(stmts[0]);
    assert_eq!(f.params.len(), 2);
    assert!(f.params[0].ty.is_some());
    assert!(f.params[1].ty.is_none());
    assert!(f.receiver.is_none());

    let g = lambda_of(stmts[1]);
    assert_eq!(g.label.map(|l| interner.lookup(l)), Some("outer"));
    assert!(g.receiver.is_some());
    assert!(g.params.is_empty());

    let h = lambda_of(stmts[2]);
    assert!(h.params.is_empty());
    match arena.kind(h.body) {
        ExprKind::Block { stmts } => {
            assert_eq!(arena.kind(stmts[0]), &ExprKind::Int(42));
        }
        other => panic!("expected block body, got {other:?}"),
    }
}

#[test]
fn test_member_and_method_call() {
    let interner = SharedInterner::default();
    let parsed = fragment("s.length + x.toString().length", &interner);
    assert!(parsed.errors.is_empty());
    let arena = &parsed.fragment.arena;
    let root = parsed.fragment.expression().unwrap_or_else(|| panic!("expression"));
    let ExprKind::Binary { left, right, .. } = arena.kind(root) else {
        panic!("expected binary");
    };
    let ExprKind::Member { selector, .. } = arena.kind(*left) else {
        panic!("expected member");
    };
    assert_eq!(arena.kind(*selector), &ExprKind::Ident(interner.intern("length")));
    let ExprKind::Member { receiver, .. } = arena.kind(*right) else {
        panic!("expected member");
    };
    assert!(matches!(arena.kind(*receiver), ExprKind::MethodCall { args, .. } if args.is_empty()));
}

#[test]
fn test_trailing_lambda_calls() {
    let interner = SharedInterner::default();
    let parsed = fragment("run { 1 }\napply(2) { x -> x }", &interner);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let arena = &parsed.fragment.arena;
    let stmts = parsed.fragment.statements();
    assert!(matches!(arena.kind(stmts[0]), ExprKind::Call { args, .. } if args.len() == 1));
    assert!(matches!(arena.kind(stmts[1]), ExprKind::Call { args, .. } if args.len() == 2));
}

#[test]
fn test_newline_rules() {
    let interner = SharedInterner::default();
    let parsed = fragment("if (a)\n  1\nelse\n  2\nval s = name\n  .length\nx\n-1", &interner);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let arena = &parsed.fragment.arena;
    let stmts = parsed.fragment.statements();
    // `-1` on its own line is a new statement, not a subtraction.
    assert_eq!(stmts.len(), 4);
    assert!(matches!(
        arena.kind(stmts[0]),
        ExprKind::If { else_branch: Some(_), .. }
    ));
    assert!(matches!(
        arena.kind(stmts[1]),
        ExprKind::Let { init, .. } if matches!(arena.kind(*init), ExprKind::Member { .. })
    ));
}

#[test]
fn test_this_and_super_labels() {
    let interner = SharedInterner::default();
    let parsed = fragment("this@main + super", &interner);
    let arena = &parsed.fragment.arena;
    let root = parsed.fragment.expression().unwrap_or_else(|| panic!("expression"));
    let ExprKind::Binary { left, right, .. } = arena.kind(root) else {
        panic!("expected binary");
    };
    assert_eq!(
        arena.kind(*left),
        &ExprKind::This {
            label: Some(interner.intern("main"))
        }
    );
    assert_eq!(arena.kind(*right), &ExprKind::Super { label: None });
}

#[test]
fn test_fragment_ids_follow_program_ids() {
    let interner = SharedInterner::default();
    let program = parse_program("fun main() {\n    val x = 1\n}\n", &interner);
    let program_arena = Arc::new(program.arena);
    let end = program_arena.end();
    let parsed = parse_fragment("x + 1", &interner, Arc::clone(&program_arena));
    assert!(parsed.fragment.root.raw() >= end);
    for stmt in parsed.fragment.statements() {
        assert!(parsed.fragment.arena.owns(*stmt));
    }
}

#[test]
fn test_syntax_errors_are_reported_and_recovered() {
    let interner = SharedInterner::default();
    let parsed = fragment("val = 3\n1 + )\nvalid", &interner);
    let codes: Vec<ErrorCode> = parsed.errors.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::E1004, ErrorCode::E1002]);
    assert_eq!(parsed.fragment.statements().len(), 3);
}

#[test]
fn test_unclosed_paren() {
    let interner = SharedInterner::default();
    let parsed = fragment("(1 + 2", &interner);
    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].code, ErrorCode::E1003);
}

#[test]
fn test_lexer_errors_are_not_duplicated() {
    let interner = SharedInterner::default();
    let parsed = fragment("1 + #", &interner);
    let codes: Vec<ErrorCode> = parsed.errors.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::E0002]);
}
