use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::visitor::{walk_expr, Visitor};

#[test]
fn test_intern_is_idempotent() {
    let interner = SharedInterner::default();
    let a = interner.intern("counter");
    let b = interner.intern("counter");
    let c = interner.intern("other");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(interner.lookup(a), "counter");
}

#[test]
fn test_interner_get_does_not_insert() {
    let interner = StringInterner::new();
    let before = interner.len();
    assert_eq!(interner.get("never_seen"), None);
    assert_eq!(interner.len(), before);
    assert!(interner.get("fun").is_some());
}

#[test]
fn test_line_index() {
    let index = LineIndex::new("fun main() {\n    val x = 5\n}\n");
    assert_eq!(index.line_of(0), 1);
    assert_eq!(index.line_of(13), 2);
    assert_eq!(index.line_col(17), (2, 5));
    assert_eq!(index.line_start(3), Some(27));
    assert_eq!(index.line_start(0), None);
    assert_eq!(index.line_count(), 4);
}

#[test]
fn test_span_merge() {
    let merged = Span::new(4, 6).merge(Span::new(1, 3));
    assert_eq!(merged, Span::new(1, 6));
    assert_eq!(merged.len(), 5);
    assert!(merged.contains(5));
    assert!(!merged.contains(6));
}

#[test]
fn test_layered_arena_ids_continue_after_parent() {
    let mut program = ExprArena::new();
    let first = program.alloc_kind(ExprKind::Int(1), Span::new(0, 1));
    let second = program.alloc_kind(ExprKind::Int(2), Span::new(2, 3));
    let program = Arc::new(program);

    let mut fragment = ExprArena::layered(Arc::clone(&program));
    let own = fragment.alloc_kind(ExprKind::Bool(true), Span::new(0, 4));

    assert_eq!(own.raw(), second.raw() + 1);
    assert!(fragment.owns(own));
    assert!(!fragment.owns(first));
    assert_eq!(fragment.kind(first), &ExprKind::Int(1));
    assert_eq!(fragment.kind(own), &ExprKind::Bool(true));
}

#[test]
fn test_type_display() {
    let ty = Type::function(Some(Type::Int), vec![Type::Int, Type::Str], Type::Bool);
    assert_eq!(ty.to_string(), "Int.(Int, Str) -> Bool");
    assert_eq!(Type::function(None, vec![], Type::Unit).to_string(), "() -> Unit");
}

#[test]
fn test_nothing_flows_into_every_type() {
    assert!(Type::Int.accepts(&Type::Nothing));
    assert!(!Type::Nothing.accepts(&Type::Int));
    assert!(!Type::Int.accepts(&Type::Str));
    assert_eq!(Type::Nothing.join(&Type::Str), Some(Type::Str));
    assert_eq!(Type::Int.join(&Type::Bool), None);
}

#[test]
fn test_cancellation_is_shared_between_clones() {
    let flag = CancellationFlag::new();
    let handle = flag.clone();
    assert_eq!(flag.check(), Ok(()));
    handle.cancel();
    assert_eq!(flag.check(), Err(Cancelled));
}

#[test]
fn test_deep_recursion_grows_stack() {
    fn depth(n: u64) -> u64 {
        stack::ensure_sufficient_stack(|| if n == 0 { 0 } else { depth(n - 1) + 1 })
    }
    assert_eq!(depth(100_000), 100_000);
}

struct SelectorSkippingCounter {
    idents: usize,
}

impl<'ast> Visitor<'ast> for SelectorSkippingCounter {
    fn visit_expr_id(&mut self, id: ExprId, arena: &'ast ExprArena) {
        if matches!(arena.kind(id), ExprKind::Ident(_)) {
            self.idents += 1;
        }
        walk_expr(self, id, arena);
    }

    fn visit_selector(&mut self, _id: ExprId, _arena: &'ast ExprArena) {}
}

#[test]
fn test_visitor_can_skip_member_selectors() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let receiver = arena.alloc_kind(ExprKind::Ident(interner.intern("s")), Span::new(0, 1));
    let selector = arena.alloc_kind(ExprKind::Ident(interner.intern("length")), Span::new(2, 8));
    let member = arena.alloc_kind(ExprKind::Member { receiver, selector }, Span::new(0, 8));

    let mut counter = SelectorSkippingCounter { idents: 0 };
    counter.visit_expr_id(member, &arena);
    assert_eq!(counter.idents, 1);
}
