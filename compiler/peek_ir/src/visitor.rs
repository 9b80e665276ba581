//! Syntax tree visitor.
//!
//! Default `visit_*` methods call the matching `walk_*` function, which
//! visits children in source order (pre-order). Override a `visit_*` method
//! to act on a node; call the `walk_*` function from the override to keep
//! descending.
//!
//! Member selectors (`b` in `a.b` and `a.b()`) are routed through
//! [`Visitor::visit_selector`] rather than `visit_expr_id`, so that passes
//! interested only in references can skip them.

use crate::ast::{ExprKind, Function, Module};
use crate::{ExprArena, ExprId};

pub trait Visitor<'ast> {
    fn visit_module(&mut self, module: &'ast Module, arena: &'ast ExprArena) {
        walk_module(self, module, arena);
    }

    fn visit_function(&mut self, function: &'ast Function, arena: &'ast ExprArena) {
        walk_function(self, function, arena);
    }

    /// Visit an expression by ID.
    fn visit_expr_id(&mut self, id: ExprId, arena: &'ast ExprArena) {
        walk_expr(self, id, arena);
    }

    /// Visit the member name of a qualified access.
    fn visit_selector(&mut self, id: ExprId, arena: &'ast ExprArena) {
        self.visit_expr_id(id, arena);
    }
}

pub fn walk_module<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    module: &'ast Module,
    arena: &'ast ExprArena,
) {
    for function in &module.functions {
        visitor.visit_function(function, arena);
    }
}

pub fn walk_function<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    function: &'ast Function,
    arena: &'ast ExprArena,
) {
    visitor.visit_expr_id(function.body, arena);
}

pub fn walk_expr<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    id: ExprId,
    arena: &'ast ExprArena,
) {
    match arena.kind(id) {
        ExprKind::Int(_)
        | ExprKind::Bool(_)
        | ExprKind::Str(_)
        | ExprKind::Ident(_)
        | ExprKind::This { .. }
        | ExprKind::Super { .. }
        | ExprKind::Error => {}

        ExprKind::Unary { operand, .. } => visitor.visit_expr_id(*operand, arena),
        ExprKind::Binary { left, right, .. } => {
            visitor.visit_expr_id(*left, arena);
            visitor.visit_expr_id(*right, arena);
        }
        ExprKind::Call { callee, args } => {
            visitor.visit_expr_id(*callee, arena);
            for arg in args {
                visitor.visit_expr_id(*arg, arena);
            }
        }
        ExprKind::Member { receiver, selector } => {
            visitor.visit_expr_id(*receiver, arena);
            visitor.visit_selector(*selector, arena);
        }
        ExprKind::MethodCall {
            receiver,
            selector,
            args,
        } => {
            visitor.visit_expr_id(*receiver, arena);
            visitor.visit_selector(*selector, arena);
            for arg in args {
                visitor.visit_expr_id(*arg, arena);
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr_id(*cond, arena);
            visitor.visit_expr_id(*then_branch, arena);
            if let Some(else_branch) = else_branch {
                visitor.visit_expr_id(*else_branch, arena);
            }
        }
        ExprKind::Block { stmts } => {
            for stmt in stmts {
                visitor.visit_expr_id(*stmt, arena);
            }
        }
        ExprKind::Lambda(lambda) => visitor.visit_expr_id(lambda.body, arena),
        ExprKind::Let { init, .. } => visitor.visit_expr_id(*init, arena),
        ExprKind::Assign { target, value } => {
            visitor.visit_expr_id(*target, arena);
            visitor.visit_expr_id(*value, arena);
        }
        ExprKind::While { cond, body } => {
            visitor.visit_expr_id(*cond, arena);
            visitor.visit_expr_id(*body, arena);
        }
        ExprKind::LocalFun(function) => visitor.visit_function(function, arena),
    }
}
