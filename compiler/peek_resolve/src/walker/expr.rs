use peek_diagnostic::ErrorCode;
use peek_ir::stack::ensure_sufficient_stack;
use peek_ir::{BinaryOp, ExprId, ExprKind, Name, Span, Type, UnaryOp};

use super::Walker;
use crate::env::Env;
use crate::{Capture, DeclId, Reference, ScopeId, ScopeKind, Visibility};

impl Walker<'_> {
    /// Resolve an expression and record its type.
    ///
    /// `expected` guides lambda typing and branch joins; the caller is
    /// responsible for reporting mismatches against it.
    pub(crate) fn resolve_expr(
        &mut self,
        id: ExprId,
        env: &Env<'_>,
        scope: ScopeId,
        expected: Option<&Type>,
    ) -> Type {
        let ty = ensure_sufficient_stack(|| self.resolve_expr_inner(id, env, scope, expected));
        self.record_type(id, ty)
    }

    fn resolve_expr_inner(
        &mut self,
        id: ExprId,
        env: &Env<'_>,
        scope: ScopeId,
        expected: Option<&Type>,
    ) -> Type {
        let arena = self.arena;
        let span = arena.span(id);
        match arena.kind(id) {
            ExprKind::Int(_) => Type::Int,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Str(_) => Type::Str,
            ExprKind::Ident(name) => self.resolve_ident(id, *name, env, scope),
            ExprKind::This { label } => self.resolve_this(id, *label, env, scope),
            ExprKind::Super { .. } => {
                self.error(
                    ErrorCode::E2009,
                    span,
                    "`super` is not allowed here: functions have no supertype",
                );
                Type::Error
            }
            ExprKind::Unary { op, operand } => {
                let (want, result) = match op {
                    UnaryOp::Neg => (Type::Int, Type::Int),
                    UnaryOp::Not => (Type::Bool, Type::Bool),
                };
                let ty = self.resolve_expr(*operand, env, scope, Some(&want));
                self.check_type(&want, &ty, arena.span(*operand));
                result
            }
            ExprKind::Binary { op, left, right } => {
                self.resolve_binary(*op, *left, *right, env, scope, span)
            }
            ExprKind::Call { callee, args } => self.resolve_call(id, *callee, args, env, scope),
            ExprKind::MethodCall {
                receiver,
                selector,
                args,
            } => self.resolve_method_call(id, *receiver, *selector, args, env, scope),
            ExprKind::Member { receiver, selector } => {
                self.resolve_member(id, *receiver, *selector, env, scope)
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.resolve_expr(*cond, env, scope, Some(&Type::Bool));
                self.check_type(&Type::Bool, &cond_ty, arena.span(*cond));
                let then_ty = self.resolve_expr(*then_branch, env, scope, expected);
                let Some(else_branch) = else_branch else {
                    return Type::Unit;
                };
                let else_ty = self.resolve_expr(*else_branch, env, scope, expected);
                match then_ty.join(&else_ty) {
                    Some(ty) => ty,
                    None => {
                        if expected.is_some_and(|e| !matches!(e, Type::Unit)) {
                            self.error(
                                ErrorCode::E2001,
                                span,
                                format!(
                                    "type mismatch: `if` branches have types {then_ty} and {else_ty}"
                                ),
                            );
                            Type::Error
                        } else {
                            Type::Unit
                        }
                    }
                }
            }
            ExprKind::Block { .. } => {
                let block_scope = self.scopes.push(ScopeKind::Block, Some(scope));
                self.resolve_block_in(id, env, block_scope, expected)
            }
            ExprKind::Lambda(_) => self.resolve_lambda(id, env, scope, expected, false, None),
            ExprKind::Let { .. }
            | ExprKind::Assign { .. }
            | ExprKind::While { .. }
            | ExprKind::LocalFun(_) => {
                // Statement forms in expression position, e.g. a lone branch
                // `if (c) x = 1`.
                let mut inner = env.child();
                let stmts = [id];
                self.resolve_statements(&stmts, &mut inner, scope, None)
            }
            ExprKind::Error => Type::Error,
        }
    }

    fn resolve_ident(&mut self, id: ExprId, name: Name, env: &Env<'_>, scope: ScopeId) -> Type {
        let span = self.arena.span(id);
        let text = self.name(name);
        if let Some(decl) = env.lookup(name) {
            if self.is_inline_param(decl) {
                self.error(
                    ErrorCode::E2015,
                    span,
                    format!("inline parameter `{text}` can only be called"),
                );
            }
            self.use_decl(id, decl, scope);
            return self.decls.get(decl).ty.clone();
        }
        if self.globals.functions.contains_key(&name) {
            self.error(
                ErrorCode::E2010,
                span,
                format!("function `{text}` can only be called"),
            );
            return Type::Error;
        }
        self.error(
            ErrorCode::E2002,
            span,
            format!("unresolved reference `{text}`"),
        );
        Type::Error
    }

    fn resolve_this(
        &mut self,
        id: ExprId,
        label: Option<Name>,
        env: &Env<'_>,
        scope: ScopeId,
    ) -> Type {
        let Some(frame) = env.receiver(label) else {
            let span = self.arena.span(id);
            let message = match label {
                Some(label) => format!("there is no receiver labeled `@{}`", self.name(label)),
                None => "`this` is not available here".to_owned(),
            };
            self.error(ErrorCode::E2008, span, message);
            return Type::Error;
        };
        let (owner, ty) = (frame.owner, frame.ty.clone());
        self.use_receiver(id, owner, scope);
        ty
    }

    fn resolve_binary(
        &mut self,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
        env: &Env<'_>,
        scope: ScopeId,
        span: Span,
    ) -> Type {
        let arena = self.arena;
        match op {
            BinaryOp::And | BinaryOp::Or => {
                for operand in [left, right] {
                    let ty = self.resolve_expr(operand, env, scope, Some(&Type::Bool));
                    self.check_type(&Type::Bool, &ty, arena.span(operand));
                }
                Type::Bool
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let left_ty = self.resolve_expr(left, env, scope, None);
                let right_ty = self.resolve_expr(right, env, scope, Some(&left_ty));
                if left_ty.join(&right_ty).is_none() {
                    self.error(
                        ErrorCode::E2001,
                        span,
                        format!(
                            "operator `{}` cannot compare {left_ty} with {right_ty}",
                            op.symbol()
                        ),
                    );
                }
                Type::Bool
            }
            BinaryOp::Add => {
                let left_ty = self.resolve_expr(left, env, scope, None);
                let right_ty = self.resolve_expr(right, env, scope, None);
                match (&left_ty, &right_ty) {
                    // String concatenation accepts any right-hand value.
                    (Type::Str, _) => Type::Str,
                    (Type::Int, Type::Int) => Type::Int,
                    (Type::Error, _) | (_, Type::Error) => Type::Error,
                    _ => {
                        self.error(
                            ErrorCode::E2001,
                            span,
                            format!("operator `+` cannot be applied to {left_ty} and {right_ty}"),
                        );
                        Type::Error
                    }
                }
            }
            _ => {
                for operand in [left, right] {
                    let ty = self.resolve_expr(operand, env, scope, Some(&Type::Int));
                    self.check_type(&Type::Int, &ty, arena.span(operand));
                }
                if op.is_comparison() {
                    Type::Bool
                } else {
                    Type::Int
                }
            }
        }
    }

    /// Record a reference to `decl` and the captures it implies.
    pub(crate) fn use_decl(&mut self, id: ExprId, decl: DeclId, scope: ScopeId) {
        self.bindings.references.insert(id, Reference::Decl(decl));
        self.bindings.ref_scopes.insert(id, scope);
        self.count_use(decl);
        let target = self.decls.get(decl);
        if target.visibility == Visibility::Local {
            let declared_in = target.scope;
            self.note_closure_crossings(scope, declared_in, Capture::Value(decl), Some(decl));
        }
    }

    /// Record a reference to the receiver of `owner`.
    pub(crate) fn use_receiver(&mut self, id: ExprId, owner: DeclId, scope: ScopeId) {
        self.bindings.references.insert(id, Reference::Receiver(owner));
        self.bindings.ref_scopes.insert(id, scope);
        if let Some(body) = self.decls.get(owner).body_scope {
            self.note_closure_crossings(scope, body, Capture::Receiver(owner), None);
        }
    }

    /// Add `capture` to every closure of this unit between `from` and the
    /// scope the captured value lives in.
    fn note_closure_crossings(
        &mut self,
        from: ScopeId,
        to: ScopeId,
        capture: Capture,
        itself: Option<DeclId>,
    ) {
        let mut captured = false;
        for closure_scope in self.scopes.closures_between(from, to) {
            let Some(owner) = self.scopes.kind(closure_scope).owner() else {
                continue;
            };
            // A local function reaches itself through its own closure.
            if Some(owner) == itself || self.decls.get(owner).origin != self.origin {
                continue;
            }
            self.bindings.add_capture(owner, capture);
            captured = true;
        }
        if let (true, Capture::Value(decl)) = (captured, capture) {
            let target = self.decls.get(decl);
            if target.mutable && target.origin == self.origin {
                self.bindings.boxed.insert(decl);
            }
        }
    }
}
