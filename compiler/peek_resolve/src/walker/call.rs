//! Calls, member access and function literals.

use peek_diagnostic::ErrorCode;
use peek_ir::{ExprId, ExprKind, FunctionType, Lambda, Name, Span, Type};

use super::Walker;
use crate::env::{Env, ReceiverFrame};
use crate::{
    Builtin, CallKind, DeclId, DeclKind, Declaration, MemberBuiltin, Reference, ScopeId,
    ScopeKind, Visibility,
};

/// How arguments of a call are checked.
struct ArgContext {
    /// Lambdas passed to function-typed parameters are inlined.
    inline: bool,
    /// Implicit label for lambda arguments: the callee's name.
    callee_name: Option<Name>,
}

impl Walker<'_> {
    pub(crate) fn resolve_call(
        &mut self,
        id: ExprId,
        callee: ExprId,
        args: &[ExprId],
        env: &Env<'_>,
        scope: ScopeId,
    ) -> Type {
        let arena = self.arena;
        let span = arena.span(id);
        let ExprKind::Ident(name) = arena.kind(callee) else {
            let callee_ty = self.resolve_expr(callee, env, scope, None);
            return self.call_value(id, &callee_ty, args, env, scope, span);
        };
        let name = *name;
        let text = self.name(name);

        if let Some(decl) = env.lookup(name) {
            let target = self.decls.get(decl).clone();
            self.use_decl(callee, decl, scope);
            let callee_ty = self.record_type(callee, target.ty.clone());
            if let DeclKind::LocalFunction { .. } = target.kind {
                self.check_local_function_ready(decl, arena.span(callee));
                self.bindings.calls.insert(id, CallKind::LocalFunction(decl));
                let Some(signature) = callee_ty.as_function().cloned() else {
                    return Type::Error;
                };
                let ctx = ArgContext {
                    inline: false,
                    callee_name: Some(name),
                };
                self.check_args(&signature.params, args, env, scope, span, &ctx);
                return signature.ret;
            }
            return self.call_value(id, &callee_ty, args, env, scope, span);
        }

        if let Some(&decl) = self.globals.functions.get(&name) {
            let fn_ty = self.ensure_function_resolved(decl);
            self.bindings.references.insert(callee, Reference::Decl(decl));
            self.bindings.ref_scopes.insert(callee, scope);
            self.record_type(callee, fn_ty.clone());
            self.check_visibility(decl, arena.span(callee));
            let inline = self.decls.get(decl).is_inline_function();
            if inline {
                self.note_inline_call(decl, span);
                self.bindings.calls.insert(id, CallKind::Inline(decl));
            } else {
                self.bindings.calls.insert(id, CallKind::Static(decl));
            }
            let Some(signature) = fn_ty.as_function().cloned() else {
                return Type::Error;
            };
            let ctx = ArgContext {
                inline,
                callee_name: Some(name),
            };
            self.check_args(&signature.params, args, env, scope, span, &ctx);
            return signature.ret;
        }

        let builtin = match text {
            "println" => Some((Builtin::Println, Type::Error, Type::Unit)),
            "error" => Some((Builtin::Error, Type::Str, Type::Nothing)),
            _ => None,
        };
        if let Some((builtin, param, ret)) = builtin {
            self.bindings.calls.insert(id, CallKind::Builtin(builtin));
            let ctx = ArgContext {
                inline: false,
                callee_name: None,
            };
            // `println` takes any value.
            self.check_args(&[param], args, env, scope, span, &ctx);
            return ret;
        }

        self.error(
            ErrorCode::E2002,
            arena.span(callee),
            format!("unresolved reference `{text}`"),
        );
        self.resolve_args_unchecked(args, env, scope);
        Type::Error
    }

    /// Invoke a function-typed value.
    fn call_value(
        &mut self,
        id: ExprId,
        callee_ty: &Type,
        args: &[ExprId],
        env: &Env<'_>,
        scope: ScopeId,
        span: Span,
    ) -> Type {
        let Some(signature) = callee_ty.as_function().cloned() else {
            if !callee_ty.is_error() {
                self.error(
                    ErrorCode::E2010,
                    span,
                    format!("expression of type {callee_ty} is not callable"),
                );
            }
            self.resolve_args_unchecked(args, env, scope);
            return Type::Error;
        };
        self.bindings.calls.insert(id, CallKind::Closure);
        let params: Vec<Type> = signature.invocation_params().cloned().collect();
        let ctx = ArgContext {
            inline: false,
            callee_name: None,
        };
        self.check_args(&params, args, env, scope, span, &ctx);
        signature.ret
    }

    pub(crate) fn resolve_method_call(
        &mut self,
        id: ExprId,
        receiver: ExprId,
        selector: ExprId,
        args: &[ExprId],
        env: &Env<'_>,
        scope: ScopeId,
    ) -> Type {
        let arena = self.arena;
        let span = arena.span(id);
        let ExprKind::Ident(name) = arena.kind(selector) else {
            return Type::Error;
        };
        let text = self.name(*name);
        let receiver_ty = self.resolve_expr(receiver, env, scope, None);

        if text == "toString" && args.is_empty() {
            self.bindings
                .calls
                .insert(id, CallKind::Member(MemberBuiltin::ToString));
            return Type::Str;
        }

        let candidates = self
            .globals
            .extensions
            .get(name)
            .cloned()
            .unwrap_or_default();
        let found = candidates.into_iter().find(|&decl| {
            self.decls
                .get(decl)
                .receiver_type()
                .is_some_and(|r| r.accepts(&receiver_ty))
        });
        let Some(decl) = found else {
            if !receiver_ty.is_error() {
                self.error(
                    ErrorCode::E2011,
                    arena.span(selector),
                    format!("unknown member `{text}` on type {receiver_ty}"),
                );
            }
            self.resolve_args_unchecked(args, env, scope);
            return Type::Error;
        };

        let fn_ty = self.ensure_function_resolved(decl);
        self.check_visibility(decl, arena.span(selector));
        let inline = self.decls.get(decl).is_inline_function();
        if inline {
            self.note_inline_call(decl, span);
            self.bindings.calls.insert(id, CallKind::Inline(decl));
        } else {
            self.bindings.calls.insert(id, CallKind::Static(decl));
        }
        let Some(signature) = fn_ty.as_function().cloned() else {
            return Type::Error;
        };
        let ctx = ArgContext {
            inline,
            callee_name: Some(*name),
        };
        self.check_args(&signature.params, args, env, scope, span, &ctx);
        signature.ret
    }

    pub(crate) fn resolve_member(
        &mut self,
        id: ExprId,
        receiver: ExprId,
        selector: ExprId,
        env: &Env<'_>,
        scope: ScopeId,
    ) -> Type {
        let arena = self.arena;
        let receiver_ty = self.resolve_expr(receiver, env, scope, None);
        let ExprKind::Ident(name) = arena.kind(selector) else {
            return Type::Error;
        };
        let text = self.name(*name);
        match (&receiver_ty, text) {
            (Type::Str, "length") => {
                self.bindings.members.insert(id, MemberBuiltin::Length);
                Type::Int
            }
            (Type::Error, _) => Type::Error,
            _ => {
                self.error(
                    ErrorCode::E2011,
                    arena.span(selector),
                    format!("unknown member `{text}` on type {receiver_ty}"),
                );
                Type::Error
            }
        }
    }

    /// Private top-level functions belong to the program's own unit.
    fn check_visibility(&mut self, decl: DeclId, span: Span) {
        let target = self.decls.get(decl);
        if target.visibility == Visibility::Private && target.origin != self.origin {
            let name = self.name(target.name);
            self.error(
                ErrorCode::E2005,
                span,
                format!("function `{name}` is private to the program"),
            );
        }
    }

    fn check_args(
        &mut self,
        params: &[Type],
        args: &[ExprId],
        env: &Env<'_>,
        scope: ScopeId,
        span: Span,
        ctx: &ArgContext,
    ) {
        let arena = self.arena;
        if params.len() != args.len() {
            self.error(
                ErrorCode::E2003,
                span,
                format!("expected {} arguments, found {}", params.len(), args.len()),
            );
        }
        for (i, &arg) in args.iter().enumerate() {
            let expected = params.get(i);
            let ty = match arena.kind(arg) {
                ExprKind::Lambda(_) => {
                    let inline = ctx.inline && expected.is_some_and(|e| e.as_function().is_some());
                    self.resolve_lambda(arg, env, scope, expected, inline, ctx.callee_name)
                }
                // Inline functions may hand their lambda parameters on to
                // other inline functions.
                ExprKind::Ident(name)
                    if ctx.inline
                        && env.lookup(*name).is_some_and(|d| self.is_inline_param(d)) =>
                {
                    let Some(decl) = env.lookup(*name) else {
                        continue;
                    };
                    self.use_decl(arg, decl, scope);
                    let ty = self.decls.get(decl).ty.clone();
                    self.record_type(arg, ty)
                }
                _ => self.resolve_expr(arg, env, scope, expected),
            };
            if let Some(expected) = expected {
                self.check_type(expected, &ty, arena.span(arg));
            }
        }
    }

    fn resolve_args_unchecked(&mut self, args: &[ExprId], env: &Env<'_>, scope: ScopeId) {
        for &arg in args {
            self.resolve_expr(arg, env, scope, None);
        }
    }

    /// Type a function literal, taking missing parameter and receiver types
    /// from the expected function type.
    pub(crate) fn resolve_lambda(
        &mut self,
        id: ExprId,
        env: &Env<'_>,
        scope: ScopeId,
        expected: Option<&Type>,
        inline: bool,
        callee_name: Option<Name>,
    ) -> Type {
        let arena = self.arena;
        let span = arena.span(id);
        let ExprKind::Lambda(lambda) = arena.kind(id) else {
            return Type::Error;
        };
        let lambda: &Lambda = lambda;
        let expected_fn: Option<FunctionType> = expected.and_then(Type::as_function).cloned();

        if let Some(expected_fn) = &expected_fn {
            if expected_fn.params.len() != lambda.params.len() {
                self.error(
                    ErrorCode::E2003,
                    span,
                    format!(
                        "expected a function literal with {} parameters, found {}",
                        expected_fn.params.len(),
                        lambda.params.len()
                    ),
                );
            }
        }

        let receiver = match &lambda.receiver {
            Some(explicit) => match (
                &explicit.ty,
                expected_fn.as_ref().and_then(|f| f.receiver.clone()),
            ) {
                (Some(ty), _) => Some(self.lower_type(ty)),
                (None, Some(ty)) => Some(ty),
                (None, None) => {
                    self.error(
                        ErrorCode::E2004,
                        explicit.span,
                        "cannot infer the type of the lambda receiver",
                    );
                    Some(Type::Error)
                }
            },
            None => expected_fn.as_ref().and_then(|f| f.receiver.clone()),
        };

        let mut params = Vec::with_capacity(lambda.params.len());
        for (i, param) in lambda.params.iter().enumerate() {
            let from_expected = expected_fn.as_ref().and_then(|f| f.params.get(i).cloned());
            let ty = match (&param.ty, from_expected) {
                (Some(ty), _) => self.lower_type(ty),
                (None, Some(ty)) => ty,
                (None, None) => {
                    let name = self.name(param.name);
                    self.error(
                        ErrorCode::E2004,
                        param.span,
                        format!("cannot infer the type of parameter `{name}`"),
                    );
                    Type::Error
                }
            };
            params.push(ty);
        }

        let name = lambda
            .label
            .or(callee_name)
            .unwrap_or_else(|| self.interner.intern("lambda"));
        let decl = self.declare(Declaration {
            name,
            kind: DeclKind::Lambda {
                inline,
                label: lambda.label,
                expr: id,
            },
            ty: Type::function(receiver.clone(), params.clone(), Type::Error),
            visibility: Visibility::Local,
            origin: self.origin,
            scope,
            body_scope: None,
            span,
            mutable: false,
        });
        self.bindings.definitions.insert(id, decl);

        let body_scope = self
            .scopes
            .push(ScopeKind::Lambda { decl, inline }, Some(scope));
        if let Some(d) = self.decls.get_mut(decl) {
            d.body_scope = Some(body_scope);
        }
        let mut body_env = env.child();
        if let Some(receiver) = &receiver {
            body_env.push_receiver(ReceiverFrame {
                owner: decl,
                label: name,
                ty: receiver.clone(),
            });
        }
        let param_decls = self.declare_params(&lambda.params, &params, body_scope, &mut body_env);
        self.bindings.params.insert(decl, param_decls);

        let expected_ret = expected_fn.as_ref().map(|f| f.ret.clone());
        let body_ty =
            self.resolve_block_in(lambda.body, &body_env, body_scope, expected_ret.as_ref());
        // A lambda expected to return `Unit` discards its last value.
        let ret = match expected_ret {
            Some(Type::Unit) => Type::Unit,
            _ => body_ty,
        };
        let ty = Type::function(receiver, params, ret);
        self.set_decl_type(decl, ty.clone());
        ty
    }
}
