//! The resolving tree walk.
//!
//! One [`Walker`] resolves either a whole program or one fragment. It fills
//! the declaration table, scope tree and [`Bindings`], infers expression
//! types and reports diagnostics. In program mode it also records a
//! [`ContextSite`] for the first statement on every line.

mod call;
mod expr;
mod types;

use std::sync::Arc;

use peek_diagnostic::{Diagnostic, ErrorCode};
use peek_ir::{
    ExprArena, ExprId, ExprKind, Function, LineIndex, Module, Name, Param, Span, StringInterner,
    Type,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::env::{ContextSite, Env, ReceiverFrame};
use crate::{
    Bindings, DeclId, DeclKind, DeclTable, Declaration, Origin, ScopeId, ScopeKind, ScopeTree,
    Visibility,
};

/// Top-level functions, by name.
#[derive(Clone, Debug, Default)]
pub(crate) struct Globals {
    pub(crate) functions: FxHashMap<Name, DeclId>,
    /// Extension functions, several per name when receivers differ.
    pub(crate) extensions: FxHashMap<Name, Vec<DeclId>>,
    /// Declaration of each `Module::functions` entry.
    pub(crate) by_index: Vec<DeclId>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FnState {
    Pending,
    InProgress,
    Done,
}

pub(crate) struct Walker<'a> {
    pub(crate) interner: &'a StringInterner,
    pub(crate) arena: &'a ExprArena,
    pub(crate) module: &'a Module,
    pub(crate) globals: Arc<Globals>,
    pub(crate) decls: DeclTable,
    pub(crate) scopes: ScopeTree,
    pub(crate) bindings: Bindings,
    pub(crate) origin: Origin,
    pub(crate) top_scope: ScopeId,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Present in program mode only.
    line_index: Option<&'a LineIndex>,
    pub(crate) sites: FxHashMap<u32, ContextSite>,
    fn_states: FxHashMap<DeclId, FnState>,
    uses: FxHashMap<DeclId, u32>,
    /// Calls to inline functions: (enclosing top-level function, callee, span).
    inline_calls: Vec<(DeclId, DeclId, Span)>,
    current_function: Option<DeclId>,
    /// Function-typed parameters of inline functions; they may only be
    /// called or handed on to another inline function.
    inline_params: FxHashSet<DeclId>,
}

impl<'a> Walker<'a> {
    #[expect(clippy::too_many_arguments, reason = "walker state is assembled once per unit")]
    pub(crate) fn new(
        interner: &'a StringInterner,
        arena: &'a ExprArena,
        module: &'a Module,
        globals: Arc<Globals>,
        decls: DeclTable,
        mut scopes: ScopeTree,
        bindings: Bindings,
        origin: Origin,
        line_index: Option<&'a LineIndex>,
        top_scope: Option<ScopeId>,
    ) -> Self {
        let top_scope = top_scope.unwrap_or_else(|| scopes.push(ScopeKind::TopLevel, None));
        Walker {
            interner,
            arena,
            module,
            globals,
            decls,
            scopes,
            bindings,
            origin,
            top_scope,
            diagnostics: Vec::new(),
            line_index,
            sites: FxHashMap::default(),
            fn_states: FxHashMap::default(),
            uses: FxHashMap::default(),
            inline_calls: Vec::new(),
            current_function: None,
            inline_params: FxHashSet::default(),
        }
    }

    pub(crate) fn name(&self, name: Name) -> &'static str {
        self.interner.lookup(name)
    }

    pub(crate) fn error(&mut self, code: ErrorCode, span: Span, message: impl Into<String>) {
        let message = message.into();
        self.diagnostics.push(
            Diagnostic::error(code)
                .with_message(message.clone())
                .with_label(span, message),
        );
    }

    pub(crate) fn record_type(&mut self, id: ExprId, ty: Type) -> Type {
        self.bindings.types.insert(id, ty.clone());
        ty
    }

    /// Report a mismatch when `actual` cannot flow into `expected`.
    pub(crate) fn check_type(&mut self, expected: &Type, actual: &Type, span: Span) {
        if !expected.accepts(actual) {
            self.error(
                ErrorCode::E2001,
                span,
                format!("type mismatch: expected {expected}, found {actual}"),
            );
        }
    }

    pub(crate) fn declare(&mut self, decl: Declaration) -> DeclId {
        self.decls.push(decl)
    }

    pub(crate) fn set_decl_type(&mut self, id: DeclId, ty: Type) {
        if let Some(decl) = self.decls.get_mut(id) {
            decl.ty = ty;
        }
    }

    pub(crate) fn count_use(&mut self, decl: DeclId) {
        *self.uses.entry(decl).or_default() += 1;
    }

    pub(crate) fn is_inline_param(&self, decl: DeclId) -> bool {
        self.inline_params.contains(&decl)
    }

    fn record_site(&mut self, stmt: ExprId, env: &Env<'_>, scope: ScopeId) {
        let (Some(index), Some(function)) = (self.line_index, self.current_function) else {
            return;
        };
        let line = index.line_of(self.arena.span(stmt).start);
        self.sites
            .entry(line)
            .or_insert_with(|| env.snapshot(line, scope, function));
    }

    // Top-level functions

    /// Declare every top-level function so bodies can refer to each other
    /// regardless of order.
    pub(crate) fn declare_functions(&mut self) {
        let module = self.module;
        let mut globals = Globals::default();
        for (index, function) in module.functions.iter().enumerate() {
            let receiver = function.receiver.as_ref().map(|ty| self.lower_type(ty));
            let params = function
                .params
                .iter()
                .map(|p| p.ty.as_ref().map_or(Type::Error, |ty| self.lower_type(ty)))
                .collect();
            // An unannotated `= expr` body gets its return type on first use.
            let ret = match (&function.ret, function.expr_body) {
                (Some(ty), _) => self.lower_type(ty),
                (None, false) => Type::Unit,
                (None, true) => Type::Error,
            };
            let decl = self.declare(Declaration {
                name: function.name,
                kind: DeclKind::Function {
                    inline: function.modifiers.inline,
                    index,
                },
                ty: Type::function(receiver.clone(), params, ret),
                visibility: if function.modifiers.private {
                    Visibility::Private
                } else {
                    Visibility::Public
                },
                origin: Origin::Program,
                scope: self.top_scope,
                body_scope: None,
                span: function.name_span,
                mutable: false,
            });
            self.fn_states.insert(decl, FnState::Pending);
            globals.by_index.push(decl);

            let name = self.name(function.name);
            if let Some(receiver) = receiver {
                let same = globals.extensions.entry(function.name).or_default();
                let duplicate = same.iter().any(|other| {
                    self.decls.get(*other).receiver_type() == Some(&receiver)
                });
                if duplicate {
                    self.error(
                        ErrorCode::E2006,
                        function.name_span,
                        format!("extension `{receiver}.{name}` is already defined"),
                    );
                } else {
                    same.push(decl);
                }
            } else if globals.functions.contains_key(&function.name) {
                self.error(
                    ErrorCode::E2006,
                    function.name_span,
                    format!("function `{name}` is already defined"),
                );
            } else {
                globals.functions.insert(function.name, decl);
            }
        }
        self.globals = Arc::new(globals);
    }

    pub(crate) fn resolve_functions(&mut self) {
        let decls = self.globals.by_index.clone();
        for decl in decls {
            self.ensure_function_resolved(decl);
        }
    }

    /// Resolve a top-level function's body if needed and return its type.
    ///
    /// Only functions whose return type must be inferred depend on this
    /// ordering; a cycle through such a function is reported.
    pub(crate) fn ensure_function_resolved(&mut self, decl: DeclId) -> Type {
        match self.fn_states.get(&decl).copied() {
            Some(FnState::Pending) => {
                let DeclKind::Function { index, .. } = self.decls.get(decl).kind else {
                    return self.decls.get(decl).ty.clone();
                };
                let module = self.module;
                self.resolve_function(decl, &module.functions[index]);
            }
            Some(FnState::InProgress) if self.needs_inference(decl) => {
                let name = self.name(self.decls.get(decl).name);
                let span = self.decls.get(decl).span;
                self.error(
                    ErrorCode::E2013,
                    span,
                    format!("cannot infer the return type of recursive function `{name}`"),
                );
            }
            _ => {}
        }
        self.decls.get(decl).ty.clone()
    }

    fn needs_inference(&self, decl: DeclId) -> bool {
        match self.decls.get(decl).kind {
            DeclKind::Function { index, .. } => {
                let function = &self.module.functions[index];
                function.expr_body && function.ret.is_none()
            }
            DeclKind::LocalFunction { expr } => match self.arena.kind(expr) {
                ExprKind::LocalFun(function) => function.expr_body && function.ret.is_none(),
                _ => false,
            },
            _ => false,
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(function = self.name(function.name)))]
    fn resolve_function(&mut self, decl: DeclId, function: &'a Function) {
        self.fn_states.insert(decl, FnState::InProgress);
        let saved_function = self.current_function.replace(decl);

        let body_scope = self.scopes.push(ScopeKind::Function(decl), Some(self.top_scope));
        if let Some(d) = self.decls.get_mut(decl) {
            d.body_scope = Some(body_scope);
        }
        let signature = self.decls.get(decl).ty.clone();
        let Some(fn_ty) = signature.as_function().cloned() else {
            return;
        };

        let mut env = Env::root();
        if let Some(receiver) = &fn_ty.receiver {
            env.push_receiver(ReceiverFrame {
                owner: decl,
                label: function.name,
                ty: receiver.clone(),
            });
        }
        let params = self.declare_params(&function.params, &fn_ty.params, body_scope, &mut env);
        if function.modifiers.inline {
            for (param, ty) in params.iter().zip(&fn_ty.params) {
                if ty.as_function().is_some() {
                    self.inline_params.insert(*param);
                }
            }
        }
        self.bindings.params.insert(decl, params);

        let declared_ret = function.ret.as_ref().map(|_| fn_ty.ret.clone());
        let body_ty = self.resolve_body(function, &env, body_scope, declared_ret.as_ref());
        let ret = match declared_ret {
            Some(ret) => ret,
            None if function.expr_body => body_ty,
            None => Type::Unit,
        };
        self.set_decl_type(decl, Type::function(fn_ty.receiver.clone(), fn_ty.params.clone(), ret));

        self.current_function = saved_function;
        self.fn_states.insert(decl, FnState::Done);
    }

    /// Declare parameters into `scope` and the environment, in order.
    pub(crate) fn declare_params(
        &mut self,
        params: &[Param],
        types: &[Type],
        scope: ScopeId,
        env: &mut Env<'_>,
    ) -> Vec<DeclId> {
        params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let ty = types.get(i).cloned().unwrap_or(Type::Error);
                let id = self.declare(Declaration {
                    name: param.name,
                    kind: DeclKind::Parameter,
                    ty,
                    visibility: Visibility::Local,
                    origin: self.origin,
                    scope,
                    body_scope: None,
                    span: param.span,
                    mutable: false,
                });
                env.define(param.name, id);
                id
            })
            .collect()
    }

    /// Resolve a function body: a block whose statements live directly in
    /// `scope`, or a single expression.
    pub(crate) fn resolve_body(
        &mut self,
        function: &Function,
        env: &Env<'_>,
        scope: ScopeId,
        expected: Option<&Type>,
    ) -> Type {
        if function.expr_body {
            self.record_site(function.body, env, scope);
            let ty = self.resolve_expr(function.body, env, scope, expected);
            if let Some(expected) = expected {
                self.check_type(expected, &ty, self.arena.span(function.body));
            }
            ty
        } else {
            self.resolve_block_in(function.body, env, scope, expected)
        }
    }

    // Blocks and statements

    /// Resolve a `Block` node's statements directly in `scope`.
    pub(crate) fn resolve_block_in(
        &mut self,
        block: ExprId,
        parent: &Env<'_>,
        scope: ScopeId,
        expected: Option<&Type>,
    ) -> Type {
        let arena = self.arena;
        let ExprKind::Block { stmts } = arena.kind(block) else {
            let ty = self.resolve_expr(block, parent, scope, expected);
            return self.record_type(block, ty);
        };
        let mut env = parent.child();
        let ty = self.resolve_statements(stmts, &mut env, scope, expected);
        self.record_type(block, ty)
    }

    /// Resolve statements in order. The value of the sequence is the value
    /// of its last statement, or `Unit`.
    pub(crate) fn resolve_statements(
        &mut self,
        stmts: &[ExprId],
        env: &mut Env<'_>,
        scope: ScopeId,
        expected: Option<&Type>,
    ) -> Type {
        let mut ty = Type::Unit;
        for (i, &stmt) in stmts.iter().enumerate() {
            self.record_site(stmt, env, scope);
            let last = i + 1 == stmts.len();
            let stmt_expected = if last { expected } else { None };
            ty = self.resolve_statement(stmt, env, scope, stmt_expected);
            if last {
                if let Some(expected) = expected {
                    if !matches!(expected, Type::Unit) {
                        self.check_type(expected, &ty, self.arena.span(stmt));
                    }
                }
            }
        }
        ty
    }

    fn resolve_statement(
        &mut self,
        stmt: ExprId,
        env: &mut Env<'_>,
        scope: ScopeId,
        expected: Option<&Type>,
    ) -> Type {
        let arena = self.arena;
        match arena.kind(stmt) {
            ExprKind::Let {
                name,
                name_span,
                mutable,
                ty,
                init,
            } => {
                let declared = ty.as_ref().map(|ty| self.lower_type(ty));
                let init_ty = self.resolve_expr(*init, env, scope, declared.as_ref());
                let value_ty = match declared {
                    Some(declared) => {
                        self.check_type(&declared, &init_ty, arena.span(*init));
                        declared
                    }
                    None => init_ty,
                };
                let decl = self.declare(Declaration {
                    name: *name,
                    kind: DeclKind::Local,
                    ty: value_ty,
                    visibility: Visibility::Local,
                    origin: self.origin,
                    scope,
                    body_scope: None,
                    span: *name_span,
                    mutable: *mutable,
                });
                self.bindings.definitions.insert(stmt, decl);
                env.define(*name, decl);
                self.record_type(stmt, Type::Unit)
            }
            ExprKind::Assign { target, value } => {
                self.resolve_assign(*target, *value, env, scope);
                self.record_type(stmt, Type::Unit)
            }
            ExprKind::While { cond, body } => {
                let cond_ty = self.resolve_expr(*cond, env, scope, Some(&Type::Bool));
                self.check_type(&Type::Bool, &cond_ty, arena.span(*cond));
                self.resolve_expr(*body, env, scope, None);
                self.record_type(stmt, Type::Unit)
            }
            ExprKind::LocalFun(function) => {
                self.resolve_local_function(stmt, function, env, scope);
                self.record_type(stmt, Type::Unit)
            }
            _ => self.resolve_expr(stmt, env, scope, expected),
        }
    }

    fn resolve_assign(&mut self, target: ExprId, value: ExprId, env: &Env<'_>, scope: ScopeId) {
        let arena = self.arena;
        let ExprKind::Ident(name) = arena.kind(target) else {
            self.error(
                ErrorCode::E1006,
                arena.span(target),
                "invalid assignment target",
            );
            self.resolve_expr(value, env, scope, None);
            return;
        };
        let Some(decl) = env.lookup(*name) else {
            let text = self.name(*name);
            self.error(
                ErrorCode::E2002,
                arena.span(target),
                format!("unresolved reference `{text}`"),
            );
            self.resolve_expr(value, env, scope, None);
            return;
        };

        let target_decl = self.decls.get(decl).clone();
        let text = self.name(*name);
        if !(target_decl.mutable && target_decl.kind == DeclKind::Local) {
            self.error(
                ErrorCode::E2007,
                arena.span(target),
                format!("`{text}` cannot be reassigned"),
            );
        } else if target_decl.origin != self.origin {
            self.error(
                ErrorCode::E2014,
                arena.span(target),
                format!("cannot assign to `{text}` of the suspended frame from an evaluated fragment"),
            );
        }
        self.use_decl(target, decl, scope);
        self.record_type(target, target_decl.ty.clone());
        let value_ty = self.resolve_expr(value, env, scope, Some(&target_decl.ty));
        self.check_type(&target_decl.ty, &value_ty, arena.span(value));
    }

    fn resolve_local_function(
        &mut self,
        stmt: ExprId,
        function: &'a Function,
        env: &mut Env<'_>,
        scope: ScopeId,
    ) {
        let params: Vec<Type> = function
            .params
            .iter()
            .map(|p| p.ty.as_ref().map_or(Type::Error, |ty| self.lower_type(ty)))
            .collect();
        let declared_ret = function.ret.as_ref().map(|ty| self.lower_type(ty));
        let provisional = match (&declared_ret, function.expr_body) {
            (Some(ret), _) => ret.clone(),
            (None, false) => Type::Unit,
            (None, true) => Type::Error,
        };
        let decl = self.declare(Declaration {
            name: function.name,
            kind: DeclKind::LocalFunction { expr: stmt },
            ty: Type::function(None, params.clone(), provisional),
            visibility: Visibility::Local,
            origin: self.origin,
            scope,
            body_scope: None,
            span: function.name_span,
            mutable: false,
        });
        self.bindings.definitions.insert(stmt, decl);
        env.define(function.name, decl);
        self.fn_states.insert(decl, FnState::InProgress);

        let body_scope = self.scopes.push(ScopeKind::LocalFunction(decl), Some(scope));
        if let Some(d) = self.decls.get_mut(decl) {
            d.body_scope = Some(body_scope);
        }
        let mut body_env = env.child();
        let param_decls = self.declare_params(&function.params, &params, body_scope, &mut body_env);
        self.bindings.params.insert(decl, param_decls);
        let body_ty = self.resolve_body(function, &body_env, body_scope, declared_ret.as_ref());

        let ret = match declared_ret {
            Some(ret) => ret,
            None if function.expr_body => body_ty,
            None => Type::Unit,
        };
        self.set_decl_type(decl, Type::function(None, params, ret));
        self.fn_states.insert(decl, FnState::Done);
    }

    /// Check a local function referenced before its inferred return type is
    /// known, as in `fun f(n: Int) = f(n - 1)`.
    pub(crate) fn check_local_function_ready(&mut self, decl: DeclId, span: Span) {
        if self.fn_states.get(&decl) == Some(&FnState::InProgress) && self.needs_inference(decl) {
            let name = self.name(self.decls.get(decl).name);
            self.error(
                ErrorCode::E2013,
                span,
                format!("cannot infer the return type of recursive function `{name}`"),
            );
        }
    }

    pub(crate) fn note_inline_call(&mut self, callee: DeclId, span: Span) {
        if let Some(caller) = self.current_function {
            self.inline_calls.push((caller, callee, span));
        }
    }

    // Finishing passes

    /// Report inline functions that expand into themselves.
    pub(crate) fn check_inline_recursion(&mut self) {
        let mut edges: FxHashMap<DeclId, Vec<DeclId>> = FxHashMap::default();
        for &(caller, callee, _) in &self.inline_calls {
            edges.entry(caller).or_default().push(callee);
        }
        let mut reported = FxHashSet::default();
        for &(caller, callee, span) in &self.inline_calls.clone() {
            if !self.decls.get(caller).is_inline_function() || reported.contains(&caller) {
                continue;
            }
            if reaches(&edges, callee, caller) {
                reported.insert(caller);
                let name = self.name(self.decls.get(caller).name);
                self.error(
                    ErrorCode::E2012,
                    span,
                    format!("inline function `{name}` cannot call itself"),
                );
            }
        }
    }

    /// Warn about locals of this unit that are never read.
    pub(crate) fn report_unused(&mut self) {
        let mut unused: Vec<(Span, &'static str)> = self
            .decls
            .iter_own()
            .filter(|(id, decl)| {
                decl.kind == DeclKind::Local
                    && decl.origin == self.origin
                    && !self.uses.contains_key(id)
            })
            .map(|(_, decl)| (decl.span, self.interner.lookup(decl.name)))
            .filter(|(_, name)| !name.starts_with('_'))
            .collect();
        unused.sort_by_key(|(span, _)| span.start);
        for (span, name) in unused {
            self.diagnostics.push(
                Diagnostic::warning(ErrorCode::W2001)
                    .with_message(format!("value `{name}` is never used"))
                    .with_label(span, "never used"),
            );
        }
    }
}

/// Whether `to` is reachable from `from` along `edges`.
fn reaches(edges: &FxHashMap<DeclId, Vec<DeclId>>, from: DeclId, to: DeclId) -> bool {
    let mut stack = vec![from];
    let mut seen = FxHashSet::default();
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if seen.insert(node) {
            stack.extend(edges.get(&node).into_iter().flatten().copied());
        }
    }
    false
}
