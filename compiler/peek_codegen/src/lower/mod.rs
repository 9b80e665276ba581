//! Lowering of resolved syntax trees to stack machine code.
//!
//! One [`Lowerer`] compiles one unit (a program or a fragment). Methods are
//! generated into a [`FrameBuilder`]; closures met along the way are
//! compiled into classes of their own and collected in the lowerer.
//!
//! Calls to inline functions are expanded at the call site: arguments are
//! stored into fresh slots of the caller's frame, lambdas passed for
//! function-typed parameters are remembered, and each call of such a
//! parameter inside the expanded body compiles the lambda's body in place.

mod call;
mod expr;
mod frame;

use peek_ir::stack::ensure_sufficient_stack;
use peek_ir::{ExprArena, ExprId, ExprKind, Function, LineIndex, StringInterner, Type};
use peek_resolve::{Bindings, DeclId, DeclKind, DeclTable};

pub(crate) use frame::FrameBuilder;

use crate::{
    ClassFile, CodegenError, Instruction, ModuleDescriptor, ReferenceInterceptor,
};

/// Name of the local slot holding the closure of local function `name`.
pub fn local_function_slot_name(name: &str) -> String {
    format!("$fun${name}")
}

pub(crate) struct Lowerer<'a> {
    arena: &'a ExprArena,
    decls: &'a DeclTable,
    bindings: &'a Bindings,
    interner: &'a StringInterner,
    module: &'a dyn ModuleDescriptor,
    interceptor: &'a dyn ReferenceInterceptor,
    /// Absent for fragments, whose code has no program lines.
    line_index: Option<&'a LineIndex>,
    classes: Vec<ClassFile>,
    closure_count: u32,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(
        arena: &'a ExprArena,
        decls: &'a DeclTable,
        bindings: &'a Bindings,
        interner: &'a StringInterner,
        module: &'a dyn ModuleDescriptor,
        interceptor: &'a dyn ReferenceInterceptor,
        line_index: Option<&'a LineIndex>,
    ) -> Self {
        Lowerer {
            arena,
            decls,
            bindings,
            interner,
            module,
            interceptor,
            line_index,
            classes: Vec::new(),
            closure_count: 0,
        }
    }

    /// Closure classes generated so far, in creation order.
    pub(crate) fn finish(self) -> Vec<ClassFile> {
        self.classes
    }

    fn name(&self, decl: DeclId) -> &'static str {
        self.interner.lookup(self.decls.get(decl).name)
    }

    /// Name of `decl` in local variable and captured-variable tables.
    fn slot_name(&self, decl: DeclId) -> String {
        let name = self.name(decl);
        match self.decls.get(decl).kind {
            DeclKind::LocalFunction { .. } => local_function_slot_name(name),
            _ => name.to_owned(),
        }
    }

    fn type_of(&self, id: ExprId) -> Type {
        self.bindings.type_of(id).cloned().unwrap_or(Type::Error)
    }

    fn unresolved(&self, id: ExprId) -> CodegenError {
        CodegenError::Unresolved {
            what: format!("expression at {:?}", self.arena.span(id)),
        }
    }

    fn mark_line(&self, frame: &mut FrameBuilder, id: ExprId) {
        if let Some(index) = self.line_index {
            frame.line(index.line_of(self.arena.span(id).start));
        }
    }

    /// Compile statements leaving the value of the last one, or `Unit`.
    pub(crate) fn statements(
        &mut self,
        frame: &mut FrameBuilder,
        stmts: &[ExprId],
    ) -> Result<(), CodegenError> {
        let Some((&last, init)) = stmts.split_last() else {
            frame.emit(Instruction::PushUnit);
            return Ok(());
        };
        for &stmt in init {
            self.mark_line(frame, stmt);
            self.effect(frame, stmt)?;
        }
        self.mark_line(frame, last);
        self.expr(frame, last)
    }

    /// Compile a statement for its effect only.
    fn effect(&mut self, frame: &mut FrameBuilder, stmt: ExprId) -> Result<(), CodegenError> {
        if self.arena.kind(stmt).is_declaration_or_statement() {
            self.statement(frame, stmt)
        } else {
            self.expr(frame, stmt)?;
            frame.emit(Instruction::Pop);
            Ok(())
        }
    }

    /// Compile an expression, leaving its value on the stack.
    pub(crate) fn expr(&mut self, frame: &mut FrameBuilder, id: ExprId) -> Result<(), CodegenError> {
        ensure_sufficient_stack(|| self.expr_inner(frame, id))
    }

    /// Compile the body of a function or local function.
    pub(crate) fn function_body(
        &mut self,
        frame: &mut FrameBuilder,
        function: &Function,
    ) -> Result<(), CodegenError> {
        if function.expr_body {
            self.mark_line(frame, function.body);
        }
        self.expr(frame, function.body)
    }

    fn next_closure_class(&mut self, owner: &str) -> String {
        self.closure_count += 1;
        format!("{owner}$lambda${}", self.closure_count)
    }

    /// Syntax of a lambda or local function declaration.
    fn closure_syntax(&self, decl: DeclId) -> Option<ClosureSyntax<'a>> {
        let arena = self.arena;
        match self.decls.get(decl).kind {
            DeclKind::Lambda { expr, .. } => match arena.kind(expr) {
                ExprKind::Lambda(lambda) => Some(ClosureSyntax::Lambda(lambda.body)),
                _ => None,
            },
            DeclKind::LocalFunction { expr } => match arena.kind(expr) {
                ExprKind::LocalFun(function) => Some(ClosureSyntax::Function(function)),
                _ => None,
            },
            _ => None,
        }
    }
}

enum ClosureSyntax<'a> {
    /// Body block of a lambda.
    Lambda(ExprId),
    Function(&'a Function),
}
