//! Calls, inline expansion and closure creation.

use peek_ir::{ExprId, ExprKind, Function, Type};
use peek_resolve::{
    receiver_slot_name, Builtin, CallKind, Capture, DeclId, DeclKind, MemberBuiltin, Reference,
};

use super::frame::CaptureLayout;
use super::{ClosureSyntax, FrameBuilder, Lowerer};
use crate::{
    BinaryType, CapturedVariable, ClassFile, ClassFlags, CodegenError, Instruction, MethodFlags,
    INVOKE_METHOD,
};

fn argc(n: usize) -> Result<u16, CodegenError> {
    u16::try_from(n).map_err(|_| CodegenError::TooManyArguments)
}

/// Return type of a callable declaration's function type.
fn return_type(ty: &Type) -> Type {
    ty.as_function().map_or(Type::Error, |f| f.ret.clone())
}

impl Lowerer<'_> {
    pub(super) fn call(
        &mut self,
        frame: &mut FrameBuilder,
        id: ExprId,
        callee: ExprId,
        args: &[ExprId],
    ) -> Result<(), CodegenError> {
        match self.bindings.call(id) {
            Some(CallKind::Static(decl)) => {
                self.arguments(frame, args)?;
                self.invoke_static(frame, decl, args.len())
            }
            Some(CallKind::Inline(decl)) => self.inline_call(frame, decl, None, args),
            Some(CallKind::LocalFunction(_)) => {
                self.load_reference(frame, callee)?;
                self.arguments(frame, args)?;
                frame.emit(Instruction::InvokeClosure {
                    argc: argc(args.len())?,
                });
                Ok(())
            }
            Some(CallKind::Closure) => {
                if let Some(lambda) = self.inline_lambda_of(frame, callee) {
                    return self.expand_lambda(frame, lambda, args);
                }
                self.expr(frame, callee)?;
                self.arguments(frame, args)?;
                frame.emit(Instruction::InvokeClosure {
                    argc: argc(args.len())?,
                });
                Ok(())
            }
            Some(CallKind::Builtin(builtin)) => {
                let [arg] = args else {
                    return Err(self.unresolved(id));
                };
                self.expr(frame, *arg)?;
                frame.emit(match builtin {
                    Builtin::Println => Instruction::Print,
                    Builtin::Error => Instruction::Throw,
                });
                // `error` never returns; keep one value per expression anyway.
                frame.emit(Instruction::PushUnit);
                Ok(())
            }
            Some(CallKind::Member(_)) | None => Err(self.unresolved(id)),
        }
    }

    pub(super) fn method_call(
        &mut self,
        frame: &mut FrameBuilder,
        id: ExprId,
        receiver: ExprId,
        args: &[ExprId],
    ) -> Result<(), CodegenError> {
        match self.bindings.call(id) {
            Some(CallKind::Member(MemberBuiltin::ToString)) => {
                self.expr(frame, receiver)?;
                if self.type_of(receiver) != Type::Str {
                    frame.emit(Instruction::ToStr);
                }
                Ok(())
            }
            Some(CallKind::Static(decl)) => {
                self.expr(frame, receiver)?;
                self.arguments(frame, args)?;
                self.invoke_static(frame, decl, args.len() + 1)
            }
            Some(CallKind::Inline(decl)) => self.inline_call(frame, decl, Some(receiver), args),
            _ => Err(self.unresolved(id)),
        }
    }

    fn arguments(&mut self, frame: &mut FrameBuilder, args: &[ExprId]) -> Result<(), CodegenError> {
        for &arg in args {
            self.expr(frame, arg)?;
        }
        Ok(())
    }

    fn invoke_static(
        &mut self,
        frame: &mut FrameBuilder,
        decl: DeclId,
        count: usize,
    ) -> Result<(), CodegenError> {
        let target = self
            .module
            .function_owner(decl)
            .ok_or_else(|| CodegenError::Unresolved {
                what: format!("function `{}`", self.name(decl)),
            })?;
        frame.emit(Instruction::InvokeStatic {
            class: target.class,
            method: target.method,
            argc: argc(count)?,
        });
        Ok(())
    }

    // ── Inline expansion ────────────────────────────────────────────

    /// Expand the body of inline function `decl` at the call site.
    fn inline_call(
        &mut self,
        frame: &mut FrameBuilder,
        decl: DeclId,
        receiver: Option<ExprId>,
        args: &[ExprId],
    ) -> Result<(), CodegenError> {
        let module = self.module;
        let body: &Function = module
            .inline_body(decl)
            .ok_or_else(|| CodegenError::Unresolved {
                what: format!("body of inline function `{}`", self.name(decl)),
            })?;
        let params = self.bindings.params(decl).to_vec();
        let saved = frame.save(decl, &params);

        if let Some(receiver) = receiver {
            self.expr(frame, receiver)?;
            let slot = frame.temp()?;
            frame.emit(Instruction::Store(slot));
            frame.receivers.insert(decl, slot);
        }
        for (&param, &arg) in params.iter().zip(args) {
            if let Some(lambda) = self.inline_argument(frame, arg) {
                frame.inline_lambdas.insert(param, lambda);
                continue;
            }
            self.expr(frame, arg)?;
            let slot = frame.alloc(param)?;
            frame.emit(Instruction::Store(slot));
        }

        frame.inlining += 1;
        let expanded = self.function_body(frame, body);
        frame.inlining -= 1;
        frame.restore(saved);
        expanded?;

        if BinaryType::of(&return_type(&self.decls.get(decl).ty)) == BinaryType::Void {
            frame.emit(Instruction::Pop);
            frame.emit(Instruction::PushUnit);
        }
        Ok(())
    }

    /// The lambda an inline function argument stands for, if it is passed
    /// by syntax rather than by value.
    fn inline_argument(&self, frame: &FrameBuilder, arg: ExprId) -> Option<ExprId> {
        match self.arena.kind(arg) {
            ExprKind::Lambda(_) => {
                let decl = self.bindings.definition(arg)?;
                matches!(self.decls.get(decl).kind, DeclKind::Lambda { inline: true, .. })
                    .then_some(arg)
            }
            ExprKind::Ident(_) => self.inline_lambda_of(frame, arg),
            _ => None,
        }
    }

    /// The lambda bound to an inline function parameter `id` refers to.
    fn inline_lambda_of(&self, frame: &FrameBuilder, id: ExprId) -> Option<ExprId> {
        match self.bindings.reference(id)? {
            Reference::Decl(decl) => frame.inline_lambdas.get(&decl).copied(),
            Reference::Receiver(_) => None,
        }
    }

    /// Compile the body of an inlined lambda in place of its invocation.
    fn expand_lambda(
        &mut self,
        frame: &mut FrameBuilder,
        lambda: ExprId,
        args: &[ExprId],
    ) -> Result<(), CodegenError> {
        let decl = self
            .bindings
            .definition(lambda)
            .ok_or_else(|| self.unresolved(lambda))?;
        let Some(ClosureSyntax::Lambda(body)) = self.closure_syntax(decl) else {
            return Err(self.unresolved(lambda));
        };
        let ty = self.decls.get(decl).ty.clone();
        let has_receiver = ty.as_function().is_some_and(|f| f.receiver.is_some());
        let params = self.bindings.params(decl).to_vec();
        let saved = frame.save(decl, &params);

        let mut args = args.iter().copied();
        if has_receiver {
            if let Some(receiver) = args.next() {
                self.expr(frame, receiver)?;
                let slot = frame.temp()?;
                frame.emit(Instruction::Store(slot));
                frame.receivers.insert(decl, slot);
            }
        }
        for (&param, arg) in params.iter().zip(args) {
            self.expr(frame, arg)?;
            let slot = frame.alloc(param)?;
            frame.emit(Instruction::Store(slot));
        }

        let expanded = self.expr(frame, body);
        frame.restore(saved);
        expanded?;

        if BinaryType::of(&return_type(&ty)) == BinaryType::Void {
            frame.emit(Instruction::Pop);
            frame.emit(Instruction::PushUnit);
        }
        Ok(())
    }

    // ── Closures ────────────────────────────────────────────────────

    /// Compile lambda or local function `decl` into a closure class and
    /// push a closure object carrying its captured values.
    pub(super) fn make_closure(
        &mut self,
        frame: &mut FrameBuilder,
        decl: DeclId,
    ) -> Result<(), CodegenError> {
        let syntax = self
            .closure_syntax(decl)
            .ok_or_else(|| CodegenError::Unresolved {
                what: format!("closure `{}`", self.name(decl)),
            })?;

        let captures = self.bindings.captures(decl).to_vec();
        let mut layout = Vec::with_capacity(captures.len());
        for capture in captures {
            let boxed = self.push_capture(frame, capture)?;
            let (name, ty) = match capture {
                Capture::Value(captured) => (
                    self.slot_name(captured),
                    BinaryType::of(&self.decls.get(captured).ty),
                ),
                Capture::Receiver(owner) => (
                    receiver_slot_name(self.name(owner)),
                    self.decls
                        .get(owner)
                        .receiver_type()
                        .map_or(BinaryType::Void, BinaryType::of),
                ),
            };
            layout.push(CaptureLayout {
                capture,
                variable: CapturedVariable {
                    name,
                    ty: if boxed { BinaryType::Ref } else { ty },
                },
                boxed,
            });
        }
        let count = argc(layout.len()).map_err(|_| CodegenError::TooManyCaptures {
            class: frame.owner.clone(),
        })?;

        let class_name = self.next_closure_class(&frame.owner);
        let self_decl = matches!(self.decls.get(decl).kind, DeclKind::LocalFunction { .. })
            .then_some(decl);
        let mut inner = FrameBuilder::closure(&class_name, self_decl, layout)?;
        inner.inlining = frame.inlining;

        let ty = self.decls.get(decl).ty.clone();
        let signature = ty.as_function().ok_or_else(|| CodegenError::Unresolved {
            what: format!("type of closure `{}`", self.name(decl)),
        })?;
        if let Some(receiver) = &signature.receiver {
            inner.receiver_param(decl, &receiver_slot_name(self.name(decl)), receiver)?;
        }
        for &param in self.bindings.params(decl) {
            let declaration = self.decls.get(param);
            inner.param(Some(param), self.name(param), &declaration.ty)?;
        }

        match syntax {
            ClosureSyntax::Lambda(body) => self.expr(&mut inner, body)?,
            ClosureSyntax::Function(function) => self.function_body(&mut inner, function)?,
        }
        let code = inner.finish_body(&signature.ret);

        let mut class = ClassFile::new(
            &class_name,
            ClassFlags::FINAL | ClassFlags::SYNTHETIC | ClassFlags::CLOSURE,
        );
        class.captures = code.captures.clone();
        class.methods.push(code.into_method(
            INVOKE_METHOD,
            MethodFlags::SYNTHETIC,
            signature.invocation_params().map(BinaryType::of).collect(),
            BinaryType::of(&signature.ret),
        ));
        self.classes.push(class);

        frame.emit(Instruction::MakeClosure {
            class: class_name,
            captures: count,
        });
        Ok(())
    }
}
